//! Runs a seeded encoder over token ids given on the command line.
//!
//! ```text
//! encode --tokens 5,6,7 --tokens 8,9 --pad-id 0 --causal
//! encode --config model.json --tokens 1,2,3 --train --seed 7
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use encoder_rs::models::{EncoderConfig, TransformerEncoder};
use encoder_rs::nn::transformer::Mask;
use encoder_rs::nn::{Activation, ForwardContext};
use encoder_rs::tensor::Tensor;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "encode",
    version,
    about = "Encode token id sequences with a transformer encoder and print the result."
)]
struct Cli {
    /// JSON model config; overrides the inline dimension flags
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 64)]
    d_model: usize,

    #[arg(long, default_value_t = 1000)]
    vocab_size: usize,

    #[arg(long, default_value_t = 128)]
    max_seq_len: usize,

    #[arg(long, default_value_t = 4)]
    num_heads: usize,

    #[arg(long, default_value_t = 2)]
    num_layers: usize,

    #[arg(long, default_value_t = 256)]
    d_ff: usize,

    #[arg(long, default_value_t = 0.1)]
    dropout: f64,

    #[arg(long, default_value_t = 1e-6)]
    eps: f64,

    /// relu or gelu
    #[arg(long, default_value = "relu")]
    activation: Activation,

    /// One comma-separated sequence per flag, e.g. `--tokens 1,2,3`
    #[arg(long, required = true)]
    tokens: Vec<String>,

    /// Forbid attention to future positions
    #[arg(long)]
    causal: bool,

    /// Pad shorter sequences with this id and mask it out
    #[arg(long)]
    pad_id: Option<usize>,

    /// Run with dropout active
    #[arg(long)]
    train: bool,

    /// Seed for parameters and dropout
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

impl Cli {
    fn model_config(&self) -> Result<EncoderConfig> {
        let config = match &self.config {
            Some(path) => EncoderConfig::from_path(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => EncoderConfig::new(
                self.d_model,
                self.vocab_size,
                self.max_seq_len,
                self.num_heads,
                self.num_layers,
                self.d_ff,
            )
            .with_dropout(self.dropout)
            .with_eps(self.eps)
            .with_activation(self.activation),
        };
        Ok(config.with_seed(self.seed))
    }

    fn token_batch(&self) -> Result<Tensor<usize, 2>> {
        let sequences = self
            .tokens
            .iter()
            .map(|seq| {
                seq.split(',')
                    .map(|t| {
                        t.trim()
                            .parse::<usize>()
                            .with_context(|| format!("invalid token id '{t}'"))
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        let seq_len = sequences.iter().map(Vec::len).max().unwrap_or(0);
        let mut data = Vec::with_capacity(sequences.len() * seq_len);
        for seq in &sequences {
            if seq.len() != seq_len {
                let Some(pad) = self.pad_id else {
                    bail!("sequences differ in length; pass --pad-id to pad them");
                };
                data.extend(seq.iter().copied().chain(std::iter::repeat(pad)).take(seq_len));
            } else {
                data.extend_from_slice(seq);
            }
        }

        Ok(Tensor::new(data, [sequences.len(), seq_len])?)
    }

    fn mask(&self, ids: &Tensor<usize, 2>) -> Result<Option<Mask>> {
        let seq_len = ids.shape()[1];
        let mask = match (self.pad_id, self.causal) {
            (Some(pad), true) => Some(Mask::padding(ids, pad).and(&Mask::causal(seq_len))?),
            (Some(pad), false) => Some(Mask::padding(ids, pad)),
            (None, true) => Some(Mask::causal(seq_len)),
            (None, false) => None,
        };
        Ok(mask)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("encoder_rs=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let config = cli.model_config()?;
    let model = TransformerEncoder::<f32>::from_config(&config)?;

    let ids = cli.token_batch()?;
    let mask = cli.mask(&ids)?;
    let mut ctx = if cli.train {
        ForwardContext::train(cli.seed)
    } else {
        ForwardContext::eval()
    };

    info!(batch = ids.shape()[0], seq_len = ids.shape()[1], mode = %ctx.mode(), "encoding");
    let output = model.forward(&ids, mask.as_ref(), &mut ctx)?;

    let [batch, seq_len, d_model] = *output.shape();
    println!("output shape: [{batch}, {seq_len}, {d_model}]");
    if d_model > 0 {
        for (row, position) in output.data().chunks(d_model).enumerate() {
            let norm = position.iter().map(|v| v * v).sum::<f32>().sqrt();
            println!("  [{}, {}] l2 = {norm:.6}", row / seq_len, row % seq_len);
        }
    }

    Ok(())
}

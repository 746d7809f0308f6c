//! Reanudar CLI - prove checkpoint/restore continuation
//!
//! # Commands
//!
//! - `verify` - Checkpoint a generation, resume it in a fresh engine, and
//!   require the two continuations to match token for token
//! - `generate` - Straight generation from a prompt, no checkpoint

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use reanudar::{
    error::Result, harness, ByteTokenizer, EngineConfig, HarnessConfig, MixerEngine,
    ReanudarError, SamplerConfig,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Reanudar - checkpoint and restore for token generation
///
/// Captures engine state mid-generation and proves the restored engine
/// continues bit-identically.
#[derive(Parser)]
#[command(name = "reanudar")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prove that generation resumes bit-identically from a saved state
    ///
    /// Examples:
    ///   reanudar verify
    ///   reanudar verify -p "Once upon a time" -n 32 --temperature 0.8
    Verify {
        /// Prompt evaluated before the checkpoint
        #[arg(short, long, default_value = "The quick brown fox")]
        prompt: String,

        /// Tokens to generate after the checkpoint
        #[arg(short = 'n', long, default_value = "16")]
        n_predict: usize,

        /// Context length (cache positions)
        #[arg(short, long, default_value = "512")]
        context_length: usize,

        /// Engine and sampling seed
        #[arg(short, long, default_value = "42")]
        seed: u64,

        /// Sampling temperature (0.0 = greedy)
        #[arg(short, long, default_value = "0.0")]
        temperature: f32,

        /// Keep only the top-k logits when sampling (0 = all)
        #[arg(long, default_value = "0")]
        top_k: usize,

        /// Recent-token window length
        #[arg(long, default_value = "64")]
        history_window: usize,

        /// Where to persist the state blob
        #[arg(long, default_value = "state.bin")]
        state_file: PathBuf,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Generate tokens from a prompt without checkpointing
    ///
    /// Examples:
    ///   reanudar generate -p "The quick brown fox" -n 16
    Generate {
        /// Prompt to continue
        #[arg(short, long, default_value = "The quick brown fox")]
        prompt: String,

        /// Tokens to generate
        #[arg(short = 'n', long, default_value = "16")]
        n_predict: usize,

        /// Context length (cache positions)
        #[arg(short, long, default_value = "512")]
        context_length: usize,

        /// Engine and sampling seed
        #[arg(short, long, default_value = "42")]
        seed: u64,

        /// Sampling temperature (0.0 = greedy)
        #[arg(short, long, default_value = "0.0")]
        temperature: f32,

        /// Keep only the top-k logits when sampling (0 = all)
        #[arg(long, default_value = "0")]
        top_k: usize,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

/// Generation output for `--format json`
#[derive(Serialize)]
struct GenerateOutput {
    prompt: String,
    tokens: Vec<u32>,
    text: String,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        },
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Verify {
            prompt,
            n_predict,
            context_length,
            seed,
            temperature,
            top_k,
            history_window,
            state_file,
            format,
        } => {
            let engine_config = EngineConfig::default()
                .with_context_length(context_length)
                .with_seed(seed);
            let config = HarnessConfig {
                prompt,
                n_predict,
                history_window,
                sampler: SamplerConfig {
                    temperature,
                    top_k,
                    seed,
                },
            };

            let report = harness::prove_continuation(
                || MixerEngine::new(engine_config),
                &config,
                &state_file,
            )?;

            if format == "json" {
                println!("{}", to_json(&report)?);
            } else {
                println!("prompt     : {}", config.prompt);
                println!(
                    "state file : {} ({} bytes)",
                    state_file.display(),
                    report.state_size
                );
                println!("first run  : {}", report.first_text);
                println!("second run : {}", report.second_text);
                if report.identical {
                    println!("result     : continuations identical");
                } else {
                    println!("result     : DIVERGED");
                }
            }

            if report.identical {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        },
        Commands::Generate {
            prompt,
            n_predict,
            context_length,
            seed,
            temperature,
            top_k,
            format,
        } => {
            let engine_config = EngineConfig::default()
                .with_context_length(context_length)
                .with_seed(seed);
            let config = HarnessConfig {
                prompt: prompt.clone(),
                n_predict,
                history_window: 64,
                sampler: SamplerConfig {
                    temperature,
                    top_k,
                    seed,
                },
            };

            let mut engine = MixerEngine::new(engine_config)?;
            let tokens = harness::run_generation(&mut engine, &config)?;
            let text = ByteTokenizer.decode(&tokens);

            if format == "json" {
                let output = GenerateOutput {
                    prompt,
                    tokens,
                    text,
                };
                println!("{}", to_json(&output)?);
            } else {
                println!("{prompt}{text}");
            }
            Ok(ExitCode::SUCCESS)
        },
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| ReanudarError::IoError {
        message: format!("failed to render JSON output: {e}"),
    })
}

//! openpad-replay - decode, encode and replay 8BitDo Ultimate 2C reports
//!
//! Runs captured interrupt-in traffic through the same control link the
//! driver uses, over an in-memory transport, so captures can be checked
//! without hardware.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod capture;
mod output;
mod replay;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use hid_8bitdo_protocol::{
    ControlState, Decoded, RumbleCommand, build_announce_report, build_rumble_report, parse,
};
use openpad_link::LinkConfig;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::capture::{CaptureFile, parse_hex_bytes, parse_magnitude};
use crate::replay::ReplayOptions;

/// Decode and replay 8BitDo Ultimate 2C reports.
#[derive(Parser)]
#[command(
    name = "openpad-replay",
    about = "8BitDo Ultimate 2C report decoder and capture replay tool"
)]
#[command(version)]
struct Cli {
    /// Output in JSON format for machine parsing
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode one input report
    Decode {
        /// Report bytes, e.g. "0x00 0x14 0x01 ..." or "001401..."
        hex: String,
    },
    /// Print the rumble report for a pair of magnitudes
    Rumble {
        /// Heavy motor magnitude (decimal or 0x hex)
        #[arg(long, value_parser = parse_magnitude, default_value = "0")]
        strong: u16,
        /// Light motor magnitude (decimal or 0x hex)
        #[arg(long, value_parser = parse_magnitude, default_value = "0")]
        weak: u16,
    },
    /// Print the announce report sent after attach
    Announce,
    /// Replay a capture file through the control link
    Replay {
        /// Capture file written by a HID capture session
        file: PathBuf,
        /// Honour capture timestamps
        #[arg(long)]
        realtime: bool,
        /// Link configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn init_logging(verbose: u8) {
    let log_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("openpad_replay={log_level},openpad_link={log_level}").into()
            }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn load_config(path: Option<&Path>) -> Result<LinkConfig> {
    let Some(path) = path else {
        return Ok(LinkConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    let config = LinkConfig::from_json_str(&text)
        .with_context(|| format!("Invalid config file '{}'", path.display()))?;
    debug!(?config, "link config loaded");
    Ok(config)
}

fn decode_command(hex: &str, json: bool) -> Result<()> {
    let bytes = parse_hex_bytes(hex).map_err(anyhow::Error::msg)?;
    if bytes.is_empty() {
        bail!("no report bytes given");
    }
    let decoded = parse(&bytes, &ControlState::default()).context("Failed to decode report")?;
    match decoded {
        Decoded::State(state) => output::print_decoded(Some(&state), bytes[0], json),
        Decoded::NotApplicable => output::print_decoded(None, bytes[0], json),
    }
    Ok(())
}

async fn execute(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Decode { hex } => decode_command(hex, cli.json),
        Commands::Rumble { strong, weak } => {
            let report = build_rumble_report(RumbleCommand::new(*weak, *strong));
            output::print_report("rumble", &report, cli.json);
            Ok(())
        }
        Commands::Announce => {
            output::print_report("announce", &build_announce_report(), cli.json);
            Ok(())
        }
        Commands::Replay {
            file,
            realtime,
            config,
        } => {
            let options = ReplayOptions {
                realtime: *realtime,
                config: load_config(config.as_deref())?,
            };
            let capture = CaptureFile::load(file)?;
            let summary = replay::replay(&capture, &options).await?;
            output::print_replay(&summary, cli.json);
            Ok(())
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match execute(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.json {
                output::print_error_json(&e);
            } else {
                output::print_error_human(&e);
            }
            ExitCode::FAILURE
        }
    }
}

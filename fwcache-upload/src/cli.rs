// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use crate::commands;
use crate::transport::Transport;

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "fwcache-upload")]
#[command(about = "Push and pull module firmware through the fwcache controller")]
pub struct Cli {
    /// Serial port (e.g., /dev/ttyACM0)
    #[arg(short, long)]
    pub port: Option<String>,

    /// Reply timeout in milliseconds
    #[arg(short, long, default_value = "2000")]
    pub timeout: u64,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Push an Intel HEX file into the next free bucket
    Push {
        /// Firmware HEX file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Module type the firmware is for
        #[arg(short, long, value_parser = parse_u8)]
        module_type: u8,
    },

    /// Pull a cached image into a raw binary file
    Pull {
        #[arg(value_name = "BUCKET")]
        bucket: u8,

        /// Output binary file
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Mask the high byte of every 12-bit instruction word
        #[arg(long)]
        pic12: bool,
    },

    /// Compare a cached image with an Intel HEX file
    Verify {
        #[arg(value_name = "BUCKET")]
        bucket: u8,

        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Show module type and length of a cached image
    Info {
        #[arg(value_name = "BUCKET")]
        bucket: u8,
    },

    /// Show the number of cached images
    Count,

    /// Show where a bucket lives in flash
    Layout {
        #[arg(value_name = "BUCKET")]
        bucket: u8,
    },

    /// Forget every cached image
    Clear,

    /// Abandon the push in progress
    Cancel,

    /// Print the bus chunks of an Intel HEX file
    Encode {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

/// Parse a decimal or `0x`-prefixed hex byte.
fn parse_u8(s: &str) -> Result<u8, String> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    }
    .map_err(|e| format!("invalid byte value: {e}"))
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Encode { file } => commands::encode(&file),

        cmd => {
            let port = cli
                .port
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("--port is required for this command"))?;
            let mut transport = Transport::new(port, cli.timeout)?;

            match cmd {
                Commands::Push { file, module_type } => {
                    commands::push(&mut transport, &file, module_type)
                }
                Commands::Pull {
                    bucket,
                    output,
                    pic12,
                } => commands::pull(&mut transport, bucket, &output, pic12),
                Commands::Verify { bucket, file } => commands::verify(&mut transport, bucket, &file),
                Commands::Info { bucket } => commands::info(&mut transport, bucket),
                Commands::Count => commands::count(&mut transport),
                Commands::Layout { bucket } => commands::layout(&mut transport, bucket),
                Commands::Clear => commands::clear(&mut transport),
                Commands::Cancel => commands::cancel(&mut transport),
                Commands::Encode { .. } => bail!("unreachable"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_and_hex_bytes() {
        assert_eq!(parse_u8("12"), Ok(12));
        assert_eq!(parse_u8("0x1f"), Ok(0x1F));
        assert!(parse_u8("0x100").is_err());
        assert!(parse_u8("abc").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}

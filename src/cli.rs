//! CLI argument parsing

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use pdc002::DeviceConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Parse a string as a hex u32, with or without `0x` prefix
fn parse_address(s: &str) -> Result<u32, String> {
    let hex = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid address: {}", e))
}

/// Parse a string as a hex (with `0x` prefix) or decimal length
fn parse_length(s: &str) -> Result<usize, String> {
    let length = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))?
    } else {
        s.parse::<usize>()
            .map_err(|e| format!("Invalid number: {}", e))?
    };
    if length == 0 {
        Err("Length must be positive".to_string())
    } else {
        Ok(length)
    }
}

/// Parse a USB ID given in hex
fn parse_usb_id(s: &str) -> Result<u16, String> {
    let hex = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u16::from_str_radix(hex, 16).map_err(|e| format!("Invalid USB ID: {}", e))
}

#[derive(Parser)]
#[command(name = "pdc002")]
#[command(author, version, about = "PDC002 bootloader tool", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// USB vendor ID (hex)
    #[arg(long, global = true, value_parser = parse_usb_id, default_value = "0716")]
    pub vid: u16,

    /// USB product ID (hex)
    #[arg(long, global = true, value_parser = parse_usb_id, default_value = "5036")]
    pub pid: u16,

    /// Timeout for each USB transfer in milliseconds
    #[arg(long, global = true, default_value_t = 1000)]
    pub timeout_ms: u64,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn device_config(&self) -> DeviceConfig {
        DeviceConfig {
            vendor_id: self.vid,
            product_id: self.pid,
            timeout: Duration::from_millis(self.timeout_ms),
            ..DeviceConfig::default()
        }
    }

    /// Log level selected by `-v`. An explicit `RUST_LOG` still takes precedence.
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Erase, program, verify and start a firmware image
    Flash {
        /// Flat binary firmware image
        firmware: PathBuf,

        /// Stop at the first verification mismatch
        #[arg(long)]
        abort_on_mismatch: bool,
    },

    /// Query the bootloader status
    Status,

    /// Read and print target memory
    Read {
        /// Start address (hex)
        #[arg(value_parser = parse_address)]
        address: u32,

        /// Number of bytes
        #[arg(value_parser = parse_length, default_value = "1")]
        length: usize,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Hex)]
        format: Format,
    },

    /// Dump target memory into a file
    Dump {
        /// Start address (hex)
        #[arg(value_parser = parse_address)]
        address: u32,

        /// Number of bytes
        #[arg(value_parser = parse_length)]
        length: usize,

        /// Output file
        output: PathBuf,
    },

    /// Leave the bootloader and start the application
    Reset,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Hex bytes
    Hex,
    /// Text messages of the firmware log
    Log,
}

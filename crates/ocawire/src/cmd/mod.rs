use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod command;
pub mod decode;
pub mod keepalive;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode frames from hex text, a binary file or stdin.
    Decode(DecodeArgs),
    /// Encode a KeepAlive frame.
    Keepalive(KeepaliveArgs),
    /// Encode a Command frame (with --rrq, a Command-with-response).
    Command(CommandArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Decode(args) => decode::run(args, format),
        Command::Keepalive(args) => keepalive::run(args, format),
        Command::Command(args) => command::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Frame bytes as hex (whitespace ignored). Reads stdin when neither this nor --file is given.
    #[arg(conflicts_with = "file")]
    pub hex: Option<String>,
    /// Read frame bytes from a file.
    #[arg(long, short = 'f')]
    pub file: Option<PathBuf>,
    /// Treat --file / stdin contents as hex text instead of binary.
    #[arg(long)]
    pub text: bool,
    /// Feed the reassembler this many bytes at a time.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub chunk_size: Option<u64>,
    /// Reject frames that declare more than this many bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_frame_size: Option<usize>,
}

#[derive(Args, Debug)]
pub struct KeepaliveArgs {
    /// Heartbeat interval (e.g. 3s, 2500ms; a bare number is milliseconds).
    pub interval: String,
}

#[derive(Args, Debug)]
pub struct CommandArgs {
    /// Target object number.
    #[arg(long)]
    pub target: u32,
    /// Method definition level.
    #[arg(long, default_value = "1")]
    pub level: u16,
    /// Method index within the level.
    #[arg(long, default_value = "1")]
    pub index: u16,
    /// Request a response (message type CommandRrq).
    #[arg(long)]
    pub rrq: bool,
    /// Explicit correlation handle; allocated when omitted.
    #[arg(long, requires = "rrq")]
    pub handle: Option<u32>,
    /// Pre-encoded parameter bytes as hex.
    #[arg(long)]
    pub params: Option<String>,
    /// Parameter count; defaults to 1 when --params is given, else 0.
    #[arg(long)]
    pub param_count: Option<u8>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Decode hex text, ignoring whitespace and an optional `0x` prefix.
pub(crate) fn parse_hex(text: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let compact: String = text.split_whitespace().collect();
    let digits = compact
        .strip_prefix("0x")
        .or_else(|| compact.strip_prefix("0X"))
        .unwrap_or(&compact);
    hex::decode(digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_tolerates_layout() {
        assert_eq!(parse_hex("3b 00 01\n00").unwrap(), vec![0x3b, 0, 1, 0]);
        assert_eq!(parse_hex("0x3B01").unwrap(), vec![0x3b, 1]);
        assert_eq!(parse_hex("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn parse_hex_rejects_odd_length() {
        assert!(matches!(parse_hex("3b0"), Err(hex::FromHexError::OddLength)));
    }
}

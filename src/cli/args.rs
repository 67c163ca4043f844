//! Command-line argument definitions

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Tag the firmware uses for the boot screen.
pub const BOOT_SCREEN_TAG: &str = "0x12FD000B";

#[derive(Parser, Debug)]
#[command(
    name = "chitu-logo",
    version,
    about = "Encoder and decoder for boot screen images stored in the firmware of Tronxy/Chitu 3D printers"
)]
pub struct Cli {
    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only report errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encode an image file into a single blob (.logo)
    Encode {
        /// Input image
        input: PathBuf,
        /// Output blob
        output: PathBuf,
        /// Image tag
        #[arg(short, long, value_parser = parse_int, default_value = BOOT_SCREEN_TAG)]
        tag: u32,
        /// Width the image is fitted to
        #[arg(short = 'W', long, value_parser = parse_int, default_value = "480")]
        width: u32,
        /// Height the image is fitted to
        #[arg(short = 'H', long, value_parser = parse_int, default_value = "320")]
        height: u32,
    },

    /// Decode a single blob (.logo)
    Decode {
        /// Input blob
        input: PathBuf,
        /// Write the decoded image here (.png)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short = 'W', long, value_parser = parse_int, default_value = "480")]
        width: u32,
        #[arg(short = 'H', long, value_parser = parse_int, default_value = "320")]
        height: u32,
    },

    /// Extract images from a package (.bin)
    #[command(alias = "decode_package")]
    DecodePackage {
        /// Input package
        input: PathBuf,
        /// Only extract these tags (comma separated)
        #[arg(short, long, value_parser = parse_int, value_delimiter = ',')]
        tags: Option<Vec<u32>>,
        /// Output folder, defaults to the package tag in hex
        #[arg(short = 'd', long)]
        output_dir: Option<PathBuf>,
    },

    /// Build a package from a folder of img_<tag>_<group>.png files
    #[command(alias = "encode_package")]
    EncodePackage {
        /// Input folder
        input: PathBuf,
        /// Output package (.bin)
        output: PathBuf,
        /// Package tag, defaults to the folder name
        #[arg(short, long, value_parser = parse_int)]
        tag: Option<u32>,
    },
}

/// Parse an integer with an optional 0x/0o/0b prefix.
pub fn parse_int(value: &str) -> Result<u32, String> {
    let value = value.trim();
    let lower = value.to_ascii_lowercase();
    let (digits, radix) = if let Some(rest) = lower.strip_prefix("0x") {
        (rest, 16)
    } else if let Some(rest) = lower.strip_prefix("0o") {
        (rest, 8)
    } else if let Some(rest) = lower.strip_prefix("0b") {
        (rest, 2)
    } else {
        (lower.as_str(), 10)
    };
    u32::from_str_radix(digits, radix).map_err(|e| format!("invalid integer '{}': {}", value, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixed_integers() {
        assert_eq!(parse_int("0x12FD000B"), Ok(0x12FD000B));
        assert_eq!(parse_int("0b101"), Ok(5));
        assert_eq!(parse_int("0o17"), Ok(15));
        assert_eq!(parse_int("480"), Ok(480));
        assert!(parse_int("0xZZ").is_err());
        assert!(parse_int("").is_err());
    }

    #[test]
    fn tag_list_is_comma_separated() {
        let cli = Cli::parse_from(["chitu-logo", "decode-package", "ui.bin", "-t", "0x1,3"]);
        match cli.command {
            Command::DecodePackage { tags, .. } => assert_eq!(tags, Some(vec![1, 3])),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn encode_defaults_to_boot_screen() {
        let cli = Cli::parse_from(["chitu-logo", "encode", "in.png", "out.logo"]);
        match cli.command {
            Command::Encode { tag, width, height, .. } => {
                assert_eq!((tag, width, height), (0x12FD000B, 480, 320));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}

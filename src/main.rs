mod cli;

use clap::Parser;
use log::{error, Level};

use cli::args::{Cli, Command};
use cli::commands;

fn setup_logger(verbose: u8, quiet: bool) {
    let log_level = if quiet {
        Level::Error
    } else {
        match verbose {
            0 => Level::Info,
            1 => Level::Debug,
            _ => Level::Trace,
        }
    };

    if let Err(e) = simple_logger::init_with_level(log_level) {
        eprintln!("Failed to initialise logger: {}", e);
    }
}

fn main() {
    let cli = Cli::parse();
    setup_logger(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Command::Encode {
            input,
            output,
            tag,
            width,
            height,
        } => commands::encode_blob(input, output, *tag, *width, *height),
        Command::Decode {
            input,
            output,
            width,
            height,
        } => commands::decode_blob(input, output.as_deref(), *width, *height),
        Command::DecodePackage {
            input,
            tags,
            output_dir,
        } => commands::decode_package(input, tags.as_deref(), output_dir.as_deref()),
        Command::EncodePackage { input, output, tag } => {
            commands::encode_package(input, output, *tag)
        }
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

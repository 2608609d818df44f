mod base;
mod cutoffs;
mod decompose;
mod error;
mod graph;
mod heap;
mod node;
mod pipeline;
mod ranges;
mod realign;
mod records;
mod reference;
mod repository;
mod settings;

use clap::Parser;
use log::error;
use settings::{Cli, Settings};
use simplelog::{ColorChoice, TermLogger, TerminalMode};

fn main() {
    let cli = Cli::parse();

    if TermLogger::init(
        cli.log_level,
        Default::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .is_err()
    {
        eprintln!("rema: could not initialize logging");
        std::process::exit(1);
    }

    let settings = match Settings::new(cli) {
        Ok(settings) => settings,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = pipeline::run(&settings) {
        error!("{}", e);
        std::process::exit(1);
    }
}

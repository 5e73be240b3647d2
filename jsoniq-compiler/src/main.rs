use std::process::exit;

use clap::Parser;
use jsoniq_compiler::Cli;

fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    if let Err(error) = cli.run() {
        eprintln!("{error}");
        exit(1)
    }
    Ok(())
}

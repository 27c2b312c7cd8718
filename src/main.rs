use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn try_main() -> anyhow::Result<()> {
    let cli = wishshelf::cli::Cli::parse();
    wishshelf::logging::init(cli.verbose).context("init logging")?;
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        wishshelf::cli::Command::Scrape(args) => {
            wishshelf::scrape::run(args).context("scrape")?;
        }
        wishshelf::cli::Command::Render(args) => {
            wishshelf::render::run(args).context("render")?;
        }
        wishshelf::cli::Command::Build(args) => {
            wishshelf::build::run(args).context("build")?;
        }
    }

    Ok(())
}

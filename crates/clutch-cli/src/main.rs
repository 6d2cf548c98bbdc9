//! Command-line entry point: reads one `.dem` recording and emits
//! either a textual trace or a JSON document.

mod cli;
mod document;
mod messages;
mod pipeline;
mod trace;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use clutch_core::error::DemoError;

use cli::Cli;
use pipeline::Pipeline;

fn init_logging() {
    let config = simplelog::ConfigBuilder::new()
        .set_location_level(log::LevelFilter::Off)
        .set_time_level(log::LevelFilter::Off)
        .build();
    let _ = simplelog::TermLogger::init(
        log::LevelFilter::Warn,
        config,
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    );
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("clutch: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let data = std::fs::read(&cli.demo_path)
        .with_context(|| format!("reading demo file {}", cli.demo_path.display()))?;

    let document = Pipeline::new(cli).run(data).map_err(|e| annotate(e))?;

    if cli.wants_json() {
        let text = if cli.pretty_json {
            serde_json::to_string_pretty(&document)?
        } else {
            serde_json::to_string(&document)?
        };
        println!("{text}");
    }

    Ok(())
}

/// Wraps a [`DemoError`] with the context anyhow needs to print something
/// more useful than the bare variant at the top level.
fn annotate(err: DemoError) -> anyhow::Error {
    anyhow::anyhow!("demo parse failed: {err}")
}

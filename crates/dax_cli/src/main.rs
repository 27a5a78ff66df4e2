//! `daxconv`: read a COLLADA document, convert it and write
//! `<output>.json` + `<output>.bin`.

mod args;

use anyhow::{Context, Result};
use clap::Parser;
use dax_core::{collada::load_collada, convert};
use dax_export::Exporter;

use crate::args::CliArgs;

fn run(args: &CliArgs) -> Result<()> {
    let options = args.converter_options()?;
    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&options)?);
        return Ok(());
    }

    log::info!("Loading {}", args.input.display());
    let doc = load_collada(&args.input).with_context(|| format!("Failed to load {}", args.input.display()))?;

    let model = convert(&doc, &options).with_context(|| format!("Failed to convert {}", args.input.display()))?;

    let exported = Exporter::new(&model)
        .with_relative_tracks(options.export_relative_tracks)
        .export();
    let base = args.output_base();
    exported
        .write(base)
        .with_context(|| format!("Failed to write {}", base.display()))?;

    Ok(())
}

fn main() {
    let args = CliArgs::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(err) = run(&args) {
        log::error!("{:#}", err);
        std::process::exit(1);
    }
}

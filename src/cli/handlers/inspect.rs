// src/cli/handlers/inspect.rs

use crate::{
    cli::{args::SessionArgs, handlers::commons},
    constants::EXIT_SUCCESS,
    core::report::{self, OutputFormat},
    models::Outcome,
    state::AppContext,
};
use anyhow::Result;
use clap::Parser;
use std::io::Write;

#[derive(Parser, Debug)]
#[command(
    name = "envlock inspect",
    no_binary_name = true,
    about = "Prints the resolved environment without running anything."
)]
struct InspectArgs {
    #[command(flatten)]
    session: SessionArgs,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Show keys and provenance only; every value is replaced by `***`.
    #[arg(long)]
    redact: bool,
}

/// The main handler for the `inspect` command.
pub fn handle(args: Vec<String>, ctx: &AppContext) -> Result<Outcome> {
    let inspect_args = InspectArgs::try_parse_from(&args)?;
    let env = commons::resolve_for_report(&inspect_args.session, ctx)?;

    let rendered = report::render(&env, inspect_args.format, inspect_args.redact)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(rendered.as_bytes())?;
    stdout.flush()?;
    Ok(Outcome::Exit(EXIT_SUCCESS))
}

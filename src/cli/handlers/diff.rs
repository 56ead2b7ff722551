// src/cli/handlers/diff.rs

use crate::{
    cli::{args::SessionArgs, handlers::commons},
    constants::{EXIT_DRIFT, EXIT_SUCCESS},
    core::{
        paths,
        report::{self, LockSnapshot},
    },
    models::Outcome,
    state::AppContext,
};
use anyhow::Result;
use clap::Parser;
use colored::*;

#[derive(Parser, Debug)]
#[command(
    name = "envlock diff",
    no_binary_name = true,
    about = "Compares a lock file with the current resolution or with another lock file."
)]
struct DiffArgs {
    #[command(flatten)]
    session: SessionArgs,

    /// The lock file to compare against (defaults to the configured `lock_file`).
    #[arg(short, long, value_name = "FILE")]
    lock: Option<String>,

    /// Compare with this lock file instead of resolving profiles.
    #[arg(long, value_name = "FILE", conflicts_with = "profiles")]
    to: Option<String>,

    /// Hide values; only keys and profiles are shown.
    #[arg(long)]
    redact: bool,
}

/// The main handler for the `diff` command. Exits with a distinct code when
/// anything differs, so scripts can detect drift.
pub fn handle(args: Vec<String>, ctx: &AppContext) -> Result<Outcome> {
    let diff_args = DiffArgs::try_parse_from(&args)?;

    let lock_path = paths::expand_relative_to(
        diff_args.lock.as_deref().unwrap_or(&ctx.settings.lock_file),
        &ctx.cwd,
    )?;
    let locked = report::read_lock(&lock_path)?;

    let current = match &diff_args.to {
        Some(other) => report::read_lock(&paths::expand_relative_to(other, &ctx.cwd)?)?,
        None => LockSnapshot::from_environment(&commons::resolve_for_report(
            &diff_args.session,
            ctx,
        )?),
    };

    let changes = report::diff(&locked, &current);
    if changes.is_empty() {
        println!("{}", t!("diff.clean").green());
        return Ok(Outcome::Exit(EXIT_SUCCESS));
    }

    print!("{}", report::render_diff(&changes, diff_args.redact));
    eprintln!(
        "{}",
        format!(t!("diff.summary"), count = changes.len()).yellow()
    );
    Ok(Outcome::Exit(EXIT_DRIFT))
}

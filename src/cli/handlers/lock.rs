// src/cli/handlers/lock.rs

use crate::{
    cli::{args::SessionArgs, handlers::commons},
    constants::EXIT_SUCCESS,
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
    name = "envlock lock",
    no_binary_name = true,
    about = "Writes the resolved environment to a lock file."
)]
struct LockArgs {
    #[command(flatten)]
    session: SessionArgs,

    /// Lock file to write (defaults to the configured `lock_file`).
    #[arg(short, long, value_name = "FILE")]
    output: Option<String>,

    /// Overwrite a differing lock file without asking.
    #[arg(short, long)]
    yes: bool,
}

/// The main handler for the `lock` command.
pub fn handle(args: Vec<String>, ctx: &AppContext) -> Result<Outcome> {
    let lock_args = LockArgs::try_parse_from(&args)?;
    let env = commons::resolve_for_report(&lock_args.session, ctx)?;
    let snapshot = LockSnapshot::from_environment(&env);

    let target = lock_args
        .output
        .as_deref()
        .unwrap_or(&ctx.settings.lock_file);
    let path = paths::expand_relative_to(target, &ctx.cwd)?;
    let display = path.display().to_string();

    if path.exists() {
        match report::read_lock(&path) {
            Ok(existing) => {
                let changes = report::diff(&existing, &snapshot);
                if changes.is_empty() && existing == snapshot {
                    println!("{}", format!(t!("lock.unchanged"), path = display).dimmed());
                    return Ok(Outcome::Exit(EXIT_SUCCESS));
                }
                print!("{}", report::render_diff(&changes, false));
            }
            Err(e) => log::warn!("Existing lock file is not usable: {}", e),
        }

        if !lock_args.yes {
            let overwrite = commons::confirm(
                &format!(t!("lock.prompt.overwrite"), path = display),
                &format!(t!("lock.error.non_interactive"), path = display),
            )?;
            if !overwrite {
                println!("{}", t!("lock.aborted").yellow());
                return Ok(Outcome::Exit(EXIT_SUCCESS));
            }
        }
    }

    report::write_lock(&path, &snapshot)?;
    println!(
        "{} {}",
        "✔".green(),
        format!(
            t!("lock.written"),
            path = display,
            count = snapshot.entries.len(),
            digest = snapshot.digest
        )
    );
    Ok(Outcome::Exit(EXIT_SUCCESS))
}

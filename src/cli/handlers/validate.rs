// src/cli/handlers/validate.rs

use crate::{
    cli::{args::SessionArgs, handlers::commons},
    constants::{EXIT_SCHEMA, EXIT_SUCCESS},
    core::{
        loader::{self, SearchPath},
        session::{self, SessionError},
    },
    models::{Outcome, Profile, ProfileRef, Session},
    state::AppContext,
};
use anyhow::Result;
use clap::Parser;
use colored::*;

#[derive(Parser, Debug)]
#[command(
    name = "envlock validate",
    no_binary_name = true,
    about = "Resolves profiles and reports problems without running anything."
)]
struct ValidateArgs {
    #[command(flatten)]
    session: SessionArgs,

    /// Validate every profile on the search path on its own.
    #[arg(long, conflicts_with = "profiles")]
    all: bool,
}

/// The main handler for the `validate` command.
pub fn handle(args: Vec<String>, ctx: &AppContext) -> Result<Outcome> {
    let validate_args = ValidateArgs::try_parse_from(&args)?;
    if validate_args.all {
        return validate_all(&validate_args.session, ctx);
    }

    let (session, search) = commons::build_session(&validate_args.session, ctx, None, Vec::new())?;
    let env = session::resolve_session(&session, &search, &ctx.host)?;
    println!(
        "{} {}",
        "✔".green(),
        format!(
            t!("validate.ok"),
            count = env.variables.len(),
            layers = env.layers.join(" < ")
        )
    );
    Ok(Outcome::Exit(EXIT_SUCCESS))
}

/// Resolves one discovered profile on its own and counts its variables.
fn resolve_one(
    profile: &Profile,
    session: &Session,
    search: &SearchPath,
    ctx: &AppContext,
) -> Result<usize, SessionError> {
    let requested = [ProfileRef::Path(profile.source.clone())];
    let (catalog, ids) = loader::load_catalog(&requested, search)?;
    let env = session::resolve_loaded(
        &catalog,
        &ids,
        session.mode,
        &session.allow_host,
        &ctx.host,
    )?;
    Ok(env.variables.len())
}

/// Validates each discovered profile as a single-profile session.
///
/// Keeps going after a failure so every broken profile is listed; the exit
/// code is the one of the first failure.
fn validate_all(session_args: &SessionArgs, ctx: &AppContext) -> Result<Outcome> {
    let (session, search) = commons::build_session(session_args, ctx, None, Vec::new())?;
    let discovered = loader::discover(&search);
    if discovered.is_empty() {
        println!(
            "{}",
            format!(t!("list.empty"), dirs = commons::describe_dirs(search.dirs())).yellow()
        );
        return Ok(Outcome::Exit(EXIT_SUCCESS));
    }

    let mut first_failure: Option<i32> = None;
    let mut failures = 0usize;
    for (path, document) in &discovered {
        let result = match document {
            Ok(profile) => resolve_one(profile, &session, &search, ctx),
            Err(e) => {
                failures += 1;
                first_failure.get_or_insert(EXIT_SCHEMA);
                println!("{} {}: {}", "✘".red(), path.display(), e);
                continue;
            }
        };

        match result {
            Ok(count) => println!(
                "{} {}",
                "✔".green(),
                format!(t!("validate.all.ok"), path = path.display(), count = count)
            ),
            Err(e) => {
                failures += 1;
                first_failure.get_or_insert(e.exit_code());
                println!("{} {}: {}", "✘".red(), path.display(), e);
            }
        }
    }

    println!(
        "\n{}",
        format!(
            t!("validate.all.summary"),
            total = discovered.len(),
            failed = failures
        )
        .bold()
    );
    Ok(Outcome::Exit(first_failure.unwrap_or(EXIT_SUCCESS)))
}

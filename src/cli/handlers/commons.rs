// src/cli/handlers/commons.rs

// Shared helpers for the command handlers.

use crate::{
    cli::args::SessionArgs,
    core::{
        loader::{self, SearchPath},
        paths,
        report,
        session,
    },
    models::{IsolationMode, ProfileRef, ResolvedEnvironment, Session},
    state::AppContext,
};
use anyhow::{Result, anyhow};
use dialoguer::{Confirm, theme::ColorfulTheme};
use std::collections::BTreeSet;
use std::io::IsTerminal;
use std::path::PathBuf;

/// Turns the shared session options into a [`Session`] and its profile search path.
///
/// Command-line values win over the configuration: explicit profiles replace
/// the default ones, `--isolated` / `--inherit` replace the configured mode and
/// `--allow-host` keys are added to the configured ones.
pub fn build_session(
    args: &SessionArgs,
    ctx: &AppContext,
    cwd: Option<&str>,
    command: Vec<String>,
) -> Result<(Session, SearchPath)> {
    let requested = if args.profiles.is_empty() {
        &ctx.settings.default_profiles
    } else {
        &args.profiles
    };
    if requested.is_empty() {
        return Err(anyhow!(t!("session.error.no_profiles")));
    }

    let mut profiles = Vec::with_capacity(requested.len());
    for arg in requested {
        let profile = match loader::parse_profile_ref(arg) {
            ProfileRef::Path(_) => ProfileRef::Path(paths::expand_relative_to(arg, &ctx.cwd)?),
            name => name,
        };
        profiles.push(profile);
    }

    let mode = if args.isolated {
        IsolationMode::Isolated
    } else if args.inherit {
        IsolationMode::Inherit
    } else {
        ctx.settings.mode
    };

    let allow_host: BTreeSet<String> = ctx
        .settings
        .allow_host
        .iter()
        .chain(args.allow_host.iter())
        .cloned()
        .collect();

    let cwd = match cwd {
        Some(dir) => paths::expand_relative_to(dir, &ctx.cwd)?,
        None => ctx.cwd.clone(),
    };

    let extra_dirs = args
        .profile_dirs
        .iter()
        .map(|dir| paths::expand_relative_to(dir, &ctx.cwd))
        .collect::<Result<Vec<PathBuf>, _>>()?;
    let search = ctx.settings.search_path(&ctx.home, &extra_dirs)?;

    Ok((
        Session {
            profiles,
            mode,
            allow_host,
            cwd,
            command,
        },
        search,
    ))
}

/// Resolves the session for a reporting command.
///
/// The failure, if any, comes back wrapped in `ReportError::ResolutionFailed`
/// so no report is ever produced from a broken resolution.
pub fn resolve_for_report(args: &SessionArgs, ctx: &AppContext) -> Result<ResolvedEnvironment> {
    let (session, search) = build_session(args, ctx, None, Vec::new())?;
    let env = report::ensure_resolved(session::resolve_session(&session, &search, &ctx.host))?;
    Ok(env)
}

/// Asks a yes/no question. Without a terminal the question cannot be asked and
/// `non_interactive` is returned as an error.
pub fn confirm(prompt: &str, non_interactive: &str) -> Result<bool> {
    if !std::io::stdin().is_terminal() {
        return Err(anyhow!(non_interactive.to_string()));
    }
    let answer = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()?;
    Ok(answer)
}

/// Comma-separated list of directories for messages.
pub fn describe_dirs(dirs: &[PathBuf]) -> String {
    dirs.iter()
        .map(|d| d.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

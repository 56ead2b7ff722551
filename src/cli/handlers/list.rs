// src/cli/handlers/list.rs

use crate::{
    cli::handlers::commons, constants::EXIT_SUCCESS, core::loader, core::paths, models::Outcome,
    state::AppContext,
};
use anyhow::Result;
use clap::Parser;
use colored::*;

#[derive(Parser, Debug)]
#[command(
    name = "envlock list",
    no_binary_name = true,
    about = "Lists the profiles found on the search path."
)]
struct ListArgs {
    /// Directory searched before the configured ones (repeatable).
    #[arg(long = "profile-dir", value_name = "DIR")]
    profile_dirs: Vec<String>,
}

/// The main handler for the `list` command.
pub fn handle(args: Vec<String>, ctx: &AppContext) -> Result<Outcome> {
    let list_args = ListArgs::try_parse_from(&args)?;
    let extra = list_args
        .profile_dirs
        .iter()
        .map(|dir| paths::expand_relative_to(dir, &ctx.cwd))
        .collect::<Result<Vec<_>, _>>()?;
    let search = ctx.settings.search_path(&ctx.home, &extra)?;
    let dirs = commons::describe_dirs(search.dirs());

    let discovered = loader::discover(&search);
    if discovered.is_empty() {
        println!("{}", format!(t!("list.empty"), dirs = dirs).yellow());
        return Ok(Outcome::Exit(EXIT_SUCCESS));
    }

    println!("\n--- {} ({}) ---", t!("list.header"), dirs.dimmed());
    let width = discovered
        .iter()
        .filter_map(|(path, _)| path.file_stem().map(|s| s.len()))
        .max()
        .unwrap_or(0);

    for (path, document) in &discovered {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let padded = format!("{:<width$}", stem, width = width);
        match document {
            Ok(profile) => {
                let mut details = Vec::new();
                if let Some(description) = &profile.description {
                    details.push(description.clone());
                }
                if !profile.extends.is_empty() {
                    details.push(format!(
                        "{} {}",
                        t!("list.label.extends"),
                        profile.extends.join(", ")
                    ));
                }
                details.push(format!(
                    t!("list.label.variables"),
                    count = profile.variables.len()
                ));
                println!("  {}  {}", padded.cyan().bold(), details.join(" · ").dimmed());
            }
            Err(e) => println!(
                "  {}  {} {}",
                padded.red().bold(),
                t!("list.label.invalid").red(),
                e
            ),
        }
    }
    println!();
    Ok(Outcome::Exit(EXIT_SUCCESS))
}

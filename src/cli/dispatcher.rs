use anyhow::{Result, anyhow};

use crate::{cli::handlers, models::Outcome, state::AppContext};

/// A command, its aliases and its handler.
#[derive(Debug)]
pub struct CommandDefinition {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    handler: fn(Vec<String>, &AppContext) -> Result<Outcome>,
}

/// Every command envlock knows.
static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "diff",
        aliases: &[],
        handler: handlers::diff::handle,
    },
    CommandDefinition {
        name: "inspect",
        aliases: &["show"],
        handler: handlers::inspect::handle,
    },
    CommandDefinition {
        name: "list",
        aliases: &["ls"],
        handler: handlers::list::handle,
    },
    CommandDefinition {
        name: "lock",
        aliases: &[],
        handler: handlers::lock::handle,
    },
    CommandDefinition {
        name: "run",
        aliases: &["exec"],
        handler: handlers::run::handle,
    },
    CommandDefinition {
        name: "validate",
        aliases: &["check"],
        handler: handlers::validate::handle,
    },
];

/// Finds a command definition in the registry by its name or alias.
pub fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

/// Picks the command for an argument list and the arguments its handler gets.
///
/// - `envlock <command> [args...]` goes to that command.
/// - Without a command name, arguments holding `--` or starting with a bare
///   word (`envlock -p dev -- make`, `envlock make`) are a `run`.
/// - Anything else, including no arguments at all, is an `inspect`.
pub fn route(args: &[String]) -> (&'static str, Vec<String>) {
    if let Some((first, rest)) = args.split_first()
        && let Some(command) = find_command(first)
    {
        return (command.name, rest.to_vec());
    }

    let wants_run = args.iter().any(|a| a == "--")
        || args.first().is_some_and(|first| !first.starts_with('-'));
    let fallback = if wants_run { "run" } else { "inspect" };
    (fallback, args.to_vec())
}

/// Routes the arguments and runs the matching handler.
pub fn dispatch(args: Vec<String>, ctx: &AppContext) -> Result<Outcome> {
    let (name, handler_args) = route(&args);
    let command = find_command(name).ok_or_else(|| anyhow!("Unknown command '{}'.", name))?;
    log::debug!("Dispatching to '{}' with {:?}", command.name, handler_args);
    (command.handler)(handler_args, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_find_command_by_name_and_alias() {
        assert_eq!(find_command("run").map(|c| c.name), Some("run"));
        assert_eq!(find_command("exec").map(|c| c.name), Some("run"));
        assert_eq!(find_command("check").map(|c| c.name), Some("validate"));
        assert_eq!(find_command("ls").map(|c| c.name), Some("list"));
        assert!(find_command("start").is_none());
    }

    #[test]
    fn test_route_explicit_command_drops_its_name() {
        // --- Execute ---
        let (command, rest) = route(&strings(&["show", "-p", "dev", "--redact"]));

        // --- Assert ---
        assert_eq!(command, "inspect");
        assert_eq!(rest, strings(&["-p", "dev", "--redact"]));
    }

    #[test]
    fn test_route_shortcuts() {
        // --- Setup ---
        let with_separator = strings(&["-p", "dev", "--", "make", "test"]);
        let bare_program = strings(&["make", "test"]);
        let only_options = strings(&["-p", "dev", "--isolated"]);

        // --- Execute & Assert ---
        let (command, rest) = route(&with_separator);
        assert_eq!(command, "run");
        assert_eq!(rest, with_separator);

        assert_eq!(route(&bare_program).0, "run");
        assert_eq!(route(&only_options).0, "inspect");
        assert_eq!(route(&[]).0, "inspect");
    }
}

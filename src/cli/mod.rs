use crate::{
    constants::{EXIT_FAILURE, EXIT_USAGE},
    core::{
        loader::SchemaError, merge::OverrideConflictError, paths::PathError, report::ReportError,
        resolver::ResolveError, session::SessionError, settings::SettingsError,
    },
    system::executor::ExecutionError,
};
use clap::Parser;
use std::path::PathBuf;

pub mod args;
pub mod dispatcher;
pub mod handlers;

/// Renders the semantic help template (`<title>`, `<cmd>`, ...) with or without colors.
fn build_help_string() -> &'static str {
    let use_colors = colored::control::SHOULD_COLORIZE.should_colorize();
    let style = |code: &'static str| if use_colors { code } else { "" };

    let title = style("\x1b[1;33m");
    let hl = style("\x1b[1;36m");
    let cmd = style("\x1b[36m");
    let group = style("\x1b[1;32m");
    let dim = style("\x1b[2m");
    let reset = style("\x1b[0m");

    let formatted = t!("cli.help.template")
        .replace("<title>", title)
        .replace("</title>", reset)
        .replace("<hl>", hl)
        .replace("</hl>", reset)
        .replace("<cmd>", cmd)
        .replace("</cmd>", reset)
        .replace("<group>", group)
        .replace("</group>", reset)
        .replace("<dim>", dim)
        .replace("</dim>", reset);

    // clap keeps the template for the whole process.
    Box::leak(formatted.into_boxed_str())
}

/// Output style of the log records written to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// envlock: deterministic environment sessions from declarative JSON profiles.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    help_template = { build_help_string() },
    styles = clap::builder::Styles::styled()
        .header(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .usage(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .literal(clap::builder::styling::AnsiColor::Cyan.on_default().bold())
        .placeholder(clap::builder::styling::AnsiColor::Green.on_default()),
)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// Log verbosity; RUST_LOG takes precedence.
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "warn",
        value_parser = ["off", "error", "warn", "info", "debug", "trace"]
    )]
    pub log_level: String,

    #[arg(long, value_enum, value_name = "FORMAT", default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Configuration file to use instead of `<home>/config.toml`.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// The command and its arguments. Only parsed by the command's handler.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
    pub args: Vec<String>,
}

/// The process exit code for an error: the code of the first typed error in
/// the chain, or the generic failure code.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<ReportError>() {
            return e.exit_code();
        }
        if let Some(e) = cause.downcast_ref::<SessionError>() {
            return e.exit_code();
        }
        if let Some(e) = cause.downcast_ref::<SchemaError>() {
            return e.exit_code();
        }
        if let Some(e) = cause.downcast_ref::<ResolveError>() {
            return e.exit_code();
        }
        if let Some(e) = cause.downcast_ref::<OverrideConflictError>() {
            return e.exit_code();
        }
        if let Some(e) = cause.downcast_ref::<ExecutionError>() {
            return e.exit_code();
        }
        if let Some(e) = cause.downcast_ref::<SettingsError>() {
            return e.exit_code();
        }
        if cause.downcast_ref::<PathError>().is_some() {
            return EXIT_FAILURE;
        }
        if cause.downcast_ref::<clap::Error>().is_some() {
            return EXIT_USAGE;
        }
    }
    EXIT_FAILURE
}

// src/cli/handlers/run.rs

use crate::{
    cli::{args::SessionArgs, handlers::commons},
    core::session,
    models::Outcome,
    state::AppContext,
    system::executor::{self, SignalForwarder},
};
use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "envlock run",
    no_binary_name = true,
    about = "Runs a command inside the resolved session."
)]
struct RunArgs {
    #[command(flatten)]
    session: SessionArgs,

    /// Working directory for the command (defaults to the current one).
    #[arg(short = 'C', long, value_name = "DIR")]
    cwd: Option<String>,

    /// The command to run, followed by its arguments.
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND"
    )]
    command: Vec<String>,
}

/// The main handler for the `run` command.
pub fn handle(args: Vec<String>, ctx: &AppContext) -> Result<Outcome> {
    // Installed first so a signal during profile loading cancels the session.
    let signals = SignalForwarder::install()?;

    let run_args = RunArgs::try_parse_from(&args)?;
    let (session, search) =
        commons::build_session(&run_args.session, ctx, run_args.cwd.as_deref(), run_args.command)?;

    let env = session::resolve_session(&session, &search, &ctx.host)?;
    let outcome = executor::run(&session, &env, &ctx.host, &signals)?;
    log::debug!("Session finished: {:?}", outcome);
    Ok(outcome)
}

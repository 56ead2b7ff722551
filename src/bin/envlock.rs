// src/bin/envlock.rs

use clap::Parser;
use colored::*;
use env_logger::{Builder, Env};
use std::io::Write;

use envlock::{
    cli::{self, Cli, LogFormat},
    models::Outcome,
    state::AppContext,
    system::executor,
};

/// Sets up `env_logger` on stderr. RUST_LOG wins over `--log-level`.
fn init_logging(level: &str, format: LogFormat) {
    let mut builder = Builder::from_env(Env::default().default_filter_or(level));
    if format == LogFormat::Json {
        builder.format(|buf, record| {
            let line = serde_json::json!({
                "level": record.level().to_string(),
                "target": record.target(),
                "message": record.args().to_string(),
            });
            writeln!(buf, "{}", line)
        });
    }
    builder.init();
}

/// Prints an error and its causes, skipping causes already part of the message.
fn report_error(err: &anyhow::Error) {
    let mut message = err.to_string();
    for cause in err.chain().skip(1) {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(&format!("\n  {} {}", "caused by:".dimmed(), text));
        }
    }
    eprintln!("{}: {}", "Error".red().bold(), message);
}

/// Parses the global options, dispatches and maps the outcome to an exit code.
fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format);
    log::debug!("CLI args parsed: {:?}", cli);

    let result = AppContext::load(cli.config.as_deref())
        .map_err(anyhow::Error::from)
        .and_then(|ctx| cli::dispatcher::dispatch(cli.args, &ctx));

    match result {
        Ok(Outcome::Exit(code)) => std::process::exit(code),
        Ok(Outcome::Signaled(signal)) => {
            let _ = std::io::stdout().flush();
            let _ = std::io::stderr().flush();
            std::process::exit(executor::terminate_with(signal));
        }
        Err(e) => {
            // Handlers parse their own arguments; clap renders those errors and `--help`.
            if let Some(clap_err) = e.downcast_ref::<clap::Error>() {
                let _ = clap_err.print();
                std::process::exit(clap_err.exit_code());
            }
            report_error(&e);
            std::process::exit(cli::exit_code_for(&e));
        }
    }
}

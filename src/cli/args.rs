// src/cli/args.rs
use clap::Args;
use std::path::PathBuf;

/// Options shared by every command that resolves a session.
#[derive(Args, Debug, Default, Clone)]
pub struct SessionArgs {
    /// Profile name or path to a profile document. Repeat to stack profiles; later ones win.
    #[arg(short = 'p', long = "profile", value_name = "PROFILE")]
    pub profiles: Vec<String>,

    /// The command sees only the resolved variables.
    #[arg(long, conflicts_with = "inherit")]
    pub isolated: bool,

    /// Host variables pass through unless a profile defines them.
    #[arg(long)]
    pub inherit: bool,

    /// Host variable that references may read in isolated mode (repeatable).
    #[arg(long = "allow-host", value_name = "KEY")]
    pub allow_host: Vec<String>,

    /// Directory searched for named profiles before the configured ones (repeatable).
    #[arg(long = "profile-dir", value_name = "DIR")]
    pub profile_dirs: Vec<String>,
}

// src/system/executor.rs

use crate::{
    constants::{
        EXIT_CANNOT_EXECUTE, EXIT_COMMAND_NOT_FOUND, EXIT_FAILURE, EXIT_SIGNAL_BASE, EXIT_USAGE,
    },
    models::{IsolationMode, Outcome, ResolvedEnvironment, Session},
    system::host::HostEnv,
};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Child, Command as StdCommand, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;
use thiserror::Error;

#[cfg(unix)]
use nix::{
    errno::Errno,
    sys::signal::{Signal, kill},
    unistd::Pid,
};
#[cfg(unix)]
use signal_hook::{
    consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM},
    iterator::{Handle, Signals},
};

/// How long the supervisor waits for a signal before polling the child again.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("No command specified to run.")]
    EmptyCommand,
    #[error("Working directory '{path}' is not usable: {source}")]
    InvalidWorkingDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Command '{program}' could not be executed: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Lost track of child process {pid}: {source}")]
    Wait {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not set up signal forwarding: {reason}")]
    Signals { reason: String },
}

impl ExecutionError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::EmptyCommand => EXIT_USAGE,
            Self::Spawn { source, .. } if source.kind() == ErrorKind::NotFound => {
                EXIT_COMMAND_NOT_FOUND
            }
            Self::Spawn { .. } | Self::InvalidWorkingDir { .. } => EXIT_CANNOT_EXECUTE,
            Self::Wait { .. } | Self::Signals { .. } => EXIT_FAILURE,
        }
    }
}

// --- Signal forwarding ---

/// Termination signals that are relayed to the child instead of killing envlock.
#[cfg(unix)]
const FORWARDED_SIGNALS: [i32; 4] = [SIGINT, SIGTERM, SIGHUP, SIGQUIT];

#[cfg(unix)]
fn close_listener(handle: Handle) {
    handle.close();
}

/// Catches termination signals for the lifetime of a session.
///
/// Installing it registers handlers for the forwarded signals and starts a
/// listener thread that hands each delivery to the supervisor. Nothing is
/// blocked, so the child starts with the signal mask envlock itself had.
/// Dropping it stops the listener.
pub struct SignalForwarder {
    received: Receiver<i32>,
    #[cfg(unix)]
    _listener: scopeguard::ScopeGuard<Handle, fn(Handle)>,
}

impl std::fmt::Debug for SignalForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalForwarder").finish_non_exhaustive()
    }
}

impl SignalForwarder {
    #[cfg(unix)]
    pub fn install() -> Result<Self, ExecutionError> {
        let mut signals = Signals::new(FORWARDED_SIGNALS).map_err(|e| ExecutionError::Signals {
            reason: e.to_string(),
        })?;
        let listener = scopeguard::guard(signals.handle(), close_listener as fn(Handle));

        let (sender, received) = mpsc::channel();
        std::thread::Builder::new()
            .name("envlock-signals".to_string())
            .spawn(move || {
                for signal in signals.forever() {
                    log::debug!("Received signal {}", signal);
                    if sender.send(signal).is_err() {
                        break;
                    }
                }
            })
            .map_err(|e| ExecutionError::Signals {
                reason: e.to_string(),
            })?;

        Ok(Self {
            received,
            _listener: listener,
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> Result<Self, ExecutionError> {
        // Never fed: without POSIX signals there is nothing to relay.
        let (_sender, received) = mpsc::channel();
        Ok(Self { received })
    }

    /// A signal that arrived before the child existed, if any.
    pub fn pending(&self) -> Option<i32> {
        self.received.try_recv().ok()
    }

    fn next(&self, timeout: Duration) -> Option<i32> {
        match self.received.recv_timeout(timeout) {
            Ok(signal) => Some(signal),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                std::thread::sleep(timeout);
                None
            }
        }
    }
}

/// Terminates envlock with `signal`, the way the child was terminated.
///
/// The signal's default action is restored before it is raised, so signals
/// envlock catches or ignores (SIGPIPE is ignored by the Rust runtime) still
/// end the process. Signals whose default action dumps core are not raised.
/// Returns the exit code to use if the process is still alive afterwards.
pub fn terminate_with(signal: i32) -> i32 {
    let code = EXIT_SIGNAL_BASE + signal;
    #[cfg(unix)]
    {
        let Ok(sig) = Signal::try_from(signal) else {
            return code;
        };
        let dumps_core = matches!(
            sig,
            Signal::SIGQUIT
                | Signal::SIGILL
                | Signal::SIGTRAP
                | Signal::SIGABRT
                | Signal::SIGBUS
                | Signal::SIGFPE
                | Signal::SIGSEGV
                | Signal::SIGSYS
                | Signal::SIGXCPU
                | Signal::SIGXFSZ
        );
        if dumps_core {
            return code;
        }
        if let Err(e) = signal_hook::low_level::emulate_default_handler(signal) {
            log::debug!("Could not re-raise {}: {}", sig, e);
        }
    }
    code
}

// --- Session state machine ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Spawned { pid: u32 },
    Running { pid: u32 },
    /// At least one signal was relayed; still waiting for the child.
    Signaled { pid: u32, signal: i32, forwarded: u32 },
    Exited(Outcome),
}

impl SessionState {
    /// Whether `next` is a legal successor of `self`.
    pub fn accepts(&self, next: &Self) -> bool {
        matches!(
            (self, next),
            (Self::Spawned { .. }, Self::Running { .. })
                | (Self::Spawned { .. }, Self::Exited(_))
                | (Self::Running { .. }, Self::Signaled { .. })
                | (Self::Running { .. }, Self::Exited(_))
                | (Self::Signaled { .. }, Self::Signaled { .. })
                | (Self::Signaled { .. }, Self::Exited(_))
        )
    }
}

/// Owns the child for the duration of a session.
#[derive(Debug)]
struct Supervisor {
    child: Child,
    pid: u32,
    state: SessionState,
}

impl Supervisor {
    fn new(child: Child) -> Self {
        let pid = child.id();
        log::debug!("Child {} spawned", pid);
        Self {
            child,
            pid,
            state: SessionState::Spawned { pid },
        }
    }

    fn transition(&mut self, next: SessionState) {
        if !self.state.accepts(&next) {
            log::warn!("Ignoring session transition {:?} -> {:?}", self.state, next);
            return;
        }
        log::debug!("Session {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Waits for the child, relaying every signal the forwarder collects.
    fn supervise(mut self, signals: &SignalForwarder) -> Result<Outcome, ExecutionError> {
        self.transition(SessionState::Running { pid: self.pid });
        loop {
            let status = self.child.try_wait().map_err(|e| ExecutionError::Wait {
                pid: self.pid,
                source: e,
            })?;
            if let Some(status) = status {
                let outcome = outcome_of(status);
                self.transition(SessionState::Exited(outcome));
                return Ok(outcome);
            }
            if let Some(signal) = signals.next(POLL_INTERVAL) {
                self.forward(signal);
            }
        }
    }

    fn forward(&mut self, signal: i32) {
        #[cfg(unix)]
        {
            let target = i32::try_from(self.pid).map(Pid::from_raw);
            match (target, Signal::try_from(signal)) {
                (Ok(pid), Ok(sig)) => match kill(pid, sig) {
                    Ok(()) | Err(Errno::ESRCH) => {}
                    Err(e) => log::warn!("Failed to forward {} to {}: {}", sig, self.pid, e),
                },
                _ => log::warn!("Cannot forward signal {} to {}", signal, self.pid),
            }
        }
        let forwarded = match self.state {
            SessionState::Signaled { forwarded, .. } => forwarded + 1,
            _ => 1,
        };
        log::info!("Forwarded signal {} to child {}", signal, self.pid);
        self.transition(SessionState::Signaled {
            pid: self.pid,
            signal,
            forwarded,
        });
    }
}

fn outcome_of(status: ExitStatus) -> Outcome {
    if let Some(code) = status.code() {
        return Outcome::Exit(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Outcome::Signaled(signal);
        }
    }
    Outcome::Exit(EXIT_FAILURE)
}

// --- Execution ---

/// The exact environment the child receives.
///
/// Isolated: only the resolved variables. Inherit: the host snapshot with the
/// resolved variables on top, so a profile value always beats the host.
/// Unset keys are removed from the inherited snapshot.
pub fn child_environment(env: &ResolvedEnvironment, host: &HostEnv) -> BTreeMap<String, String> {
    let mut vars = match env.mode {
        IsolationMode::Inherit => host.vars().clone(),
        IsolationMode::Isolated => BTreeMap::new(),
    };
    for key in &env.unset {
        vars.remove(key);
    }
    vars.extend(env.values());
    vars
}

/// Canonical form of the working directory, which must be an existing directory.
pub fn resolve_cwd(cwd: &Path) -> Result<PathBuf, ExecutionError> {
    let invalid = |source| ExecutionError::InvalidWorkingDir {
        path: cwd.display().to_string(),
        source,
    };
    let canonical = dunce::canonicalize(cwd).map_err(invalid)?;
    if !canonical.is_dir() {
        return Err(invalid(std::io::Error::new(
            ErrorKind::NotADirectory,
            "not a directory",
        )));
    }
    Ok(canonical)
}

fn display_command(command: &[String]) -> String {
    shlex::try_join(command.iter().map(String::as_str)).unwrap_or_else(|_| command.join(" "))
}

/// Runs the session's command in the resolved environment and waits for it.
///
/// A signal collected before the child could be spawned cancels the session
/// without starting anything.
pub fn run(
    session: &Session,
    env: &ResolvedEnvironment,
    host: &HostEnv,
    signals: &SignalForwarder,
) -> Result<Outcome, ExecutionError> {
    let (program, args) = session
        .command
        .split_first()
        .ok_or(ExecutionError::EmptyCommand)?;
    let cwd = resolve_cwd(&session.cwd)?;
    let vars = child_environment(env, host);

    if let Some(signal) = signals.pending() {
        log::info!("Signal {} received before start; not running the command", signal);
        return Ok(Outcome::Signaled(signal));
    }

    log::info!(
        "Running {} in {} ({} variables, {} mode)",
        display_command(&session.command),
        cwd.display(),
        vars.len(),
        env.mode
    );
    let child = StdCommand::new(program)
        .args(args)
        .current_dir(&cwd)
        .env_clear()
        .envs(&vars)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| ExecutionError::Spawn {
            program: program.clone(),
            source: e,
        })?;

    Supervisor::new(child).supervise(signals)
}

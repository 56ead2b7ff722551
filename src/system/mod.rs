//! # System Interaction Layer
//!
//! The boundary between resolution logic and the operating system.
//!
//! ## Modules
//!
//! - **`host`**: A read-only snapshot of the host environment, captured once per
//!   invocation and handed to the resolver and the executor.
//! - **`executor`**: Spawns the session's command with the resolved environment,
//!   supervises it, relays termination signals and reports how it ended.

pub mod executor;
pub mod host;

//! envlock: deterministic environment sessions from declarative JSON profiles.
//!
//! Profiles are loaded and validated ([`core::loader`]), stacked along their
//! `extends` graph and the session order ([`core::inheritance`],
//! [`core::merge`]), expanded ([`core::resolver`]) and finally either run as a
//! child process ([`system::executor`]) or reported ([`core::report`]).

include!(concat!(env!("OUT_DIR"), "/translations.rs"));

pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
pub mod state;
pub mod system;

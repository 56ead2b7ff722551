// src/core/mod.rs

pub mod inheritance;
pub mod loader;
pub mod merge;
pub mod paths;
pub mod report;
pub mod resolver;
pub mod session;
pub mod settings;
pub mod template;

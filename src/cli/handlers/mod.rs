pub mod commons;
pub mod diff;
pub mod inspect;
pub mod list;
pub mod lock;
pub mod run;
pub mod validate;

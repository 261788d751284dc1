//! Bot module - Telegram wiring for the metadata cache and the store runtime.

pub mod dispatcher;
mod runtime;

pub use dispatcher::{AppState, ThrottledBot, build_dispatcher};
pub use runtime::run;

//! Canonical data model, error taxonomy, and session store contract shared
//! by every crate in the runtime kernel.

pub mod error;
pub mod store;
pub mod types;

pub use error::{Error, Result};
pub use store::{context_window, InMemorySessionStore, SessionStore};
pub use types::*;

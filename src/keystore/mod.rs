//! Key Store Module
//!
//! Maps a 64-bit key space onto bounded, lazily created windows.
//!
//! ## Responsibilities
//! - Resolve a key to its node inside a window
//! - Track the active-key count of every window
//! - Ascending key iteration that skips empty windows

mod store;
mod window;

pub use store::{KeyIter, KeyStore, NodeRef};
pub use window::KeyWindow;

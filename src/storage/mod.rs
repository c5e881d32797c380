//! Storage Module
//!
//! Word-addressed buffers and the on-disk layout of maps.
//!
//! ## Responsibilities
//! - Back key windows and value buffers with heap memory or mapped files
//! - Name and discover window / buffer files by numeric id
//!
//! ## File Format
//! Every window and value buffer is a flat file of little-endian 64-bit
//! words with no header. Windows reserve word 0 for their active-key count.

mod buffer;
mod dir;

pub use buffer::{WordBuffer, WORD_BYTES};
pub use dir::MapDir;

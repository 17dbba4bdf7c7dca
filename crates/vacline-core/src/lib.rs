//! Shared types for the vacline vacuum-controller stack.
//!
//! This crate is the leaf of the workspace: value and state
//! types for sampled attributes, the case-insensitive ordered map used by the
//! attribute caches, numeric extraction from instrument replies, and the
//! error accounting shared by the serial and event engines.

pub mod accounting;
pub mod caseless;
pub mod constants;
pub mod error;
pub mod parse;
pub mod types;

pub use accounting::ErrorAccounting;
pub use caseless::CaselessMap;
pub use error::{CoreError, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

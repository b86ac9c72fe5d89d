//! verdant-common: Shared error type and HTTP plumbing used across all Verdant crates.

pub mod error;
pub mod sandbox;

pub use error::{Result, VerdantError};
pub use sandbox::SandboxClient;

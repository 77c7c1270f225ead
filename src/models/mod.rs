//! Data models for the forum backend.
//!
//! Field names serialize as camelCase to match the web client.

pub mod arena;
mod project;
mod thread;
mod user;

pub use arena::ThreadArena;
pub use project::*;
pub use thread::*;
pub use user::*;

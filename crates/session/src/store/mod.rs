//! Durable session persistence
//!
//! The token store holds exactly one record: the current session. Saves are
//! atomic so a crash never leaves a half-written record behind.

mod file;
mod memory;
mod traits;

pub use file::FileTokenStore;
pub use memory::InMemoryTokenStore;
pub use traits::TokenStore;

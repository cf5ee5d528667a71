//! The keyrack engine: grant resolution plus the unlock flow.
//!
//! [`resolver::GrantResolver`] answers "give me the key for this slug" from
//! the two always-readable sources (process environment, daemon session
//! cache).  [`unlock::UnlockOrchestrator`] is the explicit step that opens
//! the locked vaults and moves their minted credentials into the cache.

pub mod resolver;
pub mod unlock;

pub use resolver::GrantResolver;
pub use unlock::{UnlockOrchestrator, UnlockReport, UnlockTarget};

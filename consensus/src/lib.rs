//! Consensus: proof-of-turn validator rotation.
//!
//! - Validators announce themselves periodically; each announcement refreshes
//!   a heartbeat timestamp.
//! - A validator is *active* while its heartbeat is younger than the timeout
//!   (60 s by default). Stale entries are never removed, only ignored.
//! - The producer of the next block is drawn from the sorted active set,
//!   indexed by the previous block hash modulo the set size. Every node with
//!   the same active set and tip agrees on the winner without exchanging
//!   messages.
//!
//! ## Module overview
//!
//! - [`registry`]: heartbeat registry with lazy expiry.
//! - [`selection`]: the pure selection rule.

pub mod registry;
pub mod selection;

pub use registry::ValidatorRegistry;
pub use selection::select_from;

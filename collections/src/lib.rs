//! Small, dependency-light data structures shared by the transport engine.
//!
//! Nothing here is protocol-aware; it is the same kind of foundational layer the rest of this
//! codebase keeps separate from its domain logic.

/// A fixed-capacity, overwrite-on-full circular buffer.
pub mod ring;

/// A `HashMap` type alias using a faster, non-DoS-resistant hasher for internal lookup tables.
pub mod map;

/// Re-exported for callers that want the underlying free-list allocator directly.
pub use slab::Slab;

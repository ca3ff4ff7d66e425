use std::collections::{HashMap, HashSet};
use std::hash::BuildHasherDefault;

use ahash::AHasher;

/// A `HashMap` keyed by socket ids, loss-list ranges, and similar internal identifiers, where
/// DoS resistance does not matter but lookup cost on the hot path does.
pub type FastMap<K, V> = HashMap<K, V, BuildHasherDefault<AHasher>>;

/// A `HashSet` counterpart to [`FastMap`].
pub type FastSet<K> = HashSet<K, BuildHasherDefault<AHasher>>;

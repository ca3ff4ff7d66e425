//! Sequence-number and message-number arithmetic.
//!
//! Both counters wrap at a power of two below `u32::MAX` and are compared with a threshold
//! rule rather than native integer ordering, so that a counter which has wrapped around still
//! compares as "greater" than one that hasn't, as long as the two are within half the modulus
//! of each other.

use std::cmp::Ordering;
use std::fmt;

macro_rules! wrapping_counter {
	($name:ident, $bits:expr, $doc:expr) => {
		#[doc = $doc]
		#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
		pub struct $name(u32);

		impl $name {
			pub const BITS: u32 = $bits;
			pub const MODULUS: u32 = 1 << $bits;
			pub const THRESHOLD: u32 = 1 << ($bits - 1);
			pub const MAX: $name = $name(Self::MODULUS - 1);

			#[inline]
			pub fn new(value: u32) -> Self {
				Self(value % Self::MODULUS)
			}

			#[inline]
			pub fn value(self) -> u32 {
				self.0
			}

			/// The next counter value after this one.
			#[inline]
			pub fn next(self) -> Self {
				self.add(1)
			}

			/// This counter value advanced by `n`, wrapping at the modulus.
			#[inline]
			pub fn add(self, n: u32) -> Self {
				Self((self.0 + (n % Self::MODULUS)) % Self::MODULUS)
			}

			/// The forward distance from `base` to `self`, in `[0, MODULUS)`.
			///
			/// This is the offset you'd add to `base` to reach `self`; it is only meaningful
			/// when the two values are known to be within `THRESHOLD` of each other, as with
			/// any sequence-space arithmetic that has wrapped.
			#[inline]
			pub fn offset_from(self, base: Self) -> u32 {
				(self.0 + Self::MODULUS - base.0) % Self::MODULUS
			}

			/// `self > other`, under wraparound-aware comparison: true iff the forward
			/// distance from `other` to `self` is in `(0, THRESHOLD]`.
			#[inline]
			pub fn greater_than(self, other: Self) -> bool {
				let off = self.offset_from(other);
				off != 0 && off <= Self::THRESHOLD
			}

			#[inline]
			pub fn greater_or_equal(self, other: Self) -> bool {
				self == other || self.greater_than(other)
			}

			#[inline]
			pub fn less_than(self, other: Self) -> bool {
				other.greater_than(self)
			}

			#[inline]
			pub fn less_or_equal(self, other: Self) -> bool {
				self == other || other.greater_than(self)
			}

			/// Signed distance `self - other`, positive if `self` is ahead of `other`.
			#[inline]
			pub fn diff(self, other: Self) -> i64 {
				let off = self.offset_from(other);
				if off <= Self::THRESHOLD {
					off as i64
				} else {
					off as i64 - Self::MODULUS as i64
				}
			}
		}

		impl fmt::Debug for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, concat!(stringify!($name), "({})"), self.0)
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl PartialOrd for $name {
			fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
				Some(self.cmp(other))
			}
		}

		impl Ord for $name {
			/// Ordering under the wraparound-aware comparison. Only total within a window of
			/// `THRESHOLD` live values around any given point; see [`Self::greater_than`].
			fn cmp(&self, other: &Self) -> Ordering {
				if self == other {
					Ordering::Equal
				} else if self.greater_than(*other) {
					Ordering::Greater
				} else {
					Ordering::Less
				}
			}
		}
	};
}

wrapping_counter!(SeqNo, 31, "A 31-bit wrapping data sequence number.");
wrapping_counter!(MsgNo, 29, "A 29-bit wrapping message number.");

#[cfg(test)]
mod tests {
	use super::SeqNo;

	#[test]
	fn greater_than_is_antisymmetric() {
		let a = SeqNo::new(10);
		let b = SeqNo::new(20);
		assert!(b.greater_than(a));
		assert!(!a.greater_than(b));
		assert!(!a.greater_than(a));
	}

	#[test]
	fn wraps_around_modulus() {
		let near_max = SeqNo::new(SeqNo::MODULUS - 5);
		let wrapped = near_max.add(10);
		assert_eq!(wrapped.value(), 5);
		assert!(wrapped.greater_than(near_max));
		assert!(!near_max.greater_than(wrapped));
	}

	#[test]
	fn offset_from_round_trips_through_add() {
		let base = SeqNo::new(100);
		let next = base.add(42);
		assert_eq!(next.offset_from(base), 42);
	}

	#[test]
	fn ordering_is_transitive_within_window() {
		let a = SeqNo::new(0);
		let b = a.add(1000);
		let c = b.add(1000);
		assert!(c > b);
		assert!(b > a);
		assert!(c > a);
	}
}

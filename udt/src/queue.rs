//! The send scheduler's priority list: connections waiting for their next scheduled send,
//! ordered by when that send is due.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Mutex;

use crate::timer::Timestamp;

struct Entry {
	due: Timestamp,
	socket_id: u32,
}

impl PartialEq for Entry {
	fn eq(&self, other: &Self) -> bool {
		self.due == other.due
	}
}
impl Eq for Entry {}
impl PartialOrd for Entry {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}
impl Ord for Entry {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.due.cmp(&other.due)
	}
}

/// A min-heap of `(socket_id, next_send_time)`, popped by the send worker thread.
pub struct SndUList {
	heap: Mutex<BinaryHeap<Reverse<Entry>>>,
}

impl SndUList {
	pub fn new() -> Self {
		Self { heap: Mutex::new(BinaryHeap::new()) }
	}

	pub fn push(&self, socket_id: u32, due: Timestamp) {
		self.heap.lock().unwrap().push(Reverse(Entry { due, socket_id }));
	}

	/// Pop the head if it is due by `now`, otherwise leave the list untouched.
	pub fn pop_ready(&self, now: Timestamp) -> Option<u32> {
		let mut heap = self.heap.lock().unwrap();
		let is_ready = matches!(heap.peek(), Some(Reverse(e)) if e.due <= now);

		if is_ready {
			heap.pop().map(|Reverse(e)| e.socket_id)
		} else {
			None
		}
	}

	/// The timestamp the head of the list is due at, if the list is non-empty.
	pub fn next_wake(&self) -> Option<Timestamp> {
		self.heap.lock().unwrap().peek().map(|Reverse(e)| e.due)
	}

	pub fn is_empty(&self) -> bool {
		self.heap.lock().unwrap().is_empty()
	}
}

impl Default for SndUList {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pop_ready_respects_due_time() {
		let list = SndUList::new();
		list.push(1, 100);
		list.push(2, 50);

		assert_eq!(list.pop_ready(40), None);
		assert_eq!(list.pop_ready(60), Some(2));
		assert_eq!(list.pop_ready(60), None);
		assert_eq!(list.pop_ready(150), Some(1));
	}
}

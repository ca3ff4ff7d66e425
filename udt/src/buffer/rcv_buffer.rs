//! The receiver's reassembly ring: a fixed-capacity window of slots addressed by offset from the
//! oldest unread sequence number.

use crate::packet::Boundary;
use crate::seq::{MsgNo, SeqNo};

pub struct Unit {
	pub payload: Vec<u8>,
	pub msg_no: MsgNo,
	pub boundary: Boundary,
	pub in_order: bool,
}

pub struct RcvBuffer {
	slots: Vec<Option<Unit>>,
	capacity: u32,
	/// Sequence number of `slots[0]`: the inclusive read cursor.
	start_seq: SeqNo,
	/// Exclusive ACK boundary, as an offset from `start_seq`.
	ack_offset: u32,
	/// Furthest offset past `start_seq` that has been written.
	max_offset: u32,
}

impl RcvBuffer {
	pub fn new(capacity: u32, initial_seq: SeqNo) -> Self {
		Self { slots: (0..capacity).map(|_| None).collect(), capacity, start_seq: initial_seq, ack_offset: 0, max_offset: 0 }
	}

	pub fn capacity(&self) -> u32 {
		self.capacity
	}

	/// Readable span: data received in order and not yet consumed by the user.
	pub fn readable_len(&self) -> u32 {
		self.ack_offset
	}

	/// Store a unit at the slot implied by `seq`. Returns `false` if `seq` falls outside the
	/// buffer's current window (too old, already consumed, or beyond capacity) and should be
	/// dropped.
	pub fn insert(&mut self, seq: SeqNo, unit: Unit) -> bool {
		let offset = seq.offset_from(self.start_seq);
		if offset >= self.capacity {
			return false;
		}

		let idx = offset as usize;
		self.slots[idx] = Some(unit);
		self.max_offset = self.max_offset.max(offset + 1);
		true
	}

	pub fn contains(&self, seq: SeqNo) -> bool {
		let offset = seq.offset_from(self.start_seq);
		offset < self.capacity && self.slots[offset as usize].is_some()
	}

	/// Advance the ACK boundary as far as contiguous occupied slots allow, starting from the
	/// current boundary. Returns the new cumulative-ack sequence (one past the last contiguous
	/// occupied slot).
	pub fn advance_ack_boundary(&mut self) -> SeqNo {
		while self.ack_offset < self.max_offset && self.slots[self.ack_offset as usize].is_some() {
			self.ack_offset += 1;
		}

		self.start_seq.add(self.ack_offset)
	}

	/// Read out and remove the oldest readable unit, sliding the window forward by one.
	pub fn pop_front(&mut self) -> Option<Unit> {
		if self.ack_offset == 0 {
			return None;
		}

		let unit = self.slots.remove(0)?;
		self.slots.push(None);
		self.start_seq = self.start_seq.next();
		self.ack_offset -= 1;
		self.max_offset = self.max_offset.saturating_sub(1);

		Some(unit)
	}

	pub fn start_seq(&self) -> SeqNo {
		self.start_seq
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn unit(byte: u8) -> Unit {
		Unit { payload: vec![byte], msg_no: MsgNo::new(0), boundary: Boundary::Solo, in_order: true }
	}

	#[test]
	fn ack_boundary_advances_only_over_contiguous_slots() {
		let mut buf = RcvBuffer::new(16, SeqNo::new(0));
		buf.insert(SeqNo::new(0), unit(b'a'));
		buf.insert(SeqNo::new(2), unit(b'c'));

		assert_eq!(buf.advance_ack_boundary(), SeqNo::new(1));

		buf.insert(SeqNo::new(1), unit(b'b'));
		assert_eq!(buf.advance_ack_boundary(), SeqNo::new(3));
	}

	#[test]
	fn pop_front_slides_the_window() {
		let mut buf = RcvBuffer::new(16, SeqNo::new(0));
		buf.insert(SeqNo::new(0), unit(b'a'));
		buf.advance_ack_boundary();

		let popped = buf.pop_front().unwrap();
		assert_eq!(popped.payload, vec![b'a']);
		assert_eq!(buf.start_seq(), SeqNo::new(1));
		assert_eq!(buf.readable_len(), 0);
	}

	#[test]
	fn insert_outside_window_is_rejected() {
		let mut buf = RcvBuffer::new(4, SeqNo::new(0));
		assert!(!buf.insert(SeqNo::new(10), unit(b'z')));
	}
}

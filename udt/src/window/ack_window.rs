//! Correlates an outgoing ACK's sequence number with the ACK2 that confirms it, so the sender can
//! derive a fresh RTT sample from purely local timestamps.

use collections::ring::Ring;

use crate::seq::SeqNo;
use crate::timer::Timestamp;

/// How many outstanding ACKs this connection will track before the oldest is forgotten.
pub const DEFAULT_CAPACITY: usize = 1024;

struct Entry {
	ack_seq: u16,
	data_ack: SeqNo,
	send_ts: Timestamp,
}

pub struct AckWindow {
	entries: Ring<Entry>,
}

impl AckWindow {
	pub fn new() -> Self {
		Self { entries: Ring::new(DEFAULT_CAPACITY) }
	}

	/// Record that an ACK numbered `ack_seq`, acknowledging up to `data_ack`, was just sent.
	pub fn store(&mut self, ack_seq: u16, data_ack: SeqNo, now: Timestamp) {
		self.entries.push(Entry { ack_seq, data_ack, send_ts: now });
	}

	/// Resolve an incoming ACK2 against the stored ACK it confirms, returning the data it
	/// acknowledged and the RTT sample it implies. Entries older than the match are dropped:
	/// ACK2s are cumulative confirmations, so anything before the match will never be confirmed
	/// on its own.
	pub fn ack2(&mut self, ack_seq: u16, now: Timestamp) -> Option<(SeqNo, u64)> {
		let matched_ts = self.entries.iter().find(|e| e.ack_seq == ack_seq).map(|e| (e.data_ack, e.send_ts))?;

		self.entries.drain_while_front(|e| e.ack_seq != ack_seq);
		// The matching entry itself is still at the front; drop it too once read.
		let (data_ack, send_ts) = matched_ts;
		self.entries.drain_while_front(|e| e.ack_seq == ack_seq);

		let rtt = now.saturating_sub(send_ts);
		Some((data_ack, rtt))
	}
}

impl Default for AckWindow {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ack2_computes_rtt_and_trims_older_entries() {
		let mut window = AckWindow::new();
		window.store(1, SeqNo::new(10), 1_000);
		window.store(2, SeqNo::new(20), 1_500);
		window.store(3, SeqNo::new(30), 2_000);

		let (data_ack, rtt) = window.ack2(2, 3_000).unwrap();
		assert_eq!(data_ack, SeqNo::new(20));
		assert_eq!(rtt, 1_500);

		// Entry 1 was older than the match and should have been trimmed away with it.
		assert!(window.ack2(1, 4_000).is_none());
		// Entry 3 is newer and should still resolve.
		assert!(window.ack2(3, 4_000).is_some());
	}

	#[test]
	fn unknown_ack_seq_resolves_to_none() {
		let mut window = AckWindow::new();
		window.store(1, SeqNo::new(10), 1_000);
		assert!(window.ack2(99, 2_000).is_none());
	}
}

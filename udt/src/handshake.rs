//! Handshake negotiation: the three connection shapes (caller-initiated, listener-accepted,
//! rendezvous) share the same packet shape and the same MSS/flight-window negotiation rule.

use std::net::IpAddr;
use std::time::Duration;

use crate::packet::Handshake;
use crate::seq::SeqNo;
use crate::timer::Timestamp;

/// The three values `req_type` can take on the wire.
pub mod req_type {
	pub const CALLER_REQUEST: i32 = 1;
	pub const RENDEZVOUS: i32 = 0;
	pub const CONFIRMATION: i32 = -1;
}

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(250);
pub const SYN_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Clone, Copy, Debug)]
pub enum Role {
	Caller,
	Listener,
	Rendezvous,
}

#[allow(clippy::too_many_arguments)]
pub fn build_handshake(
	version: u32,
	req_type: i32,
	initial_seq: SeqNo,
	mss: u32,
	flight_flag_size: u32,
	conn_type: u32,
	socket_id: u32,
	cookie: u32,
	self_address: IpAddr,
) -> Handshake {
	Handshake { version, req_type, initial_seq, mss, flight_flag_size, conn_type, socket_id, cookie, peer_address: self_address }
}

/// The MSS and flight-window ceiling a connection settles on once both ends' handshakes are
/// known, plus the peer identity they carried.
#[derive(Clone, Copy, Debug)]
pub struct Negotiated {
	pub mss: u32,
	pub flight_flag_size: u32,
	pub peer_socket_id: u32,
	pub peer_isn: SeqNo,
}

/// Negotiate down to the smaller of each side's advertised MSS and flight-window size.
pub fn negotiate(local: &Handshake, peer: &Handshake) -> Negotiated {
	Negotiated { mss: local.mss.min(peer.mss), flight_flag_size: local.flight_flag_size.min(peer.flight_flag_size), peer_socket_id: peer.socket_id, peer_isn: peer.initial_seq }
}

/// Tracks one in-flight handshake attempt: when it was last (re)sent and how many times, so the
/// caller/listener/rendezvous loop can rate-limit retries to one per SYN interval and give up
/// after the configured timeout.
pub struct Attempt {
	started_at: Timestamp,
	last_sent_at: Option<Timestamp>,
	pub attempts: u32,
	timeout: Duration,
}

impl Attempt {
	pub fn new(now: Timestamp, timeout: Duration) -> Self {
		Self { started_at: now, last_sent_at: None, attempts: 0, timeout }
	}

	pub fn should_send(&self, now: Timestamp) -> bool {
		match self.last_sent_at {
			None => true,
			Some(last) => now.saturating_sub(last) >= SYN_INTERVAL.as_micros() as Timestamp,
		}
	}

	pub fn record_sent(&mut self, now: Timestamp) {
		self.last_sent_at = Some(now);
		self.attempts += 1;
	}

	pub fn timed_out(&self, now: Timestamp) -> bool {
		now.saturating_sub(self.started_at) > self.timeout.as_micros() as Timestamp
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::net::Ipv4Addr;

	fn hs(mss: u32, flight: u32) -> Handshake {
		build_handshake(4, req_type::CALLER_REQUEST, SeqNo::new(1), mss, flight, 1, 99, 0, IpAddr::V4(Ipv4Addr::LOCALHOST))
	}

	#[test]
	fn negotiate_takes_the_smaller_of_each_side() {
		let local = hs(1500, 25600);
		let peer = hs(1400, 8192);

		let negotiated = negotiate(&local, &peer);
		assert_eq!(negotiated.mss, 1400);
		assert_eq!(negotiated.flight_flag_size, 8192);
		assert_eq!(negotiated.peer_socket_id, 99);
	}

	#[test]
	fn attempt_rate_limits_resends_and_expires_after_timeout() {
		let mut attempt = Attempt::new(0, Duration::from_millis(250));
		assert!(attempt.should_send(0));
		attempt.record_sent(0);

		assert!(!attempt.should_send(5_000));
		assert!(attempt.should_send(15_000));

		assert!(!attempt.timed_out(200_000));
		assert!(attempt.timed_out(300_000));
	}
}

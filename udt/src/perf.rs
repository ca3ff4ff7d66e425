//! Performance counters: a global running total plus a point-in-time snapshot of the
//! instantaneous connection state.

use std::time::Duration;

/// Global, monotonically-increasing totals since the connection was created.
#[derive(Clone, Copy, Debug, Default)]
pub struct Totals {
	pub pkt_sent: u64,
	pub pkt_recv: u64,
	pub pkt_sent_ack: u64,
	pub pkt_recv_ack: u64,
	pub pkt_sent_nak: u64,
	pub pkt_recv_nak: u64,
	pub pkt_retrans: u64,
	pub pkt_lost_sent: u64,
	pub pkt_lost_recv: u64,
}

/// A point-in-time view of the connection's rate-control and buffer state.
#[derive(Clone, Copy, Debug)]
pub struct Snapshot {
	pub totals: Totals,
	pub pkt_snd_period_us: f64,
	pub flow_window: f64,
	pub cwnd: f64,
	pub flight_size: u32,
	pub rtt: Duration,
	pub bandwidth_mbps: f64,
	pub avail_snd_buf: usize,
	pub avail_rcv_buf: usize,
}

/// Accumulates [`Totals`] and produces [`Snapshot`]s, optionally resetting the
/// local-interval portion of the counters each time (the global totals never reset).
#[derive(Default)]
pub struct PerfMon {
	totals: Totals,
}

impl PerfMon {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn record_sent(&mut self) {
		self.totals.pkt_sent += 1;
	}

	pub fn record_recv(&mut self) {
		self.totals.pkt_recv += 1;
	}

	pub fn record_ack_sent(&mut self) {
		self.totals.pkt_sent_ack += 1;
	}

	pub fn record_ack_recv(&mut self) {
		self.totals.pkt_recv_ack += 1;
	}

	pub fn record_nak_sent(&mut self) {
		self.totals.pkt_sent_nak += 1;
	}

	pub fn record_nak_recv(&mut self) {
		self.totals.pkt_recv_nak += 1;
	}

	pub fn record_retransmit(&mut self) {
		self.totals.pkt_retrans += 1;
	}

	pub fn record_loss_sent_side(&mut self, count: u64) {
		self.totals.pkt_lost_sent += count;
	}

	pub fn record_loss_recv_side(&mut self, count: u64) {
		self.totals.pkt_lost_recv += count;
	}

	#[allow(clippy::too_many_arguments)]
	pub fn snapshot(
		&self,
		pkt_snd_period_us: f64,
		flow_window: f64,
		cwnd: f64,
		flight_size: u32,
		rtt: Duration,
		bandwidth_mbps: f64,
		avail_snd_buf: usize,
		avail_rcv_buf: usize,
	) -> Snapshot {
		Snapshot { totals: self.totals, pkt_snd_period_us, flow_window, cwnd, flight_size, rtt, bandwidth_mbps, avail_snd_buf, avail_rcv_buf }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn totals_accumulate_across_calls() {
		let mut perf = PerfMon::new();
		perf.record_sent();
		perf.record_sent();
		perf.record_retransmit();

		let snap = perf.snapshot(1.0, 16.0, 16.0, 0, Duration::from_millis(50), 10.0, 1024, 1024);
		assert_eq!(snap.totals.pkt_sent, 2);
		assert_eq!(snap.totals.pkt_retrans, 1);
	}
}

//! Congestion and flow control, expressed as a trait so the connection engine never hard-codes
//! a particular algorithm, plus the one shipped implementation.

use rand::Rng;

use crate::packet::{ControlBody, DataPacket};
use crate::seq::SeqNo;

/// Feedback and outputs a congestion controller needs to do its job. The connection engine
/// calls these at fixed points; nothing here depends on socket or buffer internals.
pub trait CongestionControl: Send {
	fn init(&mut self);
	fn on_ack(&mut self, ack_seq: SeqNo, snd_last_ack: SeqNo, rtt_us: u64, bandwidth_pps: f64);
	fn on_loss(&mut self, first_lost: SeqNo, snd_curr_seq: SeqNo, loss_count: u32);
	fn on_timeout(&mut self);
	fn on_pkt_sent(&mut self, pkt: &DataPacket);
	fn on_pkt_received(&mut self, pkt: &DataPacket);
	fn process_custom_msg(&mut self, body: &ControlBody);

	/// Inter-packet send interval, in microseconds.
	fn pkt_snd_period(&self) -> f64;
	/// Congestion window, in packets.
	fn cwnd_size(&self) -> f64;

	/// Whether the pacer should insert one extra SYN interval of delay before its next send, set
	/// by a fresh multiplicative decrease.
	fn freeze(&self) -> bool;
	/// Consume the freeze flag once the pacer has applied its extra delay.
	fn clear_freeze(&mut self);
}

const MSS_BITS_DEFAULT: f64 = 1500.0;
const SYN_US: f64 = 10_000.0;

/// The default UDT-style controller: slow start to discover headroom, then a bandwidth-aware
/// additive increase, multiplicative decrease on loss.
pub struct Daimd {
	mss: f64,
	max_flow_window: f64,
	pkt_snd_period: f64,
	cwnd: f64,
	slow_start: bool,
	last_dec_seq: SeqNo,
	nak_count: u32,
	dec_random: u32,
	avg_nak_num: f64,
	pub freeze: bool,
}

impl Daimd {
	pub fn new(mss: u32, max_flow_window: u32, initial_seq: SeqNo) -> Self {
		Self {
			mss: mss as f64,
			max_flow_window: max_flow_window as f64,
			pkt_snd_period: 1.0,
			cwnd: 16.0,
			slow_start: true,
			last_dec_seq: initial_seq,
			nak_count: 1,
			dec_random: 1,
			avg_nak_num: 1.0,
			freeze: false,
		}
	}

	fn decrease(&mut self, new_last_dec_seq: SeqNo) {
		self.pkt_snd_period *= 1.125;
		self.freeze = true;
		self.avg_nak_num = (0.875 * self.avg_nak_num + 0.125 * self.nak_count as f64).ceil();
		self.dec_random = rand::thread_rng().gen_range(1..=self.avg_nak_num.max(1.0) as u32);
		self.nak_count = 1;
		self.last_dec_seq = new_last_dec_seq;
	}
}

impl CongestionControl for Daimd {
	fn init(&mut self) {
		self.pkt_snd_period = 1.0;
		self.cwnd = 16.0;
		self.slow_start = true;
	}

	fn on_ack(&mut self, _ack_seq: SeqNo, snd_last_ack: SeqNo, rtt_us: u64, bandwidth_pps: f64) {
		if self.slow_start {
			// `snd_last_ack`'s raw value tracks delivered packets closely enough to stand in for
			// the count of packets the peer has acknowledged so far.
			self.cwnd = snd_last_ack.value() as f64;

			if self.cwnd > self.max_flow_window {
				self.slow_start = false;
			}

			return;
		}

		let c = 1_000_000.0 / self.pkt_snd_period.max(1.0);

		let inc = if bandwidth_pps <= c {
			1.0 / self.mss
		} else {
			let excess_bits_per_sec = (bandwidth_pps - c) * self.mss * 8.0;
			let exp = excess_bits_per_sec.max(1.0).log10().ceil();
			(10f64.powf(exp) * 1.5e-6 / self.mss).max(1.0 / self.mss)
		};

		self.pkt_snd_period = (self.pkt_snd_period * SYN_US / (self.pkt_snd_period * inc + SYN_US)).max(1.0);
		let _ = rtt_us;
	}

	fn on_loss(&mut self, first_lost: SeqNo, snd_curr_seq: SeqNo, loss_count: u32) {
		if first_lost.greater_than(self.last_dec_seq) {
			self.decrease(snd_curr_seq);
		} else {
			self.nak_count += 1;
			if self.nak_count % self.dec_random.max(1) == 0 {
				self.pkt_snd_period *= 1.125;
				self.last_dec_seq = snd_curr_seq;
			}
		}

		let _ = loss_count;
	}

	fn on_timeout(&mut self) {}

	fn on_pkt_sent(&mut self, _pkt: &DataPacket) {}

	fn on_pkt_received(&mut self, _pkt: &DataPacket) {}

	fn process_custom_msg(&mut self, _body: &ControlBody) {}

	fn pkt_snd_period(&self) -> f64 {
		self.pkt_snd_period
	}

	fn cwnd_size(&self) -> f64 {
		self.cwnd
	}

	fn freeze(&self) -> bool {
		self.freeze
	}

	fn clear_freeze(&mut self) {
		self.freeze = false;
	}
}

impl Default for Daimd {
	fn default() -> Self {
		Self::new(MSS_BITS_DEFAULT as u32, 25600, SeqNo::new(0))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn slow_start_tracks_delivered_packets_until_flow_window() {
		let mut cc = Daimd::new(1500, 100, SeqNo::new(0));
		cc.on_ack(SeqNo::new(1), SeqNo::new(50), 10_000, 0.0);
		assert!(cc.slow_start);
		assert_eq!(cc.cwnd_size(), 50.0);

		cc.on_ack(SeqNo::new(2), SeqNo::new(150), 10_000, 0.0);
		assert!(!cc.slow_start);
	}

	#[test]
	fn first_loss_in_epoch_increases_period_and_sets_freeze() {
		let mut cc = Daimd::new(1500, 100, SeqNo::new(0));
		let before = cc.pkt_snd_period();

		cc.on_loss(SeqNo::new(10), SeqNo::new(20), 1);
		assert!(cc.pkt_snd_period() > before);
		assert!(cc.freeze);
		assert_eq!(cc.last_dec_seq, SeqNo::new(20));
	}

	#[test]
	fn repeat_loss_within_epoch_does_not_redecrease_every_time() {
		let mut cc = Daimd::new(1500, 100, SeqNo::new(0));
		cc.on_loss(SeqNo::new(10), SeqNo::new(20), 1);
		let after_first = cc.pkt_snd_period();

		// A loss at or before last_dec_seq is within the same epoch.
		cc.on_loss(SeqNo::new(5), SeqNo::new(20), 1);
		assert_eq!(cc.last_dec_seq, SeqNo::new(20));
		assert!(cc.pkt_snd_period() >= after_first);
	}
}

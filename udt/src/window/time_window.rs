//! Packet inter-arrival, RTT trend and probe-pair history used to estimate the receiver's
//! observed receive rate, link bandwidth, and whether queuing delay is trending up.

use collections::ring::Ring;

const HISTORY_SIZE: usize = 16;

/// One RTT observation: its value and how it moved relative to the previous sample.
struct RttSample {
	rtt_us: i64,
	delta_us: i64,
}

pub struct TimeWindow {
	/// Time between consecutive packet arrivals, in microseconds.
	packet_intervals: Ring<u64>,
	rtt_trend: Ring<RttSample>,
	last_rtt: Option<i64>,
	/// Time between the two packets of a probe pair, in microseconds.
	probe_intervals: Ring<u64>,
}

impl TimeWindow {
	pub fn new() -> Self {
		Self {
			packet_intervals: Ring::new(HISTORY_SIZE),
			rtt_trend: Ring::new(HISTORY_SIZE),
			last_rtt: None,
			probe_intervals: Ring::new(HISTORY_SIZE),
		}
	}

	pub fn on_packet_arrival(&mut self, interval_us: u64) {
		self.packet_intervals.push(interval_us);
	}

	pub fn on_probe_pair(&mut self, interval_us: u64) {
		self.probe_intervals.push(interval_us);
	}

	pub fn on_rtt_sample(&mut self, rtt_us: i64) {
		let delta = match self.last_rtt {
			Some(prev) => rtt_us - prev,
			None => 0,
		};

		self.last_rtt = Some(rtt_us);
		self.rtt_trend.push(RttSample { rtt_us, delta_us: delta });
	}

	/// Estimated receiver data rate, in packets/second, from the median-filtered packet
	/// inter-arrival history.
	pub fn recv_speed(&self) -> Option<f64> {
		median_filtered_rate(self.packet_intervals.iter().copied())
	}

	/// Estimated link bandwidth, in packets/second, from the median-filtered probe-pair history.
	pub fn bandwidth(&self) -> Option<f64> {
		median_filtered_rate(self.probe_intervals.iter().copied())
	}

	/// Whether queuing delay appears to be trending upward: a PCT/PDT threshold pair over the
	/// RTT trend history (fraction of samples increasing, and normalized magnitude of increase).
	pub fn delay_trend(&self) -> bool {
		if self.rtt_trend.len() < 2 {
			return false;
		}

		let n = self.rtt_trend.len() as f64;
		let increasing = self.rtt_trend.iter().filter(|s| s.delta_us > 0).count() as f64;
		let pct = increasing / n;

		let total_abs_delta: i64 = self.rtt_trend.iter().map(|s| s.delta_us.abs()).sum();
		let total_rtt: i64 = self.rtt_trend.iter().map(|s| s.rtt_us).sum();
		let pdt = if total_rtt == 0 { 0.0 } else { total_abs_delta as f64 / total_rtt as f64 };

		(pct > 0.66 && pdt > 0.45) || (pct > 0.54 && pdt > 0.55)
	}
}

impl Default for TimeWindow {
	fn default() -> Self {
		Self::new()
	}
}

/// Filters out samples outside `[median/8, median*8]`, then returns the rate implied by the mean
/// of what remains, in events/second.
fn median_filtered_rate(samples: impl Iterator<Item = u64> + Clone) -> Option<f64> {
	let mut sorted: Vec<u64> = samples.clone().collect();
	if sorted.is_empty() {
		return None;
	}

	sorted.sort_unstable();
	let median = sorted[sorted.len() / 2] as f64;
	if median == 0.0 {
		return None;
	}

	let (lo, hi) = (median / 8.0, median * 8.0);
	let kept: Vec<f64> = samples.map(|s| s as f64).filter(|&v| v >= lo && v <= hi).collect();

	if kept.is_empty() {
		return None;
	}

	let mean = kept.iter().sum::<f64>() / kept.len() as f64;
	if mean == 0.0 { None } else { Some(1_000_000.0 / mean) }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn recv_speed_is_none_when_empty() {
		let window = TimeWindow::new();
		assert!(window.recv_speed().is_none());
	}

	#[test]
	fn recv_speed_ignores_outliers() {
		let mut window = TimeWindow::new();
		for _ in 0..15 {
			window.on_packet_arrival(1_000);
		}
		// A single wild outlier (lower than median/8) should not move the estimate much.
		window.on_packet_arrival(1);

		let rate = window.recv_speed().unwrap();
		assert!((rate - 1_000.0).abs() < 50.0, "rate was {rate}");
	}

	#[test]
	fn delay_trend_is_false_with_stable_rtt() {
		let mut window = TimeWindow::new();
		for _ in 0..10 {
			window.on_rtt_sample(1_000);
		}
		assert!(!window.delay_trend());
	}

	#[test]
	fn delay_trend_is_true_with_consistently_increasing_rtt() {
		let mut window = TimeWindow::new();
		let mut rtt = 1_000;
		for _ in 0..10 {
			rtt += 500;
			window.on_rtt_sample(rtt);
		}
		assert!(window.delay_trend());
	}
}

//! A monotonic clock and an interruptible sleep primitive.
//!
//! The send worker spends most of its life in [`Timer::sleep_to`], waiting for the next
//! scheduled packet; any call to [`Timer::tick`] (a new connection joining the send list, a
//! shutdown request) wakes it immediately so it can re-check its schedule.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Microseconds since an arbitrary, process-local epoch. Comparable only within one process.
pub type Timestamp = u64;

/// The clock every multiplexer and connection reads timestamps from.
#[derive(Clone)]
pub struct Clock {
	origin: Instant,
}

impl Clock {
	pub fn new() -> Self {
		Self { origin: Instant::now() }
	}

	pub fn now(&self) -> Timestamp {
		self.origin.elapsed().as_micros() as Timestamp
	}
}

impl Default for Clock {
	fn default() -> Self {
		Self::new()
	}
}

/// An interruptible sleep, shared by every connection scheduled on the same send worker.
pub struct Timer {
	clock: Clock,
	gate: Mutex<u64>,
	cond: Condvar,
}

impl Timer {
	pub fn new(clock: Clock) -> Self {
		Self { clock, gate: Mutex::new(0), cond: Condvar::new() }
	}

	pub fn clock(&self) -> &Clock {
		&self.clock
	}

	pub fn now(&self) -> Timestamp {
		self.clock.now()
	}

	/// Sleep until `target` (a timestamp from [`Self::now`]), or until interrupted by
	/// [`Self::tick`]. Returns early on interruption without signalling why.
	pub fn sleep_to(&self, target: Timestamp) {
		let now = self.clock.now();
		if target <= now {
			return;
		}

		let remaining = Duration::from_micros(target - now);
		let guard = self.gate.lock().unwrap();
		let generation = *guard;
		let _ = self.cond.wait_timeout_while(guard, remaining, |gen| *gen == generation);
	}

	/// Sleep for a fixed duration, interruptible the same way as [`Self::sleep_to`].
	pub fn sleep_for(&self, duration: Duration) {
		self.sleep_to(self.clock.now() + duration.as_micros() as Timestamp);
	}

	/// Wake every thread currently in [`Self::sleep_to`] or [`Self::sleep_for`].
	pub fn tick(&self) {
		let mut guard = self.gate.lock().unwrap();
		*guard = guard.wrapping_add(1);
		self.cond.notify_all();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use std::thread;

	#[test]
	fn sleep_to_past_target_returns_immediately() {
		let timer = Timer::new(Clock::new());
		let start = Instant::now();
		timer.sleep_to(0);
		assert!(start.elapsed() < Duration::from_millis(50));
	}

	#[test]
	fn tick_interrupts_a_long_sleep() {
		let timer = Arc::new(Timer::new(Clock::new()));
		let target = timer.now() + Duration::from_secs(10).as_micros() as Timestamp;

		let waiter = {
			let timer = Arc::clone(&timer);
			thread::spawn(move || {
				let start = Instant::now();
				timer.sleep_to(target);
				start.elapsed()
			})
		};

		thread::sleep(Duration::from_millis(50));
		timer.tick();

		let elapsed = waiter.join().unwrap();
		assert!(elapsed < Duration::from_secs(1));
	}
}

//! A growable pool of reusable receive buffers for the dispatcher's recv loop, so a busy
//! multiplexer doesn't allocate afresh for every incoming datagram.

/// A free-list of byte buffers, grown in batches once occupancy passes 90%. Buffers are handed
/// out for the duration of one recv-and-decode step and returned immediately after: the decoded
/// packet carries its own owned payload onward, so nothing here needs to stay checked out.
pub struct UnitQueue {
	free: Vec<Vec<u8>>,
	unit_capacity: usize,
	block_size: usize,
	total: usize,
}

impl UnitQueue {
	pub fn new(unit_capacity: usize, block_size: usize) -> Self {
		let mut queue = Self { free: Vec::new(), unit_capacity, block_size, total: 0 };
		queue.grow();
		queue
	}

	fn grow(&mut self) {
		for _ in 0..self.block_size {
			self.free.push(Vec::with_capacity(self.unit_capacity));
		}
		self.total += self.block_size;
	}

	pub fn acquire(&mut self) -> Vec<u8> {
		if self.free.len() * 10 <= self.total {
			self.grow();
		}

		self.free.pop().unwrap_or_else(|| Vec::with_capacity(self.unit_capacity))
	}

	pub fn release(&mut self, mut buf: Vec<u8>) {
		buf.clear();
		self.free.push(buf);
	}

	pub fn total(&self) -> usize {
		self.total
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn grows_once_occupancy_passes_ninety_percent() {
		let mut queue = UnitQueue::new(64, 10);
		assert_eq!(queue.total(), 10);

		let mut checked_out = Vec::new();
		for _ in 0..9 {
			checked_out.push(queue.acquire());
		}

		// Only one buffer left free (10%): the next acquire should trigger growth first.
		let _ = queue.acquire();
		assert_eq!(queue.total(), 20);
	}

	#[test]
	fn released_buffers_are_reused() {
		let mut queue = UnitQueue::new(64, 4);
		let buf = queue.acquire();
		let cap = buf.capacity();
		queue.release(buf);

		let reused = queue.acquire();
		assert_eq!(reused.capacity(), cap);
	}
}

//! Typed connection configuration: one field per socket option, not a `(name, *void, size)`
//! triple. `SockOpt` exists only for callers that want to address a field by name.

use std::sync::Arc;
use std::time::Duration;

use crate::cc::{CongestionControl, Daimd};
use crate::channel::{DEFAULT_UDP_RCVBUF, DEFAULT_UDP_SNDBUF};
use crate::seq::SeqNo;

pub type CcFactory = Arc<dyn Fn() -> Box<dyn CongestionControl> + Send + Sync>;

#[derive(Clone)]
pub struct Options {
	/// Maximum packet size in bytes, including the wire header.
	pub mss: u32,
	/// Whether `send` blocks when the send buffer is full.
	pub snd_syn: bool,
	/// Whether `recv` blocks when no data is available.
	pub rcv_syn: bool,
	pub cc_factory: CcFactory,
	/// Max flight-flag size: the receiver's advertised window cap.
	pub flight_flag_size: u32,
	/// UDT-layer send buffer cap, in bytes.
	pub snd_buf: usize,
	/// UDT-layer receive buffer cap, in bytes.
	pub rcv_buf: usize,
	pub udp_snd_buf: usize,
	pub udp_rcv_buf: usize,
	/// Drain-on-close timeout; `None` means no linger.
	pub linger: Option<Duration>,
	/// Maximum datagram-mode message size, in bytes.
	pub max_msg: usize,
	/// Datagram message time-to-live.
	pub msg_ttl: Option<Duration>,
	pub rendezvous: bool,
	/// `None` means block indefinitely.
	pub snd_timeo: Option<Duration>,
	pub rcv_timeo: Option<Duration>,
	/// Share the underlying UDP endpoint across sockets with matching options.
	pub reuse_addr: bool,
}

impl Options {
	pub fn payload_mss(&self) -> usize {
		// IP/UDP (28 bytes) + the fixed packet header (16) reserved from the MSS ceiling.
		self.mss.saturating_sub(28 + 16) as usize
	}
}

impl Default for Options {
	fn default() -> Self {
		Self {
			mss: 1500,
			snd_syn: true,
			rcv_syn: true,
			cc_factory: Arc::new(|| Box::new(Daimd::new(1500, 25600, SeqNo::new(0)))),
			flight_flag_size: 25600,
			snd_buf: 10 * 1024 * 1024,
			rcv_buf: 10 * 1024 * 1024,
			udp_snd_buf: DEFAULT_UDP_SNDBUF,
			udp_rcv_buf: DEFAULT_UDP_RCVBUF,
			linger: Some(Duration::from_secs(180)),
			max_msg: 1024 * 1024,
			msg_ttl: None,
			rendezvous: false,
			snd_timeo: None,
			rcv_timeo: None,
			reuse_addr: true,
		}
	}
}

/// Addresses a single [`Options`] field by name, for `getsockopt`/`setsockopt` callers migrating
/// from the historical option-bag convention. Each variant round-trips through exactly one
/// `Options` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SockOpt {
	Mss,
	SndSyn,
	RcvSyn,
	Fc,
	SndBuf,
	RcvBuf,
	UdpSndBuf,
	UdpRcvBuf,
	Linger,
	MaxMsg,
	MsgTtl,
	Rendezvous,
	SndTimeo,
	RcvTimeo,
	ReuseAddr,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn payload_mss_subtracts_ip_udp_and_udt_headers() {
		let opts = Options { mss: 1500, ..Default::default() };
		assert_eq!(opts.payload_mss(), 1500 - 44);
	}

	#[test]
	fn default_cc_factory_produces_a_working_controller() {
		let opts = Options::default();
		let cc = (opts.cc_factory)();
		assert_eq!(cc.cwnd_size(), 16.0);
	}
}

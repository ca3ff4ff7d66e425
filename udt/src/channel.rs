//! The UDP socket a multiplexer sends and receives datagrams on.
//!
//! One datagram in, one [`Packet`](crate::packet::Packet) out; there is no reassembly here.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use socket2::Socket;

use crate::buffer::UnitQueue;
use crate::packet::{CodecError, Packet, HEADER_LEN};

pub const DEFAULT_UDP_SNDBUF: usize = 64 * 1024;
pub const DEFAULT_UDP_RCVBUF: usize = 1024 * 1024;

/// Starting number of pooled receive buffers a fresh channel grows before its first recv.
const UNIT_QUEUE_BLOCK: usize = 16;

/// A thin wrapper over a single UDP socket shared by every connection in a multiplexer.
pub struct Channel {
	socket: UdpSocket,
	mss: usize,
	units: UnitQueue,
}

impl Channel {
	pub fn bind(addr: SocketAddr, snd_buf: usize, rcv_buf: usize, mss: u32) -> io::Result<Self> {
		let socket = Socket::new(
			if addr.is_ipv4() { socket2::Domain::IPV4 } else { socket2::Domain::IPV6 },
			socket2::Type::DGRAM,
			Some(socket2::Protocol::UDP),
		)?;

		socket.set_send_buffer_size(snd_buf)?;
		socket.set_recv_buffer_size(rcv_buf)?;
		socket.bind(&addr.into())?;
		socket.set_nonblocking(true)?;

		Ok(Self { socket: socket.into(), mss: mss as usize, units: UnitQueue::new(mss as usize, UNIT_QUEUE_BLOCK) })
	}

	pub fn local_addr(&self) -> io::Result<SocketAddr> {
		self.socket.local_addr()
	}

	/// Send `packet` to `addr`, converting its header words to network byte order.
	///
	/// Errors propagate to the caller; the send worker decides whether and how to retry.
	pub fn sendto(&self, addr: SocketAddr, packet: &Packet) -> io::Result<usize> {
		let encoded = packet.encode();
		self.socket.send_to(&encoded, addr)
	}

	/// Receive one datagram. A short read (at or below the header size) is silently dropped and
	/// reported as `Ok(None)`, matching a multiplexer that just wants to loop again.
	///
	/// The receive buffer itself is checked out of `units` for the duration of the read and
	/// decode, then handed straight back: the decoded `Packet` owns its payload independently,
	/// so nothing here needs to stay checked out past this call.
	pub fn recvfrom(&mut self) -> io::Result<Option<(SocketAddr, Packet)>> {
		let mut buf = self.units.acquire();
		buf.resize(self.mss, 0);

		let result = self.socket.recv_from(&mut buf);

		let outcome = match result {
			Ok((len, addr)) => {
				if len <= HEADER_LEN {
					Ok(None)
				} else {
					match Packet::decode(&buf[..len]) {
						Ok(packet) => Ok(Some((addr, packet))),
						Err(CodecError::ShortHeader(_) | CodecError::ShortBody { .. } | CodecError::BadAddressLen(_)) => Ok(None),
					}
				}
			}
			Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
			Err(e) => Err(e),
		};

		self.units.release(buf);
		outcome
	}

	/// Block for at most `timeout` waiting for a readable datagram, then behave as
	/// [`Self::recvfrom`]. Used by the receive worker thread instead of a busy poll loop.
	pub fn recvfrom_timeout(&mut self, timeout: Duration) -> io::Result<Option<(SocketAddr, Packet)>> {
		self.socket.set_read_timeout(Some(timeout))?;
		let result = self.recvfrom();
		self.socket.set_read_timeout(None)?;
		result
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use crate::packet::{ControlBody, ControlPacket, DataPacket, Boundary};
	use crate::seq::{MsgNo, SeqNo};

	fn loopback_addr() -> SocketAddr {
		"127.0.0.1:0".parse().unwrap()
	}

	#[test]
	fn data_packet_round_trips_over_loopback() {
		let mut a = Channel::bind(loopback_addr(), DEFAULT_UDP_SNDBUF, DEFAULT_UDP_RCVBUF, 1500).unwrap();
		let mut b = Channel::bind(loopback_addr(), DEFAULT_UDP_SNDBUF, DEFAULT_UDP_RCVBUF, 1500).unwrap();

		let dest = b.local_addr().unwrap();
		let pkt = Packet::Data(DataPacket {
			dest_id: 99,
			seq: SeqNo::new(1),
			timestamp: 0,
			boundary: Boundary::Solo,
			in_order: true,
			msg_no: MsgNo::new(0),
			payload: b"hello".to_vec(),
		});

		a.sendto(dest, &pkt).unwrap();

		let (_, received) = b.recvfrom_timeout(Duration::from_secs(1)).unwrap().expect("a packet should have arrived");
		match received {
			Packet::Data(d) => assert_eq!(d.payload, b"hello"),
			Packet::Control(_) => panic!("expected a data packet"),
		}
	}

	#[test]
	fn short_datagram_is_dropped() {
		let mut a = Channel::bind(loopback_addr(), DEFAULT_UDP_SNDBUF, DEFAULT_UDP_RCVBUF, 1500).unwrap();
		let dest = a.local_addr().unwrap();
		let sender = UdpSocket::bind(loopback_addr()).unwrap();
		sender.send_to(&[0u8; 4], dest).unwrap();

		let result = a.recvfrom_timeout(Duration::from_millis(200)).unwrap();
		assert!(result.is_none());
	}

	#[test]
	fn empty_control_packet_round_trips() {
		let mut a = Channel::bind(loopback_addr(), DEFAULT_UDP_SNDBUF, DEFAULT_UDP_RCVBUF, 1500).unwrap();
		let mut b = Channel::bind(loopback_addr(), DEFAULT_UDP_SNDBUF, DEFAULT_UDP_RCVBUF, 1500).unwrap();
		let dest = b.local_addr().unwrap();

		let pkt = Packet::Control(ControlPacket { dest_id: 7, timestamp: 0, body: ControlBody::Keepalive });
		a.sendto(dest, &pkt).unwrap();

		let (_, received) = b.recvfrom_timeout(Duration::from_secs(1)).unwrap().expect("a packet should have arrived");
		match received {
			Packet::Control(c) => {
				assert_eq!(c.dest_id, 7);
				assert!(matches!(c.body, ControlBody::Keepalive));
			}
			Packet::Data(_) => panic!("expected a control packet"),
		}
	}
}

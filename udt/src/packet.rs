//! Wire codec: a fixed four-word header plus a type-specific body.
//!
//! Accessors work directly on borrowed byte slices, in the style this codebase already uses
//! for wire formats elsewhere (length-checked before any field read, no unsafe reinterpretation
//! of the buffer). Every packet, data or control, carries the destination socket id in its
//! header so a multiplexer shared by several connections can demultiplex without relying on
//! the peer address alone.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

use crate::seq::{MsgNo, SeqNo};

/// The size of the fixed packet header: four 32-bit words.
pub const HEADER_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CodecError {
	#[error("packet shorter than the {HEADER_LEN}-byte header ({0} bytes)")]
	ShortHeader(usize),
	#[error("control body too short for type {kind:?} ({len} bytes)")]
	ShortBody { kind: ControlType, len: usize },
	#[error("handshake address field has an invalid length ({0} bytes)")]
	BadAddressLen(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlType {
	Handshake,
	Keepalive,
	Ack,
	Nak,
	CongestionWarning,
	Shutdown,
	Ack2,
	Ext,
}

impl ControlType {
	fn code(self) -> u32 {
		match self {
			Self::Handshake => 0,
			Self::Keepalive => 1,
			Self::Ack => 2,
			Self::Nak => 3,
			Self::CongestionWarning => 4,
			Self::Shutdown => 5,
			Self::Ack2 => 6,
			Self::Ext => 7,
		}
	}

	fn from_code(code: u32) -> Self {
		match code {
			0 => Self::Handshake,
			1 => Self::Keepalive,
			2 => Self::Ack,
			3 => Self::Nak,
			4 => Self::CongestionWarning,
			5 => Self::Shutdown,
			6 => Self::Ack2,
			_ => Self::Ext,
		}
	}
}

/// Message-boundary flags carried in the top bits of a data packet's second header word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Boundary {
	/// Neither the first nor the last packet of a multi-packet message.
	Middle,
	/// The first packet of a multi-packet message.
	First,
	/// The last packet of a multi-packet message.
	Last,
	/// The only packet of a single-packet message.
	Solo,
}

impl Boundary {
	fn bits(self) -> u32 {
		match self {
			Self::Middle => 0b00,
			Self::First => 0b10,
			Self::Last => 0b01,
			Self::Solo => 0b11,
		}
	}

	fn from_bits(bits: u32) -> Self {
		match bits {
			0b00 => Self::Middle,
			0b10 => Self::First,
			0b01 => Self::Last,
			_ => Self::Solo,
		}
	}
}

#[derive(Clone, Debug)]
pub struct DataPacket {
	pub dest_id: u32,
	pub seq: SeqNo,
	/// Sender's local clock at the time this packet was packed; advisory only, used for
	/// logging and not required for RTT estimation (see `window::AckWindow`).
	pub timestamp: u32,
	pub boundary: Boundary,
	pub in_order: bool,
	/// 0 in stream mode, where message framing is unused.
	pub msg_no: MsgNo,
	pub payload: Vec<u8>,
}

/// A single missing sequence number, or an inclusive range, as carried in a NAK body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LossItem {
	Single(SeqNo),
	Range(SeqNo, SeqNo),
}

/// The optional tail of an ACK body; omitted entirely for "lite" ACKs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AckExtended {
	pub rtt_us: u32,
	pub rtt_var_us: u32,
	pub avail_buf: u32,
	pub recv_speed: u32,
	pub bandwidth: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Handshake {
	pub version: u32,
	/// `1` = caller request, `0` = rendezvous, `-1` = caller confirmation.
	pub req_type: i32,
	pub initial_seq: SeqNo,
	pub mss: u32,
	pub flight_flag_size: u32,
	pub conn_type: u32,
	pub socket_id: u32,
	pub cookie: u32,
	pub peer_address: IpAddr,
}

const HANDSHAKE_FIXED_LEN: usize = 8 * 4;

#[derive(Clone, Debug)]
pub enum ControlBody {
	Handshake(Handshake),
	Keepalive,
	Ack { ack_seq: u16, data_ack: SeqNo, extended: Option<AckExtended> },
	Nak { items: Vec<LossItem> },
	CongestionWarning,
	Shutdown,
	Ack2 { ack_seq: u16 },
	Ext { subtype: u16, payload: Vec<u8> },
}

impl ControlBody {
	fn kind(&self) -> ControlType {
		match self {
			Self::Handshake(_) => ControlType::Handshake,
			Self::Keepalive => ControlType::Keepalive,
			Self::Ack { .. } => ControlType::Ack,
			Self::Nak { .. } => ControlType::Nak,
			Self::CongestionWarning => ControlType::CongestionWarning,
			Self::Shutdown => ControlType::Shutdown,
			Self::Ack2 { .. } => ControlType::Ack2,
			Self::Ext { .. } => ControlType::Ext,
		}
	}
}

#[derive(Clone, Debug)]
pub struct ControlPacket {
	pub dest_id: u32,
	pub timestamp: u32,
	pub body: ControlBody,
}

#[derive(Clone, Debug)]
pub enum Packet {
	Data(DataPacket),
	Control(ControlPacket),
}

impl Packet {
	pub fn encode(&self) -> Vec<u8> {
		let mut buf = vec![0u8; HEADER_LEN];

		match self {
			Packet::Data(d) => {
				let word0 = d.seq.value() & 0x7FFF_FFFF;
				let word1 = (d.boundary.bits() << 30) | ((d.in_order as u32) << 29) | (d.msg_no.value() & 0x1FFF_FFFF);
				BigEndian::write_u32(&mut buf[0..4], word0);
				BigEndian::write_u32(&mut buf[4..8], word1);
				BigEndian::write_u32(&mut buf[8..12], d.timestamp);
				BigEndian::write_u32(&mut buf[12..16], d.dest_id);
				buf.extend_from_slice(&d.payload);
			}
			Packet::Control(c) => {
				let (ack_seq, ext_subtype) = match &c.body {
					ControlBody::Ack { ack_seq, .. } | ControlBody::Ack2 { ack_seq } => (*ack_seq, 0u32),
					ControlBody::Ext { subtype, .. } => (0u16, *subtype as u32),
					_ => (0u16, 0u32),
				};

				let word0 = 0x8000_0000 | (c.body.kind().code() << 28) | ((ext_subtype & 0xFFF) << 16) | (ack_seq as u32);
				BigEndian::write_u32(&mut buf[0..4], word0);
				BigEndian::write_u32(&mut buf[4..8], 0);
				BigEndian::write_u32(&mut buf[8..12], c.timestamp);
				BigEndian::write_u32(&mut buf[12..16], c.dest_id);

				encode_body(&c.body, &mut buf);
			}
		}

		buf
	}

	pub fn decode(buf: &[u8]) -> Result<Packet, CodecError> {
		if buf.len() < HEADER_LEN {
			return Err(CodecError::ShortHeader(buf.len()));
		}

		let word0 = BigEndian::read_u32(&buf[0..4]);
		let word1 = BigEndian::read_u32(&buf[4..8]);
		let timestamp = BigEndian::read_u32(&buf[8..12]);
		let dest_id = BigEndian::read_u32(&buf[12..16]);
		let body = &buf[HEADER_LEN..];

		if word0 & 0x8000_0000 == 0 {
			let seq = SeqNo::new(word0 & 0x7FFF_FFFF);
			let boundary = Boundary::from_bits(word1 >> 30);
			let in_order = (word1 >> 29) & 1 != 0;
			let msg_no = MsgNo::new(word1 & 0x1FFF_FFFF);

			Ok(Packet::Data(DataPacket { dest_id, seq, timestamp, boundary, in_order, msg_no, payload: body.to_vec() }))
		} else {
			let kind = ControlType::from_code((word0 >> 28) & 0x7);
			let ext_subtype = ((word0 >> 16) & 0xFFF) as u16;
			let ack_seq = (word0 & 0xFFFF) as u16;

			let body = decode_body(kind, ack_seq, ext_subtype, body)?;
			Ok(Packet::Control(ControlPacket { dest_id, timestamp, body }))
		}
	}
}

fn encode_body(body: &ControlBody, buf: &mut Vec<u8>) {
	match body {
		ControlBody::Handshake(h) => {
			let mut tmp = [0u8; HANDSHAKE_FIXED_LEN];
			BigEndian::write_u32(&mut tmp[0..4], h.version);
			BigEndian::write_i32(&mut tmp[4..8], h.req_type);
			BigEndian::write_u32(&mut tmp[8..12], h.initial_seq.value());
			BigEndian::write_u32(&mut tmp[12..16], h.mss);
			BigEndian::write_u32(&mut tmp[16..20], h.flight_flag_size);
			BigEndian::write_u32(&mut tmp[20..24], h.conn_type);
			BigEndian::write_u32(&mut tmp[24..28], h.socket_id);
			BigEndian::write_u32(&mut tmp[28..32], h.cookie);
			buf.extend_from_slice(&tmp);

			match h.peer_address {
				IpAddr::V4(v4) => buf.extend_from_slice(&v4.octets()),
				IpAddr::V6(v6) => buf.extend_from_slice(&v6.octets()),
			}
		}
		ControlBody::Keepalive | ControlBody::CongestionWarning | ControlBody::Shutdown | ControlBody::Ack2 { .. } => {}
		ControlBody::Ack { data_ack, extended, .. } => {
			let mut tmp = [0u8; 4];
			BigEndian::write_u32(&mut tmp, data_ack.value());
			buf.extend_from_slice(&tmp);

			if let Some(ext) = extended {
				let mut tail = [0u8; 20];
				BigEndian::write_u32(&mut tail[0..4], ext.rtt_us);
				BigEndian::write_u32(&mut tail[4..8], ext.rtt_var_us);
				BigEndian::write_u32(&mut tail[8..12], ext.avail_buf);
				BigEndian::write_u32(&mut tail[12..16], ext.recv_speed);
				BigEndian::write_u32(&mut tail[16..20], ext.bandwidth);
				buf.extend_from_slice(&tail);
			}
		}
		ControlBody::Nak { items } => {
			for item in items {
				match *item {
					LossItem::Single(seq) => {
						let mut tmp = [0u8; 4];
						BigEndian::write_u32(&mut tmp, seq.value() & 0x7FFF_FFFF);
						buf.extend_from_slice(&tmp);
					}
					LossItem::Range(a, b) => {
						let mut tmp = [0u8; 8];
						BigEndian::write_u32(&mut tmp[0..4], (a.value() & 0x7FFF_FFFF) | 0x8000_0000);
						BigEndian::write_u32(&mut tmp[4..8], b.value() & 0x7FFF_FFFF);
						buf.extend_from_slice(&tmp);
					}
				}
			}
		}
		ControlBody::Ext { payload, .. } => buf.extend_from_slice(payload),
	}
}

fn decode_body(kind: ControlType, ack_seq: u16, ext_subtype: u16, body: &[u8]) -> Result<ControlBody, CodecError> {
	Ok(match kind {
		ControlType::Handshake => {
			if body.len() < HANDSHAKE_FIXED_LEN {
				return Err(CodecError::ShortBody { kind, len: body.len() });
			}

			let addr_bytes = &body[HANDSHAKE_FIXED_LEN..];
			let peer_address = match addr_bytes.len() {
				4 => IpAddr::V4(Ipv4Addr::new(addr_bytes[0], addr_bytes[1], addr_bytes[2], addr_bytes[3])),
				16 => {
					let mut octets = [0u8; 16];
					octets.copy_from_slice(&addr_bytes[..16]);
					IpAddr::V6(Ipv6Addr::from(octets))
				}
				n => return Err(CodecError::BadAddressLen(n)),
			};

			ControlBody::Handshake(Handshake {
				version: BigEndian::read_u32(&body[0..4]),
				req_type: BigEndian::read_i32(&body[4..8]),
				initial_seq: SeqNo::new(BigEndian::read_u32(&body[8..12])),
				mss: BigEndian::read_u32(&body[12..16]),
				flight_flag_size: BigEndian::read_u32(&body[16..20]),
				conn_type: BigEndian::read_u32(&body[20..24]),
				socket_id: BigEndian::read_u32(&body[24..28]),
				cookie: BigEndian::read_u32(&body[28..32]),
				peer_address,
			})
		}
		ControlType::Keepalive => ControlBody::Keepalive,
		ControlType::CongestionWarning => ControlBody::CongestionWarning,
		ControlType::Shutdown => ControlBody::Shutdown,
		ControlType::Ack2 => ControlBody::Ack2 { ack_seq },
		ControlType::Ack => {
			if body.len() < 4 {
				return Err(CodecError::ShortBody { kind, len: body.len() });
			}

			let data_ack = SeqNo::new(BigEndian::read_u32(&body[0..4]));
			let extended = if body.len() >= 24 {
				Some(AckExtended {
					rtt_us: BigEndian::read_u32(&body[4..8]),
					rtt_var_us: BigEndian::read_u32(&body[8..12]),
					avail_buf: BigEndian::read_u32(&body[12..16]),
					recv_speed: BigEndian::read_u32(&body[16..20]),
					bandwidth: BigEndian::read_u32(&body[20..24]),
				})
			} else {
				None
			};

			ControlBody::Ack { ack_seq, data_ack, extended }
		}
		ControlType::Nak => {
			let mut items = Vec::new();
			let mut i = 0;

			while i + 4 <= body.len() {
				let word = BigEndian::read_u32(&body[i..i + 4]);

				if word & 0x8000_0000 != 0 && i + 8 <= body.len() {
					let a = SeqNo::new(word & 0x7FFF_FFFF);
					let b = SeqNo::new(BigEndian::read_u32(&body[i + 4..i + 8]));
					items.push(LossItem::Range(a, b));
					i += 8;
				} else {
					items.push(LossItem::Single(SeqNo::new(word & 0x7FFF_FFFF)));
					i += 4;
				}
			}

			ControlBody::Nak { items }
		}
		ControlType::Ext => ControlBody::Ext { subtype: ext_subtype, payload: body.to_vec() },
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn data_packet_round_trips() {
		let original = Packet::Data(DataPacket {
			dest_id: 0xabcd,
			seq: SeqNo::new(12345),
			timestamp: 4242,
			boundary: Boundary::First,
			in_order: true,
			msg_no: MsgNo::new(77),
			payload: vec![1, 2, 3, 4, 5],
		});

		let encoded = original.encode();
		let decoded = Packet::decode(&encoded).unwrap();

		match decoded {
			Packet::Data(d) => {
				assert_eq!(d.dest_id, 0xabcd);
				assert_eq!(d.seq, SeqNo::new(12345));
				assert_eq!(d.timestamp, 4242);
				assert_eq!(d.boundary, Boundary::First);
				assert!(d.in_order);
				assert_eq!(d.msg_no, MsgNo::new(77));
				assert_eq!(d.payload, vec![1, 2, 3, 4, 5]);
			}
			Packet::Control(_) => panic!("expected a data packet"),
		}
	}

	#[test]
	fn ack_packet_round_trips_with_and_without_extended_fields() {
		for extended in [None, Some(AckExtended { rtt_us: 1000, rtt_var_us: 200, avail_buf: 64, recv_speed: 500, bandwidth: 900 })] {
			let original = Packet::Control(ControlPacket {
				dest_id: 42,
				timestamp: 100,
				body: ControlBody::Ack { ack_seq: 7, data_ack: SeqNo::new(999), extended },
			});

			let encoded = original.encode();
			match Packet::decode(&encoded).unwrap() {
				Packet::Control(ControlPacket { dest_id, body: ControlBody::Ack { ack_seq, data_ack, extended: got }, .. }) => {
					assert_eq!(dest_id, 42);
					assert_eq!(ack_seq, 7);
					assert_eq!(data_ack, SeqNo::new(999));
					assert_eq!(got, extended);
				}
				_ => panic!("expected an ack packet"),
			}
		}
	}

	#[test]
	fn nak_body_round_trips_singles_and_ranges() {
		let items = vec![LossItem::Single(SeqNo::new(10)), LossItem::Range(SeqNo::new(20), SeqNo::new(25)), LossItem::Single(SeqNo::new(99))];

		let original = Packet::Control(ControlPacket { dest_id: 1, timestamp: 0, body: ControlBody::Nak { items: items.clone() } });

		let encoded = original.encode();
		match Packet::decode(&encoded).unwrap() {
			Packet::Control(ControlPacket { body: ControlBody::Nak { items: got }, .. }) => assert_eq!(got, items),
			_ => panic!("expected a nak packet"),
		}
	}

	#[test]
	fn handshake_round_trips_v4_and_v6() {
		for addr in [IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), IpAddr::V6(Ipv6Addr::LOCALHOST)] {
			let hs = Handshake {
				version: 4,
				req_type: 1,
				initial_seq: SeqNo::new(55),
				mss: 1500,
				flight_flag_size: 25600,
				conn_type: 1,
				socket_id: 0xdead_beef,
				cookie: 0,
				peer_address: addr,
			};

			let original = Packet::Control(ControlPacket { dest_id: 0, timestamp: 0, body: ControlBody::Handshake(hs) });
			let encoded = original.encode();

			match Packet::decode(&encoded).unwrap() {
				Packet::Control(ControlPacket { body: ControlBody::Handshake(got), .. }) => assert_eq!(got.peer_address, addr),
				_ => panic!("expected a handshake packet"),
			}
		}
	}

	#[test]
	fn short_buffer_is_rejected() {
		assert!(matches!(Packet::decode(&[0u8; 4]), Err(CodecError::ShortHeader(4))));
	}
}

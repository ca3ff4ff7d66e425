//! The connection state machine: sender pacer, receiver ingest, control-packet handling, and
//! the per-connection timers, all behind one lock.
//!
//! A teacher actor only ever has one caller mutating it at a time, by construction of the
//! actor runtime; here the same guarantee is reproduced with a single [`Mutex<Inner>`] rather
//! than an actor scheduler, since the transport is required to run on real OS threads.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, Weak};
use std::time::Duration;

use log::{debug, info, warn};

use crate::buffer::{RcvBuffer, SndBuffer, Unit};
use crate::cc::CongestionControl;
use crate::error::{Error, Result};
use crate::handshake::{self, Attempt, Negotiated};
use crate::loss_list::{RcvLossList, SndLossList};
use crate::multiplexer::Multiplexer;
use crate::options::Options;
use crate::packet::{Boundary, ControlBody, ControlPacket, DataPacket, Handshake, LossItem, Packet};
use crate::perf::{PerfMon, Snapshot};
use crate::seq::{MsgNo, SeqNo};
use crate::timer::Timestamp;

const SYN_US: u64 = 10_000;
const EXP_BROKEN_THRESHOLD: u32 = 16;
const MAX_NAK_PER_PACKET: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
	Init,
	Opened,
	Listening,
	Connected,
	Broken,
	Closed,
}

struct SendState {
	buffer: SndBuffer,
	loss_list: SndLossList,
	snd_last_ack: SeqNo,
	snd_curr_seq: SeqNo,
	isn: SeqNo,
}

struct RecvState {
	buffer: RcvBuffer,
	loss_list: RcvLossList,
	rcv_last_ack: SeqNo,
	rcv_curr_seq: SeqNo,
	ack_seq_no: u16,
	last_ack_send: Timestamp,
	last_nak_check: Timestamp,
	last_warning_send: Timestamp,
	last_arrival: Timestamp,
	probe_first_arrival: Option<Timestamp>,
	peer_isn: SeqNo,
	ack_window: crate::window::AckWindow,
	time_window: crate::window::TimeWindow,
}

struct Inner {
	state: State,
	peer_addr: Option<SocketAddr>,
	peer_socket_id: u32,
	send: SendState,
	recv: RecvState,
	cc: Box<dyn CongestionControl>,
	perf: PerfMon,
	rtt_us: u64,
	rtt_var_us: u64,
	flow_window: f64,
	exp_count: u32,
	last_ack_time_sent: Timestamp,
	attempt: Option<Attempt>,
	role: Option<handshake::Role>,
}

/// One end of a reliable UDP connection. Shared via `Arc`; the multiplexer holds a strong
/// reference while the connection is alive, socket-table entries another, and neither side
/// holds the other via a raw or cyclic strong reference — the connection reaches back to its
/// multiplexer only through a `Weak`.
pub struct Connection {
	pub socket_id: u32,
	pub local_addr: SocketAddr,
	opts: Options,
	mux: Weak<Multiplexer>,
	broken: AtomicBool,
	inner: Mutex<Inner>,
	send_block_cond: Condvar,
	recv_data_cond: Condvar,
}

impl Connection {
	pub fn new(socket_id: u32, local_addr: SocketAddr, opts: Options, mux: Weak<Multiplexer>, initial_seq: SeqNo, now: Timestamp) -> Self {
		let payload_mss = opts.payload_mss();
		let cc = (opts.cc_factory)();
		let flow_window = opts.flight_flag_size as f64;

		Self {
			socket_id,
			local_addr,
			opts,
			mux,
			broken: AtomicBool::new(false),
			inner: Mutex::new(Inner {
				state: State::Init,
				peer_addr: None,
				peer_socket_id: 0,
				send: SendState { buffer: SndBuffer::new(payload_mss, initial_seq), loss_list: SndLossList::new(), snd_last_ack: initial_seq, snd_curr_seq: initial_seq, isn: initial_seq },
				recv: RecvState {
					buffer: RcvBuffer::new(8192, SeqNo::new(0)),
					loss_list: RcvLossList::new(),
					rcv_last_ack: SeqNo::new(0),
					rcv_curr_seq: SeqNo::new(0),
					ack_seq_no: 0,
					last_ack_send: now,
					last_nak_check: now,
					last_warning_send: now,
					last_arrival: now,
					probe_first_arrival: None,
					peer_isn: SeqNo::new(0),
					ack_window: crate::window::AckWindow::new(),
					time_window: crate::window::TimeWindow::new(),
				},
				cc,
				perf: PerfMon::new(),
				rtt_us: 100_000,
				rtt_var_us: 50_000,
				flow_window,
				exp_count: 0,
				last_ack_time_sent: now,
				attempt: None,
				role: None,
			}),
			send_block_cond: Condvar::new(),
			recv_data_cond: Condvar::new(),
		}
	}

	pub fn is_broken(&self) -> bool {
		self.broken.load(Ordering::SeqCst)
	}

	pub fn peer_addr(&self) -> Option<SocketAddr> {
		self.inner.lock().unwrap().peer_addr
	}

	/// Whether a `recv` call would return immediately without blocking. Does not consume data,
	/// unlike actually calling `recv`.
	pub fn has_readable(&self) -> bool {
		self.inner.lock().unwrap().recv.buffer.readable_len() > 0
	}

	pub fn state(&self) -> State {
		self.inner.lock().unwrap().state
	}

	fn mux(&self) -> Option<std::sync::Arc<Multiplexer>> {
		self.mux.upgrade()
	}

	// ---- handshake -----------------------------------------------------------------------

	pub fn begin_connect(&self, peer: SocketAddr, rendezvous: bool, self_addr: IpAddr, now: Timestamp) -> Handshake {
		let mut inner = self.inner.lock().unwrap();
		inner.peer_addr = Some(peer);
		inner.state = State::Opened;
		inner.role = Some(if rendezvous { handshake::Role::Rendezvous } else { handshake::Role::Caller });
		inner.attempt = Some(Attempt::new(now, handshake::DEFAULT_HANDSHAKE_TIMEOUT));

		let req_type = if rendezvous { handshake::req_type::RENDEZVOUS } else { handshake::req_type::CALLER_REQUEST };

		handshake::build_handshake(4, req_type, inner.send.isn, self.opts.mss, self.opts.flight_flag_size, 1, self.socket_id, 0, self_addr)
	}

	/// If the in-progress handshake attempt is due for a resend (rate-limited to one per SYN
	/// interval), build the request packet and record the attempt. Returns `None` once the
	/// connection has no attempt in flight (already connected, or never started one).
	pub fn handshake_resend(&self, self_addr: IpAddr, now: Timestamp) -> Option<Handshake> {
		let mut inner = self.inner.lock().unwrap();
		let role = inner.role?;
		let due = inner.attempt.as_ref().map(|a| a.should_send(now)).unwrap_or(false);
		if !due {
			return None;
		}

		let req_type = match role {
			handshake::Role::Caller => handshake::req_type::CALLER_REQUEST,
			handshake::Role::Rendezvous => handshake::req_type::RENDEZVOUS,
			handshake::Role::Listener => return None,
		};

		if let Some(attempt) = inner.attempt.as_mut() {
			attempt.record_sent(now);
		}

		Some(handshake::build_handshake(4, req_type, inner.send.isn, self.opts.mss, self.opts.flight_flag_size, 1, self.socket_id, 0, self_addr))
	}

	/// Whether the in-progress handshake attempt has exceeded its deadline without completing.
	pub fn handshake_timed_out(&self, now: Timestamp) -> bool {
		let inner = self.inner.lock().unwrap();
		inner.attempt.as_ref().map(|a| a.timed_out(now)).unwrap_or(false)
	}

	/// Process an incoming handshake packet, returning a reply to send (if any) and whether the
	/// connection is now fully established.
	pub fn on_handshake(&self, peer: SocketAddr, incoming: Handshake, self_addr: IpAddr, now: Timestamp) -> (Option<Handshake>, bool) {
		let mut inner = self.inner.lock().unwrap();

		match inner.role {
			Some(handshake::Role::Listener) | None => {
				if incoming.req_type == handshake::req_type::CALLER_REQUEST {
					let Negotiated { mss, flight_flag_size, peer_socket_id, peer_isn } = handshake::negotiate(
						&handshake::build_handshake(4, 0, inner.send.isn, self.opts.mss, self.opts.flight_flag_size, 1, self.socket_id, 0, self_addr),
						&incoming,
					);

					inner.peer_addr = Some(peer);
					inner.peer_socket_id = peer_socket_id;
					inner.recv.peer_isn = peer_isn;
					inner.recv.rcv_last_ack = peer_isn;
					inner.recv.rcv_curr_seq = peer_isn.add(u32::MAX); // so the next expected is peer_isn
					inner.recv.buffer = RcvBuffer::new(8192, peer_isn);
					inner.role = Some(handshake::Role::Listener);
					inner.state = State::Connected;

					let reply = handshake::build_handshake(4, handshake::req_type::CONFIRMATION, inner.send.isn, mss, flight_flag_size, 1, self.socket_id, 0, self_addr);
					return (Some(reply), true);
				}
				(None, false)
			}
			Some(handshake::Role::Caller) | Some(handshake::Role::Rendezvous) => {
				if incoming.req_type == handshake::req_type::CONFIRMATION || incoming.req_type == handshake::req_type::RENDEZVOUS {
					let Negotiated { peer_socket_id, peer_isn, .. } = handshake::negotiate(
						&handshake::build_handshake(4, 0, inner.send.isn, self.opts.mss, self.opts.flight_flag_size, 1, self.socket_id, 0, self_addr),
						&incoming,
					);

					inner.peer_socket_id = peer_socket_id;
					inner.recv.peer_isn = peer_isn;
					inner.recv.rcv_last_ack = peer_isn;
					inner.recv.buffer = RcvBuffer::new(8192, peer_isn);
					inner.state = State::Connected;
					inner.attempt = None;

					info!("socket {} connected to peer socket {}", self.socket_id, peer_socket_id);
					return (None, true);
				}
				(None, false)
			}
		}
	}

	// ---- sender pacer ----------------------------------------------------------------------

	/// One pop from the send scheduler: produce the next packet to send (if the connection is
	/// window-ready) and the timestamp it should next be scheduled at (0 = don't reschedule).
	pub fn pack_data(&self, now: Timestamp) -> Option<(Timestamp, Packet)> {
		let mut inner = self.inner.lock().unwrap();
		if inner.state != State::Connected {
			return None;
		}

		let cwnd = inner.cc.cwnd_size();
		let period = inner.cc.pkt_snd_period();

		let (seq, data, retransmit) = loop {
			if let Some(seq) = inner.send.loss_list.pop_first() {
				let Some(block) = inner.send.buffer.read_at(seq) else { continue };
				if block.expired(now) {
					continue;
				}
				break (seq, block.data.clone(), true);
			}

			let flow_window = inner.flow_window.min(cwnd);
			let in_flight = inner.send.snd_curr_seq.next().offset_from(inner.send.snd_last_ack) as f64;

			if in_flight >= flow_window {
				return None;
			}

			let Some(block) = inner.send.buffer.read_fresh() else { return None };
			if block.expired(now) {
				continue;
			}
			let data = block.data.clone();
			let seq = inner.send.snd_curr_seq.next();
			inner.send.snd_curr_seq = seq;
			break (seq, data, false);
		};

		let (boundary, msg_no, in_order) = inner.send.buffer.read_at(seq).map(|b| (b.boundary, b.msg_no, b.in_order)).unwrap_or((Boundary::Solo, MsgNo::new(0), true));

		if retransmit {
			inner.perf.record_retransmit();
		} else {
			inner.perf.record_sent();
		}

		let pkt = DataPacket { dest_id: inner.peer_socket_id, seq, timestamp: now as u32, boundary, in_order, msg_no, payload: data };
		inner.cc.on_pkt_sent(&pkt);

		let mut next = now + period.max(1.0) as Timestamp;
		if seq.value() % 16 == 0 {
			next = now;
		}

		if inner.cc.freeze() {
			next += SYN_US as Timestamp;
			inner.cc.clear_freeze();
		}

		Some((next, Packet::Data(pkt)))
	}

	// ---- control reception -----------------------------------------------------------------

	pub fn process_ctrl(&self, body: ControlBody, addr: SocketAddr, now: Timestamp) {
		let mut inner = self.inner.lock().unwrap();
		inner.exp_count = 0;

		match body {
			ControlBody::Ack { ack_seq, data_ack, extended } => {
				inner.perf.record_ack_recv();

				if data_ack.greater_than(inner.send.snd_last_ack) {
					inner.send.snd_last_ack = data_ack;
					inner.send.buffer.ack(data_ack);
					inner.send.loss_list.remove(data_ack);
				}

				if let Some(ext) = extended {
					let alpha_rtt = 1.0 / 8.0;
					inner.rtt_us = ((1.0 - alpha_rtt) * inner.rtt_us as f64 + alpha_rtt * ext.rtt_us as f64) as u64;
					let alpha_var = 1.0 / 4.0;
					inner.rtt_var_us = ((1.0 - alpha_var) * inner.rtt_var_us as f64 + alpha_var * (inner.rtt_us as f64 - ext.rtt_us as f64).abs()) as u64;

					inner.flow_window = 0.875 * inner.flow_window + 0.125 * ext.avail_buf as f64 * ((inner.rtt_us + SYN_US) as f64 / 1_000_000.0);
				}

				let bandwidth_pps = extended.map(|e| e.bandwidth as f64).unwrap_or(0.0);
				let snd_last_ack = inner.send.snd_last_ack;
				let rtt_us = inner.rtt_us;
				inner.cc.on_ack(data_ack, snd_last_ack, rtt_us, bandwidth_pps);

				let dest_id = inner.peer_socket_id;
				drop(inner);
				self.send_ack2(dest_id, addr, ack_seq, now);
				self.send_block_cond.notify_all();
				return;
			}
			ControlBody::Nak { items } => {
				inner.perf.record_nak_recv();
				let snd_last_ack = inner.send.snd_last_ack;
				let mut loss_count = 0u32;
				let mut first_lost = None;

				for item in items {
					let (a, b) = match item {
						LossItem::Single(s) => (s, s),
						LossItem::Range(a, b) => (a, b),
					};

					if b.less_than(snd_last_ack) {
						continue;
					}

					let a = if a.less_than(snd_last_ack) { snd_last_ack } else { a };
					inner.send.loss_list.insert(a, b);
					loss_count += b.offset_from(a) + 1;
					if first_lost.is_none() {
						first_lost = Some(a);
					}
				}

				if let Some(first_lost) = first_lost {
					let snd_curr_seq = inner.send.snd_curr_seq;
					inner.cc.on_loss(first_lost, snd_curr_seq, loss_count);
				}

				if let Some(mux) = self.mux() {
					mux.notify_send();
				}
			}
			ControlBody::Ack2 { ack_seq } => {
				if let Some((_, rtt_sample)) = inner.recv.ack_window.ack2(ack_seq, now) {
					inner.recv.time_window.on_rtt_sample(rtt_sample as i64);
				}
			}
			ControlBody::Handshake(_) => {
				// Handled by `on_handshake` via the listener/connect path, not here.
			}
			ControlBody::Keepalive => {
				debug!("keepalive from socket {}", self.socket_id);
			}
			ControlBody::Shutdown => {
				inner.state = State::Broken;
				self.broken.store(true, Ordering::SeqCst);
				self.send_block_cond.notify_all();
				self.recv_data_cond.notify_all();
				info!("socket {} closed by peer shutdown", self.socket_id);
			}
			ControlBody::CongestionWarning => {
				// Route through the same `on_loss` callback used for a real NAK, with a
				// `first_lost` guaranteed greater than the last decrease point, so the
				// congestion controller takes its usual first-in-epoch decrease without a
				// second trait method just for this one control type.
				let snd_curr_seq = inner.send.snd_curr_seq;
				inner.cc.on_loss(snd_curr_seq.next(), snd_curr_seq, 1);
			}
			ControlBody::Ext { subtype, payload } => {
				inner.cc.process_custom_msg(&ControlBody::Ext { subtype, payload });
			}
		}
	}

	fn send_ack2(&self, dest_id: u32, addr: SocketAddr, ack_seq: u16, now: Timestamp) {
		if let Some(mux) = self.mux() {
			let pkt = Packet::Control(ControlPacket { dest_id, timestamp: now as u32, body: ControlBody::Ack2 { ack_seq } });
			mux.send_control(addr, &pkt);
		}
	}

	// ---- receiver ingest --------------------------------------------------------------------

	pub fn process_data(&self, pkt: DataPacket, now: Timestamp) {
		let mut inner = self.inner.lock().unwrap();
		if inner.state != State::Connected {
			return;
		}

		inner.perf.record_recv();
		inner.exp_count = 0;

		let arrival_interval = now.saturating_sub(inner.recv.last_arrival);
		inner.recv.time_window.on_packet_arrival(arrival_interval);
		inner.recv.last_arrival = now;

		// The sender fires every 16th data packet back-to-back with the one before it (see
		// `pack_data`'s own `% 16` check); timing the gap between that pair's two arrivals is
		// UDT's probe-pair bandwidth estimate.
		if pkt.seq.value() % 16 == 0 {
			inner.recv.probe_first_arrival = Some(now);
		} else if pkt.seq.value() % 16 == 1 {
			if let Some(first) = inner.recv.probe_first_arrival.take() {
				inner.recv.time_window.on_probe_pair(now.saturating_sub(first));
			}
		}

		let rcv_curr_seq = inner.recv.rcv_curr_seq;

		if pkt.seq.greater_than(rcv_curr_seq.next()) {
			let gap_start = rcv_curr_seq.next();
			let gap_end = pkt.seq.add(u32::MAX); // pkt.seq - 1
			inner.recv.loss_list.insert(gap_start, gap_end, now);
			inner.perf.record_loss_recv_side(gap_end.offset_from(gap_start) as u64 + 1);
			inner.perf.record_nak_sent();
			self.send_immediate_nak(&inner, now, gap_start, gap_end);
		}

		let is_new = pkt.seq.greater_than(rcv_curr_seq);
		if is_new {
			inner.recv.rcv_curr_seq = pkt.seq;
		} else {
			inner.recv.loss_list.remove(pkt.seq);
		}

		let unit = Unit { payload: pkt.payload, msg_no: pkt.msg_no, boundary: pkt.boundary, in_order: pkt.in_order };
		inner.recv.buffer.insert(pkt.seq, unit);
		inner.recv.buffer.advance_ack_boundary();

		self.recv_data_cond.notify_all();

		let rtt = inner.rtt_us;
		let ack_due = self.next_ack_due(&mut inner, now, rtt);
		if ack_due {
			self.send_ack(&mut inner, now);
		}
	}

	fn next_ack_due(&self, inner: &mut Inner, now: Timestamp, rtt_us: u64) -> bool {
		let candidate = if inner.recv.loss_list.is_empty() { inner.recv.rcv_curr_seq.next() } else { inner.recv.loss_list.first_missing().unwrap() };

		if candidate.greater_than(inner.recv.rcv_last_ack) {
			return true;
		}

		now.saturating_sub(inner.recv.last_ack_send) > 2 * rtt_us
	}

	fn send_ack(&self, inner: &mut Inner, now: Timestamp) {
		let data_ack = if inner.recv.loss_list.is_empty() { inner.recv.rcv_curr_seq.next() } else { inner.recv.loss_list.first_missing().unwrap() };

		if data_ack.less_or_equal(inner.recv.rcv_last_ack) {
			return;
		}

		inner.recv.rcv_last_ack = data_ack;
		inner.recv.buffer.advance_ack_boundary();
		inner.recv.ack_seq_no = inner.recv.ack_seq_no.wrapping_add(1);
		inner.recv.last_ack_send = now;
		inner.perf.record_ack_sent();

		let recv_speed = inner.recv.time_window.recv_speed().unwrap_or(0.0) as u32;
		let bandwidth = inner.recv.time_window.bandwidth().unwrap_or(0.0) as u32;

		inner.recv.ack_window.store(inner.recv.ack_seq_no, data_ack, now);

		if let Some(mux) = self.mux() {
			if let Some(addr) = inner.peer_addr {
				let body = ControlBody::Ack {
					ack_seq: inner.recv.ack_seq_no,
					data_ack,
					extended: Some(crate::packet::AckExtended { rtt_us: inner.rtt_us as u32, rtt_var_us: inner.rtt_var_us as u32, avail_buf: inner.recv.buffer.capacity() - inner.recv.buffer.readable_len(), recv_speed, bandwidth }),
				};
				let pkt = Packet::Control(ControlPacket { dest_id: inner.peer_socket_id, timestamp: now as u32, body });
				mux.send_control(addr, &pkt);

				if inner.recv.time_window.delay_trend() && now.saturating_sub(inner.recv.last_warning_send) > inner.rtt_us.max(SYN_US) {
					inner.recv.last_warning_send = now;
					let warning = Packet::Control(ControlPacket { dest_id: inner.peer_socket_id, timestamp: now as u32, body: ControlBody::CongestionWarning });
					mux.send_control(addr, &warning);
				}
			}
		}
	}

	/// Send an immediate NAK for the gap `[start, end]` just observed.
	fn send_immediate_nak(&self, inner: &Inner, now: Timestamp, start: SeqNo, end: SeqNo) {
		if let Some(mux) = self.mux() {
			if let Some(addr) = inner.peer_addr {
				let body = ControlBody::Nak { items: vec![LossItem::Range(start, end)] };
				let pkt = Packet::Control(ControlPacket { dest_id: inner.peer_socket_id, timestamp: now as u32, body });
				mux.send_control(addr, &pkt);
			}
		}
	}

	// ---- timers ------------------------------------------------------------------------------

	/// Check per-connection timers. Returns `true` if the connection is now dead and should be
	/// removed from the multiplexer's table.
	pub fn check_timers(&self, now: Timestamp) -> bool {
		let mut inner = self.inner.lock().unwrap();

		if inner.state != State::Connected {
			return inner.state == State::Closed;
		}

		let rtt = inner.rtt_us.max(SYN_US);

		if now.saturating_sub(inner.recv.last_nak_check) > rtt {
			inner.recv.last_nak_check = now;

			let due = inner.recv.loss_list.get_for_nak(MAX_NAK_PER_PACKET, rtt, now);
			for (start, end) in &due {
				self.send_immediate_nak(&inner, now, *start, *end);
			}
			if !due.is_empty() {
				inner.perf.record_nak_sent();
			}
		}

		if now.saturating_sub(inner.recv.last_ack_send) > rtt {
			self.send_ack(&mut inner, now);
		}

		let exp_timeout = rtt.max(100_000).min(5_000_000) * (1 + inner.exp_count as u64);
		if now.saturating_sub(inner.last_ack_time_sent) > exp_timeout {
			inner.exp_count += 1;
			inner.last_ack_time_sent = now;

			if inner.exp_count > EXP_BROKEN_THRESHOLD {
				inner.state = State::Broken;
				self.broken.store(true, Ordering::SeqCst);
				self.send_block_cond.notify_all();
				self.recv_data_cond.notify_all();
				warn!("socket {} marked broken after {} EXP firings", self.socket_id, inner.exp_count);
				return true;
			}

			if !inner.send.buffer.is_empty() {
				let base = inner.send.snd_last_ack;
				let curr = inner.send.snd_curr_seq;
				if curr.greater_than(base) {
					inner.send.loss_list.insert(base.next(), curr);
				}
			} else if let (Some(addr), Some(mux)) = (inner.peer_addr, self.mux()) {
				let pkt = Packet::Control(ControlPacket { dest_id: inner.peer_socket_id, timestamp: now as u32, body: ControlBody::Keepalive });
				mux.send_control(addr, &pkt);
			}

			if let Some(mux) = self.mux() {
				mux.notify_send();
			}
		}

		false
	}

	// ---- user-facing send/recv ---------------------------------------------------------------

	pub fn send(&self, data: &[u8], ttl: Option<Duration>, in_order: bool) -> Result<usize> {
		if self.is_broken() {
			return Err(Error::conn_fail(1, "connection is broken"));
		}

		let now = self.mux().map(|m| m.timer.now()).unwrap_or(0);
		let mut inner = self.inner.lock().unwrap();

		loop {
			if inner.send.buffer.len_bytes() < self.opts.snd_buf {
				inner.send.buffer.push_message(data, ttl, in_order, now);
				drop(inner);
				if let Some(mux) = self.mux() {
					mux.notify_send();
				}
				return Ok(data.len());
			}

			if !self.opts.snd_syn {
				return Err(Error::resource(1, "send buffer full"));
			}

			let (guard, timed_out) = self.send_block_cond.wait_timeout(inner, self.opts.snd_timeo.unwrap_or(Duration::from_secs(1))).unwrap();
			inner = guard;

			if self.is_broken() {
				return Err(Error::conn_fail(1, "connection is broken"));
			}
			if timed_out.timed_out() && self.opts.snd_timeo.is_some() {
				return Err(Error::resource(2, "send timed out"));
			}
		}
	}

	pub fn recv(&self, max_len: usize) -> Result<Vec<u8>> {
		let mut inner = self.inner.lock().unwrap();

		loop {
			if inner.recv.buffer.readable_len() > 0 {
				if let Some(unit) = inner.recv.buffer.pop_front() {
					let mut data = unit.payload;
					data.truncate(max_len);
					return Ok(data);
				}
			}

			if self.is_broken() {
				return Err(Error::conn_fail(2, "connection is broken"));
			}

			if !self.opts.rcv_syn {
				return Err(Error::resource(3, "no data available"));
			}

			let (guard, timed_out) = self.recv_data_cond.wait_timeout(inner, self.opts.rcv_timeo.unwrap_or(Duration::from_secs(1))).unwrap();
			inner = guard;

			if timed_out.timed_out() && self.opts.rcv_timeo.is_some() && inner.recv.buffer.readable_len() == 0 {
				return Err(Error::resource(4, "recv timed out"));
			}
		}
	}

	/// Like [`Self::recv`], but reassembles one complete message (as delimited by the sender's
	/// boundary flags) instead of handing back a single packet's payload.
	pub fn recvmsg(&self) -> Result<Vec<u8>> {
		let mut inner = self.inner.lock().unwrap();
		let mut msg = Vec::new();

		loop {
			while inner.recv.buffer.readable_len() > 0 {
				let Some(unit) = inner.recv.buffer.pop_front() else { break };
				let boundary = unit.boundary;
				msg.extend_from_slice(&unit.payload);
				if matches!(boundary, Boundary::Last | Boundary::Solo) {
					return Ok(msg);
				}
			}

			if self.is_broken() {
				return Err(Error::conn_fail(2, "connection is broken"));
			}

			if !self.opts.rcv_syn {
				return Err(Error::resource(3, "no data available"));
			}

			let (guard, timed_out) = self.recv_data_cond.wait_timeout(inner, self.opts.rcv_timeo.unwrap_or(Duration::from_secs(1))).unwrap();
			inner = guard;

			if timed_out.timed_out() && self.opts.rcv_timeo.is_some() && inner.recv.buffer.readable_len() == 0 {
				return Err(Error::resource(4, "recv timed out"));
			}
		}
	}

	pub fn close(&self) {
		let mut inner = self.inner.lock().unwrap();
		inner.state = State::Closed;
		self.broken.store(true, Ordering::SeqCst);
		self.send_block_cond.notify_all();
		self.recv_data_cond.notify_all();
	}

	pub fn snapshot(&self) -> Snapshot {
		let inner = self.inner.lock().unwrap();
		inner.perf.snapshot(
			inner.cc.pkt_snd_period(),
			inner.flow_window,
			inner.cc.cwnd_size(),
			inner.send.snd_curr_seq.offset_from(inner.send.snd_last_ack),
			Duration::from_micros(inner.rtt_us),
			inner.recv.time_window.bandwidth().unwrap_or(0.0) * self.opts.mss as f64 * 8.0 / 1_000_000.0,
			self.opts.snd_buf.saturating_sub(inner.send.buffer.len_bytes()),
			self.opts.rcv_buf,
		)
	}
}

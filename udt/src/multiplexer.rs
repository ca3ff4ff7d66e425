//! Per-local-endpoint shared state: one UDP channel, one send scheduler thread, one receive
//! dispatcher thread, shared by every connection bound to the same `(address, UDP options)`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use collections::map::FastMap;
use log::{debug, warn};

use crate::channel::Channel;
use crate::connection::Connection;
use crate::handshake::Attempt;
use crate::packet::{ControlBody, ControlPacket, Handshake, Packet};
use crate::queue::SndUList;
use crate::timer::{Clock, Timer, Timestamp};

/// Hands an unsolicited handshake (`destination_socket_id == 0`, no matching rendezvous entry)
/// off to whatever is listening on this multiplexer. Implemented by the API layer's listener
/// socket; the multiplexer itself has no notion of a backlog or accept queue.
pub trait HandshakeListener: Send + Sync {
	fn on_handshake(&self, peer: SocketAddr, incoming: Handshake, now: Timestamp) -> Option<Handshake>;
}

/// Identifies a multiplexer: connections with the same key share one UDP socket.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MultiplexerKey {
	pub local_addr: SocketAddr,
	pub reuse_addr: bool,
}

/// An in-progress rendezvous negotiation, keyed by the peer address it's waiting to hear from.
pub struct RendezvousEntry {
	pub socket_id: u32,
	pub attempt: Attempt,
}

pub struct Multiplexer {
	pub local_addr: SocketAddr,
	pub timer: Arc<Timer>,
	pub snd_list: Arc<SndUList>,
	/// Wakes the send worker when a previously idle connection has fresh work.
	pub send_data_cond: Arc<Condvar>,
	send_data_gate: Mutex<()>,

	channel: Arc<Mutex<Channel>>,
	connections: Mutex<FastMap<u32, Arc<Connection>>>,
	rendezvous: Mutex<HashMap<SocketAddr, RendezvousEntry>>,
	listener: Mutex<Option<Arc<dyn HandshakeListener>>>,

	shutdown: Arc<AtomicBool>,
	snd_thread: Mutex<Option<JoinHandle<()>>>,
	rcv_thread: Mutex<Option<JoinHandle<()>>>,

	pub ref_count: Mutex<usize>,
}

impl Multiplexer {
	pub fn spawn(channel: Channel, local_addr: SocketAddr) -> Arc<Self> {
		let clock = Clock::new();
		let timer = Arc::new(Timer::new(clock));
		let snd_list = Arc::new(SndUList::new());
		let shutdown = Arc::new(AtomicBool::new(false));
		let channel = Arc::new(Mutex::new(channel));

		let mux = Arc::new(Self {
			local_addr,
			timer: Arc::clone(&timer),
			snd_list: Arc::clone(&snd_list),
			send_data_cond: Arc::new(Condvar::new()),
			send_data_gate: Mutex::new(()),
			channel: Arc::clone(&channel),
			connections: Mutex::new(FastMap::default()),
			rendezvous: Mutex::new(HashMap::new()),
			listener: Mutex::new(None),
			shutdown: Arc::clone(&shutdown),
			snd_thread: Mutex::new(None),
			rcv_thread: Mutex::new(None),
			ref_count: Mutex::new(1),
		});

		let snd_handle = {
			let mux = Arc::clone(&mux);
			let channel = Arc::clone(&channel);
			std::thread::Builder::new()
				.name(format!("udt-snd-{local_addr}"))
				.spawn(move || send_worker(mux, channel))
				.expect("failed to spawn send worker thread")
		};

		let rcv_handle = {
			let mux = Arc::clone(&mux);
			let channel = Arc::clone(&channel);
			std::thread::Builder::new()
				.name(format!("udt-rcv-{local_addr}"))
				.spawn(move || recv_worker(mux, channel))
				.expect("failed to spawn receive worker thread")
		};

		*mux.snd_thread.lock().unwrap() = Some(snd_handle);
		*mux.rcv_thread.lock().unwrap() = Some(rcv_handle);

		mux
	}

	pub fn register(&self, conn: Arc<Connection>) {
		self.connections.lock().unwrap().insert(conn.socket_id, conn);
	}

	pub fn unregister(&self, socket_id: u32) {
		self.connections.lock().unwrap().remove(&socket_id);
	}

	pub fn lookup(&self, socket_id: u32) -> Option<Arc<Connection>> {
		self.connections.lock().unwrap().get(&socket_id).cloned()
	}

	pub fn rendezvous_match(&self, peer: SocketAddr) -> Option<u32> {
		self.rendezvous.lock().unwrap().get(&peer).map(|e| e.socket_id)
	}

	pub fn rendezvous_register(&self, peer: SocketAddr, entry: RendezvousEntry) {
		self.rendezvous.lock().unwrap().insert(peer, entry);
	}

	pub fn rendezvous_remove(&self, peer: SocketAddr) {
		self.rendezvous.lock().unwrap().remove(&peer);
	}

	pub fn set_listener(&self, listener: Arc<dyn HandshakeListener>) {
		*self.listener.lock().unwrap() = Some(listener);
	}

	pub fn clear_listener(&self) {
		*self.listener.lock().unwrap() = None;
	}

	/// Wake the send worker: a connection has new work (a fresh send, a retransmit, a control
	/// packet queued outside the priority list).
	pub fn notify_send(&self) {
		let _guard = self.send_data_gate.lock().unwrap();
		self.send_data_cond.notify_all();
		self.timer.tick();
	}

	/// Control packets bypass the send scheduler and go out immediately.
	pub fn send_control(&self, addr: SocketAddr, pkt: &Packet) {
		if let Err(e) = self.channel.lock().unwrap().sendto(addr, pkt) {
			warn!("control send failed to {addr}: {e}");
		}
	}

	pub fn shutdown(&self) {
		self.shutdown.store(true, Ordering::SeqCst);
		self.timer.tick();

		if let Some(handle) = self.snd_thread.lock().unwrap().take() {
			let _ = handle.join();
		}
		if let Some(handle) = self.rcv_thread.lock().unwrap().take() {
			let _ = handle.join();
		}
	}

	fn is_shutdown(&self) -> bool {
		self.shutdown.load(Ordering::SeqCst)
	}
}

fn send_worker(mux: Arc<Multiplexer>, channel: Arc<Mutex<Channel>>) {
	while !mux.is_shutdown() {
		match mux.snd_list.pop_ready(mux.timer.now()) {
			Some(socket_id) => {
				let Some(conn) = mux.lookup(socket_id) else { continue };
				let now = mux.timer.now();

				if let Some((next, pkt)) = conn.pack_data(now) {
					if let Some(addr) = conn.peer_addr() {
						if let Err(e) = channel.lock().unwrap().sendto(addr, &pkt) {
							warn!("send failed for socket {socket_id}: {e}");
						}
					}

					if next > 0 {
						mux.snd_list.push(socket_id, next);
					}
				}
			}
			None => {
				let next_wake = mux.snd_list.next_wake();
				match next_wake {
					Some(ts) => mux.timer.sleep_to(ts),
					None => mux.timer.sleep_for(std::time::Duration::from_millis(10)),
				}
			}
		}
	}
}

fn recv_worker(mux: Arc<Multiplexer>, channel: Arc<Mutex<Channel>>) {
	while !mux.is_shutdown() {
		let received = channel.lock().unwrap().recvfrom_timeout(std::time::Duration::from_millis(10));

		match received {
			Ok(Some((addr, packet))) => dispatch(&mux, addr, packet),
			Ok(None) => {}
			Err(e) => debug!("recv error: {e}"),
		}

		let socket_ids: Vec<u32> = mux.connections.lock().unwrap().keys().copied().collect();
		let now = mux.timer.now();
		for socket_id in socket_ids {
			if let Some(conn) = mux.lookup(socket_id) {
				if conn.check_timers(now) {
					mux.unregister(socket_id);
				}
			}
		}
	}
}

fn dispatch(mux: &Arc<Multiplexer>, addr: SocketAddr, packet: Packet) {
	match packet {
		Packet::Data(data) => {
			// Every data packet carries the destination socket id in its header, so a
			// multiplexer can demultiplex directly without relying on the peer address.
			// That's what lets several connections to the same peer share one channel.
			if let Some(conn) = mux.lookup(data.dest_id) {
				conn.process_data(data, mux.timer.now());
			} else {
				debug!("data packet for unknown socket {} from {addr}, dropping", data.dest_id);
			}
		}
		Packet::Control(ctrl) => {
			let now = mux.timer.now();

			if let ControlBody::Handshake(hs) = ctrl.body {
				dispatch_handshake(mux, addr, hs, ctrl.dest_id, now);
				return;
			}

			if let Some(conn) = mux.lookup(ctrl.dest_id) {
				conn.process_ctrl(ctrl.body, addr, now);
				mux.notify_send();
			}
		}
	}
}

/// A handshake's destination socket id is 0 until the caller learns its peer's id, so it can't
/// be routed by the ordinary `connections` table lookup alone: first try an in-progress
/// rendezvous attempt matched by peer address, then a connection that already knows its peer's
/// id (a listener's post-accept confirmation), and only then fall back to the listening socket.
fn dispatch_handshake(mux: &Arc<Multiplexer>, addr: SocketAddr, hs: Handshake, dest_id: u32, now: Timestamp) {
	let target = if dest_id != 0 { mux.lookup(dest_id) } else { mux.rendezvous_match(addr).and_then(|id| mux.lookup(id)) };

	if let Some(conn) = target {
		let self_addr = conn.local_addr.ip();
		let (reply, established) = conn.on_handshake(addr, hs, self_addr, now);

		if established {
			mux.rendezvous_remove(addr);
		}

		if let Some(reply) = reply {
			let pkt = Packet::Control(ControlPacket { dest_id: hs.socket_id, timestamp: now as u32, body: ControlBody::Handshake(reply) });
			mux.send_control(addr, &pkt);
		}

		return;
	}

	let listener = mux.listener.lock().unwrap().clone();
	if let Some(listener) = listener {
		if let Some(reply) = listener.on_handshake(addr, hs, now) {
			let pkt = Packet::Control(ControlPacket { dest_id: hs.socket_id, timestamp: now as u32, body: ControlBody::Handshake(reply) });
			mux.send_control(addr, &pkt);
		}
	} else {
		debug!("unsolicited handshake from {addr}, no listener on this multiplexer");
	}
}

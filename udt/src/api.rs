//! Process-level socket surface: a table of `UDTSOCKET` ids over connection/listener objects,
//! a `Runtime` that owns the multiplexer map, and a `OnceLock`-backed process-default facade so
//! simple callers can use the free functions without constructing a `Runtime` themselves.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Condvar, Mutex, OnceLock, Weak};
use std::time::{Duration, Instant};

use log::{info, warn};
use rand::Rng;

use crate::channel::Channel;
use crate::connection::{Connection, State};
use crate::error::{record_last_error, Error, Result};
use crate::handshake::{self, DEFAULT_HANDSHAKE_TIMEOUT};
use crate::multiplexer::{HandshakeListener, Multiplexer, MultiplexerKey, RendezvousEntry};
use crate::options::{Options, SockOpt};
use crate::packet::Handshake;
use crate::perf::Snapshot;
use crate::seq::SeqNo;
use crate::timer::Timestamp;

/// A process-wide socket id. Handed out descending from `2^30`, matching the historical
/// convention of keeping these clear of ordinary OS file-descriptor ranges.
pub type UdtSocket = u32;

const FIRST_SOCKET_ID: UdtSocket = 1 << 30;
const CONNECT_POLL: Duration = Duration::from_millis(5);

/// A single value addressed through [`SockOpt`], for callers using the name-keyed accessors.
#[derive(Clone, Debug)]
pub enum OptValue {
	U32(u32),
	Usize(usize),
	Bool(bool),
	Duration(Option<Duration>),
}

enum SocketEntry {
	/// `socket()` was called but neither `bind`, `connect` nor `listen` has run yet.
	Unbound { opts: Options, local_addr: Option<SocketAddr> },
	/// A connected socket. `release_mux` is `true` for a socket that took out its own
	/// multiplexer reference via `connect` (so `close` must release it); an accepted socket
	/// shares its listener's reference and is `false` here, released when the listener closes.
	Connection { conn: Arc<Connection>, reuse_addr: bool, release_mux: bool },
	Listener(Arc<ListenerState>),
}

/// Backlog and accept-queue state for a listening socket. Implements [`HandshakeListener`] so
/// the multiplexer can hand it unsolicited connection requests without depending on this module.
struct ListenerState {
	runtime: Weak<Runtime>,
	mux: Weak<Multiplexer>,
	local_addr: SocketAddr,
	opts: Options,
	max_backlog: usize,
	backlog: Mutex<Vec<UdtSocket>>,
	accept_cond: Condvar,
}

impl HandshakeListener for ListenerState {
	fn on_handshake(&self, peer: SocketAddr, incoming: Handshake, now: Timestamp) -> Option<Handshake> {
		if incoming.req_type != handshake::req_type::CALLER_REQUEST {
			return None;
		}

		let runtime = self.runtime.upgrade()?;
		let mux = self.mux.upgrade()?;

		{
			let backlog = self.backlog.lock().unwrap();
			if backlog.len() >= self.max_backlog {
				warn!("listener on {} rejecting connection from {peer}: backlog full", self.local_addr);
				return None;
			}
		}

		let socket_id = runtime.alloc_socket_id();
		let initial_seq = SeqNo::new(rand::thread_rng().gen_range(0..(1u32 << 31)));
		let conn = Arc::new(Connection::new(socket_id, self.local_addr, self.opts.clone(), Arc::downgrade(&mux), initial_seq, now));

		let (reply, established) = conn.on_handshake(peer, incoming, self.local_addr.ip(), now);

		if established {
			mux.register(Arc::clone(&conn));
			runtime.sockets.lock().unwrap().insert(socket_id, SocketEntry::Connection { conn, reuse_addr: self.opts.reuse_addr, release_mux: false });
			self.backlog.lock().unwrap().push(socket_id);
			self.accept_cond.notify_all();
			info!("listener on {} accepted connection {socket_id} from {peer}", self.local_addr);
		}

		reply
	}
}

/// Owns every multiplexer and socket this process has created. Constructed explicitly; the
/// free functions in this module go through [`default_runtime`] to share one process-wide
/// instance, matching the convenience-facade pattern used elsewhere in this codebase for a
/// process-default context.
pub struct Runtime {
	multiplexers: Mutex<HashMap<MultiplexerKey, Arc<Multiplexer>>>,
	sockets: Mutex<HashMap<UdtSocket, SocketEntry>>,
	next_id: Mutex<UdtSocket>,
}

impl Runtime {
	pub fn new() -> Arc<Self> {
		Arc::new(Self { multiplexers: Mutex::new(HashMap::new()), sockets: Mutex::new(HashMap::new()), next_id: Mutex::new(FIRST_SOCKET_ID) })
	}

	fn alloc_socket_id(&self) -> UdtSocket {
		let mut next = self.next_id.lock().unwrap();
		*next -= 1;
		*next
	}

	fn multiplexer_for(self: &Arc<Self>, local_addr: SocketAddr, opts: &Options) -> Result<Arc<Multiplexer>> {
		let key = MultiplexerKey { local_addr, reuse_addr: opts.reuse_addr };
		let mut muxes = self.multiplexers.lock().unwrap();

		if opts.reuse_addr {
			if let Some(mux) = muxes.get(&key) {
				*mux.ref_count.lock().unwrap() += 1;
				return Ok(Arc::clone(mux));
			}
		}

		let channel = Channel::bind(local_addr, opts.udp_snd_buf, opts.udp_rcv_buf, opts.mss).map_err(|e| Error::conn_setup(1, format!("bind to {local_addr} failed: {e}")))?;
		let bound_addr = channel.local_addr().map_err(|e| Error::conn_setup(2, format!("could not read local address: {e}")))?;
		let mux = Multiplexer::spawn(channel, bound_addr);
		muxes.insert(MultiplexerKey { local_addr: bound_addr, reuse_addr: opts.reuse_addr }, Arc::clone(&mux));
		Ok(mux)
	}

	fn release_multiplexer(&self, local_addr: SocketAddr, reuse_addr: bool) {
		let key = MultiplexerKey { local_addr, reuse_addr };
		let mut muxes = self.multiplexers.lock().unwrap();

		if let Some(mux) = muxes.get(&key) {
			let mut count = mux.ref_count.lock().unwrap();
			*count -= 1;
			if *count == 0 {
				let mux = muxes.remove(&key).unwrap();
				drop(count);
				mux.shutdown();
			}
		}
	}

	// ---- socket lifecycle --------------------------------------------------------------------

	pub fn socket(self: &Arc<Self>, opts: Options) -> UdtSocket {
		let id = self.alloc_socket_id();
		self.sockets.lock().unwrap().insert(id, SocketEntry::Unbound { opts, local_addr: None });
		id
	}

	pub fn bind(self: &Arc<Self>, id: UdtSocket, addr: SocketAddr) -> Result<()> {
		let mut sockets = self.sockets.lock().unwrap();
		match sockets.get_mut(&id) {
			Some(SocketEntry::Unbound { local_addr, .. }) => {
				*local_addr = Some(addr);
				Ok(())
			}
			Some(_) => Err(Error::inv_op(1, "socket is already bound")),
			None => Err(Error::inv_op(2, "unknown socket id")),
		}
	}

	pub fn connect(self: &Arc<Self>, id: UdtSocket, peer: SocketAddr) -> Result<()> {
		let (opts, local_addr) = self.take_unbound(id)?;
		let bind_addr = local_addr.unwrap_or_else(|| ephemeral_addr_for(peer));
		let mux = self.multiplexer_for(bind_addr, &opts)?;

		let initial_seq = SeqNo::new(rand::thread_rng().gen_range(0..(1u32 << 31)));
		let conn = Arc::new(Connection::new(id, mux.local_addr, opts.clone(), Arc::downgrade(&mux), initial_seq, mux.timer.now()));
		mux.register(Arc::clone(&conn));
		self.sockets.lock().unwrap().insert(id, SocketEntry::Connection { conn: Arc::clone(&conn), reuse_addr: opts.reuse_addr, release_mux: true });

		let self_addr = mux.local_addr.ip();
		let now = mux.timer.now();
		let _first = conn.begin_connect(peer, opts.rendezvous, self_addr, now);

		if opts.rendezvous {
			mux.rendezvous_register(peer, RendezvousEntry { socket_id: id, attempt: handshake::Attempt::new(now, DEFAULT_HANDSHAKE_TIMEOUT) });
		}

		let deadline = Instant::now() + DEFAULT_HANDSHAKE_TIMEOUT + Duration::from_millis(50);
		loop {
			if conn.state() == State::Connected {
				return Ok(());
			}

			let now = mux.timer.now();
			if conn.handshake_timed_out(now) || Instant::now() > deadline {
				mux.unregister(id);
				mux.rendezvous_remove(peer);
				self.sockets.lock().unwrap().insert(id, SocketEntry::Unbound { opts, local_addr: Some(mux.local_addr) });
				return Err(Error::conn_setup(3, format!("handshake with {peer} timed out")));
			}

			if let Some(hs) = conn.handshake_resend(self_addr, now) {
				let pkt = crate::packet::Packet::Control(crate::packet::ControlPacket { dest_id: 0, timestamp: now as u32, body: crate::packet::ControlBody::Handshake(hs) });
				mux.send_control(peer, &pkt);
			}

			std::thread::sleep(CONNECT_POLL);
		}
	}

	pub fn listen(self: &Arc<Self>, id: UdtSocket, backlog: usize) -> Result<()> {
		let (opts, local_addr) = self.take_unbound(id)?;
		let local_addr = local_addr.ok_or_else(|| Error::inv_op(3, "listen requires a prior bind"))?;
		let mux = self.multiplexer_for(local_addr, &opts)?;

		let listener = Arc::new(ListenerState {
			runtime: Arc::downgrade(self),
			mux: Arc::downgrade(&mux),
			local_addr: mux.local_addr,
			opts,
			max_backlog: backlog.max(1),
			backlog: Mutex::new(Vec::new()),
			accept_cond: Condvar::new(),
		});

		mux.set_listener(Arc::clone(&listener) as Arc<dyn HandshakeListener>);
		self.sockets.lock().unwrap().insert(id, SocketEntry::Listener(listener));
		Ok(())
	}

	pub fn accept(&self, id: UdtSocket) -> Result<UdtSocket> {
		let listener = self.listener(id)?;
		let mut backlog = listener.backlog.lock().unwrap();

		loop {
			if !backlog.is_empty() {
				return Ok(backlog.remove(0));
			}
			backlog = listener.accept_cond.wait_timeout(backlog, Duration::from_secs(1)).unwrap().0;
		}
	}

	pub fn close(&self, id: UdtSocket) -> Result<()> {
		let entry = self.sockets.lock().unwrap().remove(&id);
		match entry {
			Some(SocketEntry::Connection { conn, reuse_addr, release_mux }) => {
				let local_addr = conn.local_addr;
				conn.close();
				if release_mux {
					self.release_multiplexer(local_addr, reuse_addr);
				}
				Ok(())
			}
			Some(SocketEntry::Listener(listener)) => {
				if let Some(mux) = listener.mux.upgrade() {
					mux.clear_listener();
					self.release_multiplexer(mux.local_addr, listener.opts.reuse_addr);
				}
				Ok(())
			}
			Some(SocketEntry::Unbound { .. }) | None => Ok(()),
		}
	}

	// ---- name/peer queries --------------------------------------------------------------------

	pub fn getsockname(&self, id: UdtSocket) -> Result<SocketAddr> {
		match self.sockets.lock().unwrap().get(&id) {
			Some(SocketEntry::Connection { conn, .. }) => Ok(conn.local_addr),
			Some(SocketEntry::Listener(l)) => Ok(l.local_addr),
			Some(SocketEntry::Unbound { local_addr: Some(addr), .. }) => Ok(*addr),
			Some(SocketEntry::Unbound { local_addr: None, .. }) => Err(Error::inv_op(4, "socket is not bound")),
			None => Err(Error::inv_op(2, "unknown socket id")),
		}
	}

	pub fn getpeername(&self, id: UdtSocket) -> Result<SocketAddr> {
		self.connection(id)?.peer_addr().ok_or_else(|| Error::inv_op(5, "socket is not connected"))
	}

	// ---- options --------------------------------------------------------------------------

	pub fn getsockopt(&self, id: UdtSocket, opt: SockOpt) -> Result<OptValue> {
		let opts = self.options_of(id)?;
		Ok(match opt {
			SockOpt::Mss => OptValue::U32(opts.mss),
			SockOpt::SndSyn => OptValue::Bool(opts.snd_syn),
			SockOpt::RcvSyn => OptValue::Bool(opts.rcv_syn),
			SockOpt::Fc => OptValue::U32(opts.flight_flag_size),
			SockOpt::SndBuf => OptValue::Usize(opts.snd_buf),
			SockOpt::RcvBuf => OptValue::Usize(opts.rcv_buf),
			SockOpt::UdpSndBuf => OptValue::Usize(opts.udp_snd_buf),
			SockOpt::UdpRcvBuf => OptValue::Usize(opts.udp_rcv_buf),
			SockOpt::Linger => OptValue::Duration(opts.linger),
			SockOpt::MaxMsg => OptValue::Usize(opts.max_msg),
			SockOpt::MsgTtl => OptValue::Duration(opts.msg_ttl),
			SockOpt::Rendezvous => OptValue::Bool(opts.rendezvous),
			SockOpt::SndTimeo => OptValue::Duration(opts.snd_timeo),
			SockOpt::RcvTimeo => OptValue::Duration(opts.rcv_timeo),
			SockOpt::ReuseAddr => OptValue::Bool(opts.reuse_addr),
		})
	}

	/// Only meaningful before `connect`/`listen`: a connected socket's options are fixed for the
	/// lifetime of the connection, matching the historical "set before you connect" contract.
	pub fn setsockopt(&self, id: UdtSocket, opt: SockOpt, value: OptValue) -> Result<()> {
		let mut sockets = self.sockets.lock().unwrap();
		let Some(SocketEntry::Unbound { opts, .. }) = sockets.get_mut(&id) else {
			return Err(Error::inv_op(6, "setsockopt must run before connect/listen"));
		};

		match (opt, value) {
			(SockOpt::Mss, OptValue::U32(v)) => opts.mss = v,
			(SockOpt::SndSyn, OptValue::Bool(v)) => opts.snd_syn = v,
			(SockOpt::RcvSyn, OptValue::Bool(v)) => opts.rcv_syn = v,
			(SockOpt::Fc, OptValue::U32(v)) => opts.flight_flag_size = v,
			(SockOpt::SndBuf, OptValue::Usize(v)) => opts.snd_buf = v,
			(SockOpt::RcvBuf, OptValue::Usize(v)) => opts.rcv_buf = v,
			(SockOpt::UdpSndBuf, OptValue::Usize(v)) => opts.udp_snd_buf = v,
			(SockOpt::UdpRcvBuf, OptValue::Usize(v)) => opts.udp_rcv_buf = v,
			(SockOpt::Linger, OptValue::Duration(v)) => opts.linger = v,
			(SockOpt::MaxMsg, OptValue::Usize(v)) => opts.max_msg = v,
			(SockOpt::MsgTtl, OptValue::Duration(v)) => opts.msg_ttl = v,
			(SockOpt::Rendezvous, OptValue::Bool(v)) => opts.rendezvous = v,
			(SockOpt::SndTimeo, OptValue::Duration(v)) => opts.snd_timeo = v,
			(SockOpt::RcvTimeo, OptValue::Duration(v)) => opts.rcv_timeo = v,
			(SockOpt::ReuseAddr, OptValue::Bool(v)) => opts.reuse_addr = v,
			_ => return Err(Error::inv_op(7, "option value does not match option type")),
		}

		Ok(())
	}

	// ---- data path --------------------------------------------------------------------------

	pub fn send(&self, id: UdtSocket, data: &[u8]) -> Result<usize> {
		self.connection(id)?.send(data, None, true)
	}

	pub fn recv(&self, id: UdtSocket, max_len: usize) -> Result<Vec<u8>> {
		self.connection(id)?.recv(max_len)
	}

	pub fn sendmsg(&self, id: UdtSocket, data: &[u8], ttl: Option<Duration>, in_order: bool) -> Result<usize> {
		self.connection(id)?.send(data, ttl, in_order)
	}

	pub fn recvmsg(&self, id: UdtSocket) -> Result<Vec<u8>> {
		self.connection(id)?.recvmsg()
	}

	/// Stream `path` over the connection in MSS-sized chunks, starting at `offset`.
	pub fn sendfile(&self, id: UdtSocket, path: &std::path::Path, offset: u64, block: usize) -> Result<u64> {
		use std::io::{Read, Seek, SeekFrom};

		let conn = self.connection(id)?;
		let mut file = std::fs::File::open(path).map_err(|e| Error::file(1, format!("open {}: {e}", path.display())))?;
		file.seek(SeekFrom::Start(offset)).map_err(|e| Error::file(2, format!("seek: {e}")))?;

		let mut buf = vec![0u8; block.max(1)];
		let mut sent = 0u64;

		loop {
			let n = file.read(&mut buf).map_err(|e| Error::file(3, format!("read: {e}")))?;
			if n == 0 {
				break;
			}
			conn.send(&buf[..n], None, true)?;
			sent += n as u64;
		}

		Ok(sent)
	}

	/// Drain the connection into `path` starting at `offset`, up to `size` bytes.
	pub fn recvfile(&self, id: UdtSocket, path: &std::path::Path, offset: u64, size: u64, block: usize) -> Result<u64> {
		use std::io::{Seek, SeekFrom, Write};

		let conn = self.connection(id)?;
		let mut file = std::fs::OpenOptions::new().create(true).write(true).open(path).map_err(|e| Error::file(4, format!("open {}: {e}", path.display())))?;
		file.seek(SeekFrom::Start(offset)).map_err(|e| Error::file(5, format!("seek: {e}")))?;

		let mut received = 0u64;
		while received < size {
			let want = (size - received).min(block.max(1) as u64) as usize;
			let chunk = conn.recv(want)?;
			if chunk.is_empty() {
				break;
			}
			file.write_all(&chunk).map_err(|e| Error::file(6, format!("write: {e}")))?;
			received += chunk.len() as u64;
		}

		Ok(received)
	}

	// ---- misc -----------------------------------------------------------------------------

	pub fn perfmon(&self, id: UdtSocket) -> Result<Snapshot> {
		Ok(self.connection(id)?.snapshot())
	}

	/// Poll `read_ids`/`write_ids` for readiness, sleeping `poll_interval` between passes, until
	/// something is ready or `timeout` elapses. Mirrors the historical `select()`'s polling
	/// contract rather than introducing an event-driven readiness API.
	pub fn select(&self, read_ids: &[UdtSocket], write_ids: &[UdtSocket], timeout: Option<Duration>) -> Result<(Vec<UdtSocket>, Vec<UdtSocket>)> {
		const POLL_INTERVAL: Duration = Duration::from_micros(10);
		let deadline = timeout.map(|t| Instant::now() + t);

		loop {
			let mut readable = Vec::new();
			let mut writable = Vec::new();

			for &id in read_ids {
				if let Ok(conn) = self.connection(id) {
					if conn.is_broken() || conn.has_readable() {
						readable.push(id);
					}
				}
			}

			for &id in write_ids {
				if let Ok(conn) = self.connection(id) {
					if conn.is_broken() || conn.state() == State::Connected {
						writable.push(id);
					}
				}
			}

			if !readable.is_empty() || !writable.is_empty() {
				return Ok((readable, writable));
			}

			if let Some(deadline) = deadline {
				if Instant::now() >= deadline {
					return Ok((readable, writable));
				}
			}

			std::thread::sleep(POLL_INTERVAL);
		}
	}

	// ---- internal helpers -------------------------------------------------------------------

	fn take_unbound(&self, id: UdtSocket) -> Result<(Options, Option<SocketAddr>)> {
		let sockets = self.sockets.lock().unwrap();
		match sockets.get(&id) {
			Some(SocketEntry::Unbound { opts, local_addr }) => Ok((opts.clone(), *local_addr)),
			Some(_) => Err(Error::inv_op(8, "socket is already connected or listening")),
			None => Err(Error::inv_op(2, "unknown socket id")),
		}
	}

	fn options_of(&self, id: UdtSocket) -> Result<Options> {
		match self.sockets.lock().unwrap().get(&id) {
			Some(SocketEntry::Unbound { opts, .. }) => Ok(opts.clone()),
			Some(SocketEntry::Connection { .. }) | Some(SocketEntry::Listener(_)) => Err(Error::inv_op(9, "socket options are only readable before connect/listen")),
			None => Err(Error::inv_op(2, "unknown socket id")),
		}
	}

	fn connection(&self, id: UdtSocket) -> Result<Arc<Connection>> {
		match self.sockets.lock().unwrap().get(&id) {
			Some(SocketEntry::Connection { conn, .. }) => Ok(Arc::clone(conn)),
			Some(_) => Err(Error::inv_op(10, "socket is not a connection")),
			None => Err(Error::inv_op(2, "unknown socket id")),
		}
	}

	fn listener(&self, id: UdtSocket) -> Result<Arc<ListenerState>> {
		match self.sockets.lock().unwrap().get(&id) {
			Some(SocketEntry::Listener(l)) => Ok(Arc::clone(l)),
			Some(_) => Err(Error::inv_op(11, "socket is not listening")),
			None => Err(Error::inv_op(2, "unknown socket id")),
		}
	}
}

fn ephemeral_addr_for(peer: SocketAddr) -> SocketAddr {
	match peer {
		SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
		SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
	}
}

static DEFAULT_RUNTIME: OnceLock<Arc<Runtime>> = OnceLock::new();

/// The process-wide `Runtime` behind the free functions in this module, created on first use.
pub fn default_runtime() -> &'static Arc<Runtime> {
	DEFAULT_RUNTIME.get_or_init(Runtime::new)
}

pub fn socket(opts: Options) -> UdtSocket {
	default_runtime().socket(opts)
}

pub fn bind(id: UdtSocket, addr: SocketAddr) -> Result<()> {
	default_runtime().bind(id, addr).map_err(record_last_error)
}

pub fn connect(id: UdtSocket, peer: SocketAddr) -> Result<()> {
	default_runtime().connect(id, peer).map_err(record_last_error)
}

pub fn listen(id: UdtSocket, backlog: usize) -> Result<()> {
	default_runtime().listen(id, backlog).map_err(record_last_error)
}

pub fn accept(id: UdtSocket) -> Result<UdtSocket> {
	default_runtime().accept(id).map_err(record_last_error)
}

pub fn close(id: UdtSocket) -> Result<()> {
	default_runtime().close(id).map_err(record_last_error)
}

pub fn getsockname(id: UdtSocket) -> Result<SocketAddr> {
	default_runtime().getsockname(id).map_err(record_last_error)
}

pub fn getpeername(id: UdtSocket) -> Result<SocketAddr> {
	default_runtime().getpeername(id).map_err(record_last_error)
}

pub fn getsockopt(id: UdtSocket, opt: SockOpt) -> Result<OptValue> {
	default_runtime().getsockopt(id, opt).map_err(record_last_error)
}

pub fn setsockopt(id: UdtSocket, opt: SockOpt, value: OptValue) -> Result<()> {
	default_runtime().setsockopt(id, opt, value).map_err(record_last_error)
}

pub fn send(id: UdtSocket, data: &[u8]) -> Result<usize> {
	default_runtime().send(id, data).map_err(record_last_error)
}

pub fn recv(id: UdtSocket, max_len: usize) -> Result<Vec<u8>> {
	default_runtime().recv(id, max_len).map_err(record_last_error)
}

pub fn sendmsg(id: UdtSocket, data: &[u8], ttl: Option<Duration>, in_order: bool) -> Result<usize> {
	default_runtime().sendmsg(id, data, ttl, in_order).map_err(record_last_error)
}

pub fn recvmsg(id: UdtSocket) -> Result<Vec<u8>> {
	default_runtime().recvmsg(id).map_err(record_last_error)
}

pub fn sendfile(id: UdtSocket, path: &std::path::Path, offset: u64, block: usize) -> Result<u64> {
	default_runtime().sendfile(id, path, offset, block).map_err(record_last_error)
}

pub fn recvfile(id: UdtSocket, path: &std::path::Path, offset: u64, size: u64, block: usize) -> Result<u64> {
	default_runtime().recvfile(id, path, offset, size, block).map_err(record_last_error)
}

pub fn perfmon(id: UdtSocket) -> Result<Snapshot> {
	default_runtime().perfmon(id).map_err(record_last_error)
}

pub fn select(read_ids: &[UdtSocket], write_ids: &[UdtSocket], timeout: Option<Duration>) -> Result<(Vec<UdtSocket>, Vec<UdtSocket>)> {
	default_runtime().select(read_ids, write_ids, timeout).map_err(record_last_error)
}

pub use crate::error::last_error as getlasterror;

#[cfg(test)]
mod tests {
	use super::*;
	use std::net::{Ipv4Addr, SocketAddrV4};

	fn loopback() -> SocketAddr {
		SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))
	}

	#[test]
	fn connect_times_out_against_nothing_listening() {
		let runtime = Runtime::new();
		let id = runtime.socket(Options::default());

		let dead_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 1));
		let result = runtime.connect(id, dead_addr);
		assert!(result.is_err());
	}

	#[test]
	fn listen_then_connect_establishes_a_connection_and_can_accept_it() {
		let runtime = Runtime::new();

		let listener_id = runtime.socket(Options::default());
		runtime.bind(listener_id, loopback()).unwrap();
		runtime.listen(listener_id, 4).unwrap();
		let listen_addr = runtime.getsockname(listener_id).unwrap();

		let client_id = runtime.socket(Options::default());
		let client_runtime = Arc::clone(&runtime);
		let client = std::thread::spawn(move || client_runtime.connect(client_id, listen_addr));

		let accepted_id = runtime.accept(listener_id).expect("listener should accept a connection");
		client.join().unwrap().expect("client connect should succeed");

		assert!(runtime.getpeername(client_id).is_ok());
		let _ = accepted_id;
	}
}

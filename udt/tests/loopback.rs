//! End-to-end coverage over real loopback UDP sockets: two [`Runtime`]s, a listener and a
//! caller, talking through the actual wire codec and multiplexer threads instead of calling
//! connection internals directly.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use udt::channel::Channel;
use udt::packet::Packet;
use udt::{Options, Runtime};

fn any_loopback() -> SocketAddr {
	SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))
}

/// Bring up a listener and a directly-connected caller on two fresh runtimes, bypassing any
/// relay. Returns the caller-side and accepted-side sockets plus the runtimes that own them.
fn connect_pair(opts: Options) -> (Arc<Runtime>, udt::UdtSocket, Arc<Runtime>, udt::UdtSocket) {
	let server = Runtime::new();
	let listener = server.socket(opts.clone());
	server.bind(listener, any_loopback()).unwrap();
	server.listen(listener, 4).unwrap();
	let listen_addr = server.getsockname(listener).unwrap();

	let client = Runtime::new();
	let client_id = client.socket(opts);

	let server_for_accept = Arc::clone(&server);
	let accept_thread = std::thread::spawn(move || server_for_accept.accept(listener).unwrap());

	client.connect(client_id, listen_addr).unwrap();
	let accepted_id = accept_thread.join().unwrap();

	(client, client_id, server, accepted_id)
}

/// Forwards datagrams between a client-facing address and a fixed server address, dropping
/// every `drop_every`th data packet it sees in the client-to-server direction. Returns the
/// relay's client-facing address and a shared counter of how many it actually dropped.
fn spawn_lossy_relay(server: SocketAddr, drop_every: usize) -> (SocketAddr, Arc<AtomicUsize>) {
	let mut client_side = Channel::bind(any_loopback(), 64 * 1024, 1024 * 1024, 1500).unwrap();
	let relay_addr = client_side.local_addr().unwrap();
	let mut server_side = Channel::bind(any_loopback(), 64 * 1024, 1024 * 1024, 1500).unwrap();
	let dropped = Arc::new(AtomicUsize::new(0));

	let worker_dropped = Arc::clone(&dropped);
	std::thread::spawn(move || {
		let mut client_addr: Option<SocketAddr> = None;
		let mut seen_data = 0usize;

		loop {
			let mut progressed = false;

			while let Ok(Some((from, pkt))) = client_side.recvfrom() {
				progressed = true;
				client_addr = Some(from);

				let drop = if matches!(pkt, Packet::Data(_)) {
					seen_data += 1;
					seen_data % drop_every == 0
				} else {
					false
				};

				if drop {
					worker_dropped.fetch_add(1, Ordering::SeqCst);
				} else {
					let _ = server_side.sendto(server, &pkt);
				}
			}

			while let Ok(Some((_, pkt))) = server_side.recvfrom() {
				progressed = true;
				if let Some(addr) = client_addr {
					let _ = client_side.sendto(addr, &pkt);
				}
			}

			if !progressed {
				std::thread::sleep(Duration::from_micros(200));
			}
		}
	});

	(relay_addr, dropped)
}

#[test]
fn lossless_transfer_delivers_every_byte_in_order_with_no_retransmits() {
	let _ = env_logger::builder().is_test(true).try_init();
	let (client, client_id, server, accepted_id) = connect_pair(Options::default());

	const TOTAL: usize = 1_000_000;
	const CHUNK: usize = 1024;
	let payload: Vec<u8> = (0..TOTAL).map(|i| (i % 256) as u8).collect();

	let send_payload = payload.clone();
	let sender = std::thread::spawn(move || {
		for chunk in send_payload.chunks(CHUNK) {
			client.send(client_id, chunk).unwrap();
		}
	});

	let mut received = Vec::with_capacity(TOTAL);
	while received.len() < TOTAL {
		let bytes = server.recv(accepted_id, 64 * 1024).unwrap();
		received.extend_from_slice(&bytes);
	}

	sender.join().unwrap();
	assert_eq!(received, payload);

	let snap = server.perfmon(accepted_id).unwrap();
	assert_eq!(snap.totals.pkt_lost_recv, 0);
	assert_eq!(snap.totals.pkt_retrans, 0);
}

#[test]
fn dropped_packets_are_retransmitted_and_delivery_still_completes() {
	let server = Runtime::new();
	let listener = server.socket(Options::default());
	server.bind(listener, any_loopback()).unwrap();
	server.listen(listener, 4).unwrap();
	let real_server_addr = server.getsockname(listener).unwrap();

	const DROP_EVERY: usize = 73;
	let (relay_addr, dropped) = spawn_lossy_relay(real_server_addr, DROP_EVERY);

	let client = Runtime::new();
	let client_id = client.socket(Options::default());

	let server_for_accept = Arc::clone(&server);
	let accept_thread = std::thread::spawn(move || server_for_accept.accept(listener).unwrap());
	client.connect(client_id, relay_addr).unwrap();
	let accepted_id = accept_thread.join().unwrap();

	const PACKETS: usize = 2_000;
	const PAYLOAD_LEN: usize = 1400;
	let chunk: Vec<u8> = (0..PAYLOAD_LEN).map(|i| (i % 251) as u8).collect();
	let total = PACKETS * chunk.len();

	let send_client = Arc::clone(&client);
	let send_chunk = chunk.clone();
	let sender = std::thread::spawn(move || {
		for _ in 0..PACKETS {
			send_client.send(client_id, &send_chunk).unwrap();
		}
	});

	let mut received_len = 0usize;
	let deadline = Instant::now() + Duration::from_secs(30);
	while received_len < total {
		assert!(Instant::now() < deadline, "transfer did not complete in time");
		let bytes = server.recv(accepted_id, 64 * 1024).unwrap();
		received_len += bytes.len();
	}

	sender.join().unwrap();
	assert_eq!(received_len, total);
	assert!(dropped.load(Ordering::SeqCst) >= PACKETS / DROP_EVERY);

	let snap = server.perfmon(accepted_id).unwrap();
	assert!(snap.totals.pkt_lost_recv as usize >= PACKETS / DROP_EVERY);
}

#[test]
fn idle_connections_survive_on_keepalives_alone() {
	let mut opts = Options::default();
	opts.rcv_timeo = Some(Duration::from_millis(20));
	let (client, client_id, server, accepted_id) = connect_pair(opts);

	// Ten EXP intervals (floored at 100ms) of silence: long enough that a connection relying
	// only on the EXP timer's keepalive, not on real traffic, must still be alive afterwards.
	std::thread::sleep(Duration::from_millis(1_200));

	match client.recv(client_id, 1024) {
		Err(_) => {}
		Ok(bytes) => assert!(bytes.is_empty()),
	}

	// Proof the connection is genuinely still usable, not merely that its table entry lingers.
	client.send(client_id, b"still here").unwrap();
	assert_eq!(server.recv(accepted_id, 1024).unwrap(), b"still here");
}

#[test]
fn connect_against_a_black_hole_fails_within_the_handshake_timeout() {
	let runtime = Runtime::new();
	let id = runtime.socket(Options::default());

	// Nothing is bound on this port, but it's a routable loopback address, so the OS neither
	// rejects the handshake immediately nor delivers it anywhere: the connect attempt has to
	// time out on its own rather than fail fast.
	let black_hole = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 59_999));

	let started = Instant::now();
	let result = runtime.connect(id, black_hole);
	let elapsed = started.elapsed();

	assert!(result.is_err());
	assert!(elapsed < Duration::from_millis(750), "connect took too long to give up: {elapsed:?}");
	assert!(runtime.getpeername(id).is_err());
}

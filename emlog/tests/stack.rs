//! End-to-end exercises over an in-memory link: framing, dispatch,
//! resynchronisation, discovery, blocking receive and the emitter macros.

use core::cell::RefCell;
use core::future::poll_fn;
use core::task::{Poll, Waker};
use std::boxed::Box;
use std::rc::Rc;
use std::sync::Mutex as StdMutex;
use std::vec::Vec;

use emlog::cobs;
use emlog::core::{config, AppHash, Port};
use emlog::link::{LinkRx, LinkTx, RxWait};
use emlog::persist::{pre_init, Retained, SavedLog};
use emlog::ring::RingBuffer;
use emlog::server::{PortHandler, Server, ServerState};
use emlog::time::Duration;
use emlog::transport::{Identity, Transport};
use emlog::{log_info, log_mem_info, log_str};
use futures_executor::LocalPool;
use futures_task::LocalSpawn;

/// The emitter attachment is process-wide; tests touching it (directly or
/// through a running server's own diagnostics) take this lock.
static STACK_LOCK: StdMutex<()> = StdMutex::new(());

const TEST_HASH: AppHash = [0x5a; config::APP_HASH_SIZE];

struct NullTx;

impl LinkTx for NullTx {
    fn schedule(&self) {}
    fn panic_flush(&self) {}
}

struct Inbox {
    bytes: Vec<u8>,
    waker: Option<Waker>,
    /// Scripted idle timeouts handed out before the wire goes quiet.
    timeouts: usize,
}

/// Test-side handle for pushing host bytes at the server.
#[derive(Clone)]
struct Feeder(Rc<RefCell<Inbox>>);

impl Feeder {
    fn feed(&self, bytes: &[u8]) {
        let mut inbox = self.0.borrow_mut();
        inbox.bytes.extend_from_slice(bytes);
        if let Some(waker) = inbox.waker.take() {
            waker.wake();
        }
    }

    fn grant_timeout(&self) {
        let mut inbox = self.0.borrow_mut();
        inbox.timeouts += 1;
        if let Some(waker) = inbox.waker.take() {
            waker.wake();
        }
    }
}

/// Loopback RX link: bytes appear when the feeder pushes them; silence
/// parks the waiter unless a timeout was scripted.
struct Wire {
    data: Vec<u8>,
    pos: usize,
    inbox: Rc<RefCell<Inbox>>,
}

impl Wire {
    fn new() -> (Self, Feeder) {
        let inbox = Rc::new(RefCell::new(Inbox {
            bytes: Vec::new(),
            waker: None,
            timeouts: 0,
        }));
        (
            Self {
                data: Vec::new(),
                pos: 0,
                inbox: inbox.clone(),
            },
            Feeder(inbox),
        )
    }
}

impl LinkRx for Wire {
    fn start(&mut self) {}
    fn stop(&mut self) {}

    fn avail(&self) -> usize {
        self.data.len() - self.pos
    }

    fn peek(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    fn skip(&mut self, n: usize) {
        self.pos += n;
    }

    async fn wait(&mut self, _timeout: Duration) -> RxWait {
        poll_fn(|cx| {
            let mut inbox = self.inbox.borrow_mut();
            if !inbox.bytes.is_empty() {
                self.data.extend_from_slice(&inbox.bytes);
                inbox.bytes.clear();
                Poll::Ready(RxWait::Activity)
            } else if inbox.timeouts > 0 {
                inbox.timeouts -= 1;
                Poll::Ready(RxWait::TimedOut)
            } else {
                inbox.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        })
        .await
    }
}

fn make_transport(board: &'static str) -> &'static Transport {
    let ring = Box::leak(Box::new(RingBuffer::new()));
    Box::leak(Box::new(Transport::new(
        ring,
        Identity {
            app_hash: &TEST_HASH,
            board,
        },
    )))
}

/// Builds a host-to-device frame image for `port`.
fn host_frame(port: u8, payload: &[u8]) -> Vec<u8> {
    let mut body = vec![(port << 2) | 0x3];
    body.extend_from_slice(payload);
    let mut framed = vec![0u8; cobs::max_encoded_len(body.len()) + 2];
    framed[0] = 0;
    let n = cobs::encode(&body, &mut framed[1..]);
    framed[1 + n] = 0;
    framed.truncate(n + 2);
    framed
}

/// Splits and unstuffs everything queued on the transport's TX ring.
fn drain_frames(transport: &Transport) -> Vec<Vec<u8>> {
    let mut wire = vec![0u8; transport.queue().read_avail()];
    transport.queue().pop_into(&mut wire);
    wire.split(|&b| b == 0)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut body = part.to_vec();
            let n = cobs::decode_in_place(&mut body).unwrap();
            body.truncate(n);
            body
        })
        .collect()
}

struct CollectingHandler(RefCell<Vec<Vec<u8>>>);

// The executor is single-threaded; the handler is only touched from it.
unsafe impl Sync for CollectingHandler {}

impl PortHandler for CollectingHandler {
    fn on_frame(&self, payload: &[u8]) {
        self.0.borrow_mut().push(payload.to_vec());
    }
}

fn boxed(
    fut: impl core::future::Future<Output = ()> + 'static,
) -> futures_task::LocalFutureObj<'static, ()> {
    Box::new(fut).into()
}

fn spawn_server(
    spawner: &impl LocalSpawn,
    wire: Wire,
    state: &'static ServerState,
    transport: &'static Transport,
) {
    let server = Box::leak(Box::new(Server::new(wire, state, transport)));
    spawner
        .spawn_local_obj(boxed(async move { server.run().await }))
        .unwrap();
}

#[test]
fn test_dispatch_and_discovery() {
    let _guard = STACK_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    let mut executor = LocalPool::new();
    let transport = make_transport("loopback");
    let state: &'static ServerState = Box::leak(Box::new(ServerState::new()));
    let handler: &'static CollectingHandler =
        Box::leak(Box::new(CollectingHandler(RefCell::new(Vec::new()))));
    state.register(Port::new(1).unwrap(), handler);

    let (wire, feeder) = Wire::new();
    spawn_server(&executor.spawner(), wire, state, transport);

    feeder.feed(&host_frame(1, &[0xde, 0xad, 0xbe, 0xef]));
    executor.run_until_stalled();

    assert_eq!(handler.0.borrow().as_slice(), &[vec![0xde, 0xad, 0xbe, 0xef]]);

    let frames = drain_frames(transport);
    // Resume announced the hash, the first valid frame answered discovery.
    assert_eq!(frames[0][0], 0xff);
    assert_eq!(&frames[0][1..], &TEST_HASH[..]);
    assert_eq!(frames[1][0], (62 << 2) | 3);
    let info = emlog::device_info::DeviceInfo::decode(&frames[1][1..]).unwrap();
    assert_eq!(info.app_hash, TEST_HASH);
    assert_eq!(&info.board[..], b"loopback");
    assert_eq!(frames.len(), 2);
}

#[test]
fn test_resync_on_bad_kind_frame() {
    let _guard = STACK_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    let mut executor = LocalPool::new();
    let transport = make_transport("loopback");
    let state: &'static ServerState = Box::leak(Box::new(ServerState::new()));
    let handler: &'static CollectingHandler =
        Box::leak(Box::new(CollectingHandler(RefCell::new(Vec::new()))));
    state.register(Port::new(2).unwrap(), handler);

    let (wire, feeder) = Wire::new();
    spawn_server(&executor.spawner(), wire, state, transport);

    // Double sentinel (an empty frame, ignored), then a frame whose header
    // kind is not data: port 63, kind 0. It is reported and consumed.
    feeder.feed(&[0x00, 0x00, 0x03, 0xfc, 0x55, 0x00]);
    executor.run_until_stalled();
    assert!(handler.0.borrow().is_empty());

    // The stream stays in sync: the next good frame is dispatched.
    feeder.feed(&host_frame(2, b"next"));
    executor.run_until_stalled();
    assert_eq!(handler.0.borrow().as_slice(), &[b"next".to_vec()]);
}

#[test]
fn test_recovers_from_malformed_stuffing() {
    let _guard = STACK_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    let mut executor = LocalPool::new();
    let transport = make_transport("loopback");
    let state: &'static ServerState = Box::leak(Box::new(ServerState::new()));
    let handler: &'static CollectingHandler =
        Box::leak(Box::new(CollectingHandler(RefCell::new(Vec::new()))));
    state.register(Port::new(3).unwrap(), handler);

    let (wire, feeder) = Wire::new();
    spawn_server(&executor.spawner(), wire, state, transport);

    // Length byte pointing past the end of the body.
    feeder.feed(&[0x00, 0x09, 0x11, 0x22, 0x00]);
    feeder.feed(&host_frame(3, &[0x77]));
    executor.run_until_stalled();

    assert_eq!(handler.0.borrow().as_slice(), &[vec![0x77]]);
}

#[test]
fn test_unknown_port_and_missing_handler_are_reported() {
    let _guard = STACK_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    let mut executor = LocalPool::new();
    let transport = make_transport("loopback");
    let state: &'static ServerState = Box::leak(Box::new(ServerState::new()));
    let handler: &'static CollectingHandler =
        Box::leak(Box::new(CollectingHandler(RefCell::new(Vec::new()))));
    state.register(Port::new(1).unwrap(), handler);

    let (wire, feeder) = Wire::new();
    spawn_server(&executor.spawner(), wire, state, transport);

    // Port outside the dispatch table, then a port with no handler, then a
    // good one; the server must keep going.
    feeder.feed(&host_frame(40, &[1]));
    feeder.feed(&host_frame(4, &[2]));
    feeder.feed(&host_frame(1, &[3]));
    executor.run_until_stalled();

    assert_eq!(handler.0.borrow().as_slice(), &[vec![3]]);
}

#[test]
fn test_blocking_rx_roundtrip() {
    let _guard = STACK_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    let mut executor = LocalPool::new();
    let transport = make_transport("loopback");
    let state: &'static ServerState = Box::leak(Box::new(ServerState::new()));

    let (wire, feeder) = Wire::new();
    let spawner = executor.spawner();
    spawn_server(&spawner, wire, state, transport);

    let result: &'static RefCell<Option<(usize, Vec<u8>)>> =
        Box::leak(Box::new(RefCell::new(None)));
    spawner
        .spawn_local_obj(boxed(async move {
            let mut buf = [0u8; 32];
            let n = state.rx(Port::new(7).unwrap(), &mut buf).await;
            *result.borrow_mut() = Some((n, buf[..n.min(buf.len())].to_vec()));
        }))
        .unwrap();

    feeder.feed(&host_frame(7, b"response"));
    executor.run_until_stalled();

    let got = result.borrow().clone().unwrap();
    assert_eq!(got.0, 8);
    assert_eq!(got.1, b"response");
}

#[test]
fn test_blocking_rx_reports_full_length_when_trimmed() {
    let _guard = STACK_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    let mut executor = LocalPool::new();
    let transport = make_transport("loopback");
    let state: &'static ServerState = Box::leak(Box::new(ServerState::new()));

    let (wire, feeder) = Wire::new();
    let spawner = executor.spawner();
    spawn_server(&spawner, wire, state, transport);

    let result: &'static RefCell<Option<(usize, Vec<u8>)>> =
        Box::leak(Box::new(RefCell::new(None)));
    spawner
        .spawn_local_obj(boxed(async move {
            let mut buf = [0u8; 4];
            let n = state.rx(Port::new(6).unwrap(), &mut buf).await;
            *result.borrow_mut() = Some((n, buf.to_vec()));
        }))
        .unwrap();

    feeder.feed(&host_frame(6, b"longer than four"));
    executor.run_until_stalled();

    let got = result.borrow().clone().unwrap();
    // Full payload length back, payload cut to the caller's capacity.
    assert_eq!(got.0, 16);
    assert_eq!(got.1, b"long");
}

#[test]
fn test_pause_resends_discovery_on_reconnect() {
    let _guard = STACK_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    let mut executor = LocalPool::new();
    let transport = make_transport("loopback");
    let state: &'static ServerState = Box::leak(Box::new(ServerState::new()));
    let handler: &'static CollectingHandler =
        Box::leak(Box::new(CollectingHandler(RefCell::new(Vec::new()))));
    state.register(Port::new(1).unwrap(), handler);

    let (wire, feeder) = Wire::new();
    spawn_server(&executor.spawner(), wire, state, transport);

    feeder.feed(&host_frame(1, &[1]));
    executor.run_until_stalled();
    let first = drain_frames(transport);
    assert_eq!(first.len(), 2); // hash beacon + discovery answer

    // Idle timeout: the worker pauses, then the "reconnected" host speaks
    // again. Both announcements repeat for the new connection.
    feeder.grant_timeout();
    executor.run_until_stalled();
    feeder.feed(&host_frame(1, &[2]));
    executor.run_until_stalled();

    let again = drain_frames(transport);
    assert_eq!(again.len(), 2);
    assert_eq!(again[0][0], 0xff);
    assert_eq!(again[1][0], (62 << 2) | 3);
    assert_eq!(handler.0.borrow().len(), 2);
}

#[test]
fn test_emitter_records_on_the_wire() {
    let _guard = STACK_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    let transport = make_transport("loopback");
    static NULL_TX: NullTx = NullTx;
    emlog::emitter::init(transport);
    transport.attach(&NULL_TX);
    drain_frames(transport); // drop the attach-time hash beacon

    log_info!("temperature: %d", 23u32);
    let frames = drain_frames(transport);
    assert_eq!(frames.len(), 1);
    let body = &frames[0];
    // Formatted record: descriptor reference with kind 0, then the slot.
    assert_eq!(body[0] & 0x3, 0);
    assert_eq!(&body[4..8], &23u32.to_le_bytes());
    assert_eq!(body.len(), 8);

    log_mem_info!("scratch: %m", &[0x11, 0x22, 0x33]);
    let frames = drain_frames(transport);
    let body = &frames[0];
    assert_eq!(body[0] & 0x3, 1);
    assert_eq!(&body[8..], &[0x11, 0x22, 0x33]);
}

#[test]
fn test_suspend_resume_beacon() {
    let _guard = STACK_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    let transport = make_transport("loopback");
    emlog::emitter::init(transport);

    emlog::emitter::suspend_tx();
    emlog::emitter::resume_tx();

    let frames = drain_frames(transport);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0][0], 0xff);
    assert_eq!(&frames[0][1..], &TEST_HASH[..]);
}

#[test]
fn test_descriptor_reference_is_stable() {
    let reference = log_str!(1, "same site");
    assert_ne!(reference.into_u32(), 0);
}

#[test]
fn test_persistence_after_emit() {
    // Boot one: stamp the hash, queue a frame that never makes the wire.
    let block: *mut Retained = Box::leak(Box::new(Retained::new()));
    let mut saved = SavedLog::new();
    let ring = pre_init(unsafe { &mut *block }, &TEST_HASH, &mut saved);

    let transport = Transport::new(
        ring,
        Identity {
            app_hash: &TEST_HASH,
            board: "loopback",
        },
    );
    transport.tx(Port::new(1).unwrap(), b"before reset");
    let queued = transport.queue().read_avail();
    assert!(queued > 0);
    drop(transport);

    // Boot two: the unsent tail surfaces in the saved log.
    let mut saved = SavedLog::new();
    pre_init(unsafe { &mut *block }, &TEST_HASH, &mut saved);
    assert_eq!(saved.log().len(), queued);
    assert_eq!(saved.app_hash(), &TEST_HASH);

    // The snapshot is itself a valid frame stream.
    let mut body: Vec<u8> = saved.log()[1..saved.log().len() - 1].to_vec();
    let n = cobs::decode_in_place(&mut body).unwrap();
    assert_eq!(body[0], (1 << 2) | 3);
    assert_eq!(&body[1..n], b"before reset");
}

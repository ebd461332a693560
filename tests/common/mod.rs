//! Shared fixtures: in-memory transport doubles, scripted handlers, and a
//! harness that drives the event loop one batch at a time.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use async_trait::async_trait;
use log::{Level, LevelFilter, Log, Metadata, Record};

use organicdump_server::client::{ClientKind, SessionRegistry};
use organicdump_server::error::{HandlerError, ReadError, ServerError, StoreError};
use organicdump_server::handlers::{Handler, HandlerTable};
use organicdump_server::protocol::messages::{DailySchedule, Hello};
use organicdump_server::protocol::{ClientType, Message, responses};
use organicdump_server::server::{EventLoop, LoopOptions};
use organicdump_server::storage::DomainStore;
use organicdump_server::transport::{Connection, Handle, Listener};

/// Longest a single loop step may take before the test is considered hung.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(2);

thread_local! {
    static CAPTURED: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
}

/// Records every log line emitted on the calling thread.
struct CaptureLogger;

impl Log for CaptureLogger {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        CAPTURED.with(|lines| lines.borrow_mut().push((record.level(), record.args().to_string())));
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger;

/// Routes `log` output into a per-thread buffer and empties it. Each
/// `#[tokio::test]` runs on its own thread, so tests never see each
/// other's lines.
pub fn capture_logs() {
    // Another test on this binary may have installed it already.
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(LevelFilter::Trace);
    CAPTURED.with(|lines| lines.borrow_mut().clear());
}

/// Captured lines at exactly `level`, oldest first.
pub fn captured_at(level: Level) -> Vec<String> {
    CAPTURED.with(|lines| {
        lines
            .borrow()
            .iter()
            .filter(|(seen, _)| *seen == level)
            .map(|(_, line)| line.clone())
            .collect()
    })
}

pub fn hello(client_type: ClientType, client_id: u64) -> Message {
    Message::Hello(Hello {
        client_type,
        client_id,
    })
}

/// What the next read on a mock connection yields.
pub enum Inbound {
    Msg(Message),
    Closed,
    Broken,
}

#[derive(Default)]
struct ConnState {
    inbound: VecDeque<Inbound>,
    outbound: Vec<Message>,
    fail_writes: bool,
    closed: bool,
    waker: Option<Waker>,
}

pub struct MockConnection {
    handle: Handle,
    state: Arc<Mutex<ConnState>>,
}

/// Test-side view of a [`MockConnection`] that stays valid after the
/// connection is dropped by the server.
#[derive(Clone)]
pub struct Peer {
    pub handle: Handle,
    state: Arc<Mutex<ConnState>>,
}

pub fn mock_connection(handle: u64) -> (MockConnection, Peer) {
    let state = Arc::new(Mutex::new(ConnState::default()));
    let handle = Handle(handle);
    (
        MockConnection {
            handle,
            state: Arc::clone(&state),
        },
        Peer { handle, state },
    )
}

impl Peer {
    fn push(&self, step: Inbound) {
        let mut state = self.state.lock().unwrap();
        state.inbound.push_back(step);
        if let Some(waker) = state.waker.take() {
            waker.wake();
        }
    }

    pub fn send(&self, message: Message) {
        self.push(Inbound::Msg(message));
    }

    pub fn close(&self) {
        self.push(Inbound::Closed);
    }

    pub fn break_stream(&self) {
        self.push(Inbound::Broken);
    }

    pub fn fail_writes(&self) {
        self.state.lock().unwrap().fail_writes = true;
    }

    /// Everything the server has written to this peer so far.
    pub fn received(&self) -> Vec<Message> {
        self.state.lock().unwrap().outbound.clone()
    }

    pub fn take_received(&self) -> Vec<Message> {
        std::mem::take(&mut self.state.lock().unwrap().outbound)
    }

    /// True once the server has dropped its end.
    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn handle(&self) -> Handle {
        self.handle
    }

    fn peer(&self) -> String {
        format!("mock{}", self.handle)
    }

    fn poll_readable(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        let mut state = self.state.lock().unwrap();
        if state.inbound.is_empty() {
            state.waker = Some(cx.waker().clone());
            Poll::Pending
        } else {
            Poll::Ready(())
        }
    }

    fn read_message(&mut self) -> Result<Message, ReadError> {
        match self.state.lock().unwrap().inbound.pop_front() {
            Some(Inbound::Msg(message)) => Ok(message),
            Some(Inbound::Closed) => Err(ReadError::PeerClosed),
            Some(Inbound::Broken) => Err(ReadError::Transport(io::ErrorKind::ConnectionReset.into())),
            None => Err(ReadError::Transport(io::ErrorKind::WouldBlock.into())),
        }
    }

    async fn write_message(&mut self, message: &Message) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        state.outbound.push(message.clone());
        Ok(())
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.state.lock().unwrap().closed = true;
    }
}

pub enum AcceptStep {
    Accept(MockConnection),
    /// One incoming connection fails; the listener stays usable.
    Fail,
    /// The listener itself becomes unusable.
    Fatal,
}

#[derive(Default)]
struct ListenerState {
    steps: VecDeque<AcceptStep>,
    waker: Option<Waker>,
}

pub struct MockListener {
    state: Arc<Mutex<ListenerState>>,
}

#[derive(Clone)]
pub struct ListenerControl {
    state: Arc<Mutex<ListenerState>>,
}

pub fn mock_listener() -> (MockListener, ListenerControl) {
    let state = Arc::new(Mutex::new(ListenerState::default()));
    (
        MockListener {
            state: Arc::clone(&state),
        },
        ListenerControl { state },
    )
}

impl ListenerControl {
    pub fn push(&self, step: AcceptStep) {
        let mut state = self.state.lock().unwrap();
        state.steps.push_back(step);
        if let Some(waker) = state.waker.take() {
            waker.wake();
        }
    }
}

#[async_trait]
impl Listener for MockListener {
    fn poll_acceptable(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut state = self.state.lock().unwrap();
        match state.steps.front() {
            None => {
                state.waker = Some(cx.waker().clone());
                Poll::Pending
            }
            Some(AcceptStep::Fatal) => Poll::Ready(Err(io::Error::other("listener gone"))),
            Some(_) => Poll::Ready(Ok(())),
        }
    }

    async fn accept(&mut self) -> io::Result<Box<dyn Connection>> {
        let step = self.state.lock().unwrap().steps.pop_front();
        match step {
            Some(AcceptStep::Accept(connection)) => Ok(Box::new(connection)),
            Some(AcceptStep::Fail) => Err(io::ErrorKind::ConnectionAborted.into()),
            Some(AcceptStep::Fatal) | None => Err(io::ErrorKind::WouldBlock.into()),
        }
    }
}

/// Drives an [`EventLoop`] over mock endpoints.
pub struct Harness {
    pub event_loop: EventLoop,
    pub listener: ListenerControl,
    next_handle: u64,
}

impl Harness {
    pub fn new(handlers: HandlerTable, options: LoopOptions) -> Self {
        let (listener, control) = mock_listener();
        Self {
            event_loop: EventLoop::new(Box::new(listener), handlers, options),
            listener: control,
            next_handle: 1,
        }
    }

    /// Queues a connection without running the loop.
    pub fn queue_connection(&mut self) -> Peer {
        let (connection, peer) = mock_connection(self.next_handle);
        self.next_handle += 1;
        self.listener.push(AcceptStep::Accept(connection));
        peer
    }

    /// Queues a connection and runs one batch to accept it.
    pub async fn connect(&mut self) -> Peer {
        let peer = self.queue_connection();
        self.step().await.unwrap();
        peer
    }

    /// Connects and completes a handshake.
    pub async fn connect_as(&mut self, client_type: ClientType, client_id: u64) -> Peer {
        let peer = self.connect().await;
        peer.send(hello(client_type, client_id));
        self.step().await.unwrap();
        peer
    }

    /// Runs one readiness batch. Panics if nothing becomes ready in time.
    pub async fn step(&mut self) -> Result<(), ServerError> {
        tokio::time::timeout(STEP_TIMEOUT, self.event_loop.run_once())
            .await
            .expect("event loop step did not become ready")
    }

    pub fn is_live(&self, peer: &Peer) -> bool {
        self.event_loop.sessions().contains(peer.handle)
    }
}

/// Everything a [`ScriptedHandler`] saw.
pub type Seen = Arc<Mutex<Vec<(Handle, Message)>>>;

/// What a [`ScriptedHandler`] does after recording a message.
#[derive(Clone, Copy)]
pub enum Action {
    Accept,
    Reply,
    Fail,
    /// Evicts another session, as a handler does after a failed forward.
    Evict(Handle),
}

pub struct ScriptedHandler {
    seen: Seen,
    action: Action,
}

impl ScriptedHandler {
    pub fn new(action: Action) -> (Self, Seen) {
        let seen = Seen::default();
        (
            Self {
                seen: Arc::clone(&seen),
                action,
            },
            seen,
        )
    }
}

#[async_trait]
impl Handler for ScriptedHandler {
    async fn handle(
        &mut self,
        message: Message,
        origin: Handle,
        sessions: &mut SessionRegistry,
    ) -> Result<(), HandlerError> {
        self.seen.lock().unwrap().push((origin, message));
        match self.action {
            Action::Accept => Ok(()),
            Action::Reply => {
                if let Some(session) = sessions.get_mut(origin) {
                    session.send(&responses::ok()).await?;
                }
                Ok(())
            }
            Action::Fail => Err(HandlerError::ProtocolViolation("scripted failure".into())),
            Action::Evict(victim) => {
                if sessions.contains(victim) {
                    sessions.remove(victim);
                }
                Ok(())
            }
        }
    }
}

pub fn table_with(kind: ClientKind, handler: ScriptedHandler) -> HandlerTable {
    HandlerTable::new().bind(kind, Box::new(handler)).unwrap()
}

/// A store whose every operation fails.
pub struct FailingStore;

fn broken() -> StoreError {
    StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows)
}

impl DomainStore for FailingStore {
    fn contains_rpi(&mut self, _id: u64) -> Result<bool, StoreError> {
        Err(broken())
    }
    fn contains_rpi_named(&mut self, _name: &str) -> Result<bool, StoreError> {
        Err(broken())
    }
    fn contains_peripheral(&mut self, _id: u64) -> Result<bool, StoreError> {
        Err(broken())
    }
    fn contains_peripheral_named(&mut self, _name: &str) -> Result<bool, StoreError> {
        Err(broken())
    }
    fn contains_soil_moisture_sensor(&mut self, _id: u64) -> Result<bool, StoreError> {
        Err(broken())
    }
    fn contains_irrigation_system(&mut self, _id: u64) -> Result<bool, StoreError> {
        Err(broken())
    }
    fn insert_rpi(&mut self, _name: &str, _location: &str) -> Result<u64, StoreError> {
        Err(broken())
    }
    fn insert_soil_moisture_sensor(
        &mut self,
        _name: &str,
        _rpi_id: Option<u64>,
        _floor: f64,
        _ceil: f64,
    ) -> Result<u64, StoreError> {
        Err(broken())
    }
    fn insert_irrigation_system(&mut self, _name: &str, _rpi_id: Option<u64>) -> Result<u64, StoreError> {
        Err(broken())
    }
    fn insert_soil_moisture_measurement(&mut self, _sensor_id: u64, _value: f64) -> Result<u64, StoreError> {
        Err(broken())
    }
    fn update_peripheral_ownership(
        &mut self,
        _peripheral_id: u64,
        _rpi_id: u64,
        _orphan: bool,
    ) -> Result<(), StoreError> {
        Err(broken())
    }
    fn replace_irrigation_schedule(
        &mut self,
        _irrigation_system_id: u64,
        _schedules: &[DailySchedule],
    ) -> Result<(), StoreError> {
        Err(broken())
    }
}

// ── Controller ──
//
// Async driver for a `Tracker`. One task owns the tracker and the bus: it
// watches the daemon's name, issues the calls the tracker asks for, routes
// signals by subscription, and applies commands from `Controller` handles.
// Readers never touch the task; they load snapshots through the shared
// manager view and listen on the event broadcast.

use std::sync::{Arc, Mutex, Weak};

use csk_bus::{Bus, BusError, NameEvent, Reply, Signal, ZbusBus};
use futures_util::stream::BoxStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt, StreamMap};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::{Command, CommandEnvelope, CommandResult};
use crate::config::TrackerConfig;
use crate::error::CoreError;
use crate::event::{Event, EventFilter};
use crate::model::Manager;
use crate::observer::ObserverId;
use crate::store::{AccessPointHandle, DeviceHandle, ManagerView};
use crate::tracker::{Request, SubscriptionId, Ticket, Tracker};

const COMMAND_CHANNEL_SIZE: usize = 64;

/// Process-wide shared controller. Holds no strong reference: the
/// controller lives exactly as long as some caller keeps a handle.
static DEFAULT: Mutex<Weak<ControllerInner>> = Mutex::new(Weak::new());

// ── Controller ───────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable. Dropping the last clone cancels the tracker task,
/// which tears the mirror down without emitting removals.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: TrackerConfig,
    manager: ManagerView,
    event_tx: broadcast::Sender<Arc<Event>>,
    command_tx: mpsc::Sender<CommandEnvelope>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Controller {
    /// Start tracking over `bus`. Must be called inside a tokio runtime.
    pub fn start<B: Bus>(bus: B, config: TrackerConfig) -> Self {
        let cancel = CancellationToken::new();
        let (event_tx, _) = broadcast::channel(config.event_buffer.max(1));
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);

        let mut tracker = Tracker::with_token(config.clone(), cancel.child_token());
        let forward = event_tx.clone();
        tracker.observe(EventFilter::All, move |event| {
            // No receivers is fine.
            let _ = forward.send(Arc::new(event.clone()));
        });
        let manager = tracker.manager_view();

        let task = tokio::spawn(tracker_task(bus, tracker, command_rx, cancel.clone()));

        Self {
            inner: Arc::new(ControllerInner {
                config,
                manager,
                event_tx,
                command_tx,
                cancel,
                task: Mutex::new(Some(task)),
            }),
        }
    }

    /// Track the daemon on the system bus.
    pub async fn system(config: TrackerConfig) -> Result<Self, CoreError> {
        let bus = ZbusBus::system().await.map_err(bus_unavailable)?;
        Ok(Self::start(bus, config))
    }

    /// Track the daemon on the session bus.
    pub async fn session(config: TrackerConfig) -> Result<Self, CoreError> {
        let bus = ZbusBus::session().await.map_err(bus_unavailable)?;
        Ok(Self::start(bus, config))
    }

    /// The shared controller, created on the system bus on first use and
    /// again after every holder has let go.
    pub async fn get_default() -> Result<Self, CoreError> {
        Self::get_default_with(|| Self::system(TrackerConfig::default())).await
    }

    /// The shared controller, or a new one from `create` when none is
    /// alive and running. The slot holds no strong reference.
    pub async fn get_default_with<F, Fut>(create: F) -> Result<Self, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Self, CoreError>>,
    {
        if let Some(inner) = live_default() {
            return Ok(Self { inner });
        }

        let created = create().await?;
        let mut slot = lock_default();
        if let Some(inner) = slot.upgrade().filter(|inner| !inner.cancel.is_cancelled()) {
            // Another caller won the race; ours is dropped and cancelled.
            return Ok(Self { inner });
        }
        *slot = Arc::downgrade(&created.inner);
        Ok(created)
    }

    /// Whether both handles drive the same tracker.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }

    // ── Snapshots ────────────────────────────────────────────────────

    /// Current manager snapshot.
    pub fn manager(&self) -> Arc<Manager> {
        self.inner.manager.get()
    }

    /// Ready devices, in announcement order.
    pub fn devices(&self) -> Vec<DeviceHandle> {
        self.manager().devices.clone()
    }

    pub fn primary_device(&self) -> Option<DeviceHandle> {
        self.manager().primary_device.clone()
    }

    /// Find a ready device by interface name or display name.
    pub fn find_device(&self, name: &str) -> Option<DeviceHandle> {
        self.devices().into_iter().find(|handle| {
            let device = handle.get();
            device.interface.as_deref() == Some(name) || device.name.as_deref() == Some(name)
        })
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Subscribe to the event broadcast.
    pub fn events(&self) -> broadcast::Receiver<Arc<Event>> {
        self.inner.event_tx.subscribe()
    }

    /// Event broadcast as a stream. Events missed by a lagging reader are
    /// skipped.
    pub fn event_stream(&self) -> impl Stream<Item = Arc<Event>> + Send + 'static {
        BroadcastStream::new(self.events()).filter_map(|item| match item {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(error = %e, "event reader lagged");
                None
            }
        })
    }

    /// Register a synchronous observer. It runs on the tracker task, in
    /// emission order, before the broadcast sees the event.
    pub async fn observe(
        &self,
        filter: EventFilter,
        callback: impl FnMut(&Event) + Send + 'static,
    ) -> Result<ObserverId, CoreError> {
        let command = Command::Observe {
            filter,
            callback: Box::new(callback),
        };
        match self.execute(command).await? {
            CommandResult::Observing(id) => Ok(id),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn unobserve(&self, id: ObserverId) -> Result<bool, CoreError> {
        match self.execute(Command::Unobserve(id)).await? {
            CommandResult::Unobserved(found) => Ok(found),
            other => Err(unexpected(&other)),
        }
    }

    // ── Actions ──────────────────────────────────────────────────────

    /// Ask a Wi-Fi device to rescan. Returns `false` when the request was
    /// ignored (removed or non-Wi-Fi device).
    pub async fn request_scan(&self, device: &DeviceHandle) -> Result<bool, CoreError> {
        match self.execute(Command::RequestScan(device.clone())).await? {
            CommandResult::Accepted(issued) => Ok(issued),
            other => Err(unexpected(&other)),
        }
    }

    /// Ask the daemon to connect through an access point.
    pub async fn request_connect(&self, access_point: &AccessPointHandle) -> Result<bool, CoreError> {
        match self
            .execute(Command::RequestConnect(access_point.clone()))
            .await?
        {
            CommandResult::Accepted(issued) => Ok(issued),
            other => Err(unexpected(&other)),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Stop the tracker task and wait for it to finish. Other clones see
    /// `TrackerStopped` from then on.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let task = match self.inner.task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "tracker task ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        !self.inner.cancel.is_cancelled()
    }

    async fn execute(&self, command: Command) -> Result<CommandResult, CoreError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(CommandEnvelope {
                command,
                response_tx,
            })
            .await
            .map_err(|_| CoreError::TrackerStopped)?;
        response_rx.await.map_err(|_| CoreError::TrackerStopped)
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("daemon", &self.inner.config.daemon_name)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

fn live_default() -> Option<Arc<ControllerInner>> {
    lock_default()
        .upgrade()
        .filter(|inner| !inner.cancel.is_cancelled())
}

fn lock_default() -> std::sync::MutexGuard<'static, Weak<ControllerInner>> {
    DEFAULT
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn bus_unavailable(err: BusError) -> CoreError {
    CoreError::BusUnavailable {
        reason: err.to_string(),
    }
}

fn unexpected(result: &CommandResult) -> CoreError {
    CoreError::Internal(format!("unexpected command result: {result:?}"))
}

// ── Tracker task ─────────────────────────────────────────────────────

type Completion = (Ticket, Result<Reply, BusError>);

/// Owns the tracker until cancelled or every command sender is gone.
async fn tracker_task<B: Bus>(
    bus: B,
    mut tracker: Tracker,
    mut commands: mpsc::Receiver<CommandEnvelope>,
    cancel: CancellationToken,
) {
    let daemon = tracker.config().daemon_name.clone();
    let mut names = bus.watch_name(&daemon);
    let mut signals: StreamMap<SubscriptionId, BoxStream<'static, Signal>> = StreamMap::new();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();
    debug!(daemon = %daemon, "tracker task started");

    loop {
        if !drain_requests(&bus, &mut tracker, &mut signals, &done_tx, &cancel).await {
            break;
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = commands.recv() => {
                let Some(envelope) = envelope else { break };
                let result = route_command(&mut tracker, envelope.command);
                let _ = envelope.response_tx.send(result);
            }
            event = names.next() => match event {
                Some(NameEvent::Appeared { owner }) => tracker.daemon_appeared(&owner),
                Some(NameEvent::Vanished) => tracker.daemon_vanished(),
                None => {
                    warn!(daemon = %daemon, "name watch ended");
                    break;
                }
            },
            Some((ticket, result)) = done_rx.recv() => tracker.complete_call(ticket, result),
            Some((id, signal)) = signals.next() => tracker.handle_signal(id, &signal),
        }
    }

    cancel.cancel();
    tracker.shutdown();
    info!(daemon = %daemon, "tracker task stopped");
}

/// Hand every queued tracker request to the bus, in order. A subscription
/// is live before any request queued after it goes out, so the call it
/// guards cannot outrun it. Returns `false` once cancelled.
async fn drain_requests<B: Bus>(
    bus: &B,
    tracker: &mut Tracker,
    signals: &mut StreamMap<SubscriptionId, BoxStream<'static, Signal>>,
    done_tx: &mpsc::UnboundedSender<Completion>,
    cancel: &CancellationToken,
) -> bool {
    while let Some(request) = tracker.next_request() {
        match request {
            Request::Call {
                ticket,
                call,
                cancel,
            } => {
                let reply = bus.call(call, cancel);
                let done = done_tx.clone();
                tokio::spawn(async move {
                    let _ = done.send((ticket, reply.await));
                });
            }
            Request::Subscribe { id, filter } => {
                let installed = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return false,
                    installed = bus.subscribe(filter) => installed,
                };
                match installed {
                    Ok(stream) => {
                        signals.insert(id, stream);
                    }
                    Err(e) => warn!(subscription = %id, error = %e, "signal subscription failed"),
                }
            }
            Request::Unsubscribe { id } => {
                signals.remove(&id);
            }
        }
    }
    true
}

fn route_command(tracker: &mut Tracker, command: Command) -> CommandResult {
    match command {
        Command::RequestScan(device) => CommandResult::Accepted(tracker.request_scan(&device)),
        Command::RequestConnect(ap) => CommandResult::Accepted(tracker.request_connect(&ap)),
        Command::Observe { filter, callback } => {
            CommandResult::Observing(tracker.observe(filter, callback))
        }
        Command::Unobserve(id) => CommandResult::Unobserved(tracker.unobserve(id)),
    }
}

use std::any::Any;
use std::fmt;
use std::io;
use std::panic;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::info;
use tracing::warn;

use super::ChannelOf;
use super::Control;
use super::Shared;
use super::SnapshotUpdater;
use super::Updater;
use crate::channel::ClientChannel;
use crate::metrics::remove_updater_metrics;
use crate::Error;
use crate::Result;
use crate::SystemError;
use crate::UpdaterConfig;

static INSTANCE_COUNTER: AtomicUsize = AtomicUsize::new(0);

struct EngineState<H: SnapshotUpdater> {
    /// Mirror of the updater's channel list
    channels: Vec<Arc<ChannelOf<H>>>,
    /// The updater while no thread runs it
    parked: Option<Updater<H>>,
    thread: Option<JoinHandle<Updater<H>>>,
}

/// Handle owning one snapshot updater and its client channels.
///
/// All methods take `&self`; the handle can be shared between the threads
/// that start, stop and resize the engine.
///
/// # Example
///
/// ```ignore
/// struct Totals;
///
/// impl SnapshotUpdater for Totals {
///     type Data = HashMap<String, u64>;
///     type Update = (String, u64);
///
///     fn create_new_copy(&mut self, current: &Self::Data) -> Self::Data {
///         current.clone()
///     }
///
///     fn make_updates(&mut self, data: &mut Self::Data, updates: &mut Vec<Self::Update>) {
///         for (key, n) in updates.drain(..) {
///             *data.entry(key).or_default() += n;
///         }
///     }
/// }
///
/// let config = UpdaterConfig { num_clients: 4, ..Default::default() };
/// let engine = SnapshotEngine::new(config, HashMap::new(), Totals)?;
/// engine.start()?;
///
/// // on worker 2
/// let channel = engine.channel(2).unwrap();
/// channel.submit(("select".into(), 1))?;
/// let totals = channel.reader_ready().unwrap();
///
/// engine.stop();
/// ```
pub struct SnapshotEngine<H: SnapshotUpdater> {
    name: String,
    config: UpdaterConfig,
    shared: Arc<Shared<H::Data>>,
    control_tx: Sender<Control<H::Data, H::Update>>,
    state: Mutex<EngineState<H>>,
}

impl<H: SnapshotUpdater> SnapshotEngine<H> {
    /// Validate `config` and create the updater with `config.num_clients`
    /// channels. The thread is not started.
    pub fn new(
        config: UpdaterConfig,
        initial: H::Data,
        hooks: H,
    ) -> Result<Self> {
        let config = config.validate()?;
        let name = format!(
            "{}-{:02}",
            config.name,
            INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed)
        );

        let (control_tx, control_rx) = crossbeam_channel::unbounded();
        let shared = Arc::new(Shared::new());
        let updater = Updater::new(
            name.clone(),
            config.clone(),
            hooks,
            initial,
            shared.clone(),
            control_rx,
        );

        info!(
            updater = %name,
            num_clients = config.num_clients,
            queue_max = config.queue_max,
            cap_copies = config.cap_copies,
            "Snapshot engine created"
        );

        Ok(Self {
            state: Mutex::new(EngineState {
                channels: updater.channels().to_vec(),
                parked: Some(updater),
                thread: None,
            }),
            name,
            config,
            shared,
            control_tx,
        })
    }

    /// Instance name, also the updater thread name and metric label
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Spawn the updater thread.
    ///
    /// Calling `start()` on a running engine is a no-op. Fails with
    /// [`Error::Fatal`] while a context returned by
    /// [`latest_snapshot`](Self::latest_snapshot) of an update-only engine is
    /// still held; the engine stays stopped and can be started once it is
    /// dropped. If the thread cannot be spawned the engine also stays stopped
    /// and can be started again.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.thread.is_some() {
            return Ok(());
        }

        let Some(mut updater) = state.parked.take() else {
            return Err(SystemError::UpdaterUnavailable.into());
        };
        if updater.context_in_use() {
            state.parked = Some(updater);
            return Err(Error::Fatal(format!(
                "{}: update-only context is still referenced, release it before start()",
                self.name
            )));
        }
        updater.resume();

        self.shared.running.store(true, Ordering::Release);
        let builder = thread::Builder::new().name(self.name.clone());
        match spawn_updater(builder, updater) {
            Ok(handle) => {
                state.thread = Some(handle);
                Ok(())
            }
            Err((e, updater)) => {
                self.shared.running.store(false, Ordering::Release);
                for channel in &state.channels {
                    channel.shutdown();
                }
                state.parked = Some(updater);
                Err(SystemError::ThreadSpawn(e).into())
            }
        }
    }

    /// Stop the updater thread and wait for it to exit.
    ///
    /// Channels refuse new records from here on. With
    /// [`ShutdownMode::DrainToEmpty`](crate::ShutdownMode::DrainToEmpty)
    /// every record submitted before this call has been applied when it
    /// returns. A panic raised by a hook on the updater thread is resumed
    /// here.
    pub fn stop(&self) {
        if let Some(payload) = self.shutdown_updater() {
            panic::resume_unwind(payload);
        }
    }

    fn shutdown_updater(&self) -> Option<Box<dyn Any + Send + 'static>> {
        let mut state = self.state.lock();
        let handle = state.thread.take()?;

        self.shared.running.store(false, Ordering::Release);
        for channel in &state.channels {
            channel.shutdown();
        }
        // Fails only if the thread is already gone
        let _ = self.control_tx.send(Control::Shutdown);

        match handle.join() {
            Ok(updater) => {
                state.parked = Some(updater);
                None
            }
            Err(payload) => {
                warn!(updater = %self.name, "Snapshot updater thread panicked");
                Some(payload)
            }
        }
    }

    /// Channel of the worker with the given index
    pub fn channel(
        &self,
        index: usize,
    ) -> Option<Arc<ClientChannel<H::Data, H::Update>>> {
        self.state.lock().channels.get(index).cloned()
    }

    /// All channels, ordered by index
    pub fn channels(&self) -> Vec<Arc<ClientChannel<H::Data, H::Update>>> {
        self.state.lock().channels.clone()
    }

    pub fn client_count(&self) -> usize {
        self.state.lock().channels.len()
    }

    /// Add a channel at the end of the channel list.
    ///
    /// # Panics
    ///
    /// Panics unless `index` equals the current channel count.
    pub fn increase_client_count(
        &self,
        index: usize,
    ) -> Result<Arc<ClientChannel<H::Data, H::Update>>> {
        let mut state = self.state.lock();
        assert_eq!(
            index,
            state.channels.len(),
            "client channels must be added in index order"
        );

        let channel = match state.parked.as_mut() {
            Some(updater) => updater.add_channel(index),
            None => {
                let (reply, response) = crossbeam_channel::bounded(1);
                self.control_tx
                    .send(Control::Join { index, reply })
                    .map_err(|_| SystemError::UpdaterUnavailable)?;
                response.recv().map_err(|_| SystemError::UpdaterUnavailable)?
            }
        };

        state.channels.push(channel.clone());
        Ok(channel)
    }

    /// Remove the highest channel. Returns once every record queued in it
    /// has been applied and the channel is gone from the updater.
    ///
    /// One exception: on a stopped engine with
    /// [`ShutdownMode::Immediate`](crate::ShutdownMode::Immediate) whose
    /// `cap_copies` is reached, the records cannot be applied without
    /// waiting for readers. They are then kept by the updater and applied by
    /// the next run instead.
    ///
    /// # Panics
    ///
    /// Panics unless `index` is the highest active index.
    pub fn decrease_client_count(
        &self,
        index: usize,
    ) -> Result<()> {
        let mut state = self.state.lock();
        assert_eq!(
            index + 1,
            state.channels.len(),
            "only the highest client channel can be removed"
        );

        match state.parked.as_mut() {
            Some(updater) => updater.remove_channel(index),
            None => {
                let (reply, response) = crossbeam_channel::bounded(1);
                self.control_tx
                    .send(Control::Leave { index, reply })
                    .map_err(|_| SystemError::UpdaterUnavailable)?;
                response.recv().map_err(|_| SystemError::UpdaterUnavailable)?;
            }
        }

        state.channels.pop();
        Ok(())
    }

    /// The latest snapshot.
    ///
    /// For diagnostics and tests: the engine may publish a newer one right
    /// after this returns. `None` while an update-only engine runs, since its
    /// context is then owned by the updater thread. A caller holding an
    /// update-only context must release it before the next `start()`.
    pub fn latest_snapshot(&self) -> Option<Arc<H::Data>> {
        let state = self.state.lock();
        match state.parked.as_ref() {
            Some(updater) => Some(updater.latest()),
            None => self.shared.latest.load_full(),
        }
    }
}

/// Run `updater` on a thread built by `builder`. On failure the updater is
/// handed back along with the error.
pub(super) fn spawn_updater<H: SnapshotUpdater>(
    builder: thread::Builder,
    updater: Updater<H>,
) -> std::result::Result<JoinHandle<Updater<H>>, (io::Error, Updater<H>)> {
    // A failed spawn drops the closure, the updater waits in the handoff
    let (handoff_tx, handoff_rx) = crossbeam_channel::bounded(1);
    let _ = handoff_tx.send(updater);

    let receiver = handoff_rx.clone();
    builder
        .spawn(move || {
            let updater: Updater<H> = receiver
                .recv()
                .expect("updater is handed off before its thread starts");
            updater.run()
        })
        .map_err(|e| {
            let updater = handoff_rx
                .try_recv()
                .expect("the thread never started, the updater is still in the handoff");
            (e, updater)
        })
}

impl<H: SnapshotUpdater> Drop for SnapshotEngine<H> {
    fn drop(&mut self) {
        if self.shutdown_updater().is_some() && !thread::panicking() {
            warn!(updater = %self.name, "Dropped engine whose updater panicked");
        }
        remove_updater_metrics(&self.name);
    }
}

impl<H: SnapshotUpdater> fmt::Debug for SnapshotEngine<H> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("SnapshotEngine")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

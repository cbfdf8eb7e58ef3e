use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use crossbeam_channel::select;
use crossbeam_channel::Receiver;
use crossbeam_channel::RecvError;
use crossbeam_channel::Sender;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::take_in_sequence;
use super::SnapshotUpdater;
use crate::channel::doorbell;
use crate::channel::ClientChannel;
use crate::channel::Stamped;
use crate::metrics::UpdaterMetrics;
use crate::snapshot::Ledger;
use crate::UpdaterConfig;

pub(crate) type ChannelOf<H> =
    ClientChannel<<H as SnapshotUpdater>::Data, <H as SnapshotUpdater>::Update>;

/// Requests the engine handle sends to a running updater
pub(crate) enum Control<T, U> {
    Join {
        index: usize,
        reply: Sender<Arc<ClientChannel<T, U>>>,
    },
    Leave {
        index: usize,
        reply: Sender<()>,
    },
    Shutdown,
}

/// State the engine handle and the updater thread both look at
pub(crate) struct Shared<T> {
    pub(crate) running: AtomicBool,
    /// Latest published snapshot, empty in update-only mode
    pub(crate) latest: ArcSwapOption<T>,
}

impl<T> Shared<T> {
    pub(crate) fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            latest: ArcSwapOption::empty(),
        }
    }
}

enum Wake<T, U> {
    Updates,
    Control(Result<Control<T, U>, RecvError>),
    Timeout,
}

/// The state owned by the updater thread.
///
/// Between runs it is parked in the engine handle, which then applies
/// membership changes to it directly.
pub(crate) struct Updater<H: SnapshotUpdater> {
    name: String,
    config: UpdaterConfig,
    hooks: H,

    latest: Arc<H::Data>,
    ledger: Ledger<H::Data>,
    /// Uncollected copies besides the latest one
    outstanding: usize,

    channels: Vec<Arc<ChannelOf<H>>>,
    client_indices: Vec<usize>,

    collected: Vec<Stamped<H::Update>>,
    deferred: Vec<Stamped<H::Update>>,
    batch: Vec<H::Update>,
    sequence: Option<Arc<AtomicU64>>,
    next_seq: u64,

    doorbell_tx: Sender<()>,
    doorbell_rx: Receiver<()>,
    control_rx: Receiver<Control<H::Data, H::Update>>,

    shared: Arc<Shared<H::Data>>,
    metrics: UpdaterMetrics,
    stopping: bool,
}

impl<H: SnapshotUpdater> Updater<H> {
    pub(crate) fn new(
        name: String,
        config: UpdaterConfig,
        hooks: H,
        initial: H::Data,
        shared: Arc<Shared<H::Data>>,
        control_rx: Receiver<Control<H::Data, H::Update>>,
    ) -> Self {
        let latest = Arc::new(initial);
        let mut ledger = Ledger::new();
        let (doorbell_tx, doorbell_rx) = doorbell();
        let sequence = config.order_updates.then(|| Arc::new(AtomicU64::new(0)));
        let metrics = UpdaterMetrics::new(&name);

        // An update-only context stays uniquely owned (no weak references
        // either), it is mutated in place.
        if !config.updates_only {
            ledger.record(&latest);
            shared.latest.store(Some(latest.clone()));
        }

        let mut updater = Self {
            name,
            hooks,
            latest,
            ledger,
            outstanding: 0,
            channels: Vec::with_capacity(config.num_clients),
            client_indices: Vec::with_capacity(config.num_clients),
            collected: Vec::with_capacity(config.queue_max),
            deferred: Vec::new(),
            batch: Vec::with_capacity(config.queue_max),
            sequence,
            next_seq: 0,
            doorbell_tx,
            doorbell_rx,
            control_rx,
            shared,
            metrics,
            stopping: false,
            config,
        };

        for index in 0..updater.config.num_clients {
            updater.add_channel(index);
        }
        updater
    }

    pub(crate) fn channels(&self) -> &[Arc<ChannelOf<H>>] {
        &self.channels
    }

    pub(crate) fn latest(&self) -> Arc<H::Data> {
        self.latest.clone()
    }

    /// Whether an update-only context is still referenced outside the
    /// updater. It must not be, since every pass mutates it in place.
    pub(crate) fn context_in_use(&self) -> bool {
        self.config.updates_only
            && (Arc::strong_count(&self.latest) > 1 || Arc::weak_count(&self.latest) > 0)
    }

    /// Undo a previous shutdown: reopen the channels and republish the
    /// latest snapshot. Called on the parked updater before it runs again.
    pub(crate) fn resume(&mut self) {
        self.stopping = false;
        for channel in &self.channels {
            channel.reopen();
        }
        if self.config.updates_only {
            // The context is mutated in place, nobody else may hold it
            self.shared.latest.store(None);
        } else {
            self.publish();
        }
    }

    /// Thread body. Returns the updater so the engine can park it.
    pub(crate) fn run(mut self) -> Self {
        info!(
            updater = %self.name,
            channels = self.channels.len(),
            ordered = self.config.order_updates,
            updates_only = self.config.updates_only,
            "Snapshot updater started"
        );

        while !self.should_exit() {
            while let Ok(control) = self.control_rx.try_recv() {
                self.handle_control(control);
            }
            if self.should_exit() {
                break;
            }

            self.read_clients();

            if self.collected.is_empty() {
                self.idle();
                self.read_clients();

                if self.collected.is_empty() {
                    // Shutting down, or the wakeup belonged to records the
                    // first read already consumed.
                    continue;
                }
            }

            self.apply_collected();
        }

        self.finish();
        self
    }

    fn should_exit(&self) -> bool {
        self.stopping && (!self.config.drains_on_shutdown() || !self.has_pending())
    }

    fn has_pending(&self) -> bool {
        !self.deferred.is_empty() || self.channels.iter().any(|channel| channel.has_data())
    }

    /// An immediate shutdown was requested while work is still in progress
    fn aborting(&self) -> bool {
        !self.config.drains_on_shutdown() && !self.shared.running.load(Ordering::Acquire)
    }

    /// Drain every channel once; a busy channel is retried after the others
    fn read_clients(&mut self) {
        self.collected.append(&mut self.deferred);

        let mut clients: VecDeque<usize> = self.client_indices.iter().copied().collect();
        while let Some(index) = clients.pop_front() {
            if self.channels[index].drain(&mut self.collected) {
                continue;
            }

            // The worker holds its channel, check the others first
            self.metrics.busy_retries.inc();
            clients.push_back(index);
            if clients.len() == 1 {
                thread::yield_now();
            }
        }

        if !self.collected.is_empty() {
            trace!(updater = %self.name, collected = self.collected.len(), "Read clients");
        }
    }

    /// Nothing was collected: collect garbage while it lingers, then block
    /// until the next submission or control message.
    fn idle(&mut self) {
        if self.outstanding > 0 {
            self.gc();
        }

        let mut woke = false;
        if self.outstanding > 0 {
            // Opportunistic gc: readers release old copies without new updates arriving
            let mut rounds = self.config.opportunistic_gc_rounds;
            while self.outstanding > 0 && rounds > 0 {
                rounds -= 1;
                if self.wait_for_updates(Some(self.config.garbage_wait())) {
                    woke = true;
                    break;
                }
                self.gc();
            }
        }

        if !woke && !self.stopping {
            self.wait_for_updates(None);
        }
    }

    /// Block until a record is submitted, a control message arrives or
    /// `timeout` elapses. Returns false on timeout.
    fn wait_for_updates(
        &mut self,
        timeout: Option<Duration>,
    ) -> bool {
        let wake = match timeout {
            Some(timeout) => select! {
                recv(self.doorbell_rx) -> _ => Wake::Updates,
                recv(self.control_rx) -> control => Wake::Control(control),
                default(timeout) => Wake::Timeout,
            },
            None => select! {
                recv(self.doorbell_rx) -> _ => Wake::Updates,
                recv(self.control_rx) -> control => Wake::Control(control),
            },
        };

        match wake {
            Wake::Updates => true,
            Wake::Control(Ok(control)) => {
                self.handle_control(control);
                true
            }
            Wake::Control(Err(_)) => {
                warn!(updater = %self.name, "Engine handle dropped, stopping updater");
                self.begin_shutdown();
                true
            }
            Wake::Timeout => false,
        }
    }

    fn handle_control(
        &mut self,
        control: Control<H::Data, H::Update>,
    ) {
        match control {
            Control::Join { index, reply } => {
                let channel = self.add_channel(index);
                let _ = reply.send(channel);
            }
            Control::Leave { index, reply } => {
                self.remove_channel(index);
                let _ = reply.send(());
            }
            Control::Shutdown => self.begin_shutdown(),
        }
    }

    fn begin_shutdown(&mut self) {
        debug!(
            updater = %self.name,
            drain = self.config.drains_on_shutdown(),
            "Snapshot updater shutting down"
        );
        self.stopping = true;
        for channel in &self.channels {
            channel.shutdown();
        }
    }

    /// Apply what `read_clients` collected. Returns false when an immediate
    /// shutdown interrupted the wait for a free snapshot slot; the records
    /// are then kept for a later run.
    fn apply_collected(&mut self) -> bool {
        if self.config.order_updates {
            take_in_sequence(&mut self.collected, &mut self.next_seq, &mut self.deferred);
            self.metrics.deferred_updates.set(self.deferred.len() as i64);

            if !self.deferred.is_empty() {
                trace!(
                    updater = %self.name,
                    next_seq = self.next_seq,
                    deferred = self.deferred.len(),
                    "Sequence gap, deferring tail"
                );
            }
            if self.collected.is_empty() {
                thread::yield_now();
                return true;
            }
        }

        if !self.wait_for_cap() {
            if self.config.order_updates {
                self.next_seq -= self.collected.len() as u64;
            }
            self.deferred.append(&mut self.collected);
            return false;
        }

        self.batch.extend(self.collected.drain(..).map(|record| record.update));
        let applied = self.batch.len() as u64;

        if self.config.updates_only {
            let context = Arc::get_mut(&mut self.latest)
                .expect("update-only context must not be referenced outside the updater");
            self.hooks.make_updates(context, &mut self.batch);
        } else {
            let mut next = self.hooks.create_new_copy(&self.latest);
            self.metrics.copies.inc();
            self.hooks.make_updates(&mut next, &mut self.batch);

            let next = Arc::new(next);
            self.ledger.record(&next);
            self.latest = next;
            self.outstanding += 1;

            self.publish();
            debug!(updater = %self.name, applied, outstanding = self.outstanding, "Published snapshot");
        }

        self.batch.clear();
        self.metrics.updates_applied.inc_by(applied);

        if self.outstanding > 1 {
            self.gc();
        }
        true
    }

    /// Stall snapshot creation while `cap_copies` copies are outstanding.
    /// Returns false if an immediate shutdown cut the wait short.
    fn wait_for_cap(&mut self) -> bool {
        let Some(cap) = self.config.cap() else {
            return true;
        };
        if self.config.updates_only {
            return true;
        }

        while self.outstanding >= cap {
            // The count may be stale, readers could have released copies since
            self.gc();
            if self.outstanding < cap {
                break;
            }
            if self.aborting() {
                return false;
            }

            // Readers should release a copy very soon, only one is needed
            self.metrics.cap_waits.inc();
            thread::sleep(self.config.garbage_wait());
        }
        true
    }

    fn publish(&self) {
        for channel in &self.channels {
            channel.set_new_data(self.latest.clone());
        }
        self.shared.latest.store(Some(self.latest.clone()));
    }

    fn gc(&mut self) {
        let collection = self.ledger.collect();
        self.outstanding = collection.outstanding();
        self.metrics.live_copies.set(collection.live as i64);

        if collection.freed > 0 {
            debug!(
                updater = %self.name,
                freed = collection.freed,
                live = collection.live,
                "Collected snapshots"
            );
        } else if self.outstanding > 0 {
            trace!(
                updater = %self.name,
                live = collection.live,
                pinned_by_channels = self.pinned_by_channels(),
                "Snapshots still referenced"
            );
        }
    }

    /// Distinct snapshots held in the channels' pointer pairs. Anything
    /// live beyond these is held by a worker.
    fn pinned_by_channels(&self) -> usize {
        let mut in_use: Vec<*const H::Data> = Vec::with_capacity(2 * self.channels.len());
        for channel in &self.channels {
            let (current, previous) = channel.get_ptrs();
            in_use.extend(current.iter().chain(previous.iter()).map(Arc::as_ptr));
        }
        in_use.sort_unstable();
        in_use.dedup();
        in_use.len()
    }

    pub(crate) fn add_channel(
        &mut self,
        index: usize,
    ) -> Arc<ChannelOf<H>> {
        debug_assert_eq!(index, self.channels.len());

        let initial = (!self.config.updates_only).then(|| self.latest.clone());
        let channel = Arc::new(ClientChannel::new(
            index,
            self.config.queue_max,
            self.config.queue_full,
            self.sequence.clone(),
            self.doorbell_tx.clone(),
            initial,
            self.metrics.queue_full.clone(),
        ));
        if self.stopping {
            channel.shutdown();
        }

        self.channels.push(channel.clone());
        self.update_client_indices();
        info!(updater = %self.name, index, "Client channel joined");
        channel
    }

    /// Remove the highest channel after every record it holds was applied
    pub(crate) fn remove_channel(
        &mut self,
        index: usize,
    ) {
        debug_assert_eq!(index + 1, self.channels.len());

        let channel = self.channels[index].clone();
        channel.shutdown();

        // Passes over all channels: in ordering mode the leaving channel's
        // records may wait for a gap another channel fills.
        while channel.has_data() || !self.deferred.is_empty() {
            self.read_clients();
            if !self.apply_collected() {
                warn!(
                    updater = %self.name,
                    index,
                    "Shutdown interrupted the drain of a leaving client channel"
                );
                break;
            }
        }

        channel.reset_ptrs();
        self.channels.pop();
        self.update_client_indices();
        self.gc();
        info!(updater = %self.name, index, "Client channel left");
    }

    fn update_client_indices(&mut self) {
        self.client_indices = (0..self.channels.len()).collect();
        self.metrics.client_channels.set(self.channels.len() as i64);
    }

    fn finish(&mut self) {
        // Workers should not be touching shared data any more
        for channel in &self.channels {
            channel.reset_ptrs();
        }
        self.gc();

        let unapplied =
            self.deferred.len() + self.channels.iter().map(|channel| channel.len()).sum::<usize>();
        if unapplied > 0 {
            warn!(updater = %self.name, unapplied, "Snapshot updater stopped with unapplied records");
        }
        info!(updater = %self.name, live = self.ledger.len(), "Snapshot updater stopped");
    }
}

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use crossbeam_channel::Sender;
use parking_lot::Condvar;
use parking_lot::Mutex;
use prometheus::IntCounter;

use super::Stamped;
use crate::QueueFullPolicy;
use crate::SubmitError;

/// The channel between one worker thread and the updater.
///
/// Write path: [`submit`](Self::submit) locks only this channel's queue.
/// Read path: [`reader_ready`](Self::reader_ready) is a lock-free load of the
/// `current` slot. The `(current, previous)` slots are written only by the
/// updater; `previous` keeps the superseded snapshot alive for one more
/// publication so a reader that loaded it just before the swap is never left
/// with a dangling view.
pub struct ClientChannel<T, U> {
    index: usize,
    queue_max: usize,
    policy: QueueFullPolicy,

    pub(super) queue: Mutex<Vec<Stamped<U>>>,
    not_full: Condvar,
    closed: AtomicBool,

    /// Shared by all channels of the updater when ordering is enabled
    sequence: Option<Arc<AtomicU64>>,
    doorbell: Sender<()>,

    current: ArcSwapOption<T>,
    previous: ArcSwapOption<T>,

    queue_full: IntCounter,
}

impl<T, U> ClientChannel<T, U> {
    pub(crate) fn new(
        index: usize,
        queue_max: usize,
        policy: QueueFullPolicy,
        sequence: Option<Arc<AtomicU64>>,
        doorbell: Sender<()>,
        initial: Option<Arc<T>>,
        queue_full: IntCounter,
    ) -> Self {
        Self {
            index,
            queue_max,
            policy,
            queue: Mutex::new(Vec::with_capacity(queue_max)),
            not_full: Condvar::new(),
            closed: AtomicBool::new(false),
            sequence,
            doorbell,
            current: ArcSwapOption::new(initial),
            previous: ArcSwapOption::empty(),
            queue_full,
        }
    }

    /// Position of this channel in the updater's channel list
    pub fn index(&self) -> usize {
        self.index
    }

    /// Submit a mutation record, applying the configured queue-full policy.
    ///
    /// With [`QueueFullPolicy::Block`] this waits until the updater drains
    /// the queue, or until the channel is closed.
    pub fn submit(
        &self,
        update: U,
    ) -> Result<(), SubmitError<U>> {
        self.push(update, self.policy == QueueFullPolicy::Block)
    }

    /// Submit without ever waiting for queue space
    pub fn try_submit(
        &self,
        update: U,
    ) -> Result<(), SubmitError<U>> {
        self.push(update, false)
    }

    fn push(
        &self,
        update: U,
        block: bool,
    ) -> Result<(), SubmitError<U>> {
        let mut queue = self.queue.lock();
        let mut counted = false;

        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(SubmitError::Closed(update));
            }
            if queue.len() < self.queue_max {
                break;
            }
            if !counted {
                self.queue_full.inc();
                counted = true;
            }
            if !block {
                return Err(SubmitError::QueueFull(update));
            }
            self.not_full.wait(&mut queue);
        }

        // Drawn under the queue lock, after the capacity check: a number is
        // only consumed by a record that becomes visible to the updater.
        let seq = self
            .sequence
            .as_ref()
            .map_or(0, |sequence| sequence.fetch_add(1, Ordering::Relaxed));
        queue.push(Stamped { seq, update });
        drop(queue);

        let _ = self.doorbell.try_send(());
        Ok(())
    }

    /// The latest snapshot published to this channel.
    ///
    /// `None` in update-only mode and after the engine has stopped.
    pub fn reader_ready(&self) -> Option<Arc<T>> {
        self.current.load_full()
    }

    /// Records submitted but not yet drained by the updater
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Move all queued records into `out`.
    ///
    /// Returns false, without waiting, when the owning worker holds the lock.
    pub(crate) fn drain(
        &self,
        out: &mut Vec<Stamped<U>>,
    ) -> bool {
        let Some(mut queue) = self.queue.try_lock() else {
            return false;
        };
        out.append(&mut *queue);
        drop(queue);

        self.not_full.notify_all();
        true
    }

    pub(crate) fn has_data(&self) -> bool {
        !self.queue.lock().is_empty()
    }

    /// `(current, previous)`
    pub(crate) fn get_ptrs(&self) -> (Option<Arc<T>>, Option<Arc<T>>) {
        (self.current.load_full(), self.previous.load_full())
    }

    /// Shift `current` into `previous` and install `data` as `current`
    pub(crate) fn set_new_data(
        &self,
        data: Arc<T>,
    ) {
        let superseded = self.current.swap(Some(data));
        self.previous.store(superseded);
    }

    pub(crate) fn reset_ptrs(&self) {
        self.current.store(None);
        self.previous.store(None);
    }

    /// Refuse further submissions and release any blocked submitter
    pub(crate) fn shutdown(&self) {
        {
            let _queue = self.queue.lock();
            self.closed.store(true, Ordering::Release);
        }
        self.not_full.notify_all();
        let _ = self.doorbell.try_send(());
    }

    pub(crate) fn reopen(&self) {
        let _queue = self.queue.lock();
        self.closed.store(false, Ordering::Release);
    }
}

impl<T, U> fmt::Debug for ClientChannel<T, U> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ClientChannel")
            .field("index", &self.index)
            .field("queue_max", &self.queue_max)
            .field("policy", &self.policy)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

//! Cancellable per-key idle timers for Tillguard.
//!
//! An [`IdleTimers`] keeps at most one armed one-shot timer per key. When a
//! timer runs out it does not call back into anything; it pushes an
//! [`IdleExpiry`] onto a channel. The owner of the receiving end decides
//! what to do with it, which lets a single actor process timer firings in
//! the same serialized stream as every other command.
//!
//! # Generations
//!
//! Aborting a Tokio task does not un-send a message it already sent. An
//! expiry can therefore be sitting in the channel while the owner re-arms
//! or cancels the same key. Every arm gets a fresh generation number and
//! the expiry carries it; [`IdleTimers::claim`] only accepts an expiry whose
//! generation is still the registered one.
//!
//! # Integration
//!
//! ```ignore
//! let (mut timers, mut expiries) = IdleTimers::new(Duration::from_secs(1800));
//! timers.arm(profile_id);
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands, re-arm on activity */ }
//!         Some(expiry) = expiries.recv() => {
//!             if timers.claim(&expiry) { /* lock expiry.key */ }
//!         }
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, trace};

/// A timer firing, delivered on the channel returned by [`IdleTimers::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdleExpiry<K> {
    /// Which key's timer ran out.
    pub key: K,
    /// The generation of the arm that produced this firing.
    pub generation: u64,
}

/// Receiving end for timer firings.
pub type ExpiryReceiver<K> = mpsc::UnboundedReceiver<IdleExpiry<K>>;

struct ArmedTimer {
    generation: u64,
    deadline: Instant,
    task: JoinHandle<()>,
}

/// One cancellable one-shot timer per key.
///
/// All methods that arm a timer spawn a Tokio task, so they must be called
/// from within a Tokio runtime.
pub struct IdleTimers<K> {
    timeout: Duration,
    timers: HashMap<K, ArmedTimer>,
    next_generation: u64,
    expiry_tx: mpsc::UnboundedSender<IdleExpiry<K>>,
}

impl<K> IdleTimers<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// Creates an empty timer set and the channel its firings arrive on.
    pub fn new(timeout: Duration) -> (Self, ExpiryReceiver<K>) {
        let (expiry_tx, expiry_rx) = mpsc::unbounded_channel();
        let timers = Self {
            timeout,
            timers: HashMap::new(),
            next_generation: 1,
            expiry_tx,
        };
        (timers, expiry_rx)
    }

    /// Cancels any timer for `key` and starts a new one for the current
    /// timeout. Returns the generation of the new timer.
    pub fn arm(&mut self, key: K) -> u64 {
        self.cancel(&key);

        let generation = self.next_generation;
        self.next_generation += 1;

        let timeout = self.timeout;
        let deadline = Instant::now() + timeout;
        let tx = self.expiry_tx.clone();
        let fired_key = key.clone();
        let task = tokio::spawn(async move {
            time::sleep_until(deadline).await;
            // The receiver may be gone during shutdown; nothing to do then.
            let _ = tx.send(IdleExpiry {
                key: fired_key,
                generation,
            });
        });

        trace!(generation, timeout_secs = timeout.as_secs(), "idle timer armed");
        self.timers.insert(
            key,
            ArmedTimer {
                generation,
                deadline,
                task,
            },
        );
        generation
    }

    /// Cancels the timer for `key`. Returns `false` if none was armed.
    pub fn cancel(&mut self, key: &K) -> bool {
        match self.timers.remove(key) {
            Some(timer) => {
                timer.task.abort();
                trace!(generation = timer.generation, "idle timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancels every timer.
    pub fn cancel_all(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.task.abort();
        }
    }

    /// Changes the timeout and re-arms every live timer with it.
    ///
    /// Each re-armed timer counts down the full new timeout from now.
    /// Keys without a timer stay without one.
    pub fn rescale_all(&mut self, timeout: Duration) {
        self.timeout = timeout;
        let keys: Vec<K> = self.timers.keys().cloned().collect();
        debug!(
            timers = keys.len(),
            timeout_secs = timeout.as_secs(),
            "rescaling idle timers"
        );
        for key in keys {
            self.arm(key);
        }
    }

    /// Accepts a firing if it belongs to the currently armed timer for its
    /// key, removing that timer. Stale firings return `false` and leave any
    /// newer timer in place.
    pub fn claim(&mut self, expiry: &IdleExpiry<K>) -> bool {
        match self.timers.get(&expiry.key) {
            Some(timer) if timer.generation == expiry.generation => {
                self.timers.remove(&expiry.key);
                true
            }
            _ => {
                trace!(generation = expiry.generation, "stale idle expiry ignored");
                false
            }
        }
    }

    /// Whether `key` has a live timer.
    pub fn is_armed(&self, key: &K) -> bool {
        self.timers.contains_key(key)
    }

    /// When the timer for `key` will fire, if armed.
    pub fn deadline(&self, key: &K) -> Option<Instant> {
        self.timers.get(key).map(|t| t.deadline)
    }

    /// The timeout new timers are armed with.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of armed timers.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// `true` if no timer is armed.
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl<K> Drop for IdleTimers<K> {
    fn drop(&mut self) {
        for timer in self.timers.values() {
            timer.task.abort();
        }
    }
}

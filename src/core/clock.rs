/// Timer capability used by the master scheduler
///
/// Timers are identified by explicit [`TimerId`] values. A clock never calls back into
/// the scheduler directly: fired ids are handed to whoever owns the event loop, and the
/// scheduler ignores any id it no longer tracks. That keeps a timer that fires after
/// `stop()` from touching torn-down state.
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

pub trait Clock: Send + Sync {
    /// Arm a one-shot timer firing after `delay`.
    fn schedule(&self, delay: Duration) -> TimerId;

    /// Disarm a timer. Unknown or already fired ids are ignored.
    fn cancel(&self, id: TimerId);
}

/// Simulated clock for tests: time only moves when [`ManualClock::advance`] is called.
#[derive(Default)]
pub struct ManualClock {
    inner: Mutex<ManualState>,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_id: u64,
    // (deadline, id) keeps fire order stable for equal deadlines
    pending: BTreeMap<(Duration, TimerId), ()>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed since creation.
    pub fn now(&self) -> Duration {
        self.inner.lock().now
    }

    /// Move time forward and return the timers that came due, in deadline order.
    pub fn advance(&self, by: Duration) -> Vec<TimerId> {
        let mut state = self.inner.lock();
        state.now += by;
        let now = state.now;
        let due: Vec<(Duration, TimerId)> = state
            .pending
            .keys()
            .take_while(|(deadline, _)| *deadline <= now)
            .copied()
            .collect();
        for key in &due {
            state.pending.remove(key);
        }
        due.into_iter().map(|(_, id)| id).collect()
    }

    /// Number of armed timers.
    pub fn pending(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Time left until `id` fires, if it is still armed.
    pub fn remaining(&self, id: TimerId) -> Option<Duration> {
        let state = self.inner.lock();
        state
            .pending
            .keys()
            .find(|(_, pending)| *pending == id)
            .map(|(deadline, _)| *deadline - state.now)
    }
}

impl Clock for ManualClock {
    fn schedule(&self, delay: Duration) -> TimerId {
        let mut state = self.inner.lock();
        state.next_id += 1;
        let id = TimerId(state.next_id);
        let deadline = state.now + delay;
        state.pending.insert((deadline, id), ());
        id
    }

    fn cancel(&self, id: TimerId) {
        self.inner.lock().pending.retain(|(_, pending), _| *pending != id);
    }
}

type FireSink = Arc<dyn Fn(TimerId) + Send + Sync>;

/// Clock backed by tokio timers. Each armed timer is a sleeping task that reports its
/// id to `on_fire`; cancelling aborts the task.
pub struct TokioClock {
    handle: tokio::runtime::Handle,
    next_id: AtomicU64,
    tasks: Arc<Mutex<HashMap<TimerId, tokio::task::JoinHandle<()>>>>,
    on_fire: FireSink,
}

impl TokioClock {
    pub fn new(handle: tokio::runtime::Handle, on_fire: FireSink) -> Self {
        Self {
            handle,
            next_id: AtomicU64::new(1),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            on_fire,
        }
    }

    /// Abort every armed timer.
    pub fn cancel_all(&self) {
        for (_, task) in self.tasks.lock().drain() {
            task.abort();
        }
    }
}

impl Clock for TokioClock {
    fn schedule(&self, delay: Duration) -> TimerId {
        let id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let tasks = Arc::clone(&self.tasks);
        let on_fire = Arc::clone(&self.on_fire);

        // hold the lock across spawn so the task cannot finish before it is tracked
        let mut guard = self.tasks.lock();
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            tasks.lock().remove(&id);
            on_fire(id);
        });
        guard.insert(id, task);
        id
    }

    fn cancel(&self, id: TimerId) {
        if let Some(task) = self.tasks.lock().remove(&id) {
            task.abort();
        }
    }
}

impl Drop for TokioClock {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

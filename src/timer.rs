//! Keyed one-shot timers.
//!
//! Every armed timer carries a generation number. When its delay elapses the
//! task re-checks the table under the mutex and only runs the callback if its
//! own generation is still the one registered for the key, so a `cancel` or a
//! re-`schedule` that takes the mutex first always wins.

use std::{
    collections::HashMap,
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use tokio::task::JoinHandle;

use crate::BoxError;

struct ArmedTimer {
    generation: u64,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct TimerTable {
    armed: Mutex<HashMap<String, ArmedTimer>>,
    next_generation: AtomicU64,
}

impl TimerTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, ArmedTimer>> {
        self.armed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forgets `key` if it still belongs to `generation`. Returns whether the
    /// caller owns the firing.
    fn claim(&self, key: &str, generation: u64) -> bool {
        let mut armed = self.lock();
        match armed.get(key) {
            Some(timer) if timer.generation == generation => {
                armed.remove(key);
                true
            }
            _ => false,
        }
    }
}

#[derive(Clone, Default)]
pub struct TimerService {
    table: Arc<TimerTable>,
}

impl TimerService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a one-shot timer under `key`, replacing whatever was armed there.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F, Fut>(&self, key: impl Into<String>, delay: Duration, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let key = key.into();
        let generation = self.table.next_generation.fetch_add(1, Ordering::Relaxed);
        let table = Arc::clone(&self.table);
        let task_key = key.clone();

        // The task is spawned while the table is locked, so even a zero delay
        // finds its own entry when it claims the firing.
        let mut armed = self.table.lock();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !table.claim(&task_key, generation) {
                return;
            }

            match tokio::spawn(callback()).await {
                Ok(Ok(())) => tracing::debug!(key = %task_key, "timer fired"),
                Ok(Err(err)) => {
                    tracing::error!(key = %task_key, error = %err, "timer callback failed")
                }
                Err(err) => {
                    tracing::error!(key = %task_key, error = %err, "timer callback panicked")
                }
            }
        });

        if let Some(previous) = armed.insert(key, ArmedTimer { generation, task }) {
            previous.task.abort();
        }
    }

    /// Disarms the timer under `key`. Returns `false` if nothing was armed.
    pub fn cancel(&self, key: &str) -> bool {
        match self.table.lock().remove(key) {
            Some(timer) => {
                timer.task.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, key: &str) -> bool {
        self.table.lock().contains_key(key)
    }

    pub fn armed_count(&self) -> usize {
        self.table.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counting(counter: &Arc<AtomicUsize>) -> impl FnOnce() -> std::future::Ready<Result<(), BoxError>> {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(()))
        }
    }

    fn always_panic() -> bool {
        true
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_and_forgets_key() {
        let timers = TimerService::new();
        let fired = Arc::new(AtomicUsize::new(0));

        timers.schedule("question-timeout:1", Duration::from_secs(10), counting(&fired));
        assert!(timers.is_armed("question-timeout:1"));

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timers.is_armed("question-timeout:1"));
        assert_eq!(timers.armed_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let timers = TimerService::new();
        let fired = Arc::new(AtomicUsize::new(0));

        timers.schedule("k", Duration::from_secs(5), counting(&fired));
        assert!(timers.cancel("k"));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent() {
        let timers = TimerService::new();
        let fired = Arc::new(AtomicUsize::new(0));

        assert!(!timers.cancel("never-armed"));

        timers.schedule("k", Duration::from_secs(5), counting(&fired));
        assert!(timers.cancel("k"));
        assert!(!timers.cancel("k"));
        assert_eq!(timers.armed_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_previous_timer() {
        let timers = TimerService::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        timers.schedule("k", Duration::from_secs(5), counting(&first));
        timers.schedule("k", Duration::from_secs(8), counting(&second));
        assert_eq!(timers.armed_count(), 1);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_callback_is_contained() {
        let timers = TimerService::new();
        let fired = Arc::new(AtomicUsize::new(0));

        timers.schedule("broken", Duration::from_secs(1), || async {
            Err::<(), BoxError>("presenter unavailable".into())
        });
        timers.schedule("panics", Duration::from_secs(1), || async {
            if always_panic() {
                panic!("callback blew up");
            }
            Ok::<(), BoxError>(())
        });
        timers.schedule("healthy", Duration::from_secs(2), counting(&fired));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(timers.armed_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_still_fires() {
        let timers = TimerService::new();
        let fired = Arc::new(AtomicUsize::new(0));

        timers.schedule("now", Duration::ZERO, counting(&fired));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}

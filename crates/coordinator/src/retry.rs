//! Leading + trailing retry throttle.
//!
//! Used to re-enter the update pipeline while a target's data is not ready,
//! without re-entering it more than about twice per window however often the
//! caller asks.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::lock;

#[derive(Debug)]
struct PendingTimer {
    seq: u64,
    handle: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct Slot {
    last_fired_at: Option<Instant>,
    timer: Option<PendingTimer>,
    next_seq: u64,
}

impl Slot {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.handle.abort();
        }
    }
}

/// Per-key throttle: at most one pending timer per key.
///
/// For each call to [`schedule_retry`](Self::schedule_retry):
///
/// 1. any pending timer for the key is cancelled
/// 2. if the key last fired more than `window` ago, `action` runs now
/// 3. a new timer is armed to run `action` once `window` has elapsed
///
/// A key that has never fired gets no leading run. Keys are independent.
#[derive(Debug)]
pub struct RetryScheduler<K> {
    window: Duration,
    slots: Arc<Mutex<HashMap<K, Slot>>>,
}

impl<K> RetryScheduler<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Throttled run of `action` for `key`. Must be called within a tokio runtime.
    pub fn schedule_retry<F>(&self, key: K, action: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let action = Arc::new(action);
        let now = Instant::now();

        let fire_leading = {
            let mut slots = lock(&self.slots);
            let slot = slots.entry(key.clone()).or_default();
            slot.cancel_timer();
            match slot.last_fired_at {
                Some(last) if now.duration_since(last) > self.window => {
                    slot.last_fired_at = Some(now);
                    true
                }
                _ => false,
            }
        };

        // Run without the lock held: the action may schedule again.
        if fire_leading {
            action();
        }

        let mut slots = lock(&self.slots);
        // A leading action that forgot its own key leaves nothing to arm.
        let Some(slot) = slots.get_mut(&key) else {
            return;
        };
        slot.cancel_timer();
        slot.next_seq += 1;
        let seq = slot.next_seq;

        let window = self.window;
        let weak = Arc::downgrade(&self.slots);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let Some(slots) = weak.upgrade() else {
                return;
            };
            {
                let mut slots = lock(&slots);
                let Some(slot) = slots.get_mut(&key) else {
                    return;
                };
                if slot.timer.as_ref().map(|timer| timer.seq) != Some(seq) {
                    return;
                }
                slot.timer = None;
                slot.last_fired_at = Some(Instant::now());
            }
            action();
        });
        slot.timer = Some(PendingTimer { seq, handle });
    }

    /// Drop the pending timer for `key`, keeping its last-fired time.
    pub fn cancel(&self, key: &K) {
        if let Some(slot) = lock(&self.slots).get_mut(key) {
            slot.cancel_timer();
        }
    }

    /// Drop all state for `key`.
    pub fn forget(&self, key: &K) {
        if let Some(mut slot) = lock(&self.slots).remove(key) {
            slot.cancel_timer();
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        lock(&self.slots)
            .get(key)
            .is_some_and(|slot| slot.timer.is_some())
    }

    pub fn cancel_all(&self) {
        for slot in lock(&self.slots).values_mut() {
            slot.cancel_timer();
        }
    }
}

impl<K> Drop for RetryScheduler<K> {
    fn drop(&mut self) {
        for slot in lock(&self.slots).values_mut() {
            slot.cancel_timer();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const WINDOW: Duration = Duration::from_millis(200);

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + Clone + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = count.clone();
        (count, move || {
            handle.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[tokio::test(start_paused = true)]
    async fn first_call_only_fires_trailing() {
        let retries = RetryScheduler::new(WINDOW);
        let (count, action) = counter();

        retries.schedule_retry("a", action);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(retries.is_pending(&"a"));

        tokio::time::sleep(ms(199)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        tokio::time::sleep(ms(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!retries.is_pending(&"a"));
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_calls_collapse_into_one_trailing_fire() {
        let retries = RetryScheduler::new(WINDOW);
        let (count, action) = counter();

        for _ in 0..10 {
            retries.schedule_retry("a", action.clone());
            tokio::time::sleep(ms(15)).await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(ms(1000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn leading_fire_after_quiet_window() {
        let retries = RetryScheduler::new(WINDOW);
        let (count, action) = counter();

        retries.schedule_retry("a", action.clone());
        tokio::time::sleep(ms(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        retries.schedule_retry("a", action.clone());
        assert_eq!(count.load(Ordering::SeqCst), 2, "leading edge fires immediately");

        retries.schedule_retry("a", action.clone());
        assert_eq!(count.load(Ordering::SeqCst), 2, "within the window: no second leading fire");

        tokio::time::sleep(ms(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn continuous_calls_fire_at_a_bounded_rate() {
        let retries = RetryScheduler::new(WINDOW);
        let (count, action) = counter();

        // A call every 50ms for two seconds: the trailing timer never survives
        // long enough, so only leading fires happen once the key has fired once.
        retries.schedule_retry("a", action.clone());
        tokio::time::sleep(ms(250)).await;
        for _ in 0..40 {
            retries.schedule_retry("a", action.clone());
            tokio::time::sleep(ms(50)).await;
        }
        let fired = count.load(Ordering::SeqCst);
        assert!((8..=11).contains(&fired), "fired {fired} times");
    }

    #[tokio::test(start_paused = true)]
    async fn keys_do_not_clobber_each_other() {
        let retries = RetryScheduler::new(WINDOW);
        let (a_count, a) = counter();
        let (b_count, b) = counter();

        retries.schedule_retry("a", a);
        tokio::time::sleep(ms(100)).await;
        retries.schedule_retry("b", b);
        tokio::time::sleep(ms(150)).await;

        assert_eq!(a_count.load(Ordering::SeqCst), 1);
        assert_eq!(b_count.load(Ordering::SeqCst), 0);
        tokio::time::sleep(ms(100)).await;
        assert_eq!(b_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_and_forget_stop_the_trailing_fire() {
        let retries = RetryScheduler::new(WINDOW);
        let (count, action) = counter();

        retries.schedule_retry("a", action.clone());
        retries.cancel(&"a");
        assert!(!retries.is_pending(&"a"));

        retries.schedule_retry("b", action.clone());
        retries.forget(&"b");

        retries.schedule_retry("c", action.clone());
        retries.cancel_all();

        tokio::time::sleep(ms(1000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_scheduler_cancels_timers() {
        let retries = RetryScheduler::new(WINDOW);
        let (count, action) = counter();

        retries.schedule_retry(1u32, action);
        drop(retries);

        tokio::time::sleep(ms(1000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn action_may_reschedule_itself() {
        let retries = Arc::new(RetryScheduler::new(WINDOW));
        let count = Arc::new(AtomicUsize::new(0));

        fn arm(retries: &Arc<RetryScheduler<&'static str>>, count: &Arc<AtomicUsize>) {
            let weak = Arc::downgrade(retries);
            let count = count.clone();
            retries.schedule_retry("a", move || {
                if count.fetch_add(1, Ordering::SeqCst) < 2 {
                    if let Some(retries) = weak.upgrade() {
                        arm(&retries, &count);
                    }
                }
            });
        }

        arm(&retries, &count);
        tokio::time::sleep(ms(2000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn key_forgotten_by_its_leading_action_stays_forgotten() {
        let retries = Arc::new(RetryScheduler::new(WINDOW));
        let (count, action) = counter();

        retries.schedule_retry("a", action);
        tokio::time::sleep(ms(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let weak = Arc::downgrade(&retries);
        let forgetting = count.clone();
        retries.schedule_retry("a", move || {
            forgetting.fetch_add(1, Ordering::SeqCst);
            if let Some(retries) = weak.upgrade() {
                retries.forget(&"a");
            }
        });
        assert_eq!(count.load(Ordering::SeqCst), 2, "leading edge fires immediately");
        assert!(!retries.is_pending(&"a"));

        tokio::time::sleep(ms(1000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2, "no trailing fire after forget");
        assert!(!retries.is_pending(&"a"));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn calls_within_one_window_fire_once_or_twice(
                primed in any::<bool>(),
                mut offsets in proptest::collection::vec(0u64..200, 1..30),
            ) {
                offsets.sort_unstable();
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .start_paused(true)
                    .build()
                    .unwrap();

                let fired = rt.block_on(async move {
                    let retries = RetryScheduler::new(WINDOW);
                    let (count, action) = counter();

                    if primed {
                        retries.schedule_retry((), action.clone());
                        tokio::time::sleep(ms(1000)).await;
                    }
                    let before = count.load(Ordering::SeqCst);

                    let start = Instant::now();
                    for offset in offsets {
                        tokio::time::sleep_until(start + ms(offset)).await;
                        retries.schedule_retry((), action.clone());
                    }
                    tokio::time::sleep(ms(1000)).await;
                    count.load(Ordering::SeqCst) - before
                });

                prop_assert!((1..=2).contains(&fired), "fired {} times", fired);
            }
        }
    }
}

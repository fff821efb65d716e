//! The pause between submitting a probe and looking for it.

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

/// Interval between progress callbacks while waiting.
pub const TICK: Duration = Duration::from_millis(100);

/// Sleeps for a mail-transit allowance, reporting progress as it goes.
///
/// Progress callbacks are observers only: the wait ends at the deadline
/// whatever they do.
#[derive(Debug, Clone, Copy)]
pub struct IntervalWaiter {
    tick: Duration,
}

impl Default for IntervalWaiter {
    fn default() -> Self {
        Self { tick: TICK }
    }
}

impl IntervalWaiter {
    #[must_use]
    pub const fn with_tick(tick: Duration) -> Self {
        Self { tick }
    }

    /// Wait for `duration`, calling `on_tick` with the time elapsed so far on
    /// every tick. A zero duration returns at once without ticking.
    pub async fn wait(&self, duration: Duration, mut on_tick: impl FnMut(Duration)) {
        if duration.is_zero() {
            return;
        }

        let start = Instant::now();
        // `sleep` clamps an unrepresentable deadline to the far future.
        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);

        let mut ticks = tokio::time::interval_at(start + self.tick, self.tick);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = &mut deadline => break,
                at = ticks.tick() => on_tick(at - start),
            }
        }
    }
}

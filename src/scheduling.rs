// Periodic re-allocation timer.
//
// Guarantees an `Allocator` recomputes at least every
// `max_time_between_calculations`, even when no `bandwidth_changed` or
// `update_settings` call arrives. Grounded in the teacher's
// `sfu::Sfu::start` accept loop, which spawns a long-lived `tokio::spawn`
// task driven by `tokio::time::sleep`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::allocator::Allocator;

const RESCHEDULE_SLACK: Duration = Duration::from_millis(5);

/// Spawns the periodic tick task and stores its handle on `allocator` so
/// `Allocator::expire` can cancel it.
pub async fn start(allocator: Arc<Allocator>) {
    let handle = tokio::spawn(run(allocator.clone()));
    allocator.set_scheduler_handle(handle).await;
}

async fn run(allocator: Arc<Allocator>) {
    loop {
        let max_period = allocator.config().max_time_between_calculations;
        let elapsed = allocator.last_update_time().await.elapsed();

        if allocator.is_expired() {
            return;
        }

        if elapsed >= max_period {
            allocator.update().await;
            tokio::time::sleep(max_period + RESCHEDULE_SLACK).await;
        } else {
            tokio::time::sleep(max_period - elapsed + RESCHEDULE_SLACK).await;
        }

        if allocator.is_expired() {
            return;
        }
    }
}

/// Whether, given `last_update_time`, a cycle should run now rather than
/// being deferred to a later tick. Exposed separately from `run` so the
/// decision is unit-testable without a real timer.
pub fn should_run_now(last_update_time: Instant, max_period: Duration, now: Instant) -> bool {
    now.saturating_duration_since(last_update_time) >= max_period
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_immediately_once_period_elapsed() {
        let now = Instant::now();
        let last = now - Duration::from_secs(10);
        assert!(should_run_now(last, Duration::from_secs(5), now));
    }

    #[test]
    fn defers_when_within_period() {
        let now = Instant::now();
        let last = now - Duration::from_secs(1);
        assert!(!should_run_now(last, Duration::from_secs(5), now));
    }
}

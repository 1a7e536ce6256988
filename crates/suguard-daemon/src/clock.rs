//! Cancellable prompt countdown.
//!
//! A [`DecisionClock`] reports the remaining time once per [`TICK`] and fires
//! a single [`ClockEvent::Expired`] at the deadline unless cancelled first.
//! Events are delivered over an unbounded channel so the clock never waits on
//! its consumer.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, interval, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Tick granularity.
pub const TICK: Duration = Duration::from_millis(1000);

/// Event emitted by a running clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    /// Time left until the deadline. The first tick arrives immediately.
    Tick { remaining: Duration },
    /// Deadline reached without cancellation.
    Expired,
}

/// A running countdown.
///
/// Dropping the clock cancels it.
#[derive(Debug)]
pub struct DecisionClock {
    cancel: CancellationToken,
}

impl DecisionClock {
    /// Start a countdown of `total`.
    pub fn start(total: Duration) -> (Self, mpsc::UnboundedReceiver<ClockEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let deadline = Instant::now() + total;

        let token = cancel.clone();
        tokio::spawn(async move {
            let mut ticker = interval(TICK);
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => {
                        debug!("Decision clock cancelled");
                        return;
                    }
                    () = sleep_until(deadline) => {
                        let _ = tx.send(ClockEvent::Expired);
                        return;
                    }
                    _ = ticker.tick() => {
                        let remaining = deadline.saturating_duration_since(Instant::now());
                        if tx.send(ClockEvent::Tick { remaining }).is_err() {
                            return;
                        }
                    }
                }
            }
        });

        (Self { cancel }, rx)
    }

    /// Stop ticking and firing. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for DecisionClock {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Whole seconds shown on the deny label, rounded up.
#[allow(clippy::cast_possible_truncation)]
pub const fn countdown_secs(remaining: Duration) -> u64 {
    remaining.as_millis().div_ceil(TICK.as_millis()) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ticks_every_second_then_expires() {
        let (_clock, mut rx) = DecisionClock::start(Duration::from_secs(3));

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert_eq!(
            events,
            vec![
                ClockEvent::Tick {
                    remaining: Duration::from_secs(3)
                },
                ClockEvent::Tick {
                    remaining: Duration::from_secs(2)
                },
                ClockEvent::Tick {
                    remaining: Duration::from_secs(1)
                },
                ClockEvent::Expired,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_expiry() {
        let (clock, mut rx) = DecisionClock::start(Duration::from_secs(10));
        assert!(matches!(rx.recv().await, Some(ClockEvent::Tick { .. })));

        clock.cancel();
        tokio::time::sleep(Duration::from_secs(20)).await;

        // Channel closes without an expiry once the task observes the token.
        let mut rest = Vec::new();
        while let Some(event) = rx.recv().await {
            rest.push(event);
        }
        assert!(!rest.contains(&ClockEvent::Expired));
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels() {
        let (clock, mut rx) = DecisionClock::start(Duration::from_secs(5));
        drop(clock);

        let mut saw_expiry = false;
        while let Some(event) = rx.recv().await {
            saw_expiry |= event == ClockEvent::Expired;
        }
        assert!(!saw_expiry);
    }

    #[test]
    fn countdown_rounds_up() {
        assert_eq!(countdown_secs(Duration::from_millis(10_000)), 10);
        assert_eq!(countdown_secs(Duration::from_millis(9_001)), 10);
        assert_eq!(countdown_secs(Duration::from_millis(1)), 1);
        assert_eq!(countdown_secs(Duration::ZERO), 0);
    }
}

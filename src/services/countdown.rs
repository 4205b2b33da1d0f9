use std::time::Duration;

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};

const TICK: Duration = Duration::from_secs(1);

/// Seconds left at which the display starts pulsing the timer.
pub const PULSE_THRESHOLD: u32 = 10;

/// Result of feeding a tick to a [`Countdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick belongs to a stopped or restarted run.
    Stale,
    /// One second elapsed.
    Running {
        /// Seconds left.
        remaining: u32,
    },
    /// The countdown reached zero and stopped.
    Expired,
}

/// One-second countdown driven by a background ticker task.
///
/// The ticker only sends `(generation)` markers to the owning actor; the actor feeds
/// them back through [`Countdown::tick`], which ignores markers from older runs. Starting
/// always aborts the previous ticker so runs never stack.
#[derive(Debug)]
pub struct Countdown {
    initial: u32,
    remaining: u32,
    generation: u64,
    ticker: Option<JoinHandle<()>>,
}

impl Countdown {
    /// Idle countdown of `seconds`.
    pub fn new(seconds: u32) -> Self {
        Self {
            initial: seconds,
            remaining: seconds,
            generation: 0,
            ticker: None,
        }
    }

    /// Seconds left.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Whether a ticker is running.
    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Resume from the remaining time. Returns `false` when nothing is left to count.
    pub fn start<T, F>(&mut self, tx: mpsc::UnboundedSender<T>, wrap: F) -> bool
    where
        T: Send + 'static,
        F: Fn(u64) -> T + Send + 'static,
    {
        self.stop();
        if self.remaining == 0 {
            return false;
        }

        let generation = self.generation;
        self.ticker = Some(tokio::spawn(async move {
            let mut ticks = interval(TICK);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticks.tick().await;
            loop {
                ticks.tick().await;
                if tx.send(wrap(generation)).is_err() {
                    break;
                }
            }
        }));
        true
    }

    /// Reset to the full duration and start counting.
    pub fn restart<T, F>(&mut self, tx: mpsc::UnboundedSender<T>, wrap: F) -> bool
    where
        T: Send + 'static,
        F: Fn(u64) -> T + Send + 'static,
    {
        self.reset();
        self.start(tx, wrap)
    }

    /// Pause, keeping the remaining time.
    pub fn stop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        self.generation = self.generation.wrapping_add(1);
    }

    /// Stop and restore the full duration.
    pub fn reset(&mut self) {
        self.stop();
        self.remaining = self.initial;
    }

    /// Apply a tick produced by the ticker of run `generation`.
    pub fn tick(&mut self, generation: u64) -> TickOutcome {
        if generation != self.generation || self.ticker.is_none() {
            return TickOutcome::Stale;
        }

        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.stop();
            TickOutcome::Expired
        } else {
            TickOutcome::Running {
                remaining: self.remaining,
            }
        }
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn counts_down_to_expiry() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut countdown = Countdown::new(3);
        assert!(countdown.start(tx, |generation| generation));

        let mut outcomes = Vec::new();
        while let Some(generation) = rx.recv().await {
            let outcome = countdown.tick(generation);
            outcomes.push(outcome);
            if outcome == TickOutcome::Expired {
                break;
            }
        }

        assert_eq!(
            outcomes,
            vec![
                TickOutcome::Running { remaining: 2 },
                TickOutcome::Running { remaining: 1 },
                TickOutcome::Expired
            ]
        );
        assert!(!countdown.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_keeps_remaining_and_start_resumes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut countdown = Countdown::new(60);
        countdown.start(tx.clone(), |generation| generation);
        let generation = rx.recv().await.unwrap();
        countdown.tick(generation);
        countdown.stop();

        assert_eq!(countdown.tick(generation), TickOutcome::Stale);
        assert_eq!(countdown.remaining(), 59);

        countdown.start(tx, |generation| generation);
        let generation = rx.recv().await.unwrap();
        assert_eq!(
            countdown.tick(generation),
            TickOutcome::Running { remaining: 58 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn restart_restores_the_full_duration() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut countdown = Countdown::new(5);
        countdown.start(tx.clone(), |generation| generation);
        let generation = rx.recv().await.unwrap();
        countdown.tick(generation);
        assert_eq!(countdown.remaining(), 4);

        countdown.restart(tx, |generation| generation);
        assert_eq!(countdown.remaining(), 5);
        assert_eq!(countdown.tick(generation), TickOutcome::Stale);
    }

    #[test]
    fn expired_countdown_does_not_start() {
        let mut countdown = Countdown::new(0);
        let (tx, _rx) = mpsc::unbounded_channel::<u64>();
        assert!(!countdown.start(tx, |generation| generation));
    }
}

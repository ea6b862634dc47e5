use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::config::LOADING_MESSAGES;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadingTick {
    pub generation: u64,
    pub index: usize,
}

/// Rotates the loading message while a request is in flight. The task is
/// aborted on `stop` and on drop, so it never outlives the Loading view.
#[derive(Debug, Default)]
pub struct LoadingTicker {
    handle: Option<JoinHandle<()>>,
    generation: u64,
}

impl LoadingTicker {
    pub fn start(&mut self, period: Duration, sender: UnboundedSender<LoadingTick>) {
        self.stop();
        self.generation += 1;
        let generation = self.generation;

        self.handle = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut index = 0usize;
            loop {
                ticker.tick().await;
                index = (index + 1) % LOADING_MESSAGES.len();
                if sender.send(LoadingTick { generation, index }).is_err() {
                    break;
                }
            }
        }));
        debug!(generation, "loading ticker started");
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!(generation = self.generation, "loading ticker stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Ticks queued before a stop, or sent by an earlier run, are stale.
    pub fn is_current(&self, tick: &LoadingTick) -> bool {
        self.handle.is_some() && tick.generation == self.generation
    }
}

impl Drop for LoadingTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    const PERIOD: Duration = Duration::from_millis(2500);

    #[tokio::test(start_paused = true)]
    async fn rotates_through_messages_and_wraps() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let mut ticker = LoadingTicker::default();
        ticker.start(PERIOD, sender);

        let started = Instant::now();
        let mut indices = Vec::new();
        for _ in 0..5 {
            let tick = receiver.recv().await.expect("tick");
            assert!(ticker.is_current(&tick));
            indices.push(tick.index);
        }
        assert_eq!(indices, vec![1, 2, 3, 0, 1]);
        assert!(Instant::now() - started >= PERIOD * 5);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_silences_the_ticker() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let mut ticker = LoadingTicker::default();
        ticker.start(PERIOD, sender);
        let first = receiver.recv().await.expect("first tick");

        ticker.stop();
        assert!(!ticker.is_running());
        assert!(!ticker.is_current(&first));

        tokio::time::sleep(PERIOD * 4).await;
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_ticker_cancels_its_task() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let mut ticker = LoadingTicker::default();
        ticker.start(PERIOD, sender);
        drop(ticker);

        tokio::time::sleep(PERIOD * 3).await;
        assert!(receiver.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_invalidates_earlier_generation() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let mut ticker = LoadingTicker::default();
        ticker.start(PERIOD, sender.clone());
        let stale = receiver.recv().await.expect("tick");

        ticker.start(PERIOD, sender);
        assert!(!ticker.is_current(&stale));
        let fresh = receiver.recv().await.expect("tick");
        assert!(ticker.is_current(&fresh));
        assert_eq!(fresh.index, 1);
    }
}

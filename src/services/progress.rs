//! Progress channel between a backup run and its observer.
//!
//! One [`ProgressSender`] per run, one [`ProgressStream`] per observer. Events
//! arrive in emission order, `percent` never decreases, and exactly one event
//! with `done = true` closes the stream. Dropping the stream does not stop the
//! run; later events are simply discarded.

use crate::models::BackupProgress;
use tokio::sync::mpsc;

/// Label of the first event of every run.
pub const PREPARING_LABEL: &str = "Preparing backup...";

/// Label of the terminal event of a successful run.
pub const COMPLETE_LABEL: &str = "Complete!";

/// Create a connected sender/stream pair for one run.
pub fn progress_channel() -> (ProgressSender, ProgressStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ProgressSender {
            tx,
            percent: 0.0,
            current: String::new(),
            finished: false,
        },
        ProgressStream { rx, finished: false },
    )
}

/// Producer side, owned by the executor.
///
/// The terminal methods consume the sender so a second terminal event cannot
/// be emitted. A sender dropped without one (a panicking coordinator, for
/// instance) emits a failure event on drop.
#[derive(Debug)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<BackupProgress>,
    percent: f64,
    current: String,
    finished: bool,
}

impl ProgressSender {
    /// Emit a non-terminal update.
    ///
    /// `percent` is clamped to 0-100, rounded to one decimal place, and never
    /// allowed below the last value sent.
    pub fn update(&mut self, percent: f64, current: impl Into<String>) {
        let percent = (percent.clamp(0.0, 100.0) * 10.0).round() / 10.0;
        self.percent = self.percent.max(percent);
        self.current = current.into();
        self.send(false, None);
    }

    /// Emit the terminal success event at 100%.
    pub fn complete(mut self) {
        self.percent = 100.0;
        self.current = COMPLETE_LABEL.to_string();
        self.send(true, None);
    }

    /// Emit the terminal failure event, keeping the last percent reached.
    pub fn fail(mut self, error: impl Into<String>) {
        self.send(true, Some(error.into()));
    }

    /// Last percent emitted.
    pub fn percent(&self) -> f64 {
        self.percent
    }

    fn send(&mut self, done: bool, error: Option<String>) {
        if self.finished {
            return;
        }
        self.finished = done;

        // The observer may have gone away; the run continues regardless
        let _ = self.tx.send(BackupProgress {
            percent: self.percent,
            current: self.current.clone(),
            done,
            error,
        });
    }
}

impl Drop for ProgressSender {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("Backup run ended without a terminal progress event");
            self.send(true, Some("Backup aborted unexpectedly".to_string()));
        }
    }
}

/// Consumer side of a run's progress events.
#[derive(Debug)]
pub struct ProgressStream {
    rx: mpsc::UnboundedReceiver<BackupProgress>,
    finished: bool,
}

impl ProgressStream {
    /// Wait for the next event.
    ///
    /// Returns `None` once the terminal event has been delivered.
    pub async fn next(&mut self) -> Option<BackupProgress> {
        if self.finished {
            return None;
        }
        let event = self.rx.recv().await?;
        self.finished = event.done;
        Some(event)
    }

    /// Take the next event if one is already queued.
    #[cfg(test)]
    fn try_next(&mut self) -> Option<BackupProgress> {
        if self.finished {
            return None;
        }
        let event = self.rx.try_recv().ok()?;
        self.finished = event.done;
        Some(event)
    }

    /// Whether the terminal event has been delivered.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_events_in_order_and_terminal_last() {
        let (mut tx, mut rx) = progress_channel();
        tx.update(0.0, PREPARING_LABEL);
        tx.update(50.0, "Weapons");
        tx.complete();

        let events: Vec<_> = std::iter::from_fn(|| rx.try_next()).collect();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].current, PREPARING_LABEL);
        assert_eq!(events[1].percent, 50.0);
        assert!(events[2].done);
        assert_eq!(events[2].percent, 100.0);
        assert_eq!(events[2].current, COMPLETE_LABEL);
        assert!(rx.is_finished());
        assert!(rx.try_next().is_none());
    }

    #[test]
    fn test_percent_is_monotonic_and_rounded() {
        let (mut tx, mut rx) = progress_channel();
        tx.update(33.333, "A");
        tx.update(12.0, "B");
        tx.update(140.0, "C");
        drop(tx);

        let percents: Vec<_> = std::iter::from_fn(|| rx.try_next())
            .map(|e| e.percent)
            .collect();
        assert_eq!(percents, vec![33.3, 33.3, 100.0, 100.0]);
    }

    #[test]
    fn test_failure_keeps_percent() {
        let (mut tx, mut rx) = progress_channel();
        tx.update(40.0, "Hair");
        tx.fail("Backup cancelled");

        rx.try_next();
        let last = rx.try_next().unwrap();
        assert!(last.is_failure());
        assert_eq!(last.percent, 40.0);
        assert_eq!(last.error.as_deref(), Some("Backup cancelled"));
    }

    #[test]
    fn test_dropped_sender_emits_failure() {
        let (tx, mut rx) = progress_channel();
        drop(tx);

        let last = rx.try_next().unwrap();
        assert!(last.done);
        assert!(last.error.is_some());
        assert!(rx.try_next().is_none());
    }

    #[test]
    fn test_detached_observer_does_not_block_sender() {
        let (mut tx, rx) = progress_channel();
        drop(rx);
        tx.update(10.0, "A");
        tx.complete();
    }

    #[test]
    fn test_next_waits_for_events() {
        let (mut tx, mut rx) = progress_channel();
        {
            let mut next = task::spawn(rx.next());
            assert_pending!(next.poll());

            tx.update(5.0, "A");
            assert!(next.is_woken());
            let event = assert_ready!(next.poll());
            assert_eq!(event.map(|e| e.percent), Some(5.0));
        }

        tx.complete();
        let terminal = tokio_test::block_on(rx.next());
        assert!(terminal.is_some_and(|e| e.done));
        assert!(tokio_test::block_on(rx.next()).is_none());
    }
}

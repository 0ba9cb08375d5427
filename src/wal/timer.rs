//! Periodic sync timer
//!
//! A background thread that syncs the WAL every `interval`. Each manual sync
//! sends `Reschedule`, which restarts the countdown so the two never fire
//! back to back.

use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, warn};

use crate::error::{Result, WalError};

use super::{Shared, WalState};

/// Messages from the WAL to its timer thread
#[derive(Debug, Clone, Copy)]
enum TimerCommand {
    /// Restart the countdown
    Reschedule,
    /// Exit the loop
    Shutdown,
}

/// Handle to the running timer thread
pub(crate) struct SyncTimer {
    control: Sender<TimerCommand>,
    thread: JoinHandle<()>,
}

impl SyncTimer {
    /// Spawn the timer thread
    ///
    /// The thread only holds a weak reference, so it never keeps the WAL alive.
    pub(crate) fn spawn(target: Weak<Shared>, interval: Duration) -> Result<Self> {
        // One pending reschedule is as good as many
        let (control, commands) = channel::bounded(1);

        let thread = thread::Builder::new()
            .name("segwal-sync".into())
            .spawn(move || run(target, commands, interval))
            .map_err(|e| WalError::Timer(format!("failed to spawn sync timer: {}", e)))?;

        Ok(Self { control, thread })
    }

    /// Push the next automatic sync a full interval into the future
    pub(crate) fn reschedule(&self) {
        // Full: a reschedule is already pending
        let _ = self.control.try_send(TimerCommand::Reschedule);
    }

    /// Stop the thread and wait for any in-flight sync to finish
    pub(crate) fn stop(self) -> Result<()> {
        // A disconnected channel also ends the loop, so the send result is irrelevant
        let _ = self.control.send(TimerCommand::Shutdown);
        drop(self.control);
        self.thread
            .join()
            .map_err(|_| WalError::Timer("sync timer thread panicked".to_string()))
    }
}

/// Why the timer thread woke up
enum Wakeup {
    Rescheduled,
    Elapsed,
    Stop,
}

/// Timer loop body
fn run(target: Weak<Shared>, commands: Receiver<TimerCommand>, interval: Duration) {
    debug!(?interval, "sync timer started");

    loop {
        let wakeup = crossbeam::select! {
            recv(commands) -> command => match command {
                Ok(TimerCommand::Reschedule) => Wakeup::Rescheduled,
                Ok(TimerCommand::Shutdown) | Err(_) => Wakeup::Stop,
            },
            default(interval) => Wakeup::Elapsed,
        };

        match wakeup {
            Wakeup::Rescheduled => continue,
            Wakeup::Stop => break,
            Wakeup::Elapsed => {}
        }

        let Some(shared) = target.upgrade() else {
            break;
        };

        // Same lock as append: a tick never interleaves with a write
        let mut inner = shared.inner.lock();
        if inner.state != WalState::Running {
            break;
        }
        match shared.sync_locked(&mut inner) {
            Ok(()) => debug!("periodic sync"),
            Err(e) => warn!(error = %e, "periodic sync failed"),
        }
        #[cfg(test)]
        shared.ticks.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    debug!("sync timer stopped");
}

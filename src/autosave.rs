use std::{future::Future, sync::Arc, time::Duration};

use color_eyre::{Result, eyre::WrapErr};
use strum::Display;
use tokio::sync::{
    mpsc::{self, UnboundedSender},
    oneshot, watch,
};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

mod machine;
mod runner;

use crate::config::AutoSaveConfig;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum AutoSaveStatus {
    #[default]
    Idle,
    Saving,
    Saved,
}

/// The asynchronous save behind an [AutoSave]. Errors are logged and swallowed there.
pub trait Saver<T>: Send + Sync + 'static {
    fn save(&self, value: T) -> impl Future<Output = Result<()>> + Send;
}

enum Command<T> {
    Trigger(T),
    /// Answered once nothing is pending and no save is running.
    Flush(Option<oneshot::Sender<()>>),
    Cancel,
}

/// Coalesces rapid edits into one delayed save and reports progress as [AutoSaveStatus].
///
/// At most one save runs at a time. A debounce that elapses while a save is still running
/// is held back, and the value goes out as soon as that save finishes.
/// Dropping the handle stops the timers; a save that is already running completes in the
/// background and its result is ignored.
pub struct AutoSave<T> {
    cmd_tx: UnboundedSender<Command<T>>,
    status_rx: watch::Receiver<AutoSaveStatus>,
    _stop: DropGuard,
}

impl<T: Send + 'static> AutoSave<T> {
    pub fn spawn<S: Saver<T>>(saver: Arc<S>, config: &AutoSaveConfig) -> Self {
        Self::with_delays(saver, config.debounce, config.saved_display)
    }

    pub fn with_delays<S: Saver<T>>(saver: Arc<S>, debounce: Duration, saved_display: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(AutoSaveStatus::Idle);
        let token = CancellationToken::new();
        let runner = runner::Runner {
            saver,
            debounce,
            saved_display,
            cmd_rx,
            status_tx,
            token: token.clone(),
        };
        tokio::spawn(runner.run());
        Self {
            cmd_tx,
            status_rx,
            _stop: token.drop_guard(),
        }
    }

    /// Records `value` as the latest state and restarts the debounce window.
    pub fn trigger(&self, value: T) {
        self.send(Command::Trigger(value));
    }

    /// Saves the latest pending value right away, or as soon as the running save finishes.
    pub fn flush(&self) {
        self.send(Command::Flush(None));
    }

    /// Like [AutoSave::flush], but resolves only after the last value has been written
    /// (or the attempt failed) and nothing else is pending.
    pub async fn flush_and_wait(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(Command::Flush(Some(ack_tx)));
        ack_rx.await.wrap_err("auto-save stopped before the flush completed")
    }

    /// Forgets the pending value without saving it.
    pub fn cancel(&self) {
        self.send(Command::Cancel);
    }

    pub fn status(&self) -> watch::Receiver<AutoSaveStatus> {
        self.status_rx.clone()
    }

    fn send(&self, cmd: Command<T>) {
        if self.cmd_tx.send(cmd).is_err() {
            debug!("Auto-save runner already stopped");
        }
    }
}

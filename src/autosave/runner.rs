use std::{pin::Pin, sync::Arc, time::Duration};

use tokio::{
    select,
    sync::{
        mpsc::{self, UnboundedReceiver},
        oneshot, watch,
    },
    time::{Instant, Sleep, sleep_until},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{
    Command, Saver,
    machine::{Effect, Event, Machine},
    AutoSaveStatus,
};

type Timer = Option<Pin<Box<Sleep>>>;

pub(super) struct Runner<T, S> {
    pub saver: Arc<S>,
    pub debounce: Duration,
    pub saved_display: Duration,
    pub cmd_rx: UnboundedReceiver<Command<T>>,
    pub status_tx: watch::Sender<AutoSaveStatus>,
    pub token: CancellationToken,
}

impl<T, S> Runner<T, S>
where
    T: Send + 'static,
    S: Saver<T>,
{
    pub async fn run(mut self) {
        let mut machine = Machine::default();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<bool>();
        let mut debounce_timer: Timer = None;
        let mut revert_timer: Timer = None;
        let mut flush_waiters: Vec<oneshot::Sender<()>> = vec![];

        loop {
            let event = select! {
                biased;
                _ = self.token.cancelled() => {
                    debug!("Auto-save stopped, dropping any pending save");
                    return;
                }
                Some(ok) = done_rx.recv() => Event::SaveFinished { ok },
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Trigger(value)) => Event::Trigger(value),
                    Some(Command::Flush(ack)) => {
                        flush_waiters.extend(ack);
                        Event::Flush
                    }
                    Some(Command::Cancel) => Event::Cancel,
                    None => return,
                },
                _ = elapsed(&mut debounce_timer) => {
                    debounce_timer = None;
                    Event::DebounceElapsed
                }
                _ = elapsed(&mut revert_timer) => {
                    revert_timer = None;
                    Event::RevertElapsed
                }
            };

            for effect in machine.apply(event) {
                match effect {
                    Effect::ArmDebounce => debounce_timer = Some(timer(self.debounce)),
                    Effect::DisarmDebounce => debounce_timer = None,
                    Effect::ArmRevert => revert_timer = Some(timer(self.saved_display)),
                    Effect::DisarmRevert => revert_timer = None,
                    Effect::StartSave(value) => {
                        let saver = self.saver.clone();
                        let done_tx = done_tx.clone();
                        tokio::spawn(async move {
                            let ok = match saver.save(value).await {
                                Ok(()) => true,
                                Err(err) => {
                                    warn!("Auto-save failed, will retry on next edit: {err:?}");
                                    false
                                }
                            };
                            // nobody listening any more means the editor is gone
                            let _ = done_tx.send(ok);
                        });
                    }
                }
            }
            if machine.is_settled() {
                for waiter in flush_waiters.drain(..) {
                    let _ = waiter.send(());
                }
            }
            self.status_tx.send_if_modified(|status| {
                let changed = *status != machine.status();
                *status = machine.status();
                changed
            });
        }
    }
}

fn timer(after: Duration) -> Pin<Box<Sleep>> {
    Box::pin(sleep_until(Instant::now() + after))
}

async fn elapsed(timer: &mut Timer) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

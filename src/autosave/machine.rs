use tracing::trace;

use super::AutoSaveStatus;

#[derive(Debug)]
pub enum Event<T> {
    Trigger(T),
    Flush,
    Cancel,
    DebounceElapsed,
    SaveFinished { ok: bool },
    RevertElapsed,
}

/// What the driver has to do after an event. Timers are re-armed from scratch.
#[derive(Debug, PartialEq, Eq)]
pub enum Effect<T> {
    ArmDebounce,
    DisarmDebounce,
    StartSave(T),
    ArmRevert,
    DisarmRevert,
}

/// Debounce with an in-flight guard, plus the idle/saving/saved indicator on top.
///
/// Holds no timers or tasks itself, it only decides. See [super::runner] for the part
/// that owns the clock.
#[derive(Debug)]
pub struct Machine<T> {
    pending: Option<T>,
    debounce_armed: bool,
    in_flight: bool,
    revert_armed: bool,
    status: AutoSaveStatus,
}

impl<T> Default for Machine<T> {
    fn default() -> Self {
        Self {
            pending: None,
            debounce_armed: false,
            in_flight: false,
            revert_armed: false,
            status: AutoSaveStatus::Idle,
        }
    }
}

impl<T> Machine<T> {
    pub fn status(&self) -> AutoSaveStatus {
        self.status
    }

    /// Nothing waits to be saved and no save is running.
    pub fn is_settled(&self) -> bool {
        self.pending.is_none() && !self.in_flight
    }

    pub fn apply(&mut self, event: Event<T>) -> Vec<Effect<T>> {
        match event {
            Event::Trigger(value) => {
                self.pending = Some(value);
                self.debounce_armed = true;
                self.status = AutoSaveStatus::Saving;
                let mut effects = vec![Effect::ArmDebounce];
                if std::mem::take(&mut self.revert_armed) {
                    effects.push(Effect::DisarmRevert);
                }
                effects
            }
            Event::DebounceElapsed => {
                self.debounce_armed = false;
                self.start_pending().into_iter().collect()
            }
            Event::Flush => {
                let mut effects = vec![];
                if std::mem::take(&mut self.debounce_armed) {
                    effects.push(Effect::DisarmDebounce);
                }
                effects.extend(self.start_pending());
                effects
            }
            Event::Cancel => {
                self.pending = None;
                let mut effects = vec![];
                if std::mem::take(&mut self.debounce_armed) {
                    effects.push(Effect::DisarmDebounce);
                }
                if !self.in_flight && self.status == AutoSaveStatus::Saving {
                    self.status = AutoSaveStatus::Idle;
                }
                effects
            }
            Event::SaveFinished { ok } => {
                self.in_flight = false;
                if self.debounce_armed {
                    // a newer edit is already waiting, keep showing "saving"
                    return vec![];
                }
                if let Some(effect) = self.start_pending() {
                    // skipped or flushed while this save ran
                    return vec![effect];
                }
                if ok {
                    self.status = AutoSaveStatus::Saved;
                    self.revert_armed = true;
                    vec![Effect::ArmRevert]
                } else {
                    self.status = AutoSaveStatus::Idle;
                    vec![]
                }
            }
            Event::RevertElapsed => {
                self.revert_armed = false;
                if self.status == AutoSaveStatus::Saved {
                    self.status = AutoSaveStatus::Idle;
                }
                vec![]
            }
        }
    }

    fn start_pending(&mut self) -> Option<Effect<T>> {
        if self.in_flight {
            trace!("Save still in flight, skipping this attempt");
            return None;
        }
        let value = self.pending.take()?;
        self.in_flight = true;
        Some(Effect::StartSave(value))
    }
}

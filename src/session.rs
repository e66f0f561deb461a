//! Popup lifecycle and the single-request busy gate.
//!
//! `Session` lives on the UI thread and is the only writer of the popup.
//! Workers see two things: the `BusyGuard` they were handed and the
//! `ActivePopup` generation counter they use to notice they were superseded.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Identifies one popup instance. Never reused within a process.
pub type Generation = u64;

const NO_POPUP: Generation = 0;

#[derive(Clone, Default)]
pub struct BusyFlag(Arc<AtomicBool>);

impl BusyFlag {
    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn try_acquire(&self) -> Option<BusyGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(Arc::clone(&self.0)))
    }
}

/// Held by the one in-flight worker. Dropping it clears the busy flag,
/// including on early return and panic unwind.
pub struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Generation of the popup currently on screen, readable from any thread.
#[derive(Clone, Default)]
pub struct ActivePopup(Arc<AtomicU64>);

impl ActivePopup {
    pub fn is_current(&self, generation: Generation) -> bool {
        generation != NO_POPUP && self.0.load(Ordering::Acquire) == generation
    }

    fn set(&self, generation: Generation) {
        self.0.store(generation, Ordering::Release);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopupStatus {
    Editing,
    Translating,
    Failed(String),
}

#[derive(Debug)]
pub struct Popup {
    generation: Generation,
    pub buffer: String,
    status: PopupStatus,
}

impl Popup {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn status(&self) -> &PopupStatus {
        &self.status
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Closed,
    Open,
    Submitting,
}

/// A trimmed submission plus the busy slot it occupies.
pub struct Job {
    pub generation: Generation,
    pub text: String,
    pub guard: BusyGuard,
}

pub enum SubmitOutcome {
    Started(Job),
    NoPopup,
    Busy,
    Empty,
}

#[derive(Default)]
pub struct Session {
    popup: Option<Popup>,
    busy: BusyFlag,
    active: ActivePopup,
    last_generation: Generation,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn busy(&self) -> BusyFlag {
        self.busy.clone()
    }

    pub fn active(&self) -> ActivePopup {
        self.active.clone()
    }

    pub fn popup(&self) -> Option<&Popup> {
        self.popup.as_ref()
    }

    pub fn popup_mut(&mut self) -> Option<&mut Popup> {
        self.popup.as_mut()
    }

    pub fn is_open(&self) -> bool {
        self.popup.is_some()
    }

    pub fn phase(&self) -> Phase {
        match &self.popup {
            None => Phase::Closed,
            Some(p) if p.status == PopupStatus::Translating => Phase::Submitting,
            Some(_) => Phase::Open,
        }
    }

    /// Destroys any open popup and opens an empty one.
    pub fn open(&mut self) -> Generation {
        if let Some(old) = self.popup.take() {
            info!("Replacing popup #{}", old.generation);
        }
        self.last_generation += 1;
        let generation = self.last_generation;
        self.popup = Some(Popup {
            generation,
            buffer: String::new(),
            status: PopupStatus::Editing,
        });
        self.active.set(generation);
        info!("Popup #{} opened", generation);
        generation
    }

    /// Dismisses the popup. An in-flight worker keeps running but its result is discarded.
    pub fn cancel(&mut self) -> bool {
        match self.popup.take() {
            Some(p) => {
                self.active.set(NO_POPUP);
                info!("Popup #{} cancelled", p.generation);
                true
            }
            None => false,
        }
    }

    /// Trims the buffer and claims the busy slot. The buffer is left intact.
    pub fn submit(&mut self) -> SubmitOutcome {
        let Some(popup) = self.popup.as_mut() else {
            return SubmitOutcome::NoPopup;
        };
        if self.busy.is_busy() {
            debug!("Submit ignored: translation already in flight");
            return SubmitOutcome::Busy;
        }
        let text = popup.buffer.trim();
        if text.is_empty() {
            debug!("Submit ignored: empty input");
            return SubmitOutcome::Empty;
        }
        let Some(guard) = self.busy.try_acquire() else {
            return SubmitOutcome::Busy;
        };
        popup.status = PopupStatus::Translating;
        SubmitOutcome::Started(Job {
            generation: popup.generation,
            text: text.to_string(),
            guard,
        })
    }

    /// Inserts a newline at a char index (clamped to the end). Returns the cursor after it.
    pub fn insert_newline(&mut self, char_index: usize) -> Option<usize> {
        let popup = self.popup.as_mut()?;
        let byte = popup
            .buffer
            .char_indices()
            .nth(char_index)
            .map_or(popup.buffer.len(), |(i, _)| i);
        popup.buffer.insert(byte, '\n');
        Some(popup.buffer[..byte].chars().count() + 1)
    }

    /// Characters in the trimmed buffer.
    pub fn char_count(&self) -> usize {
        self.popup
            .as_ref()
            .map_or(0, |p| p.buffer.trim().chars().count())
    }

    /// Worker delivered `generation`; close it if it is still the live popup.
    pub fn finish(&mut self, generation: Generation) -> bool {
        if self.popup.as_ref().map(Popup::generation) != Some(generation) {
            debug!("Finish for stale popup #{}", generation);
            return false;
        }
        self.popup = None;
        self.active.set(NO_POPUP);
        info!("Popup #{} closed after translation", generation);
        true
    }

    /// Keeps the popup and its text so the user can retry.
    pub fn fail(&mut self, generation: Generation, message: String) -> bool {
        match self.popup.as_mut() {
            Some(p) if p.generation == generation => {
                p.status = PopupStatus::Failed(message);
                true
            }
            _ => false,
        }
    }
}

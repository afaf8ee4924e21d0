//! Mode controllers: the loop player, the metronome and the tuner.
//!
//! Each controller owns the authoritative copy of its derived state and is
//! the only piece that talks to a sink or a source. Consumers either poll
//! the accessors or subscribe to a channel of update events.

pub mod looper;
pub mod metronome;
pub mod tuner;

#[cfg(test)]
pub(crate) mod testing;

use crate::pacemaker::Pacemaker;
use crossbeam_channel::Sender;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub use looper::{AudioLoop, LoopPlayer, LoopUpdate};
pub use metronome::{Metronome, MetronomeUpdate};
pub use tuner::{Tuner, TunerReading, TunerUpdate, TuningMode};

/// Whether a controller is doing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ModeState {
    #[default]
    Idle,
    Active,
}

/// What the periodic driver needs from a controller.
pub trait ModeController: Send {
    fn name(&self) -> &'static str;

    fn state(&self) -> ModeState;

    /// Idle -> Active or Active -> Idle.
    fn toggle(&mut self);

    /// Processes whatever became due since the last call.
    fn update(&mut self);

    fn is_active(&self) -> bool {
        self.state() == ModeState::Active
    }
}

/// Calls `update` on a shared controller every `interval`.
///
/// The controller lives behind a mutex so input handlers and the driver
/// take turns: a `stop` made under the lock is seen by the very next frame.
pub fn drive<T>(controller: Arc<Mutex<T>>, interval: Duration) -> std::io::Result<Pacemaker>
where
    T: ModeController + 'static,
{
    let name = controller
        .lock()
        .map(|c| c.name())
        .unwrap_or("controller");
    Pacemaker::spawn(name, interval, move || {
        let mut controller = controller.lock().unwrap_or_else(|e| e.into_inner());
        controller.update();
    })
}

/// Sends `update` to the listener, forgetting it once it hangs up.
fn publish<T>(listener: &mut Option<Sender<T>>, update: T) {
    if let Some(tx) = listener {
        if tx.send(update).is_err() {
            log::debug!("update listener disconnected");
            *listener = None;
        }
    }
}

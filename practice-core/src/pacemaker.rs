//! # Pacemaker Module
//!
//! The periodic driver behind the controllers: a background thread that
//! calls a closure at a fixed rate (about 60 Hz for smooth phase updates)
//! until it is stopped.
//!
//! ## Architecture
//! - **Worker thread**: waits on a `crossbeam_channel::tick` and a shutdown
//!   channel with `select!`
//! - **Shutdown**: [`Pacemaker::stop`] signals the worker and joins it, so
//!   once it returns the closure will never run again

use crossbeam_channel::{Sender, select};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Default callback rate for phase updates.
pub const DEFAULT_FRAME_RATE_HZ: f64 = 60.0;

/// Interval between callbacks for a given rate, bounded to 1 ms..1 s.
pub fn frame_interval(rate_hz: f64) -> Duration {
    let rate = if rate_hz.is_finite() && rate_hz > 0.0 {
        rate_hz
    } else {
        DEFAULT_FRAME_RATE_HZ
    };
    Duration::from_secs_f64((1.0 / rate).clamp(0.001, 1.0))
}

/// Handle to a running periodic worker.
#[derive(Debug)]
pub struct Pacemaker {
    shutdown_tx: Sender<()>,
    thread_handle: Option<JoinHandle<()>>,
}

impl Pacemaker {
    /// Spawns a worker that calls `on_frame` every `interval`.
    pub fn spawn<F>(name: &str, interval: Duration, mut on_frame: F) -> std::io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let ticker = crossbeam_channel::tick(interval);
        let thread_name = name.to_string();

        let thread_handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                log::debug!("[{thread_name}] pacemaker running every {interval:?}");
                loop {
                    select! {
                        recv(shutdown_rx) -> _ => break,
                        recv(ticker) -> _ => on_frame(),
                    }
                }
                log::debug!("[{thread_name}] pacemaker finished");
            })?;

        Ok(Self {
            shutdown_tx,
            thread_handle: Some(thread_handle),
        })
    }

    /// Stops the worker and waits for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            let _ = self.shutdown_tx.send(());
            if handle.join().is_err() {
                log::error!("pacemaker thread panicked");
            }
        }
    }
}

impl Drop for Pacemaker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

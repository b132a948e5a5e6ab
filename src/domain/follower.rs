//! Background refresh loop for a [`BarSeries`].

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::bar_series::BarSeries;
use super::error::RciTraderError;

/// Time left until the next tick of a loop started `elapsed` ago.
///
/// Ticks sit on multiples of `interval` from the start, so a slow refresh
/// shortens the following wait instead of pushing every later tick back.
pub fn time_to_next_tick(elapsed: Duration, interval: Duration) -> Duration {
    let interval_nanos = interval.as_nanos();
    if interval_nanos == 0 {
        return Duration::ZERO;
    }
    let into_tick = elapsed.as_nanos() % interval_nanos;
    let remaining = interval_nanos - into_tick;
    Duration::from_nanos(remaining as u64)
}

/// Handle to a running follower thread. Dropping it stops the thread.
pub struct Follower {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Follower {
    pub fn spawn(series: Arc<BarSeries>, interval: Duration) -> Result<Self, RciTraderError> {
        if interval.is_zero() {
            return Err(RciTraderError::invalid_parameter(
                "refresh_interval",
                "must be positive",
            ));
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let name = format!("follow-{}", series.key());
        let handle = thread::Builder::new().name(name).spawn(move || {
            info!(series = %series.key(), ?interval, "follower started");
            let started = Instant::now();
            loop {
                if let Err(e) = series.refresh() {
                    warn!(series = %series.key(), error = %e, "background refresh failed");
                }

                let wait = time_to_next_tick(started.elapsed(), interval);
                match stop_rx.recv_timeout(wait) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            info!(series = %series.key(), "follower stopped");
        })?;

        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Signal the thread and wait for it to finish its current refresh.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("follower thread panicked");
            }
        }
    }
}

impl Drop for Follower {
    fn drop(&mut self) {
        self.shutdown();
    }
}

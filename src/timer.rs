// timer.rs — Wall-clock stopwatch for stage timings.
//
// Observational only: nothing in the pipeline branches on a measured time.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default)]
pub struct Stopwatch {
    started: Option<Instant>,
    elapsed: Duration,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// A stopwatch that is already running.
    pub fn started() -> Self {
        let mut sw = Self::new();
        sw.start();
        sw
    }

    /// Start (or restart) timing. Any previous reading is discarded.
    pub fn start(&mut self) {
        self.elapsed = Duration::ZERO;
        self.started = Some(Instant::now());
    }

    /// Stop timing and return the elapsed time. Stopping a stopwatch that is
    /// not running returns the last reading.
    pub fn stop(&mut self) -> Duration {
        if let Some(t0) = self.started.take() {
            self.elapsed = t0.elapsed();
        }
        self.elapsed
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    /// Time so far if running, else the last reading.
    pub fn elapsed(&self) -> Duration {
        match self.started {
            Some(t0) => t0.elapsed(),
            None => self.elapsed,
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1e3
    }
}

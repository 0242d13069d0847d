//! Wall-clock timing helpers for benchmarking inference.

use std::time::{Duration, Instant};
use thiserror::Error;

/// Invalid stopwatch state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StopwatchError {
    #[error("Stopwatch is already running")]
    AlreadyRunning,

    #[error("Stopwatch is not running")]
    NotRunning,

    #[error("Stopwatch is not paused")]
    NotPaused,
}

#[derive(Debug, Clone, Copy)]
enum State {
    Idle,
    Running(Instant),
    Paused,
}

/// Accumulating stopwatch on a monotonic clock.
///
/// `start` begins a lap, `stop` ends it and adds it to the total. A running
/// stopwatch can be paused and resumed; `stop` on a paused stopwatch is an
/// error.
#[derive(Debug, Clone)]
pub struct Stopwatch {
    state: State,
    accumulated: Duration,
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Stopwatch {
    /// A stopped stopwatch with zero elapsed time.
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            accumulated: Duration::ZERO,
        }
    }

    /// A stopwatch that is already running.
    pub fn started() -> Self {
        Self {
            state: State::Running(Instant::now()),
            accumulated: Duration::ZERO,
        }
    }

    pub fn start(&mut self) -> Result<(), StopwatchError> {
        match self.state {
            State::Idle => {
                self.state = State::Running(Instant::now());
                Ok(())
            }
            State::Running(_) | State::Paused => Err(StopwatchError::AlreadyRunning),
        }
    }

    pub fn stop(&mut self) -> Result<(), StopwatchError> {
        match self.state {
            State::Running(since) => {
                self.accumulated += since.elapsed();
                self.state = State::Idle;
                Ok(())
            }
            State::Idle | State::Paused => Err(StopwatchError::NotRunning),
        }
    }

    pub fn pause(&mut self) -> Result<(), StopwatchError> {
        match self.state {
            State::Running(since) => {
                self.accumulated += since.elapsed();
                self.state = State::Paused;
                Ok(())
            }
            State::Idle | State::Paused => Err(StopwatchError::NotRunning),
        }
    }

    pub fn resume(&mut self) -> Result<(), StopwatchError> {
        match self.state {
            State::Paused => {
                self.state = State::Running(Instant::now());
                Ok(())
            }
            State::Idle | State::Running(_) => Err(StopwatchError::NotPaused),
        }
    }

    /// Stop and clear the accumulated time.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Running and not paused.
    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running(_))
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.state, State::Paused)
    }

    /// Total time, including the current lap if running.
    pub fn elapsed(&self) -> Duration {
        match self.state {
            State::Running(since) => self.accumulated + since.elapsed(),
            State::Idle | State::Paused => self.accumulated,
        }
    }
}

/// Logs how long a labelled scope took when dropped.
///
/// ```
/// # use statica_runtime::ScopedTimer;
/// {
///     let _timer = ScopedTimer::new("preprocess");
///     // ... work ...
/// } // logs "preprocess took N ms" at info level
/// ```
#[derive(Debug)]
pub struct ScopedTimer {
    label: String,
    start: Instant,
}

impl ScopedTimer {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        let ms = self.start.elapsed().as_secs_f64() * 1e3;
        tracing::info!("{} took {ms:.3} ms", self.label);
    }
}

//! Pomodoro countdown state machine and its one-second driver.
//!
//! # Invariants
//! - Remaining time never goes below zero.
//! - `Halfway` fires at most once per start, at half the session length.
//! - `Finished` fires when the countdown reaches zero and stops the timer.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Default session length (25 minutes).
pub const DEFAULT_SESSION_SECS: u32 = 1500;
/// Step used by the `+`/`-` controls (5 minutes).
pub const ADJUST_STEP_SECS: u32 = 300;
/// Tick period of the countdown driver.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Notable moments reported by [`PomodoroTimer::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Halfway,
    Finished,
}

/// Rejected custom session input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomTimeError {
    NotAPositiveInteger(String),
    TooLong(u32),
}

impl Display for CustomTimeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAPositiveInteger(value) => {
                write!(f, "custom time must be a positive number of minutes, got `{value}`")
            }
            Self::TooLong(minutes) => write!(f, "custom time of {minutes} minutes is too long"),
        }
    }
}

impl Error for CustomTimeError {}

/// Countdown state for one Pomodoro session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PomodoroTimer {
    remaining_secs: u32,
    session_secs: u32,
    running: bool,
    halfway_reported: bool,
}

impl Default for PomodoroTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl PomodoroTimer {
    pub fn new() -> Self {
        Self::with_remaining(DEFAULT_SESSION_SECS)
    }

    pub fn with_remaining(remaining_secs: u32) -> Self {
        Self {
            remaining_secs,
            session_secs: remaining_secs,
            running: false,
            halfway_reported: false,
        }
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Starts (or resumes) counting down from the current remaining time.
    pub fn start(&mut self) {
        self.running = true;
        self.halfway_reported = false;
        self.session_secs = self.remaining_secs;
    }

    /// Pauses without losing the remaining time.
    pub fn pause(&mut self) {
        self.running = false;
    }

    /// Stops and restores the default session length.
    pub fn reset(&mut self) {
        self.pause();
        self.remaining_secs = DEFAULT_SESSION_SECS;
        self.session_secs = DEFAULT_SESSION_SECS;
    }

    pub fn increment(&mut self) {
        self.remaining_secs = self.remaining_secs.saturating_add(ADJUST_STEP_SECS);
    }

    pub fn decrement(&mut self) {
        self.remaining_secs = self.remaining_secs.saturating_sub(ADJUST_STEP_SECS);
    }

    /// Sets the remaining time from user-entered minutes.
    ///
    /// Leaves the timer untouched when the input is rejected.
    pub fn set_custom_minutes(&mut self, input: &str) -> Result<(), CustomTimeError> {
        let trimmed = input.trim();
        let minutes = trimmed
            .parse::<u32>()
            .ok()
            .filter(|minutes| *minutes > 0)
            .ok_or_else(|| CustomTimeError::NotAPositiveInteger(trimmed.to_string()))?;
        let secs = minutes
            .checked_mul(60)
            .ok_or(CustomTimeError::TooLong(minutes))?;
        self.remaining_secs = secs;
        Ok(())
    }

    /// Advances the countdown by one second.
    pub fn tick(&mut self) -> Option<TimerEvent> {
        if !self.running {
            return None;
        }
        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        if self.remaining_secs == 0 {
            self.running = false;
            return Some(TimerEvent::Finished);
        }
        if !self.halfway_reported && self.remaining_secs == self.session_secs / 2 {
            self.halfway_reported = true;
            return Some(TimerEvent::Halfway);
        }
        None
    }

    /// Remaining time as `m:ss`.
    pub fn clock(&self) -> String {
        format_clock(self.remaining_secs)
    }
}

/// Formats seconds as `m:ss` (`25:00`, `4:05`).
pub fn format_clock(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Drives a started timer with one tick per `period` until it stops.
///
/// Returns immediately when the timer is not running. Dropping the future
/// cancels the countdown and leaves the timer at its last ticked value.
pub async fn run_countdown(
    timer: &mut PomodoroTimer,
    period: Duration,
    mut on_event: impl FnMut(TimerEvent),
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    while timer.is_running() {
        ticker.tick().await;
        if let Some(event) = timer.tick() {
            on_event(event);
        }
    }
}

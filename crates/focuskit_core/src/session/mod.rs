//! Study-session helpers that run beside the broker.

pub mod pomodoro;

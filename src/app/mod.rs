//! Terminal front-end: owns the queue and plays the controlling task.

pub(crate) mod input;
pub(crate) mod progress_manager;
pub(crate) mod runtime;
pub(crate) mod terminal;

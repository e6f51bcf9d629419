// SPDX-License-Identifier: Apache-2.0

use core::fmt;

/// Error values returned by the public scheduler operations.
///
/// Success is represented by `Ok(())` on the `Result` the operations return,
/// not by a variant here (there is no `Ok`/`Success` member).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerError {
    /// A semantic constraint failed (unknown timer type, zero duration, ...).
    InvalidParam,
    /// The operation was attempted before [`crate::Scheduler::init`] succeeded.
    InvalidState,
    /// The hardware abstraction's own `init()` reported failure.
    Error,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::InvalidParam => "semantic constraint violated",
            Self::InvalidState => "scheduler not initialized",
            Self::Error => "hardware abstraction init failed",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for SchedulerError {}

// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), no_std)]
#![doc = include_str!("../README.md")]

//! `tickmux` multiplexes any number of logical one-shot or repeating timers
//! onto a single wrap-capable hardware counter that can interrupt when it
//! reaches a programmed target.
//!
//! The crate has no required dependency on any particular piece of hardware:
//! callers implement [`hal::HardwareTimer`] for whatever counter peripheral
//! they have, and hand it to [`Scheduler::new`]. A reference implementation
//! for Cortex-M SysTick is provided behind the `cortex-m` feature
//! ([`cortex_m_ha`]), and an `embassy_time_driver::Driver` adapter is
//! provided behind the `embassy-time-driver` feature ([`embassy_driver`]).
//!
//! See [`Scheduler`] for the public operations: `create`, `start`, `stop`,
//! `is_active`, and the interrupt-context entry point
//! [`Scheduler::target_count_reached`].

mod error;
mod hal;
mod list;
mod record;
mod scheduler;
mod stats;

#[cfg(feature = "cortex-m")]
pub mod cortex_m_ha;

#[cfg(feature = "embassy-time-driver")]
pub mod embassy_driver;

pub use error::SchedulerError;
pub use hal::{HardwareTimer, StatusToken};
pub use record::{HandlerFn, Timer, TimerType};
pub use scheduler::Scheduler;
pub use stats::Stats;

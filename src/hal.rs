// SPDX-License-Identifier: Apache-2.0

//! The Hardware Abstraction (HA) contract the scheduler core is built
//! against. Nothing in this module talks to real hardware; concrete
//! adapters live in [`crate::cortex_m_ha`] and [`crate::embassy_driver`],
//! or in the embedding program.

/// Opaque token threaded through a single `set_interrupts(false, ..)` /
/// `set_interrupts(true, ..)` pair.
///
/// The scheduler never inspects the value. Adapters on architectures with
/// nestable interrupt-priority masking (e.g. `PRIMASK` on Cortex-M) use it
/// to save state on disable and restore the same state on enable.
#[derive(Default)]
pub struct StatusToken(pub(crate) u32);

/// The hardware abstraction a [`crate::Scheduler`] is built against.
///
/// Tick width is fixed to `u32` and the running-clock width to `u64`. An
/// adapter for a 16-bit counter simply reports a `max_count()` at or below
/// `0xFFFF` and widens its raw reads to `u32`.
pub trait HardwareTimer {
    /// One-time hardware initialization. Returns `false` on failure.
    fn init(&mut self) -> bool;

    /// Converts a caller-facing duration (in whatever unit the embedding
    /// program uses, milliseconds is the common case) to counter ticks.
    fn units_to_ticks(&self, duration: u64) -> u64;

    /// Current raw counter value. May increase monotonically toward
    /// `max_count()` or wrap at a hardware-defined boundary; both are
    /// valid as long as they're consistent for a given adapter.
    fn read(&self) -> u32;

    /// Programs the counter to raise the next `target_count_reached` event
    /// after `counts` more ticks. Always called with `counts <= max_count()`.
    fn set_target(&mut self, counts: u32);

    /// Starts or stops the counter.
    fn set_running(&mut self, on: bool);

    /// Masks or unmasks whatever interrupt(s) must be suppressed for
    /// scheduler state changes to be atomic. `token` is reused, paired,
    /// within a single disable/enable span.
    fn set_interrupts(&mut self, on: bool, token: &mut StatusToken);

    /// Largest legal argument to [`Self::set_target`].
    fn max_count(&self) -> u32;
}

//! Sleep timer service consumed by the power manager.
//!
//! The power manager only needs two things from the timer subsystem: how long until the
//! next timer that needs the high-frequency clock expires, and a one-shot timer of its own
//! to start the oscillator ahead of that deadline. [`TimerService`] is that contract;
//! [`SleepTimer`] is a tick-driven implementation of it.

mod queue;
pub use queue::SleepTimer;

use core::ops;

use crate::energy_mode::Ticks;
use crate::Error;

/// Identifies a timer. Chosen by the owner of the timer, like a timer handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerId(pub u16);

/// Id of the power manager's early-wakeup timer. Reserved.
pub const EARLY_WAKEUP_TIMER: TimerId = TimerId(u16::MAX);

/// Timer option flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerFlags(u8);

impl TimerFlags {
    pub const NONE: TimerFlags = TimerFlags(0);
    /// The callback does not need the high-frequency clock.
    pub const NO_HF_CLOCK_REQUIRED: TimerFlags = TimerFlags(1 << 0);
    /// The power manager's own early-wakeup timer.
    pub const EARLY_WAKEUP: TimerFlags = TimerFlags(1 << 1);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn union(self, other: TimerFlags) -> Self {
        TimerFlags(self.0 | other.0)
    }

    pub const fn intersects(self, other: TimerFlags) -> bool {
        self.0 & other.0 != 0
    }
}

impl ops::BitOr for TimerFlags {
    type Output = TimerFlags;
    fn bitor(self, rhs: TimerFlags) -> Self::Output {
        self.union(rhs)
    }
}

/// Timer operations the power manager relies on.
pub trait TimerService {
    /// Ticks until the first running timer that has none of the `exclude` flags expires.
    /// `None` if there is no such timer.
    fn remaining_ticks_of_first_timer(&self, exclude: TimerFlags) -> Option<Ticks>;

    /// Start, or restart, one-shot timer `id` to expire in `delay` ticks.
    ///
    /// When it expires, the platform's timer interrupt must call
    /// [`PowerManager::on_wakeup_timer_expired`](crate::PowerManager::on_wakeup_timer_expired)
    /// for the power manager's timer.
    ///
    /// Returns [`Error::TimersFull`] if there is no room for a new timer. The power
    /// manager then keeps the high-frequency clock running instead of sleeping deep.
    fn start_one_shot(
        &mut self,
        id: TimerId,
        delay: Ticks,
        flags: TimerFlags,
    ) -> Result<(), Error>;

    /// Stop timer `id`. Stopping a timer that is not running does nothing.
    fn stop(&mut self, id: TimerId);
}

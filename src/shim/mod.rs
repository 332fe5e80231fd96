//! Platform interfaces consumed by the power manager.
//!
//! [`HardwareShim`] is implemented once per silicon family: it owns the sleep
//! instruction and the save/restore of the high-frequency clock tree. [`SleepHooks`] is
//! the application (or RTOS) veto on sleeping.
//!
//! Both are injected into [`PowerManager::new`](crate::PowerManager::new) and called with
//! `&self`, from inside and outside the power manager's critical section.

#[cfg(feature = "cortex-m")]
pub mod cortex_m;

use crate::energy_mode::{EnergyMode, Ticks};

/// Silicon-family specific sleep and clock operations.
///
/// Only [`apply_em`](Self::apply_em) and
/// [`convert_delay_us_to_tick`](Self::convert_delay_us_to_tick) are mandatory. The
/// defaults describe a platform without deep sleep: nothing to save, the clock is always
/// ready and waking up costs nothing.
pub trait HardwareShim {
    /// One-time hardware setup, called from [`PowerManager::init`](crate::PowerManager::init).
    fn init(&self) {}

    /// Put the CPU into `mode`. Returns once an interrupt wakes it up.
    ///
    /// Called with interrupts masked; a pending interrupt must still end the sleep.
    /// Applying a mode the platform does not support is a fault.
    fn apply_em(&self, mode: EnergyMode);

    /// Snapshot the high-frequency clock selection and voltage scaling before deep sleep.
    fn save_states(&self) {}

    /// Bring back the state captured by [`save_states`](Self::save_states).
    fn restore_states(&self) {}

    /// Last operations before entering EM2/EM3, such as switching the system clock to a
    /// low-frequency source.
    fn handle_pre_deepsleep_operations(&self) {}

    /// Start the high-frequency oscillator. Must not block.
    fn restore_high_freq_accuracy_clk(&self) {}

    /// Whether the high-frequency oscillator is ready. With `wait`, block until it is.
    fn is_high_freq_accuracy_clk_ready(&self, wait: bool) -> bool {
        let _ = wait;
        true
    }

    /// Time needed to restore the clock tree after a deep sleep.
    fn get_wakeup_process_time_overhead(&self) -> Ticks {
        0
    }

    fn convert_delay_us_to_tick(&self, us: u32) -> Ticks;

    /// Below this time to the next timer, powering the oscillator down is not worth it.
    fn get_default_high_frequency_minimum_offtime(&self) -> Ticks {
        0
    }
}

/// Application hooks consulted by [`PowerManager::sleep`](crate::PowerManager::sleep).
///
/// Hooks must not call back into the power manager.
pub trait SleepHooks {
    /// Checked once before sleeping. Returning `false` skips the sleep entirely.
    fn is_ok_to_sleep(&self) -> bool {
        true
    }

    /// Checked after every wakeup. Returning `true` goes back to sleep without returning
    /// to the caller of `sleep()`.
    fn sleep_on_isr_exit(&self) -> bool {
        false
    }
}

/// Hooks that always allow sleeping and always return to the application on wakeup.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveHooks;

impl SleepHooks for PermissiveHooks {}

/// Convert microseconds to ticks of a `tick_hz` clock, rounding up.
pub const fn us_to_ticks(us: u32, tick_hz: u32) -> Ticks {
    let ticks = (us as u64 * tick_hz as u64).div_ceil(1_000_000);
    if ticks > Ticks::MAX as u64 {
        Ticks::MAX
    } else {
        ticks as Ticks
    }
}

//! Power manager configuration.

use crate::energy_mode::{EnergyMode, Ticks};

cfg_if::cfg_if! {
    if #[cfg(feature = "lowest-em1")] {
        /// Deepest energy mode the system may enter, selected by cargo feature.
        pub const LOWEST_EM_ALLOWED: EnergyMode = EnergyMode::Em1;
    } else if #[cfg(feature = "lowest-em2")] {
        /// Deepest energy mode the system may enter, selected by cargo feature.
        pub const LOWEST_EM_ALLOWED: EnergyMode = EnergyMode::Em2;
    } else {
        /// Deepest energy mode the system may enter, selected by cargo feature.
        pub const LOWEST_EM_ALLOWED: EnergyMode = EnergyMode::Em3;
    }
}

/// Maximum number of transition subscriptions.
pub const SUBSCRIBER_CAPACITY: usize = 16;

/// Size of the requirement owner pool.
pub const OWNER_POOL_SIZE: usize = 10;

/// Configuration passed to [`PowerManager::new`](crate::PowerManager::new).
///
/// Defaults:
/// - deepest mode: [`LOWEST_EM_ALLOWED`]
/// - wakeup overhead correction: 0 ticks
/// - minimum off-time: the shim's default, read at `init()`
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Deepest energy mode the system may enter. Must be EM1, EM2 or EM3.
    pub lowest_em_allowed: EnergyMode,
    /// Signed correction, in ticks, added to the shim's wakeup process overhead.
    pub wakeup_overhead_correction: i32,
    /// Below this time to the next timer, stay in EM1. `None` uses
    /// [`HardwareShim::get_default_high_frequency_minimum_offtime`](crate::HardwareShim::get_default_high_frequency_minimum_offtime).
    pub minimum_offtime: Option<Ticks>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub const fn new() -> Self {
        Self {
            lowest_em_allowed: LOWEST_EM_ALLOWED,
            wakeup_overhead_correction: 0,
            minimum_offtime: None,
        }
    }

    pub const fn with_lowest_em_allowed(mut self, mode: EnergyMode) -> Self {
        self.lowest_em_allowed = mode;
        self
    }

    pub const fn with_wakeup_overhead_correction(mut self, ticks: i32) -> Self {
        self.wakeup_overhead_correction = ticks;
        self
    }

    pub const fn with_minimum_offtime(mut self, ticks: Ticks) -> Self {
        self.minimum_offtime = Some(ticks);
        self
    }

    /// Validate the configuration.
    ///
    /// Evaluate it in a const context to turn a bad configuration into a build error:
    ///
    /// ```rust
    /// use em_power_manager::{Config, EnergyMode};
    ///
    /// const CONFIG: Config = Config::new()
    ///     .with_lowest_em_allowed(EnergyMode::Em2)
    ///     .check();
    /// ```
    pub const fn check(self) -> Self {
        if !self.lowest_em_allowed.is_requirable() {
            ::core::panic!("lowest_em_allowed must be EM1, EM2 or EM3");
        }
        self
    }

    pub(crate) const fn is_valid(&self) -> bool {
        self.lowest_em_allowed.is_requirable()
    }
}

/// Shim overhead plus the signed correction, floored at 0.
pub(crate) fn effective_overhead(shim_overhead: Ticks, correction: i32) -> Ticks {
    if correction >= 0 {
        shim_overhead.saturating_add(correction as Ticks)
    } else {
        shim_overhead.saturating_sub(correction.unsigned_abs())
    }
}

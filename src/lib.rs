#![cfg_attr(not(test), no_std)]
#![doc = include_str!("../README.md")]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod clock_restore;
pub mod config;
pub mod debug;
pub mod energy_mode;
mod manager;
pub mod notify;
pub mod requirement;
pub mod shim;
pub mod sleeptimer;

pub use clock_restore::ClockRestoreState;
pub use config::{Config, LOWEST_EM_ALLOWED, OWNER_POOL_SIZE, SUBSCRIBER_CAPACITY};
pub use debug::RequirementOwner;
pub use energy_mode::{EnergyMode, Events, Ticks};
pub use manager::PowerManager;
pub use notify::{SubscriptionHandle, TransitionCallback, TransitionSubscription};
pub use shim::{HardwareShim, PermissiveHooks, SleepHooks};
pub use sleeptimer::{SleepTimer, TimerFlags, TimerId, TimerService};

/// Power manager error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// `init()` was already called.
    AlreadyInitialized,
    /// The configured deepest mode is not EM1, EM2 or EM3.
    InvalidLowestEm,
    /// No free transition subscription slot.
    SubscriptionsFull,
    /// No free slot in the sleep timer queue.
    TimersFull,
}

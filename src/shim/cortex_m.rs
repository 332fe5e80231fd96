//! Cortex-M sleep helpers.
//!
//! [`wait_for_interrupt`] is the building block chip shims use in
//! [`HardwareShim::apply_em`]. [`SleepOnly`] is a complete shim for parts, or
//! configurations, that never go below EM1.

use super::{us_to_ticks, HardwareShim};
use crate::energy_mode::{EnergyMode, Ticks};

/// Enter sleep (`deep == false`) or deep sleep (`deep == true`) and wait for an interrupt.
///
/// Works with interrupts masked: a pending interrupt wakes the core, and is serviced once
/// the caller unmasks.
pub fn wait_for_interrupt(deep: bool) {
    let mut cp = unsafe { cortex_m::Peripherals::steal() };
    if deep {
        cp.SCB.set_sleepdeep();
    } else {
        cp.SCB.clear_sleepdeep();
    }
    cortex_m::asm::dsb();
    cortex_m::asm::wfi();
    cortex_m::asm::isb();
}

/// Shim for systems limited to EM1: every sleep is a plain `WFI`.
#[derive(Debug, Clone, Copy)]
pub struct SleepOnly {
    tick_hz: u32,
}

impl SleepOnly {
    /// `tick_hz` is the frequency of the sleep timer the manager's ticks refer to.
    pub const fn new(tick_hz: u32) -> Self {
        Self { tick_hz }
    }
}

impl HardwareShim for SleepOnly {
    fn apply_em(&self, mode: EnergyMode) {
        match mode {
            EnergyMode::Em1 => wait_for_interrupt(false),
            other => panic!("SleepOnly shim cannot apply {:?}", other),
        }
    }

    fn convert_delay_us_to_tick(&self, us: u32) -> Ticks {
        us_to_ticks(us, self.tick_hz)
    }
}

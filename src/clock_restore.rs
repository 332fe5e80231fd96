//! High-frequency clock restore state machine.
//!
//! ```text
//!            save()                 request()            try_complete() && ready
//! NotSaved ---------> Saved ----------------------+-------------------------------> NotSaved
//!                       ^   \                     |
//!                       |    +-> SleepingWhileWaiting   (async: CPU parked in EM1,
//!                       |    |                           ready ISR finishes)
//!                       |    +-> ActivelyWaiting        (sync: caller polls)
//!                       +--- park_deep() when the sleep loop goes deep again
//! ```
//!
//! Every completion path goes through [`ClockRestore::try_complete`], which is a no-op
//! once the state is back to `NotSaved`, so only one of them ever restores the registers.

use crate::energy_mode::EnergyMode;
use crate::shim::HardwareShim;

/// Where the high-frequency clock tree stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockRestoreState {
    /// Run-time clock tree active.
    NotSaved,
    /// Settings saved and clock tree torn down for deep sleep.
    Saved,
    /// A caller is polling for the oscillator to become ready.
    ActivelyWaiting,
    /// The oscillator was started; the CPU sleeps in EM1 until it is ready.
    SleepingWhileWaiting,
}

#[derive(Debug)]
pub(crate) struct ClockRestore {
    state: ClockRestoreState,
    /// Oscillator start requested since the last save.
    requested: bool,
    /// Deep mode being left, for the notification sent when the restore completes.
    leaving: EnergyMode,
}

impl ClockRestore {
    pub(crate) const fn new() -> Self {
        Self {
            state: ClockRestoreState::NotSaved,
            requested: false,
            leaving: EnergyMode::Em2,
        }
    }

    pub(crate) fn state(&self) -> ClockRestoreState {
        self.state
    }

    /// Whether the clock tree is torn down, whatever the progress of its restore.
    pub(crate) fn is_saved(&self) -> bool {
        self.state != ClockRestoreState::NotSaved
    }

    /// Save the hardware state and tear down the high-frequency clocks.
    pub(crate) fn save<H: HardwareShim>(&mut self, hal: &H) {
        debug_assert!(self.state == ClockRestoreState::NotSaved);
        trace!("clock: saving hf clock settings");
        hal.save_states();
        self.state = ClockRestoreState::Saved;
        self.requested = false;
    }

    /// Going back to deep sleep with a restore in flight: the pre-deepsleep operations
    /// stop the oscillator again, so the next restore starts from scratch.
    pub(crate) fn park_deep(&mut self) {
        if self.state == ClockRestoreState::SleepingWhileWaiting {
            self.state = ClockRestoreState::Saved;
            self.requested = false;
        }
    }

    /// Kick off the oscillator restore. Non-blocking, and only issued once per save.
    pub(crate) fn request<H: HardwareShim>(&mut self, hal: &H) {
        if self.is_saved() && !self.requested {
            trace!("clock: starting hf oscillator");
            hal.restore_high_freq_accuracy_clk();
            self.requested = true;
        }
    }

    /// Record that someone is waiting for the restore, leaving `from`.
    pub(crate) fn begin_wait(&mut self, state: ClockRestoreState, from: EnergyMode) {
        debug_assert!(matches!(
            state,
            ClockRestoreState::ActivelyWaiting | ClockRestoreState::SleepingWhileWaiting
        ));
        debug_assert!(self.is_saved());
        self.state = state;
        self.leaving = from;
    }

    /// Finish the restore if the oscillator is ready.
    ///
    /// Returns `true` if this call restored the registers. Returns `false` if the
    /// oscillator is not ready yet, or if the restore was already done.
    pub(crate) fn try_complete<H: HardwareShim>(&mut self, hal: &H) -> bool {
        if !self.is_saved() {
            return false;
        }
        self.request(hal);
        if !hal.is_high_freq_accuracy_clk_ready(false) {
            return false;
        }
        trace!("clock: restoring hf clock settings, leaving {:?}", self.leaving);
        hal.restore_states();
        self.state = ClockRestoreState::NotSaved;
        self.requested = false;
        true
    }
}

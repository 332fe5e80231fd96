//! The power manager.
//!
//! [`PowerManager`] owns the requirement table, the active energy mode, the clock restore
//! state and the transition subscribers. Everything lives behind one critical-section
//! mutex, so every method takes `&self` and is callable from interrupt context, except
//! [`sleep`](PowerManager::sleep) which belongs to the idle loop.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::{Deque, Vec};

use crate::clock_restore::{ClockRestore, ClockRestoreState};
use crate::config::{effective_overhead, Config, OWNER_POOL_SIZE, SUBSCRIBER_CAPACITY};
use crate::debug::{RequirementOwner, RequirementOwners};
use crate::energy_mode::{EnergyMode, Ticks};
use crate::notify::{
    SubscriptionHandle, TransitionCallback, TransitionRegistry, TransitionSubscription,
};
use crate::requirement::RequirementTable;
use crate::shim::{HardwareShim, PermissiveHooks, SleepHooks};
use crate::sleeptimer::{TimerFlags, TimerService, EARLY_WAKEUP_TIMER};
use crate::Error;


/// Transitions latched but not yet dispatched. A single state update makes at most two.
const PENDING_TRANSITIONS: usize = 4;

type Notification = (EnergyMode, EnergyMode, Vec<TransitionCallback, SUBSCRIBER_CAPACITY>);

struct State<T> {
    config: Config,
    initialized: bool,
    minimum_offtime: Ticks,
    requirements: RequirementTable,
    active: EnergyMode,
    restore: ClockRestore,
    registry: TransitionRegistry<SUBSCRIBER_CAPACITY>,
    pending: Deque<(EnergyMode, EnergyMode), PENDING_TRANSITIONS>,
    owners: RequirementOwners<OWNER_POOL_SIZE>,
    timer: T,
    /// EM1 requirement added by the scheduled-wakeup policy, dropped back in run mode.
    internal_em1: bool,
    wakeup_timer_armed: bool,
    latest_wakeup_internal: bool,
}

impl<T: TimerService> State<T> {
    const fn new(timer: T, config: Config) -> Self {
        Self {
            config,
            initialized: false,
            minimum_offtime: match config.minimum_offtime {
                Some(ticks) => ticks,
                None => 0,
            },
            requirements: RequirementTable::new(),
            active: EnergyMode::Em0,
            restore: ClockRestore::new(),
            registry: TransitionRegistry::new(),
            pending: Deque::new(),
            owners: RequirementOwners::new(),
            timer,
            internal_em1: false,
            wakeup_timer_armed: false,
            latest_wakeup_internal: false,
        }
    }

    fn lowest_allowed(&self) -> EnergyMode {
        self.requirements.lowest_allowed(self.config.lowest_em_allowed)
    }

    /// Latch `to` as the active mode and queue the notification.
    fn transition(&mut self, to: EnergyMode) {
        let from = self.active;
        if from == to {
            return;
        }
        debug!("em: {:?} -> {:?}", from, to);
        self.active = to;
        if self.pending.push_back((from, to)).is_err() {
            panic!("em: too many pending transitions");
        }
    }

    fn next_notification(&mut self) -> Option<Notification> {
        let (from, to) = self.pending.pop_front()?;
        Some((from, to, self.registry.subscribers_of(from, to)))
    }

    /// Notification owed once the clock tree is back while the active mode is still deep.
    fn restored_to_em1(&mut self) {
        if self.active.is_deep() {
            self.transition(EnergyMode::Em1);
        }
    }

    /// Start the oscillator and let the ready interrupt, or the sleep loop, finish.
    fn start_async_restore<H: HardwareShim>(&mut self, hal: &H) {
        if self.restore.try_complete(hal) {
            self.restored_to_em1();
        } else if self.restore.state() != ClockRestoreState::SleepingWhileWaiting {
            let from = self.active;
            self.restore.begin_wait(ClockRestoreState::SleepingWhileWaiting, from);
        }
    }

    /// Returns `true` if the caller has to poll for the oscillator.
    fn begin_sync_restore<H: HardwareShim>(&mut self, hal: &H) -> bool {
        if !self.active.is_deep() {
            return false;
        }
        if self.restore.is_saved() && !self.restore.try_complete(hal) {
            let from = self.active;
            self.restore.begin_wait(ClockRestoreState::ActivelyWaiting, from);
            return true;
        }
        self.restored_to_em1();
        false
    }

    fn finish_sync_restore<H: HardwareShim>(&mut self, hal: &H) -> bool {
        if self.restore.is_saved() && !self.restore.try_complete(hal) {
            return false;
        }
        self.restored_to_em1();
        true
    }

    /// Pick the sleep mode for this iteration, given the time to the next timer that
    /// needs the high-frequency clock.
    fn evaluate_wakeup<H: HardwareShim>(&mut self, hal: &H, mode: EnergyMode) -> EnergyMode {
        let exclude = TimerFlags::EARLY_WAKEUP | TimerFlags::NO_HF_CLOCK_REQUIRED;
        let Some(remaining) = self.timer.remaining_ticks_of_first_timer(exclude) else {
            return mode;
        };
        let overhead = effective_overhead(
            hal.get_wakeup_process_time_overhead(),
            self.config.wakeup_overhead_correction,
        );

        if remaining > self.minimum_offtime && remaining > overhead {
            let delay = remaining - overhead;
            match self
                .timer
                .start_one_shot(EARLY_WAKEUP_TIMER, delay, TimerFlags::EARLY_WAKEUP)
            {
                Ok(()) => {
                    trace!("wakeup: early wakeup in {} ticks", delay);
                    self.wakeup_timer_armed = true;
                    return mode;
                }
                Err(e) => warn!("wakeup: cannot arm early wakeup ({:?}), staying in EM1", e),
            }
        } else {
            trace!(
                "wakeup: timer in {} ticks, staying in EM1 (offtime {}, overhead {})",
                remaining,
                self.minimum_offtime,
                overhead
            );
        }

        if !self.internal_em1 {
            self.requirements.add(EnergyMode::Em1);
            self.internal_em1 = true;
        }
        self.lowest_allowed()
    }

    /// Everything up to the sleep instruction. Returns the mode to apply.
    fn prepare_sleep<H: HardwareShim>(&mut self, hal: &H) -> EnergyMode {
        self.latest_wakeup_internal = false;

        let mut mode = self.lowest_allowed();
        if mode.is_deep() {
            mode = self.evaluate_wakeup(hal, mode);
        }

        if mode.is_deep() {
            match self.restore.state() {
                ClockRestoreState::NotSaved if !self.requirements.is_hf_clock_preserved() => {
                    self.restore.save(hal)
                }
                ClockRestoreState::SleepingWhileWaiting => self.restore.park_deep(),
                _ => {}
            }
        } else if self.restore.is_saved() {
            // Shallow sleep with the clock tree down: restore while parked in EM1.
            self.start_async_restore(hal);
        }

        if mode != self.active && self.restore.state() != ClockRestoreState::SleepingWhileWaiting
        {
            self.transition(mode);
        }

        if mode.is_deep() && self.restore.is_saved() {
            hal.handle_pre_deepsleep_operations();
        }
        mode
    }

    /// Bookkeeping after an interrupt ended the sleep. Returns whether the wakeup was the
    /// power manager's own.
    fn after_wakeup<H: HardwareShim>(&mut self, hal: &H) -> bool {
        if self.restore.state() == ClockRestoreState::SleepingWhileWaiting
            && self.restore.try_complete(hal)
        {
            self.restored_to_em1();
        }
        if self.wakeup_timer_armed {
            self.timer.stop(EARLY_WAKEUP_TIMER);
            self.wakeup_timer_armed = false;
        }
        self.latest_wakeup_internal
    }

    /// Back in run mode: drop the scheduled-wakeup requirement and notify.
    fn resume(&mut self) {
        if self.internal_em1 {
            self.requirements.remove(EnergyMode::Em1);
            self.internal_em1 = false;
        }
        self.transition(EnergyMode::Em0);
    }
}

/// Energy-mode power manager.
///
/// - `H`: the silicon family's [`HardwareShim`]
/// - `T`: the [`TimerService`] the scheduled-wakeup policy queries
/// - `K`: the application's [`SleepHooks`]
///
/// Meant to live in a `static`, which requires `H`, `K` to be `Sync` and `T` to be `Send`.
pub struct PowerManager<H, T, K = PermissiveHooks> {
    hal: H,
    hooks: K,
    state: Mutex<CriticalSectionRawMutex, RefCell<State<T>>>,
}

impl<H: HardwareShim, T: TimerService, K: SleepHooks> PowerManager<H, T, K> {
    pub const fn new(hal: H, timer: T, hooks: K, config: Config) -> Self {
        Self {
            hal,
            hooks,
            state: Mutex::const_new(
                CriticalSectionRawMutex::new(),
                RefCell::new(State::new(timer, config)),
            ),
        }
    }

    /// Run `f` on the state, then notify subscribers of the transitions it made. Callbacks
    /// run with the state released, still inside the caller's critical section.
    fn update<R>(cell: &RefCell<State<T>>, f: impl FnOnce(&mut State<T>) -> R) -> R {
        let ret = f(&mut *cell.borrow_mut());
        loop {
            let next = cell.borrow_mut().next_notification();
            let Some((from, to, callbacks)) = next else {
                return ret;
            };
            for on_event in callbacks {
                on_event(from, to);
            }
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State<T>) -> R) -> R {
        self.state.lock(|cell| Self::update(cell, f))
    }

    /// Initialize the hardware shim and validate the configuration. Call once, before the
    /// first [`sleep`](Self::sleep).
    pub fn init(&self) -> Result<(), Error> {
        self.state.lock(|st| {
            let mut st = st.borrow_mut();
            if st.initialized {
                return Err(Error::AlreadyInitialized);
            }
            if !st.config.is_valid() {
                error!("invalid lowest energy mode {:?}", st.config.lowest_em_allowed);
                return Err(Error::InvalidLowestEm);
            }

            self.hal.init();
            if st.config.minimum_offtime.is_none() {
                st.minimum_offtime = self.hal.get_default_high_frequency_minimum_offtime();
            }
            st.initialized = true;
            info!(
                "power manager: lowest {:?}, minimum offtime {} ticks",
                st.config.lowest_em_allowed,
                st.minimum_offtime
            );
            Ok(())
        })
    }

    /// Forbid sleeping deeper than `mode` until the matching
    /// [`remove_requirement`](Self::remove_requirement).
    ///
    /// An EM1 requirement taken while the system sits in EM2/EM3, from an interrupt,
    /// restores the high-frequency clocks before returning. This may busy-wait for the
    /// oscillator.
    ///
    /// # Panics
    ///
    /// Panics if `mode` is EM0 or EM4, or if the counter overflows.
    pub fn add_requirement(&self, mode: EnergyMode) {
        self.add_requirement_inner(mode, None);
    }

    /// Release a requirement taken with [`add_requirement`](Self::add_requirement).
    ///
    /// # Panics
    ///
    /// Panics if `mode` is EM0 or EM4, or if no requirement is held on it.
    pub fn remove_requirement(&self, mode: EnergyMode) {
        self.remove_requirement_inner(mode, None);
    }

    /// [`add_requirement`](Self::add_requirement), recording `owner` in the owner table.
    pub fn add_requirement_with_owner(&self, mode: EnergyMode, owner: &'static str) {
        self.add_requirement_inner(mode, Some(owner));
    }

    pub fn remove_requirement_with_owner(&self, mode: EnergyMode, owner: &'static str) {
        self.remove_requirement_inner(mode, Some(owner));
    }

    fn add_requirement_inner(&self, mode: EnergyMode, owner: Option<&'static str>) {
        let escalate = self.state.lock(|st| {
            let mut st = st.borrow_mut();
            st.requirements.add(mode);
            if let Some(owner) = owner {
                st.owners.add(mode, owner);
            }
            mode == EnergyMode::Em1 && st.active.is_deep()
        });
        if escalate {
            self.restore_and_wait();
        }
    }

    fn remove_requirement_inner(&self, mode: EnergyMode, owner: Option<&'static str>) {
        self.state.lock(|st| {
            let mut st = st.borrow_mut();
            st.requirements.remove(mode);
            if let Some(owner) = owner {
                st.owners.remove(mode, owner);
            }
        })
    }

    /// Bring the high-frequency clocks back now, polling with interrupts serviceable.
    fn restore_and_wait(&self) {
        if !self.with_state(|st| st.begin_sync_restore(&self.hal)) {
            return;
        }
        loop {
            self.hal.is_high_freq_accuracy_clk_ready(true);
            if self.with_state(|st| st.finish_sync_restore(&self.hal)) {
                return;
            }
        }
    }

    /// Keep the high-frequency clock settings across deep sleep until the matching
    /// [`remove_hf_clock_preservation`](Self::remove_hf_clock_preservation).
    pub fn add_hf_clock_preservation(&self) {
        self.state
            .lock(|st| st.borrow_mut().requirements.add_hf_clock_preservation())
    }

    pub fn remove_hf_clock_preservation(&self) {
        self.state
            .lock(|st| st.borrow_mut().requirements.remove_hf_clock_preservation())
    }

    /// Register for energy-mode transition events.
    ///
    /// The callback runs inside the power manager's critical section, after the new mode
    /// is latched. It may query the power manager but must not add or remove requirements.
    pub fn subscribe(
        &self,
        subscription: TransitionSubscription,
    ) -> Result<SubscriptionHandle, Error> {
        self.state
            .lock(|st| st.borrow_mut().registry.subscribe(subscription))
    }

    /// # Panics
    ///
    /// Panics if `handle` is not registered.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.state
            .lock(|st| st.borrow_mut().registry.unsubscribe(handle))
    }

    /// Sleep as deep as the requirements allow, until an interrupt ends the sleep and
    /// [`SleepHooks::sleep_on_isr_exit`] does not ask for more.
    ///
    /// Returns in EM0 with the high-frequency clocks restored. Does nothing before
    /// [`init`](Self::init) or when [`SleepHooks::is_ok_to_sleep`] vetoes. Must not be
    /// called from interrupt context.
    ///
    /// The notifications that close a deep sleep depend on who finishes the clock restore.
    /// When the oscillator ready interrupt finishes it, subscribers see `(deep, EM1)` then
    /// `(EM1, EM0)`. When this loop finishes it, they see `(deep, EM0)`. Subscribers must
    /// not rely on either sequence.
    pub fn sleep(&self) {
        let ok = self.state.lock(|st| {
            if !st.borrow().initialized {
                warn!("sleep() called before init()");
                return false;
            }
            self.hooks.is_ok_to_sleep()
        });
        if !ok {
            return;
        }

        loop {
            self.state.lock(|st| {
                let mode = Self::update(st, |st| st.prepare_sleep(&self.hal));
                self.hal.apply_em(mode);
            });
            // Pending interrupts run here.
            let internal = self.with_state(|st| st.after_wakeup(&self.hal));
            if !internal && !self.hooks.sleep_on_isr_exit() {
                break;
            }
        }

        self.finish_restore();
        self.with_state(|st| st.resume());
    }

    /// Complete an outstanding clock restore, parking in EM1 while the oscillator starts.
    fn finish_restore(&self) {
        loop {
            let parked = self.state.lock(|st| {
                let parked = {
                    let mut st = st.borrow_mut();
                    if !st.restore.is_saved() || st.restore.try_complete(&self.hal) {
                        false
                    } else {
                        if st.restore.state() != ClockRestoreState::SleepingWhileWaiting {
                            let from = st.active;
                            st.restore
                                .begin_wait(ClockRestoreState::SleepingWhileWaiting, from);
                        }
                        true
                    }
                };
                if parked {
                    self.hal.apply_em(EnergyMode::Em1);
                }
                parked
            });
            if !parked {
                return;
            }
        }
    }

    /// Enter EM4. Subscribers are told about the `active -> EM4` transition first.
    pub fn enter_shutoff(&self) -> ! {
        self.with_state(|st| st.transition(EnergyMode::Em4));
        loop {
            self.hal.apply_em(EnergyMode::Em4);
        }
    }

    /// To be called from the high-frequency oscillator ready interrupt.
    pub fn on_hf_clock_ready(&self) {
        self.with_state(|st| {
            let waiting = matches!(
                st.restore.state(),
                ClockRestoreState::SleepingWhileWaiting | ClockRestoreState::ActivelyWaiting
            );
            if waiting && st.restore.try_complete(&self.hal) {
                st.restored_to_em1();
            }
        })
    }

    /// To be called when [`EARLY_WAKEUP_TIMER`](crate::sleeptimer::EARLY_WAKEUP_TIMER)
    /// expires. Starts the clock restore ahead of the next application timer.
    pub fn on_wakeup_timer_expired(&self) {
        self.with_state(|st| {
            st.wakeup_timer_armed = false;
            if !st.active.is_deep() {
                return;
            }
            trace!("wakeup: early wakeup timer expired");
            st.latest_wakeup_internal = true;
            if st.restore.state() == ClockRestoreState::Saved {
                st.start_async_restore(&self.hal);
            }
        })
    }

    /// Whether the last wakeup was caused by the early-wakeup timer.
    pub fn is_latest_wakeup_internal(&self) -> bool {
        self.state.lock(|st| st.borrow().latest_wakeup_internal)
    }

    pub fn active_mode(&self) -> EnergyMode {
        self.state.lock(|st| st.borrow().active)
    }

    pub fn clock_restore_state(&self) -> ClockRestoreState {
        self.state.lock(|st| st.borrow().restore.state())
    }

    pub fn requirement_count(&self, mode: EnergyMode) -> u8 {
        self.state.lock(|st| st.borrow().requirements.count(mode))
    }

    /// Deepest mode the outstanding requirements allow.
    pub fn lowest_allowed_mode(&self) -> EnergyMode {
        self.state.lock(|st| st.borrow().lowest_allowed())
    }

    pub fn set_wakeup_overhead_correction(&self, ticks: i32) {
        self.state
            .lock(|st| st.borrow_mut().config.wakeup_overhead_correction = ticks)
    }

    pub fn wakeup_overhead_correction(&self) -> i32 {
        self.state
            .lock(|st| st.borrow().config.wakeup_overhead_correction)
    }

    pub fn set_minimum_offtime(&self, ticks: Ticks) {
        self.state.lock(|st| {
            let mut st = st.borrow_mut();
            st.config.minimum_offtime = Some(ticks);
            st.minimum_offtime = ticks;
        })
    }

    pub fn set_minimum_offtime_us(&self, us: u32) {
        self.set_minimum_offtime(self.hal.convert_delay_us_to_tick(us));
    }

    pub fn minimum_offtime(&self) -> Ticks {
        self.state.lock(|st| st.borrow().minimum_offtime)
    }

    /// Log which owners hold requirements on each mode.
    pub fn print_requirement_owners(&self) {
        self.state.lock(|st| st.borrow().owners.print())
    }

    pub fn for_each_requirement_owner(&self, mut f: impl FnMut(&RequirementOwner)) {
        self.state.lock(|st| {
            for owner in st.borrow().owners.iter() {
                f(owner);
            }
        })
    }

    /// Whether requirements were taken while the owner table was full.
    pub fn requirement_owners_incomplete(&self) -> bool {
        self.state.lock(|st| st.borrow().owners.is_incomplete())
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    /// Run `f` on the timer service, inside the critical section.
    pub fn with_timer<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        self.state.lock(|st| f(&mut st.borrow_mut().timer))
    }
}

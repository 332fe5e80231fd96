//! Energy-mode transition subscriptions.
//!
//! Subscribers register a set of [`Events`] and a callback. On every confirmed mode
//! change the registry is walked once and each callback whose event set intersects the
//! transition is invoked with `(from, to)`.
//!
//! Dispatch order is most-recently-subscribed first. This is not a guarantee; callers
//! must not rely on it.
//!
//! Callbacks run inside the power manager's critical section, after the new mode is
//! latched and with the manager's state released. They may query the manager, but must
//! not add or remove requirements.

use heapless::Vec;

use crate::energy_mode::{EnergyMode, Events};
use crate::Error;

/// Callback invoked on a transition, with `(from, to)`.
pub type TransitionCallback = fn(EnergyMode, EnergyMode);

/// What to be notified about, and how.
#[derive(Clone, Copy)]
pub struct TransitionSubscription {
    pub events: Events,
    pub on_event: TransitionCallback,
}

impl TransitionSubscription {
    pub const fn new(events: Events, on_event: TransitionCallback) -> Self {
        Self { events, on_event }
    }
}

/// Identifies a registered subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SubscriptionHandle(u16);

struct Entry {
    handle: SubscriptionHandle,
    subscription: TransitionSubscription,
}

/// Fixed-capacity registry of transition subscribers.
pub struct TransitionRegistry<const N: usize> {
    entries: Vec<Entry, N>,
    next_handle: u16,
}

impl<const N: usize> Default for TransitionRegistry<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> TransitionRegistry<N> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_handle: 0,
        }
    }

    /// Register `subscription`. Registering the same subscription twice yields two
    /// independent handles, and the callback then fires twice per transition.
    pub fn subscribe(
        &mut self,
        subscription: TransitionSubscription,
    ) -> Result<SubscriptionHandle, Error> {
        let handle = SubscriptionHandle(self.next_handle);
        self.entries
            .push(Entry {
                handle,
                subscription,
            })
            .map_err(|_| Error::SubscriptionsFull)?;
        self.next_handle = self.next_handle.wrapping_add(1);
        Ok(handle)
    }

    /// Remove the subscription identified by `handle`.
    ///
    /// # Panics
    ///
    /// Panics if `handle` is not registered.
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) {
        let Some(pos) = self.entries.iter().position(|e| e.handle == handle) else {
            panic!("unsubscribe: {:?} is not registered", handle);
        };
        self.entries.remove(pos);
    }

    /// Callbacks interested in the `from -> to` transition, in dispatch order.
    pub fn subscribers_of(
        &self,
        from: EnergyMode,
        to: EnergyMode,
    ) -> Vec<TransitionCallback, N> {
        assert_ne!(from, to, "no-op transition");
        let transition = Events::transition(from, to);
        self.entries
            .iter()
            .rev()
            .filter(|e| e.subscription.events.intersects(transition))
            .map(|e| e.subscription.on_event)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;
    use std::vec::Vec as StdVec;
    use EnergyMode::*;

    std::thread_local! {
        static CALLS: RefCell<StdVec<(&'static str, EnergyMode, EnergyMode)>> =
            RefCell::new(StdVec::new());
    }

    fn record(name: &'static str, from: EnergyMode, to: EnergyMode) {
        CALLS.with(|c| c.borrow_mut().push((name, from, to)));
    }

    fn first(from: EnergyMode, to: EnergyMode) {
        record("first", from, to);
    }

    fn second(from: EnergyMode, to: EnergyMode) {
        record("second", from, to);
    }

    fn dispatch<const N: usize>(
        registry: &TransitionRegistry<N>,
        from: EnergyMode,
        to: EnergyMode,
    ) {
        for on_event in registry.subscribers_of(from, to) {
            on_event(from, to);
        }
    }

    fn take_calls() -> StdVec<(&'static str, EnergyMode, EnergyMode)> {
        CALLS.with(|c| core::mem::take(&mut *c.borrow_mut()))
    }

    #[test]
    fn mask_filters_transitions() {
        let mut registry = TransitionRegistry::<4>::new();
        registry
            .subscribe(TransitionSubscription::new(Events::ENTERING_EM1, first))
            .unwrap();

        dispatch(&registry, Em0, Em1);
        dispatch(&registry, Em1, Em2);

        assert_eq!(take_calls(), [("first", Em0, Em1)]);
    }

    #[test]
    fn leave_bit_alone_is_enough() {
        let mut registry = TransitionRegistry::<4>::new();
        registry
            .subscribe(TransitionSubscription::new(Events::LEAVING_EM2, first))
            .unwrap();

        dispatch(&registry, Em2, Em1);
        dispatch(&registry, Em1, Em0);

        assert_eq!(take_calls(), [("first", Em2, Em1)]);
    }

    #[test]
    fn most_recent_subscriber_runs_first() {
        let mut registry = TransitionRegistry::<4>::new();
        registry
            .subscribe(TransitionSubscription::new(Events::ALL, first))
            .unwrap();
        registry
            .subscribe(TransitionSubscription::new(Events::ALL, second))
            .unwrap();

        dispatch(&registry, Em0, Em2);

        assert_eq!(take_calls(), [("second", Em0, Em2), ("first", Em0, Em2)]);
    }

    #[test]
    fn unsubscribed_callback_is_not_invoked() {
        let mut registry = TransitionRegistry::<4>::new();
        let a = registry
            .subscribe(TransitionSubscription::new(Events::ALL, first))
            .unwrap();
        registry
            .subscribe(TransitionSubscription::new(Events::ALL, second))
            .unwrap();

        registry.unsubscribe(a);
        dispatch(&registry, Em1, Em0);

        assert_eq!(registry.len(), 1);
        assert_eq!(take_calls(), [("second", Em1, Em0)]);
    }

    #[test]
    fn subscribers_are_collected_without_running() {
        let mut registry = TransitionRegistry::<4>::new();
        registry
            .subscribe(TransitionSubscription::new(Events::ENTERING_EM2, first))
            .unwrap();
        registry
            .subscribe(TransitionSubscription::new(Events::ALL, second))
            .unwrap();

        let callbacks = registry.subscribers_of(Em0, Em2);
        assert_eq!(callbacks.len(), 2);
        assert_eq!(registry.subscribers_of(Em2, Em0).len(), 1);
        assert!(take_calls().is_empty());

        for on_event in callbacks {
            on_event(Em0, Em2);
        }
        assert_eq!(take_calls(), [("second", Em0, Em2), ("first", Em0, Em2)]);
    }

    #[test]
    fn full_registry_rejects_subscription() {
        let mut registry = TransitionRegistry::<2>::new();
        let sub = TransitionSubscription::new(Events::ALL, first);
        registry.subscribe(sub).unwrap();
        registry.subscribe(sub).unwrap();
        assert_eq!(registry.subscribe(sub), Err(Error::SubscriptionsFull));
    }

    #[test]
    fn freed_slot_is_reused() {
        let mut registry = TransitionRegistry::<1>::new();
        let sub = TransitionSubscription::new(Events::ALL, first);
        let a = registry.subscribe(sub).unwrap();
        registry.unsubscribe(a);
        let b = registry.subscribe(sub).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    #[should_panic(expected = "not registered")]
    fn unsubscribing_unknown_handle_is_a_fault() {
        let mut registry = TransitionRegistry::<2>::new();
        let a = registry
            .subscribe(TransitionSubscription::new(Events::ALL, first))
            .unwrap();
        registry.unsubscribe(a);
        registry.unsubscribe(a);
    }
}

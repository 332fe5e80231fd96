//! Delta-ordered one-shot timer queue.
//!
//! Timers are kept sorted by expiry. Each entry stores its distance, in ticks, from the
//! entry before it, so advancing time only touches the head of the list.

use heapless::Vec;

use super::{TimerFlags, TimerId, TimerService};
use crate::energy_mode::Ticks;
use crate::Error;

#[derive(Debug, Clone, Copy)]
struct Node {
    id: TimerId,
    delta: Ticks,
    flags: TimerFlags,
}

/// Tick-driven queue of up to `N` one-shot timers.
///
/// The platform feeds elapsed ticks through [`advance`](Self::advance), typically from
/// its low-frequency timer interrupt, and dispatches the expired ids.
pub struct SleepTimer<const N: usize> {
    nodes: Vec<Node, N>,
}

impl<const N: usize> Default for SleepTimer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> SleepTimer<N> {
    pub const fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Start, or restart, timer `id` to expire in `delay` ticks.
    ///
    /// Timers with the same expiry fire in the order they were started.
    pub fn start(&mut self, id: TimerId, delay: Ticks, flags: TimerFlags) -> Result<(), Error> {
        self.remove(id);

        let mut at = 0;
        let mut pos = self.nodes.len();
        for (i, node) in self.nodes.iter().enumerate() {
            if at + node.delta > delay {
                pos = i;
                break;
            }
            at += node.delta;
        }

        let delta = delay - at;
        self.nodes
            .insert(pos, Node { id, delta, flags })
            .map_err(|_| Error::TimersFull)?;
        if let Some(next) = self.nodes.get_mut(pos + 1) {
            next.delta -= delta;
        }
        Ok(())
    }

    /// Stop timer `id`. Returns whether it was running.
    pub fn remove(&mut self, id: TimerId) -> bool {
        let Some(pos) = self.nodes.iter().position(|n| n.id == id) else {
            return false;
        };
        let node = self.nodes.remove(pos);
        if let Some(next) = self.nodes.get_mut(pos) {
            next.delta += node.delta;
        }
        true
    }

    pub fn is_running(&self, id: TimerId) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    /// Ticks until timer `id` expires.
    pub fn remaining_ticks(&self, id: TimerId) -> Option<Ticks> {
        let mut at: Ticks = 0;
        for node in &self.nodes {
            at += node.delta;
            if node.id == id {
                return Some(at);
            }
        }
        None
    }

    /// Let `elapsed` ticks pass, calling `on_expire` for each timer that expired, in
    /// expiry order.
    pub fn advance(&mut self, elapsed: Ticks, mut on_expire: impl FnMut(TimerId)) {
        let mut left = elapsed;
        while let Some(first) = self.nodes.first_mut() {
            if first.delta > left {
                first.delta -= left;
                return;
            }
            left -= first.delta;
            let node = self.nodes.remove(0);
            trace!("sleeptimer: {:?} expired", node.id);
            on_expire(node.id);
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl<const N: usize> TimerService for SleepTimer<N> {
    fn remaining_ticks_of_first_timer(&self, exclude: TimerFlags) -> Option<Ticks> {
        let mut at: Ticks = 0;
        for node in &self.nodes {
            at += node.delta;
            if !node.flags.intersects(exclude) {
                return Some(at);
            }
        }
        None
    }

    fn start_one_shot(
        &mut self,
        id: TimerId,
        delay: Ticks,
        flags: TimerFlags,
    ) -> Result<(), Error> {
        self.start(id, delay, flags)
    }

    fn stop(&mut self, id: TimerId) {
        self.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec as StdVec;

    const A: TimerId = TimerId(1);
    const B: TimerId = TimerId(2);
    const C: TimerId = TimerId(3);

    fn expired<const N: usize>(timer: &mut SleepTimer<N>, elapsed: Ticks) -> StdVec<TimerId> {
        let mut out = StdVec::new();
        timer.advance(elapsed, |id| out.push(id));
        out
    }

    #[test]
    fn timers_expire_in_deadline_order() {
        let mut timer = SleepTimer::<4>::new();
        timer.start(A, 300, TimerFlags::NONE).unwrap();
        timer.start(B, 100, TimerFlags::NONE).unwrap();
        timer.start(C, 200, TimerFlags::NONE).unwrap();

        assert_eq!(timer.remaining_ticks(A), Some(300));
        assert_eq!(timer.remaining_ticks(B), Some(100));
        assert_eq!(timer.remaining_ticks(C), Some(200));

        assert_eq!(expired(&mut timer, 150), [B]);
        assert_eq!(timer.remaining_ticks(C), Some(50));
        assert_eq!(expired(&mut timer, 1000), [C, A]);
        assert!(timer.is_empty());
    }

    #[test]
    fn equal_deadlines_fire_in_start_order() {
        let mut timer = SleepTimer::<4>::new();
        timer.start(A, 50, TimerFlags::NONE).unwrap();
        timer.start(B, 50, TimerFlags::NONE).unwrap();
        assert_eq!(expired(&mut timer, 50), [A, B]);
    }

    #[test]
    fn removing_keeps_later_deadlines() {
        let mut timer = SleepTimer::<4>::new();
        timer.start(A, 100, TimerFlags::NONE).unwrap();
        timer.start(B, 250, TimerFlags::NONE).unwrap();
        assert!(timer.remove(A));
        assert!(!timer.remove(A));
        assert_eq!(timer.remaining_ticks(B), Some(250));
    }

    #[test]
    fn restart_moves_the_deadline() {
        let mut timer = SleepTimer::<4>::new();
        timer.start(A, 100, TimerFlags::NONE).unwrap();
        timer.start(B, 200, TimerFlags::NONE).unwrap();
        timer.start(A, 500, TimerFlags::NONE).unwrap();
        assert_eq!(timer.len(), 2);
        assert_eq!(timer.remaining_ticks(A), Some(500));
        assert_eq!(expired(&mut timer, 200), [B]);
    }

    #[test]
    fn first_timer_query_skips_excluded_flags() {
        let mut timer = SleepTimer::<4>::new();
        timer.start(A, 10, TimerFlags::EARLY_WAKEUP).unwrap();
        timer.start(B, 20, TimerFlags::NO_HF_CLOCK_REQUIRED).unwrap();
        timer.start(C, 30, TimerFlags::NONE).unwrap();

        let exclude = TimerFlags::EARLY_WAKEUP | TimerFlags::NO_HF_CLOCK_REQUIRED;
        assert_eq!(timer.remaining_ticks_of_first_timer(exclude), Some(30));
        assert_eq!(
            timer.remaining_ticks_of_first_timer(TimerFlags::NONE),
            Some(10)
        );

        timer.stop(C);
        assert_eq!(timer.remaining_ticks_of_first_timer(exclude), None);
    }

    #[test]
    fn full_queue_rejects_new_timer() {
        let mut timer = SleepTimer::<1>::new();
        timer.start(A, 10, TimerFlags::NONE).unwrap();
        assert_eq!(timer.start(B, 10, TimerFlags::NONE), Err(Error::TimersFull));
        // Restarting an existing timer needs no extra room.
        timer.start(A, 20, TimerFlags::NONE).unwrap();
    }

    #[test]
    fn one_shot_on_full_queue_leaves_running_timers() {
        let mut timer = SleepTimer::<2>::new();
        timer.start(A, 100, TimerFlags::NONE).unwrap();
        timer.start(B, 200, TimerFlags::NONE).unwrap();

        let res = timer.start_one_shot(C, 50, TimerFlags::EARLY_WAKEUP);
        assert_eq!(res, Err(Error::TimersFull));
        assert!(!timer.is_running(C));
        assert_eq!(timer.remaining_ticks(A), Some(100));
        assert_eq!(timer.remaining_ticks(B), Some(200));
    }
}

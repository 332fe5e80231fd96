//! Requirement owner tracking.
//!
//! A fixed pool of `{mode, owner}` records, filled by
//! [`PowerManager::add_requirement_with_owner`](crate::PowerManager::add_requirement_with_owner).
//! Only used for diagnostics: when the pool is exhausted the table becomes incomplete, the
//! requirement itself is still taken.

use heapless::Vec;

use crate::energy_mode::EnergyMode;

/// A named requirement holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RequirementOwner {
    pub mode: EnergyMode,
    pub owner: &'static str,
}

pub(crate) struct RequirementOwners<const N: usize> {
    entries: Vec<RequirementOwner, N>,
    incomplete: bool,
}

impl<const N: usize> RequirementOwners<N> {
    pub(crate) const fn new() -> Self {
        Self {
            entries: Vec::new(),
            incomplete: false,
        }
    }

    pub(crate) fn add(&mut self, mode: EnergyMode, owner: &'static str) {
        if self.entries.push(RequirementOwner { mode, owner }).is_err() {
            warn!(
                "requirement owner pool exhausted, {} on {:?} not tracked",
                owner, mode
            );
            self.incomplete = true;
        }
    }

    /// Drop one record of `owner` on `mode`, if tracked.
    pub(crate) fn remove(&mut self, mode: EnergyMode, owner: &'static str) {
        if let Some(pos) = self
            .entries
            .iter()
            .position(|e| e.mode == mode && e.owner == owner)
        {
            self.entries.remove(pos);
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &RequirementOwner> {
        self.entries.iter()
    }

    /// Whether some requirements were taken while the pool was full.
    pub(crate) fn is_incomplete(&self) -> bool {
        self.incomplete
    }

    pub(crate) fn print(&self) {
        for mode in EnergyMode::REQUIRABLE {
            info!("requirements on {:?}:", mode);
            for entry in self.entries.iter().filter(|e| e.mode == mode) {
                info!("  {}", entry.owner);
            }
        }
        if self.incomplete {
            warn!("requirement owner table is incomplete");
        }
    }
}

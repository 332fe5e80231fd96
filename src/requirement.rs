//! Energy-mode requirement table.
//!
//! One saturating reference counter per requirable mode (EM1..EM3), plus a counter of
//! callers that need the high-frequency clock settings preserved across deep sleep.
//! A non-zero counter on mode `M` means the system must not sleep deeper than `M`.

use crate::energy_mode::EnergyMode;

/// Requirement reference counters.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RequirementTable {
    counters: [u8; 3],
    hf_clock_preserve: u8,
}

impl Default for RequirementTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RequirementTable {
    pub const fn new() -> Self {
        Self {
            counters: [0; 3],
            hf_clock_preserve: 0,
        }
    }

    /// Add a requirement on `mode`.
    ///
    /// # Panics
    ///
    /// Panics if `mode` is EM0 or EM4, or if the counter would overflow.
    pub fn add(&mut self, mode: EnergyMode) {
        assert!(mode.is_requirable(), "requirement on {:?} is not allowed", mode);
        let counter = &mut self.counters[mode.requirement_index()];
        assert!(*counter < u8::MAX, "requirement counter overflow on {:?}", mode);
        *counter += 1;
    }

    /// Remove a requirement on `mode`.
    ///
    /// # Panics
    ///
    /// Panics if `mode` is EM0 or EM4, or if no requirement is held on it.
    pub fn remove(&mut self, mode: EnergyMode) {
        assert!(mode.is_requirable(), "requirement on {:?} is not allowed", mode);
        let counter = &mut self.counters[mode.requirement_index()];
        assert!(*counter > 0, "requirement counter underflow on {:?}", mode);
        *counter -= 1;
    }

    /// Number of requirements currently held on `mode`. Always 0 for EM0 and EM4.
    pub fn count(&self, mode: EnergyMode) -> u8 {
        if mode.is_requirable() {
            self.counters[mode.requirement_index()]
        } else {
            0
        }
    }

    /// The deepest mode allowed by the outstanding requirements, bounded by `lowest`.
    ///
    /// Scans from EM1 towards `lowest` and stops at the first mode with a requirement.
    pub fn lowest_allowed(&self, lowest: EnergyMode) -> EnergyMode {
        for mode in EnergyMode::REQUIRABLE {
            if mode >= lowest {
                break;
            }
            if self.counters[mode.requirement_index()] > 0 {
                return mode;
            }
        }
        lowest
    }

    pub fn add_hf_clock_preservation(&mut self) {
        assert!(
            self.hf_clock_preserve < u8::MAX,
            "hf clock preservation counter overflow"
        );
        self.hf_clock_preserve += 1;
    }

    pub fn remove_hf_clock_preservation(&mut self) {
        assert!(
            self.hf_clock_preserve > 0,
            "hf clock preservation counter underflow"
        );
        self.hf_clock_preserve -= 1;
    }

    /// Whether some caller needs the high-frequency clock settings kept in deep sleep.
    pub fn is_hf_clock_preserved(&self) -> bool {
        self.hf_clock_preserve > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use EnergyMode::*;

    #[test]
    fn empty_table_allows_deepest_configured_mode() {
        let table = RequirementTable::new();
        assert_eq!(table.lowest_allowed(Em3), Em3);
        assert_eq!(table.lowest_allowed(Em2), Em2);
        assert_eq!(table.lowest_allowed(Em1), Em1);
    }

    #[test]
    fn simple_em1_requirement() {
        let mut table = RequirementTable::new();
        table.add(Em1);
        assert_eq!(table.lowest_allowed(Em3), Em1);
        table.remove(Em1);
        assert_eq!(table.lowest_allowed(Em3), Em3);
    }

    #[test]
    fn shallowest_requirement_wins() {
        let mut table = RequirementTable::new();
        table.add(Em2);
        assert_eq!(table.lowest_allowed(Em3), Em2);
        table.add(Em1);
        assert_eq!(table.lowest_allowed(Em3), Em1);
        table.remove(Em1);
        assert_eq!(table.lowest_allowed(Em3), Em2);
    }

    #[test]
    fn requirement_deeper_than_configured_is_ignored() {
        let mut table = RequirementTable::new();
        table.add(Em3);
        assert_eq!(table.lowest_allowed(Em2), Em2);
        assert_eq!(table.lowest_allowed(Em3), Em3);
    }

    #[test]
    fn lowest_allowed_never_skips_a_held_requirement() {
        // Every combination of held requirements, against every configured bound.
        for bits in 0u8..8 {
            let mut table = RequirementTable::new();
            for (i, mode) in EnergyMode::REQUIRABLE.iter().enumerate() {
                if bits & (1 << i) != 0 {
                    table.add(*mode);
                }
            }
            for lowest in [Em1, Em2, Em3] {
                let allowed = table.lowest_allowed(lowest);
                assert!(allowed <= lowest);
                for mode in EnergyMode::REQUIRABLE {
                    if mode < allowed {
                        assert_eq!(table.count(mode), 0);
                    }
                }
            }
        }
    }

    #[test]
    fn balanced_add_remove_leaves_table_unchanged() {
        let mut table = RequirementTable::new();
        table.add(Em2);
        let before = table.clone();
        table.add(Em1);
        table.remove(Em1);
        assert_eq!(table, before);
    }

    #[test]
    fn counter_saturates_at_max() {
        let mut table = RequirementTable::new();
        for _ in 0..u8::MAX {
            table.add(Em1);
        }
        assert_eq!(table.count(Em1), u8::MAX);
    }

    #[test]
    #[should_panic(expected = "overflow")]
    fn overflow_is_a_fault() {
        let mut table = RequirementTable::new();
        for _ in 0..=u8::MAX {
            table.add(Em1);
        }
    }

    #[test]
    #[should_panic(expected = "underflow")]
    fn underflow_is_a_fault() {
        let mut table = RequirementTable::new();
        table.add(Em2);
        table.remove(Em2);
        table.remove(Em2);
    }

    #[test]
    #[should_panic(expected = "not allowed")]
    fn requirement_on_em0_is_a_fault() {
        RequirementTable::new().add(Em0);
    }

    #[test]
    #[should_panic(expected = "not allowed")]
    fn requirement_on_em4_is_a_fault() {
        RequirementTable::new().add(Em4);
    }

    #[test]
    fn hf_clock_preservation_is_counted() {
        let mut table = RequirementTable::new();
        assert!(!table.is_hf_clock_preserved());
        table.add_hf_clock_preservation();
        table.add_hf_clock_preservation();
        table.remove_hf_clock_preservation();
        assert!(table.is_hf_clock_preserved());
        table.remove_hf_clock_preservation();
        assert!(!table.is_hf_clock_preserved());
    }
}

//! Energy modes and transition events.

use core::ops;

/// Sleep timer ticks.
pub type Ticks = u32;

/// Energy mode.
///
/// Ordered from fully running (EM0) to shutoff (EM4). A higher value means a deeper
/// sleep: less power, more latency to resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum EnergyMode {
    /// Run mode.
    Em0 = 0,
    /// Sleep. CPU halted, high-frequency clocks kept.
    Em1 = 1,
    /// Deep sleep. High-frequency clocks off.
    Em2 = 2,
    /// Stop.
    Em3 = 3,
    /// Shutoff. The device resets on wakeup.
    Em4 = 4,
}

impl EnergyMode {
    /// Modes that can carry a requirement, shallowest first.
    pub const REQUIRABLE: [EnergyMode; 3] = [EnergyMode::Em1, EnergyMode::Em2, EnergyMode::Em3];

    /// Whether this mode tears down the high-frequency clock tree (EM2 and EM3).
    pub const fn is_deep(self) -> bool {
        matches!(self, EnergyMode::Em2 | EnergyMode::Em3)
    }

    /// Whether a requirement can be placed on this mode.
    pub const fn is_requirable(self) -> bool {
        matches!(self, EnergyMode::Em1 | EnergyMode::Em2 | EnergyMode::Em3)
    }

    /// Event raised when the system enters this mode. EM4 has none.
    pub const fn entering_event(self) -> Events {
        match self {
            EnergyMode::Em0 => Events::ENTERING_EM0,
            EnergyMode::Em1 => Events::ENTERING_EM1,
            EnergyMode::Em2 => Events::ENTERING_EM2,
            EnergyMode::Em3 => Events::ENTERING_EM3,
            EnergyMode::Em4 => Events::NONE,
        }
    }

    /// Event raised when the system leaves this mode. EM4 has none.
    pub const fn leaving_event(self) -> Events {
        match self {
            EnergyMode::Em0 => Events::LEAVING_EM0,
            EnergyMode::Em1 => Events::LEAVING_EM1,
            EnergyMode::Em2 => Events::LEAVING_EM2,
            EnergyMode::Em3 => Events::LEAVING_EM3,
            EnergyMode::Em4 => Events::NONE,
        }
    }

    pub(crate) const fn requirement_index(self) -> usize {
        match self {
            EnergyMode::Em1 => 0,
            EnergyMode::Em2 => 1,
            EnergyMode::Em3 => 2,
            EnergyMode::Em0 | EnergyMode::Em4 => ::core::panic!("no requirement on EM0/EM4"),
        }
    }
}

/// Set of energy-mode transition events a subscriber is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Events(u8);

impl Events {
    pub const NONE: Events = Events(0);
    pub const ENTERING_EM0: Events = Events(1 << 0);
    pub const LEAVING_EM0: Events = Events(1 << 1);
    pub const ENTERING_EM1: Events = Events(1 << 2);
    pub const LEAVING_EM1: Events = Events(1 << 3);
    pub const ENTERING_EM2: Events = Events(1 << 4);
    pub const LEAVING_EM2: Events = Events(1 << 5);
    pub const ENTERING_EM3: Events = Events(1 << 6);
    pub const LEAVING_EM3: Events = Events(1 << 7);
    pub const ALL: Events = Events(0xFF);

    /// Events describing a `from -> to` transition.
    pub const fn transition(from: EnergyMode, to: EnergyMode) -> Self {
        Events(to.entering_event().0 | from.leaving_event().0)
    }

    pub const fn from_bits(bits: u8) -> Self {
        Events(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn union(self, other: Events) -> Self {
        Events(self.0 | other.0)
    }

    pub const fn intersects(self, other: Events) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn contains(self, other: Events) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl ops::BitOr for Events {
    type Output = Events;
    fn bitor(self, rhs: Events) -> Self::Output {
        self.union(rhs)
    }
}

impl ops::BitOrAssign for Events {
    fn bitor_assign(&mut self, rhs: Events) {
        self.0 |= rhs.0;
    }
}

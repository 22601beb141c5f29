//! Lane Model - Bitmask priorities for scheduling updates.
//!
//! A lane is one bit of a 31-bit mask; a set of lanes is the OR of its bits.
//! Lower bit positions are more urgent, so the highest-priority lane of a set
//! is always its lowest set bit (`lanes & -lanes`).
//!
//! ```text
//! bit  0       SYNC               discrete input, flush_sync
//! bit  2       INPUT_CONTINUOUS   drags, scrolls, hovers
//! bit  4       DEFAULT            everything else
//! bits 6..=21  TRANSITION_1..16   start_transition
//! bit  29      IDLE
//! bit  30      OFFSCREEN          hidden subtrees
//! ```
//!
//! Nothing here holds mutable state except [`RootLanes`], which each root
//! owns to track which lanes still have work.

use serde::Deserialize;

use crate::scheduler::PriorityLevel;

// =============================================================================
// Lanes
// =============================================================================

bitflags::bitflags! {
    /// A set of priority lanes.
    ///
    /// `Lanes::empty()` is "no lane" and is a subset of every set, so an
    /// update stamped with no lane is applied by every render.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Lanes: u32 {
        const SYNC = 1 << 0;
        const INPUT_CONTINUOUS = 1 << 2;
        const DEFAULT = 1 << 4;

        const TRANSITION_1 = 1 << 6;
        const TRANSITION_2 = 1 << 7;
        const TRANSITION_3 = 1 << 8;
        const TRANSITION_4 = 1 << 9;
        const TRANSITION_5 = 1 << 10;
        const TRANSITION_6 = 1 << 11;
        const TRANSITION_7 = 1 << 12;
        const TRANSITION_8 = 1 << 13;
        const TRANSITION_9 = 1 << 14;
        const TRANSITION_10 = 1 << 15;
        const TRANSITION_11 = 1 << 16;
        const TRANSITION_12 = 1 << 17;
        const TRANSITION_13 = 1 << 18;
        const TRANSITION_14 = 1 << 19;
        const TRANSITION_15 = 1 << 20;
        const TRANSITION_16 = 1 << 21;

        const IDLE = 1 << 29;
        const OFFSCREEN = 1 << 30;

        const TRANSITIONS = 0b0000_0000_0011_1111_1111_1111_1100_0000;
        const NON_IDLE = 0b0000_0111_1111_1111_1111_1111_1111_1111;
    }
}

impl Lanes {
    /// Discrete user input runs on the sync lane.
    pub const DISCRETE: Self = Self::SYNC;

    /// `a | b`.
    #[inline]
    pub const fn merge(self, other: Self) -> Self {
        Self::from_bits_retain(self.bits() | other.bits())
    }

    /// True when every lane of `subset` is in `self`.
    #[inline]
    pub const fn is_subset(self, subset: Self) -> bool {
        self.bits() & subset.bits() == subset.bits()
    }

    /// True when the two sets share at least one lane.
    #[inline]
    pub const fn includes_some(self, other: Self) -> bool {
        self.bits() & other.bits() != 0
    }

    /// `self & !other`.
    #[inline]
    pub const fn remove_lanes(self, other: Self) -> Self {
        Self::from_bits_retain(self.bits() & !other.bits())
    }

    /// The most urgent lane of the set (its lowest set bit).
    #[inline]
    pub const fn highest_priority(self) -> Self {
        let bits = self.bits();
        Self::from_bits_retain(bits & bits.wrapping_neg())
    }

    /// The group of lanes that should render together with the most urgent
    /// lane. Pending transitions are batched into one render.
    pub fn highest_priority_lanes(self) -> Self {
        let lane = self.highest_priority();
        if Self::TRANSITIONS.contains(lane) {
            self & Self::TRANSITIONS
        } else if lane.is_empty() {
            // Unknown high bits fall back to the whole set.
            self
        } else {
            lane
        }
    }

    /// True if any lane is something other than idle or offscreen work.
    #[inline]
    pub const fn includes_non_idle_work(self) -> bool {
        self.bits() & Self::NON_IDLE.bits() != 0
    }

    /// Map the most urgent lane to a scheduler priority.
    pub fn to_scheduler_priority(self) -> PriorityLevel {
        let lane = self.highest_priority();
        if lane.is_empty() {
            return PriorityLevel::Idle;
        }
        if lane == Self::SYNC {
            PriorityLevel::Immediate
        } else if lane == Self::INPUT_CONTINUOUS {
            PriorityLevel::UserBlocking
        } else if lane.includes_non_idle_work() {
            PriorityLevel::Normal
        } else {
            PriorityLevel::Idle
        }
    }

    /// Iterate the individual lanes of the set, most urgent first.
    pub fn lanes(self) -> impl Iterator<Item = Lanes> {
        let mut rest = self.bits();
        std::iter::from_fn(move || {
            if rest == 0 {
                return None;
            }
            let lane = rest & rest.wrapping_neg();
            rest &= !lane;
            Some(Lanes::from_bits_retain(lane))
        })
    }
}

// =============================================================================
// Named lanes (configuration)
// =============================================================================

/// Lane names accepted in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneName {
    Sync,
    InputContinuous,
    #[default]
    Default,
    Idle,
}

impl LaneName {
    pub const fn lane(self) -> Lanes {
        match self {
            LaneName::Sync => Lanes::SYNC,
            LaneName::InputContinuous => Lanes::INPUT_CONTINUOUS,
            LaneName::Default => Lanes::DEFAULT,
            LaneName::Idle => Lanes::IDLE,
        }
    }
}

// =============================================================================
// Transition lane cycling
// =============================================================================

/// Hands out transition lanes round-robin so consecutive transitions can be
/// told apart while still batching when they pile up.
#[derive(Debug, Clone, Copy)]
pub struct TransitionLanes {
    next: Lanes,
}

impl Default for TransitionLanes {
    fn default() -> Self {
        Self {
            next: Lanes::TRANSITION_1,
        }
    }
}

impl TransitionLanes {
    pub fn claim(&mut self) -> Lanes {
        let lane = self.next;
        let shifted = Lanes::from_bits_retain(lane.bits() << 1);
        self.next = if Lanes::TRANSITIONS.contains(shifted) {
            shifted
        } else {
            Lanes::TRANSITION_1
        };
        lane
    }
}

// =============================================================================
// Root lane bookkeeping
// =============================================================================

/// Lanes tracked per root: what has pending work, what is parked, and what
/// was woken back up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RootLanes {
    pub pending: Lanes,
    pub suspended: Lanes,
    pub pinged: Lanes,
}

impl RootLanes {
    /// Record a new update. An update may unblock parked work, so parked
    /// lanes are released.
    pub fn mark_updated(&mut self, lane: Lanes) {
        self.pending |= lane;
        if lane != Lanes::IDLE {
            self.suspended = Lanes::empty();
            self.pinged = Lanes::empty();
        }
    }

    /// Park lanes that cannot make progress right now.
    ///
    /// The engine itself never suspends: renders run to completion, so
    /// `suspended` and `pinged` stay empty unless an embedder drives them.
    /// `next_lanes` still honours them for roots that do.
    pub fn mark_suspended(&mut self, lanes: Lanes) {
        self.suspended |= lanes;
        self.pinged = self.pinged.remove_lanes(lanes);
    }

    /// Wake parked lanes. Only meaningful after [`mark_suspended`](Self::mark_suspended).
    pub fn mark_pinged(&mut self, lanes: Lanes) {
        self.pinged |= self.suspended & lanes;
    }

    /// After a commit only `remaining` lanes still have work.
    pub fn mark_finished(&mut self, remaining: Lanes) {
        let no_longer_pending = self.pending.remove_lanes(remaining);
        self.pending = remaining;
        self.suspended = self.suspended.remove_lanes(no_longer_pending);
        self.pinged = self.pinged.remove_lanes(no_longer_pending);
    }

    /// Drop lanes whose render failed so they are not retried forever.
    pub fn mark_failed(&mut self, lanes: Lanes) {
        self.pending = self.pending.remove_lanes(lanes);
        self.suspended = self.suspended.remove_lanes(lanes);
        self.pinged = self.pinged.remove_lanes(lanes);
    }

    /// Choose the lanes the next render should work on.
    pub fn next_lanes(&self) -> Lanes {
        let pending = self.pending;
        if pending.is_empty() {
            return Lanes::empty();
        }

        let non_idle = pending & Lanes::NON_IDLE;
        let mut next = if !non_idle.is_empty() {
            let unblocked = non_idle.remove_lanes(self.suspended);
            if !unblocked.is_empty() {
                unblocked.highest_priority_lanes()
            } else {
                (non_idle & self.pinged).highest_priority_lanes()
            }
        } else {
            let unblocked = pending.remove_lanes(self.suspended);
            if !unblocked.is_empty() {
                unblocked.highest_priority_lanes()
            } else {
                (pending & self.pinged).highest_priority_lanes()
            }
        };

        // Continuous input and default updates render together so a
        // continuous event never observes a half-applied default update.
        if next.contains(Lanes::INPUT_CONTINUOUS) {
            next |= pending & Lanes::DEFAULT;
        }
        next
    }
}

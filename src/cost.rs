// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Cost values compared by the dynamic program.

use serde::{Deserialize, Serialize};

/// Cost of a configuration that must never be chosen.
///
/// Halved so that summing two of them does not overflow before
/// saturation kicks in.
pub const INFEASIBLE: u64 = u64::MAX / 2;

/// The cost of assigning some part of the stream to some tiles.
///
/// `max` is the bottleneck (the heaviest tile). `sum` is the total
/// of all pieces and only breaks ties between equal `max`.
/// `icode` is the largest instruction footprint of any tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DpCost {
    pub max: u64,
    pub sum: u64,
    pub icode: u64,
}

impl DpCost {
    /// A single indivisible piece of work.
    #[inline]
    pub fn single(work: u64, icode: u64) -> DpCost {
        DpCost { max: work, sum: work, icode }
    }

    /// The cost reported for configurations that cannot be realized.
    #[inline]
    pub fn infeasible(icode_threshold: u64) -> DpCost {
        DpCost {
            max: INFEASIBLE,
            sum: INFEASIBLE,
            icode: icode_threshold.saturating_add(1),
        }
    }

    #[inline]
    pub fn is_infeasible(&self) -> bool {
        self.max >= INFEASIBLE
    }

    /// Collapse every infeasible cost onto the same work terms.
    #[inline]
    fn clamped(self) -> DpCost {
        if self.max >= INFEASIBLE || self.sum >= INFEASIBLE {
            DpCost { max: INFEASIBLE, sum: INFEASIBLE, ..self }
        }
        else {
            self
        }
    }

    /// Two pieces placed on disjoint tiles.
    #[inline]
    pub fn parallel(self, other: DpCost) -> DpCost {
        DpCost {
            max: self.max.max(other.max),
            sum: self.sum.saturating_add(other.sum),
            icode: self.icode.max(other.icode),
        }.clamped()
    }

    /// Two pieces fused onto the same tile.
    #[inline]
    pub fn serial(self, other: DpCost) -> DpCost {
        DpCost {
            max: self.max.saturating_add(other.max),
            sum: self.sum.saturating_add(other.sum),
            icode: self.icode.saturating_add(other.icode),
        }.clamped()
    }

    /// Add an overhead that only shows up in the work terms.
    #[inline]
    pub fn with_overhead(self, overhead: u64) -> DpCost {
        DpCost {
            max: self.max.saturating_add(overhead),
            sum: self.sum.saturating_add(overhead),
            icode: self.icode,
        }.clamped()
    }

    /// Strictly better on bottleneck, then on total work.
    /// A full tie is not better, so the first candidate seen wins.
    #[inline]
    pub fn better_than(&self, other: &DpCost) -> bool {
        self.max < other.max || (self.max == other.max && self.sum < other.sum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combinators() {
        let a = DpCost::single(10, 100);
        let b = DpCost::single(30, 50);
        assert_eq!(a.parallel(b), DpCost { max: 30, sum: 40, icode: 100 });
        assert_eq!(a.serial(b), DpCost { max: 40, sum: 40, icode: 150 });
        assert_eq!(a.with_overhead(5), DpCost { max: 15, sum: 15, icode: 100 });
    }

    #[test]
    fn test_infeasible_saturates() {
        let inf = DpCost::infeasible(16000);
        assert!(inf.is_infeasible());
        assert_eq!(inf.icode, 16001);
        let s = inf.serial(inf).serial(DpCost::single(7, 0));
        assert!(s.is_infeasible());
        assert_eq!((s.max, s.sum), (INFEASIBLE, INFEASIBLE));
        let p = DpCost::single(3, 0).parallel(inf.with_overhead(56));
        assert_eq!((p.max, p.sum), (INFEASIBLE, INFEASIBLE));
        // all infeasible costs tie, whatever they were built from.
        assert!(!s.better_than(&p) && !p.better_than(&s));
        assert!(DpCost::single(1, 0).better_than(&inf));
    }

    #[test]
    fn test_tie_break() {
        let a = DpCost { max: 50, sum: 60, icode: 0 };
        let b = DpCost { max: 50, sum: 70, icode: 0 };
        assert!(a.better_than(&b));
        assert!(!b.better_than(&a));
        assert!(!a.better_than(&a));
    }
}

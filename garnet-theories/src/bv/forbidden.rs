//! Forbidden-Interval Extraction.
//!
//! Converts a unary constraint over one bit-vector variable into the
//! half-open wrapped interval of values it forbids. Unit-multiplier
//! constraints yield a single interval; non-unit multipliers are classified
//! for the refinement side lists of the viable engine.
//!
//! Unsigned-comparison constraints are canonicalised first:
//!
//! - `k1 <= k2` folds to trivially true or false
//! - `0 <= p` and `p <= 2^w - 1` are trivially true
//! - `k <= p` becomes `p - k <= -k - 1`

use super::{pow2, truncate};
use num_bigint::BigUint;
use num_traits::{One, Zero};

/// Index of a registered constraint.
pub type ConstraintIdx = u32;

/// Classification of a forbidden-interval record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Unit multiplier: a concrete forbidden interval.
    Unit,
    /// Non-unit multiplier on an equality; handled by refinement.
    EqualLin,
    /// Non-unit multiplier on a disequality; handled by refinement.
    DiseqLin,
}

/// A half-open interval `[lo, hi)` on the circle `Z_{2^w}`, with `lo != hi`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapInterval {
    /// First forbidden value.
    pub lo: BigUint,
    /// First allowed value past the interval.
    pub hi: BigUint,
}

impl WrapInterval {
    /// Number of values covered, given the width.
    #[must_use]
    pub fn len(&self, w: u32) -> BigUint {
        truncate(&(pow2(w) + &self.hi - &self.lo), w)
    }

    /// Is the interval empty? Proper intervals never are.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lo == self.hi
    }

    /// Does the interval contain `x`?
    #[must_use]
    pub fn contains(&self, w: u32, x: &BigUint) -> bool {
        truncate(&(pow2(w) + x - &self.lo), w) < self.len(w)
    }

    /// Does the interval overlap `other`?
    #[must_use]
    pub fn overlaps(&self, w: u32, other: &WrapInterval) -> bool {
        self.contains(w, &other.lo) || other.contains(w, &self.lo)
    }

    /// Does the interval cover all of `other`?
    #[must_use]
    pub fn covers(&self, w: u32, other: &WrapInterval) -> bool {
        if !self.contains(w, &other.lo) {
            return false;
        }
        let offset = truncate(&(pow2(w) + &other.lo - &self.lo), w);
        offset + other.len(w) <= self.len(w)
    }

    /// Union with an overlapping interval. Returns `None` when the union
    /// wraps the full circle.
    #[must_use]
    pub fn union(&self, w: u32, other: &WrapInterval) -> Option<WrapInterval> {
        debug_assert!(self.overlaps(w, other));
        let (first, second) = if self.contains(w, &other.lo) {
            (self, other)
        } else {
            (other, self)
        };
        let offset = truncate(&(pow2(w) + &second.lo - &first.lo), w);
        let end = std::cmp::max(first.len(w), offset + second.len(w));
        if end >= pow2(w) {
            return None;
        }
        Some(WrapInterval {
            lo: first.lo.clone(),
            hi: truncate(&(&first.lo + end), w),
        })
    }
}

/// Set of values forbidden by one constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Forbidden {
    /// Nothing is forbidden; the constraint is trivially true.
    Nothing,
    /// Everything is forbidden; the constraint is unsatisfiable on its own.
    Everything,
    /// A proper interval is forbidden.
    Interval(WrapInterval),
}

/// Record produced by interval extraction.
#[derive(Debug, Clone)]
pub struct FiRecord {
    /// The forbidden set.
    pub forbidden: Forbidden,
    /// Bit-width the record applies to.
    pub width: u32,
    /// Classification for the viable engine.
    pub kind: EntryKind,
}

/// A constraint mentioning a single bit-vector variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnaryConstraint {
    /// `a·v + b <=u c·v + d` over the given width, with `a, c ∈ {0, 1}`.
    Ule {
        /// Bit-width.
        width: u32,
        /// Left multiplier (0 or 1).
        a: BigUint,
        /// Left offset.
        b: BigUint,
        /// Right multiplier (0 or 1).
        c: BigUint,
        /// Right offset.
        d: BigUint,
    },
    /// `a·v + b == 0` over the given width.
    EqLin {
        /// Bit-width.
        width: u32,
        /// Multiplier.
        a: BigUint,
        /// Offset.
        b: BigUint,
    },
    /// `a·v + b != 0` over the given width.
    DiseqLin {
        /// Bit-width.
        width: u32,
        /// Multiplier.
        a: BigUint,
        /// Offset.
        b: BigUint,
    },
}

impl UnaryConstraint {
    /// `v <= k`.
    #[must_use]
    pub fn le_val(width: u32, k: &BigUint) -> Self {
        Self::Ule {
            width,
            a: BigUint::one(),
            b: BigUint::zero(),
            c: BigUint::zero(),
            d: truncate(k, width),
        }
    }

    /// `v <= k`.
    #[must_use]
    pub fn le_const(width: u32, k: u64) -> Self {
        Self::le_val(width, &BigUint::from(k))
    }

    /// `v >= k`.
    #[must_use]
    pub fn ge_val(width: u32, k: &BigUint) -> Self {
        Self::Ule {
            width,
            a: BigUint::zero(),
            b: truncate(k, width),
            c: BigUint::one(),
            d: BigUint::zero(),
        }
    }

    /// `v >= k`.
    #[must_use]
    pub fn ge_const(width: u32, k: u64) -> Self {
        Self::ge_val(width, &BigUint::from(k))
    }

    /// `v == k`.
    #[must_use]
    pub fn eq_val(width: u32, k: &BigUint) -> Self {
        let k = truncate(k, width);
        Self::EqLin {
            width,
            a: BigUint::one(),
            b: truncate(&(pow2(width) - k), width),
        }
    }

    /// `v == k`.
    #[must_use]
    pub fn eq_const(width: u32, k: u64) -> Self {
        Self::eq_val(width, &BigUint::from(k))
    }

    /// `v != k`.
    #[must_use]
    pub fn diseq_val(width: u32, k: &BigUint) -> Self {
        let k = truncate(k, width);
        Self::DiseqLin {
            width,
            a: BigUint::one(),
            b: truncate(&(pow2(width) - k), width),
        }
    }

    /// `v != k`.
    #[must_use]
    pub fn diseq_const(width: u32, k: u64) -> Self {
        Self::diseq_val(width, &BigUint::from(k))
    }

    /// The width the constraint is expressed at.
    #[must_use]
    pub fn width(&self) -> u32 {
        match self {
            Self::Ule { width, .. } | Self::EqLin { width, .. } | Self::DiseqLin { width, .. } => {
                *width
            }
        }
    }

    /// Evaluate the constraint at a concrete value of the variable.
    #[must_use]
    pub fn eval(&self, val: &BigUint) -> bool {
        match self {
            Self::Ule { width, a, b, c, d } => {
                let lhs = truncate(&(a * val + b), *width);
                let rhs = truncate(&(c * val + d), *width);
                lhs <= rhs
            }
            Self::EqLin { width, a, b } => truncate(&(a * val + b), *width).is_zero(),
            Self::DiseqLin { width, a, b } => !truncate(&(a * val + b), *width).is_zero(),
        }
    }

    /// Canonicalise an unsigned comparison: fold constant sides and rewrite
    /// `k <= p` into the `p' <= k'` form.
    #[must_use]
    pub fn simplify(self) -> Self {
        let Self::Ule { width, a, b, c, d } = &self else {
            return self;
        };
        let w = *width;
        let max = pow2(w) - BigUint::one();
        // k1 <= k2
        if a.is_zero() && c.is_zero() {
            return if b <= d {
                Self::Ule {
                    width: w,
                    a: BigUint::zero(),
                    b: BigUint::zero(),
                    c: BigUint::zero(),
                    d: BigUint::zero(),
                }
            } else {
                // 1 <= 0
                Self::Ule {
                    width: w,
                    a: BigUint::zero(),
                    b: BigUint::one(),
                    c: BigUint::zero(),
                    d: BigUint::zero(),
                }
            };
        }
        // 0 <= p
        if a.is_zero() && b.is_zero() {
            return Self::Ule {
                width: w,
                a: BigUint::zero(),
                b: BigUint::zero(),
                c: BigUint::zero(),
                d: BigUint::zero(),
            };
        }
        // p <= max
        if c.is_zero() && *d == max {
            return Self::Ule {
                width: w,
                a: BigUint::zero(),
                b: BigUint::zero(),
                c: BigUint::zero(),
                d: BigUint::zero(),
            };
        }
        // k <= p  ==>  p - k <= -k - 1
        if a.is_zero() && c.is_one() {
            let k = b.clone();
            return Self::Ule {
                width: w,
                a: BigUint::one(),
                b: truncate(&(pow2(w) + d - &k), w),
                c: BigUint::zero(),
                d: truncate(&(pow2(w) + pow2(w) - &k - BigUint::one()), w),
            };
        }
        self
    }
}

/// Extract the forbidden set of a constraint.
#[must_use]
pub fn forbidden_intervals(c: &UnaryConstraint) -> FiRecord {
    let w = c.width();
    match c.clone().simplify() {
        UnaryConstraint::Ule { width, a, b, c, d } => {
            let forbidden = if a.is_zero() && c.is_zero() {
                // constant comparison after simplification
                if b <= d {
                    Forbidden::Nothing
                } else {
                    Forbidden::Everything
                }
            } else if a.is_one() && c.is_zero() {
                // v + b <= d: allowed band [-b, d - b], forbidden [d-b+1, -b)
                let lo = truncate(&(pow2(width) + &d + BigUint::one() - &b), width);
                let hi = truncate(&(pow2(width) - &b), width);
                proper(lo, hi)
            } else if a.is_one() && c.is_one() {
                // v + b <= v + d: forbidden [-d, -b)
                let lo = truncate(&(pow2(width) - &d), width);
                let hi = truncate(&(pow2(width) - &b), width);
                proper(lo, hi)
            } else {
                // non-unit multiplier: refinement only
                return FiRecord {
                    forbidden: Forbidden::Nothing,
                    width,
                    kind: EntryKind::DiseqLin,
                };
            };
            FiRecord {
                forbidden,
                width,
                kind: EntryKind::Unit,
            }
        }
        UnaryConstraint::EqLin { width, a, b } => {
            if a.is_one() {
                // v == -b: forbid everything except that value
                let k = truncate(&(pow2(width) - &b), width);
                let lo = truncate(&(&k + BigUint::one()), width);
                FiRecord {
                    forbidden: proper(lo, k),
                    width,
                    kind: EntryKind::Unit,
                }
            } else if a.is_zero() {
                FiRecord {
                    forbidden: if b.is_zero() {
                        Forbidden::Nothing
                    } else {
                        Forbidden::Everything
                    },
                    width,
                    kind: EntryKind::Unit,
                }
            } else {
                FiRecord {
                    forbidden: Forbidden::Nothing,
                    width,
                    kind: EntryKind::EqualLin,
                }
            }
        }
        UnaryConstraint::DiseqLin { width, a, b } => {
            if a.is_one() {
                let k = truncate(&(pow2(width) - &b), width);
                let hi = truncate(&(&k + BigUint::one()), width);
                FiRecord {
                    forbidden: proper(k, hi),
                    width,
                    kind: EntryKind::Unit,
                }
            } else if a.is_zero() {
                FiRecord {
                    forbidden: if b.is_zero() {
                        Forbidden::Everything
                    } else {
                        Forbidden::Nothing
                    },
                    width,
                    kind: EntryKind::Unit,
                }
            } else {
                FiRecord {
                    forbidden: Forbidden::Nothing,
                    width,
                    kind: EntryKind::DiseqLin,
                }
            }
        }
    }
    .with_width(w)
}

impl FiRecord {
    fn with_width(mut self, w: u32) -> Self {
        self.width = w;
        self
    }
}

fn proper(lo: BigUint, hi: BigUint) -> Forbidden {
    if lo == hi {
        Forbidden::Nothing
    } else {
        Forbidden::Interval(WrapInterval { lo, hi })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forb(c: &UnaryConstraint) -> Forbidden {
        forbidden_intervals(c).forbidden
    }

    fn forbidden_set(c: &UnaryConstraint, w: u32) -> Vec<u64> {
        (0..(1u64 << w))
            .filter(|&x| match forb(c) {
                Forbidden::Nothing => false,
                Forbidden::Everything => true,
                Forbidden::Interval(iv) => iv.contains(w, &BigUint::from(x)),
            })
            .collect()
    }

    /// The forbidden set must be exactly the complement of the constraint's
    /// satisfying assignments.
    #[test]
    fn intervals_complement_semantics_exhaustive() {
        let w = 4;
        let mut cases: Vec<UnaryConstraint> = Vec::new();
        for k in 0..16 {
            cases.push(UnaryConstraint::le_const(w, k));
            cases.push(UnaryConstraint::ge_const(w, k));
            cases.push(UnaryConstraint::eq_const(w, k));
            cases.push(UnaryConstraint::diseq_const(w, k));
        }
        for b in 0..16u32 {
            for d in 0..16u32 {
                cases.push(UnaryConstraint::Ule {
                    width: w,
                    a: BigUint::one(),
                    b: BigUint::from(b),
                    c: BigUint::one(),
                    d: BigUint::from(d),
                });
                cases.push(UnaryConstraint::Ule {
                    width: w,
                    a: BigUint::one(),
                    b: BigUint::from(b),
                    c: BigUint::zero(),
                    d: BigUint::from(d),
                });
                cases.push(UnaryConstraint::Ule {
                    width: w,
                    a: BigUint::zero(),
                    b: BigUint::from(b),
                    c: BigUint::one(),
                    d: BigUint::from(d),
                });
            }
        }
        for c in &cases {
            let forbidden = forbidden_set(c, w);
            for x in 0u64..16 {
                let sat = c.eval(&BigUint::from(x));
                assert_eq!(
                    forbidden.contains(&x),
                    !sat,
                    "constraint {c:?} at value {x}"
                );
            }
        }
    }

    #[test]
    fn interval_algebra() {
        let w = 4;
        let a = WrapInterval {
            lo: BigUint::from(14u32),
            hi: BigUint::from(2u32),
        };
        assert_eq!(a.len(w), BigUint::from(4u32));
        assert!(a.contains(w, &BigUint::from(15u32)));
        assert!(a.contains(w, &BigUint::from(1u32)));
        assert!(!a.contains(w, &BigUint::from(2u32)));

        let b = WrapInterval {
            lo: BigUint::from(1u32),
            hi: BigUint::from(5u32),
        };
        assert!(a.overlaps(w, &b));
        let u = a.union(w, &b).unwrap();
        assert_eq!(u.lo, BigUint::from(14u32));
        assert_eq!(u.hi, BigUint::from(5u32));
        assert!(u.covers(w, &a));
        assert!(u.covers(w, &b));
    }

    #[test]
    fn union_detects_full_cover() {
        let w = 2;
        let a = WrapInterval {
            lo: BigUint::from(0u32),
            hi: BigUint::from(3u32),
        };
        let b = WrapInterval {
            lo: BigUint::from(2u32),
            hi: BigUint::from(1u32),
        };
        assert!(a.union(w, &b).is_none());
    }

    #[test]
    fn canonicalisation_folds_constants() {
        let w = 4;
        let c = UnaryConstraint::Ule {
            width: w,
            a: BigUint::zero(),
            b: BigUint::from(3u32),
            c: BigUint::zero(),
            d: BigUint::from(7u32),
        };
        assert_eq!(forb(&c), Forbidden::Nothing);
        let c = UnaryConstraint::Ule {
            width: w,
            a: BigUint::zero(),
            b: BigUint::from(9u32),
            c: BigUint::zero(),
            d: BigUint::from(7u32),
        };
        assert_eq!(forb(&c), Forbidden::Everything);
    }
}

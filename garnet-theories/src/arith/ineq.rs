//! Inequality Atoms and Distance-to-Truth.

use super::{ArithVar, Ineq, IneqKind};
use garnet_core::error::Result;
use garnet_core::num::Num;
use std::fmt;

impl<N: Num> Ineq<N> {
    /// Truth value of the atom at the cached evaluation.
    pub fn is_true(&self) -> Result<bool> {
        let total = self.args_value.add(&self.coeff)?;
        Ok(match self.op {
            IneqKind::Le => total <= N::zero(),
            IneqKind::Eq => total.is_zero(),
            IneqKind::Lt => total < N::zero(),
        })
    }

    /// The atom's operator.
    #[must_use]
    pub fn op(&self) -> IneqKind {
        self.op
    }

    /// Cached evaluation of the linear part.
    #[must_use]
    pub fn args_value(&self) -> &N {
        &self.args_value
    }

    /// Coefficient of a variable in the atom, if it occurs.
    #[must_use]
    pub fn coeff_of(&self, v: ArithVar) -> Option<&N> {
        self.args.iter().find(|(_, w)| *w == v).map(|(c, _)| c)
    }

    /// Distance to the desired truth value at the cached evaluation.
    /// `sign` is the polarity the Boolean assignment requests: `false`
    /// wants the atom true. Zero exactly when the atom already agrees.
    pub fn dtt(&self, sign: bool) -> Result<N> {
        self.dtt_at(sign, &self.args_value)
    }

    /// Distance to the desired truth value at an explicit evaluation of the
    /// linear part. Linear in `args`.
    pub fn dtt_at(&self, sign: bool, args: &N) -> Result<N> {
        let zero = N::zero();
        let total = args.add(&self.coeff)?;
        Ok(match self.op {
            IneqKind::Le => {
                if sign {
                    if total <= zero {
                        total.neg()?.add(&N::one())?
                    } else {
                        zero
                    }
                } else if total <= zero {
                    zero
                } else {
                    total
                }
            }
            IneqKind::Eq => {
                if sign {
                    if total.is_zero() {
                        N::one()
                    } else {
                        zero
                    }
                } else if total.is_zero() {
                    zero
                } else {
                    N::one()
                }
            }
            IneqKind::Lt => {
                if sign {
                    if total < zero {
                        total.neg()?
                    } else {
                        zero
                    }
                } else if total < zero {
                    zero
                } else {
                    total.add(&N::one())?
                }
            }
        })
    }

    /// Distance to truth if `v` moved from `old` to `new`. Returns one when
    /// `v` does not occur in the atom.
    pub fn dtt_with_var(&self, sign: bool, v: ArithVar, old: &N, new: &N) -> Result<N> {
        for (c, w) in &self.args {
            if *w == v {
                let adjusted = self.args_value.add(&c.mul(&new.sub(old)?)?)?;
                return self.dtt_at(sign, &adjusted);
            }
        }
        Ok(N::one())
    }

    /// Distance to truth if an occurrence with coefficient `coeff` moved
    /// from `old` to `new`.
    pub fn dtt_with_coeff(&self, sign: bool, coeff: &N, old: &N, new: &N) -> Result<N> {
        let adjusted = self.args_value.add(&coeff.mul(&new.sub(old)?)?)?;
        self.dtt_at(sign, &adjusted)
    }
}

impl<N: Num> fmt::Display for Ineq<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (c, v)) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, " + ")?;
            }
            write!(f, "{c} * v{v}")?;
        }
        if !self.coeff.is_zero() {
            write!(f, " + {}", self.coeff)?;
        }
        let op = match self.op {
            IneqKind::Le => "<=",
            IneqKind::Lt => "<",
            IneqKind::Eq => "==",
        };
        write!(f, " {op} 0 ({})", self.args_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use garnet_core::num::CheckedInt;
    use smallvec::smallvec;

    fn ineq(op: IneqKind, coeff: i64, args_value: i64) -> Ineq<CheckedInt> {
        Ineq {
            args: smallvec![(CheckedInt::from_i64(1), 0)],
            coeff: CheckedInt::from_i64(coeff),
            op,
            args_value: CheckedInt::from_i64(args_value),
            var_to_flip: None,
        }
    }

    #[test]
    fn truth_table() {
        // v + 0 <= 0 at v = 0 holds; at v = 1 it does not
        assert!(ineq(IneqKind::Le, 0, 0).is_true().unwrap());
        assert!(!ineq(IneqKind::Le, 0, 1).is_true().unwrap());
        // v < 0 at v = 0 does not hold
        assert!(!ineq(IneqKind::Lt, 0, 0).is_true().unwrap());
        assert!(ineq(IneqKind::Lt, 0, -1).is_true().unwrap());
        assert!(ineq(IneqKind::Eq, -3, 3).is_true().unwrap());
    }

    #[test]
    fn dtt_le() {
        let i = ineq(IneqKind::Le, 0, 5);
        // positive polarity: distance is the excess
        assert_eq!(i.dtt(false).unwrap(), CheckedInt::from_i64(5));
        // negative polarity: already violated, distance zero
        assert_eq!(i.dtt(true).unwrap(), CheckedInt::from_i64(0));

        let sat = ineq(IneqKind::Le, 0, -2);
        assert_eq!(sat.dtt(false).unwrap(), CheckedInt::from_i64(0));
        // to falsify: need to climb past zero, -total + 1
        assert_eq!(sat.dtt(true).unwrap(), CheckedInt::from_i64(3));
    }

    #[test]
    fn dtt_lt() {
        let i = ineq(IneqKind::Lt, 0, 0);
        assert_eq!(i.dtt(false).unwrap(), CheckedInt::from_i64(1));
        assert_eq!(i.dtt(true).unwrap(), CheckedInt::from_i64(0));
        let sat = ineq(IneqKind::Lt, 0, -4);
        assert_eq!(sat.dtt(false).unwrap(), CheckedInt::from_i64(0));
        assert_eq!(sat.dtt(true).unwrap(), CheckedInt::from_i64(4));
    }

    #[test]
    fn dtt_eq_is_indicator() {
        let off = ineq(IneqKind::Eq, 0, 7);
        assert_eq!(off.dtt(false).unwrap(), CheckedInt::from_i64(1));
        assert_eq!(off.dtt(true).unwrap(), CheckedInt::from_i64(0));
        let on = ineq(IneqKind::Eq, -7, 7);
        assert_eq!(on.dtt(false).unwrap(), CheckedInt::from_i64(0));
        assert_eq!(on.dtt(true).unwrap(), CheckedInt::from_i64(1));
    }

    #[test]
    fn dtt_zero_iff_agrees() {
        for op in [IneqKind::Le, IneqKind::Lt, IneqKind::Eq] {
            for av in -3..=3 {
                let i = ineq(op, 0, av);
                let t = i.is_true().unwrap();
                assert_eq!(i.dtt(false).unwrap().is_zero(), t);
                assert_eq!(i.dtt(true).unwrap().is_zero(), !t);
            }
        }
    }
}

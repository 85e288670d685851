//! Numeric Capability for the Arithmetic Core.
//!
//! The SLS arithmetic engine is generic over an exact numeric type. Two
//! instantiations are provided:
//!
//! - [`CheckedInt`]: a checked 64-bit integer. Any operation that leaves the
//!   representable range reports [`Error::Overflow`], aborting the current
//!   repair attempt so the host can fall back to arbitrary precision.
//! - [`Rational`]: an arbitrary-precision rational built on
//!   `num-rational`/`num-bigint`. Its operations never fail.
//!
//! All arithmetic is exact; there is no floating point in the engine itself.

use crate::error::{Error, Result};
use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{Signed, ToPrimitive, Zero};
use std::fmt;

/// Exact arithmetic as consumed by the SLS engine.
///
/// `div_floor`, `mod_euclid`, `gcd`, `gcd_ext`, `divides` and `sqrt_floor`
/// are only invoked on integral values; `div_real` is exact division for the
/// rational instantiation and truncating division for the checked one.
pub trait Num: Clone + Eq + Ord + fmt::Debug + fmt::Display {
    /// The additive identity.
    fn zero() -> Self;
    /// The multiplicative identity.
    fn one() -> Self;
    /// Inject a machine integer.
    fn from_i64(n: i64) -> Self;
    /// Convert from an AST numeral. The checked instantiation rejects
    /// numerals that are not integers fitting 64 bits.
    fn from_numeral(r: &BigRational) -> Result<Self>;
    /// Convert back to an AST numeral.
    fn to_numeral(&self) -> BigRational;

    /// `self + other`.
    fn add(&self, other: &Self) -> Result<Self>;
    /// `self - other`.
    fn sub(&self, other: &Self) -> Result<Self>;
    /// `self * other`.
    fn mul(&self, other: &Self) -> Result<Self>;
    /// `-self`.
    fn neg(&self) -> Result<Self>;
    /// Magnitude.
    fn abs(&self) -> Result<Self>;

    /// Real division (exact for rationals, truncating for checked integers).
    /// The divisor must be non-zero.
    fn div_real(&self, other: &Self) -> Result<Self>;
    /// Floor division. The divisor must be non-zero.
    fn div_floor(&self, other: &Self) -> Result<Self>;
    /// Mathematical modulus with result in `[0, |other|)`. The divisor must
    /// be non-zero.
    fn mod_euclid(&self, other: &Self) -> Result<Self>;
    /// Truncated remainder; the sign follows the dividend. The divisor must
    /// be non-zero.
    fn rem_trunc(&self, other: &Self) -> Result<Self>;

    /// Does `self` divide `other` exactly? `false` when `self` is zero.
    fn divides(&self, other: &Self) -> bool;
    /// Greatest common divisor (non-negative).
    fn gcd(&self, other: &Self) -> Self;
    /// Extended Euclid: `(g, x, y)` with `self * x + other * y == g` and
    /// `g == gcd(self, other) >= 0`.
    fn gcd_ext(&self, other: &Self) -> Result<(Self, Self, Self)>;

    /// Is this value an integer?
    fn is_integral(&self) -> bool;
    /// Is this value negative?
    fn is_negative(&self) -> bool;
    /// Is this value zero?
    fn is_zero(&self) -> bool;
    /// Lossy conversion for scoring.
    fn to_f64(&self) -> f64;

    /// Floor of the square root, by Newton iteration. Requires a
    /// non-negative integral receiver.
    fn sqrt_floor(&self) -> Result<Self> {
        let one = Self::one();
        if *self <= one {
            return Ok(self.clone());
        }
        let two = Self::from_i64(2);
        let mut x0 = self.div_floor(&two)?;
        let mut x1 = x0.add(&self.div_floor(&x0)?)?.div_floor(&two)?;
        while x1 < x0 {
            x0 = x1.clone();
            x1 = x0.add(&self.div_floor(&x0)?)?.div_floor(&two)?;
        }
        Ok(x0)
    }
}

/// Factor a non-negative value into primes by trial division: 2, 3 and 5
/// first, then a 2-3-5 wheel bounded to a few steps. The final cofactor is
/// kept as-is, so the result is a partial factorization for large inputs.
pub fn factor<N: Num>(n: &N) -> Result<Vec<N>> {
    let mut n = n.clone();
    let mut out = Vec::new();
    if n.is_zero() {
        return Ok(out);
    }
    for d in [2i64, 3, 5] {
        let d = N::from_i64(d);
        while n.mod_euclid(&d)?.is_zero() {
            out.push(d.clone());
            n = n.div_floor(&d)?;
        }
    }
    const INCREMENTS: [i64; 8] = [4, 2, 4, 2, 4, 6, 2, 6];
    let mut d = N::from_i64(7);
    let mut i = 0;
    let mut steps = 0;
    while d.mul(&d)? <= n && steps < 3 {
        while n.mod_euclid(&d)?.is_zero() {
            out.push(d.clone());
            n = n.div_floor(&d)?;
        }
        d = d.add(&N::from_i64(INCREMENTS[i]))?;
        i = (i + 1) % INCREMENTS.len();
        steps += 1;
    }
    if n > N::one() {
        out.push(n);
    }
    Ok(out)
}

/// Checked 64-bit integer. Overflow is an error, never a wrap or a panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CheckedInt(i64);

impl CheckedInt {
    /// Wrap a machine integer.
    #[must_use]
    pub const fn new(n: i64) -> Self {
        Self(n)
    }

    /// Unwrap to a machine integer.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for CheckedInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Num for CheckedInt {
    fn zero() -> Self {
        Self(0)
    }

    fn one() -> Self {
        Self(1)
    }

    fn from_i64(n: i64) -> Self {
        Self(n)
    }

    fn from_numeral(r: &BigRational) -> Result<Self> {
        if !r.is_integer() {
            return Err(Error::Overflow);
        }
        r.to_integer().to_i64().map(Self).ok_or(Error::Overflow)
    }

    fn to_numeral(&self) -> BigRational {
        BigRational::from_integer(BigInt::from(self.0))
    }

    fn add(&self, other: &Self) -> Result<Self> {
        self.0.checked_add(other.0).map(Self).ok_or(Error::Overflow)
    }

    fn sub(&self, other: &Self) -> Result<Self> {
        self.0.checked_sub(other.0).map(Self).ok_or(Error::Overflow)
    }

    fn mul(&self, other: &Self) -> Result<Self> {
        self.0.checked_mul(other.0).map(Self).ok_or(Error::Overflow)
    }

    fn neg(&self) -> Result<Self> {
        self.0.checked_neg().map(Self).ok_or(Error::Overflow)
    }

    fn abs(&self) -> Result<Self> {
        self.0.checked_abs().map(Self).ok_or(Error::Overflow)
    }

    fn div_real(&self, other: &Self) -> Result<Self> {
        self.0.checked_div(other.0).map(Self).ok_or(Error::Overflow)
    }

    fn div_floor(&self, other: &Self) -> Result<Self> {
        if other.0 == 0 {
            return Err(Error::InvalidTerm("division by zero"));
        }
        let q = self.0.checked_div(other.0).ok_or(Error::Overflow)?;
        let r = self.0 % other.0;
        if r != 0 && (r < 0) != (other.0 < 0) {
            Ok(Self(q - 1))
        } else {
            Ok(Self(q))
        }
    }

    fn mod_euclid(&self, other: &Self) -> Result<Self> {
        self.0
            .checked_rem_euclid(other.0)
            .map(Self)
            .ok_or(Error::Overflow)
    }

    fn rem_trunc(&self, other: &Self) -> Result<Self> {
        self.0.checked_rem(other.0).map(Self).ok_or(Error::Overflow)
    }

    fn divides(&self, other: &Self) -> bool {
        self.0 != 0 && other.0 % self.0 == 0
    }

    fn gcd(&self, other: &Self) -> Self {
        Self(self.0.gcd(&other.0))
    }

    fn gcd_ext(&self, other: &Self) -> Result<(Self, Self, Self)> {
        // Work in i128 so the Bezout updates cannot overflow mid-loop.
        let (mut old_r, mut r) = (i128::from(self.0), i128::from(other.0));
        let (mut old_s, mut s) = (1i128, 0i128);
        let (mut old_t, mut t) = (0i128, 1i128);
        while r != 0 {
            let q = old_r / r;
            (old_r, r) = (r, old_r - q * r);
            (old_s, s) = (s, old_s - q * s);
            (old_t, t) = (t, old_t - q * t);
        }
        if old_r < 0 {
            old_r = -old_r;
            old_s = -old_s;
            old_t = -old_t;
        }
        let narrow = |x: i128| i64::try_from(x).map(Self).map_err(|_| Error::Overflow);
        Ok((narrow(old_r)?, narrow(old_s)?, narrow(old_t)?))
    }

    fn is_integral(&self) -> bool {
        true
    }

    fn is_negative(&self) -> bool {
        self.0 < 0
    }

    fn is_zero(&self) -> bool {
        self.0 == 0
    }

    fn to_f64(&self) -> f64 {
        self.0 as f64
    }
}

/// Arbitrary-precision rational.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rational(BigRational);

impl Rational {
    /// Wrap a `BigRational`.
    #[must_use]
    pub const fn new(r: BigRational) -> Self {
        Self(r)
    }

    /// Borrow the underlying rational.
    #[must_use]
    pub const fn inner(&self) -> &BigRational {
        &self.0
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Num for Rational {
    fn zero() -> Self {
        Self(BigRational::zero())
    }

    fn one() -> Self {
        Self(BigRational::from_integer(BigInt::from(1)))
    }

    fn from_i64(n: i64) -> Self {
        Self(BigRational::from_integer(BigInt::from(n)))
    }

    fn from_numeral(r: &BigRational) -> Result<Self> {
        Ok(Self(r.clone()))
    }

    fn to_numeral(&self) -> BigRational {
        self.0.clone()
    }

    fn add(&self, other: &Self) -> Result<Self> {
        Ok(Self(&self.0 + &other.0))
    }

    fn sub(&self, other: &Self) -> Result<Self> {
        Ok(Self(&self.0 - &other.0))
    }

    fn mul(&self, other: &Self) -> Result<Self> {
        Ok(Self(&self.0 * &other.0))
    }

    fn neg(&self) -> Result<Self> {
        Ok(Self(-&self.0))
    }

    fn abs(&self) -> Result<Self> {
        Ok(Self(self.0.abs()))
    }

    fn div_real(&self, other: &Self) -> Result<Self> {
        if other.0.is_zero() {
            return Err(Error::InvalidTerm("division by zero"));
        }
        Ok(Self(&self.0 / &other.0))
    }

    fn div_floor(&self, other: &Self) -> Result<Self> {
        if other.0.is_zero() {
            return Err(Error::InvalidTerm("division by zero"));
        }
        Ok(Self((&self.0 / &other.0).floor()))
    }

    fn mod_euclid(&self, other: &Self) -> Result<Self> {
        if other.0.is_zero() {
            return Err(Error::InvalidTerm("division by zero"));
        }
        let m = other.0.abs();
        let q = (&self.0 / &m).floor();
        Ok(Self(&self.0 - m * q))
    }

    fn rem_trunc(&self, other: &Self) -> Result<Self> {
        if other.0.is_zero() {
            return Err(Error::InvalidTerm("division by zero"));
        }
        let q = (&self.0 / &other.0).trunc();
        Ok(Self(&self.0 - &other.0 * q))
    }

    fn divides(&self, other: &Self) -> bool {
        !self.0.is_zero() && (&other.0 / &self.0).is_integer()
    }

    fn gcd(&self, other: &Self) -> Self {
        debug_assert!(self.0.is_integer() && other.0.is_integer());
        let g = self.0.to_integer().gcd(&other.0.to_integer());
        Self(BigRational::from_integer(g))
    }

    fn gcd_ext(&self, other: &Self) -> Result<(Self, Self, Self)> {
        debug_assert!(self.0.is_integer() && other.0.is_integer());
        let (mut old_r, mut r) = (self.0.to_integer(), other.0.to_integer());
        let (mut old_s, mut s) = (BigInt::from(1), BigInt::from(0));
        let (mut old_t, mut t) = (BigInt::from(0), BigInt::from(1));
        while !r.is_zero() {
            let q = &old_r / &r;
            let next_r = &old_r - &q * &r;
            let next_s = &old_s - &q * &s;
            let next_t = &old_t - &q * &t;
            old_r = std::mem::replace(&mut r, next_r);
            old_s = std::mem::replace(&mut s, next_s);
            old_t = std::mem::replace(&mut t, next_t);
        }
        if old_r.is_negative() {
            old_r = -old_r;
            old_s = -old_s;
            old_t = -old_t;
        }
        let wrap = |x: BigInt| Self(BigRational::from_integer(x));
        Ok((wrap(old_r), wrap(old_s), wrap(old_t)))
    }

    fn is_integral(&self) -> bool {
        self.0.is_integer()
    }

    fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or(f64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_overflow() {
        let max = CheckedInt::from_i64(i64::MAX);
        assert_eq!(max.add(&CheckedInt::one()), Err(Error::Overflow));
        assert_eq!(max.mul(&CheckedInt::from_i64(2)), Err(Error::Overflow));
        assert!(CheckedInt::from_i64(i64::MIN).neg().is_err());
    }

    #[test]
    fn floor_division() {
        let n = CheckedInt::from_i64(-7);
        let d = CheckedInt::from_i64(2);
        assert_eq!(n.div_floor(&d).unwrap(), CheckedInt::from_i64(-4));
        assert_eq!(
            CheckedInt::from_i64(7)
                .div_floor(&CheckedInt::from_i64(-2))
                .unwrap(),
            CheckedInt::from_i64(-4)
        );
        assert_eq!(n.mod_euclid(&d).unwrap(), CheckedInt::from_i64(1));
    }

    #[test]
    fn bezout() {
        let (g, x, y) = CheckedInt::from_i64(3)
            .gcd_ext(&CheckedInt::from_i64(5))
            .unwrap();
        assert_eq!(g, CheckedInt::one());
        assert_eq!(
            3 * x.get() + 5 * y.get(),
            1,
            "3*{} + 5*{} should be 1",
            x.get(),
            y.get()
        );

        let (g, x, y) = CheckedInt::from_i64(-12)
            .gcd_ext(&CheckedInt::from_i64(18))
            .unwrap();
        assert_eq!(g, CheckedInt::from_i64(6));
        assert_eq!(-12 * x.get() + 18 * y.get(), 6);
    }

    #[test]
    fn sqrt_newton() {
        for (n, r) in [(0, 0), (1, 1), (2, 1), (3, 1), (4, 2), (35, 5), (36, 6)] {
            assert_eq!(
                CheckedInt::from_i64(n).sqrt_floor().unwrap(),
                CheckedInt::from_i64(r)
            );
        }
    }

    #[test]
    fn trial_factor() {
        let fs = factor(&CheckedInt::from_i64(60)).unwrap();
        let mut prod = CheckedInt::one();
        for f in &fs {
            prod = prod.mul(f).unwrap();
        }
        assert_eq!(prod, CheckedInt::from_i64(60));
        assert!(fs.contains(&CheckedInt::from_i64(5)));
    }

    #[test]
    fn rational_mod() {
        let a = Rational::from_i64(-7);
        let b = Rational::from_i64(-3);
        let m = a.mod_euclid(&b).unwrap();
        // result in [0, |b|)
        assert_eq!(m, Rational::from_i64(2));
        assert_eq!(
            a.rem_trunc(&Rational::from_i64(3)).unwrap(),
            Rational::from_i64(-1)
        );
    }
}

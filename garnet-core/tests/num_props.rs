//! Property tests for the numeric capability.

use garnet_core::num::{CheckedInt, Num, Rational};
use proptest::prelude::*;

proptest! {
    /// Floor division and euclidean modulus agree: the modulus lies in
    /// [0, |b|) and b divides a - mod(a, b).
    #[test]
    fn mod_euclid_in_range(a in -1_000_000i64..1_000_000, b in 1i64..1000) {
        for b in [b, -b] {
            let m = CheckedInt::from_i64(a)
                .mod_euclid(&CheckedInt::from_i64(b))
                .unwrap()
                .get();
            prop_assert!(0 <= m && m < b.abs());
            prop_assert_eq!((a - m) % b, 0);
        }
    }

    /// div_floor really floors.
    #[test]
    fn div_floor_is_floor(a in -1_000_000i64..1_000_000, b in 1i64..1000) {
        for b in [b, -b] {
            let q = CheckedInt::from_i64(a)
                .div_floor(&CheckedInt::from_i64(b))
                .unwrap()
                .get();
            // exact for these magnitudes
            let f = (a as f64 / b as f64).floor() as i64;
            prop_assert_eq!(q, f);
        }
    }

    /// Extended gcd returns Bezout coefficients for both instantiations.
    #[test]
    fn gcd_ext_is_bezout(a in -100_000i64..100_000, b in -100_000i64..100_000) {
        let (g, x, y) = CheckedInt::from_i64(a)
            .gcd_ext(&CheckedInt::from_i64(b))
            .unwrap();
        prop_assert_eq!(a * x.get() + b * y.get(), g.get());
        prop_assert!(g.get() >= 0);

        let (g2, x2, y2) = Rational::from_i64(a).gcd_ext(&Rational::from_i64(b)).unwrap();
        let lhs = Rational::from_i64(a)
            .mul(&x2)
            .unwrap()
            .add(&Rational::from_i64(b).mul(&y2).unwrap())
            .unwrap();
        prop_assert_eq!(lhs, g2.clone());
        prop_assert_eq!(g2, Rational::from_i64(g.get()));
    }

    /// The two instantiations compute the same floor quotients on the
    /// shared domain.
    #[test]
    fn instantiations_agree(a in -10_000i64..10_000, b in 1i64..100) {
        let ci = CheckedInt::from_i64(a)
            .div_floor(&CheckedInt::from_i64(b))
            .unwrap();
        let ra = Rational::from_i64(a)
            .div_floor(&Rational::from_i64(b))
            .unwrap();
        prop_assert_eq!(ra, Rational::from_i64(ci.get()));
    }
}

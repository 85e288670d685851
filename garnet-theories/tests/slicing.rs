//! Scenario and law tests for the slicing layer.

use garnet_core::literal::Lit;
use garnet_theories::{Dep, Slicing};
use num_bigint::BigUint;
use proptest::prelude::*;

/// S6: 8-bit a, b with a[7:4] = b[3:0]. The inner slices a[6:5] and b[2:1]
/// land in the same equivalence class.
#[test]
fn slice_equality_propagates_through_splits() {
    let mut s = Slicing::new();
    let a = s.add_var(8);
    let b = s.add_var(8);
    let a_hi = s.mk_extract(a, 7, 4).unwrap();
    let b_lo = s.mk_extract(b, 3, 0).unwrap();
    let lit = Lit::positive(0);
    assert!(s.assert_equal(a_hi, b_lo, lit).unwrap());
    assert!(!s.is_conflict());

    let p = s.mk_extract(a, 6, 5).unwrap();
    let q = s.mk_extract(b, 2, 1).unwrap();
    assert!(s.is_equal(p, q), "a[6:5] and b[2:1] must be equal");

    let mut deps = Vec::new();
    s.explain_equal(p, q, &mut deps);
    assert!(deps.contains(&Dep::Lit(lit)), "explanation names the literal");
}

/// Extract composition: (v[h:l])[h':l'] = v[l+h' : l+l'].
#[test]
fn extract_composition() {
    let mut s = Slicing::new();
    let v = s.add_var(8);
    let inner = s.mk_extract(v, 6, 1).unwrap();
    let left = s.mk_extract(inner, 3, 2).unwrap();
    let right = s.mk_extract(v, 1 + 3, 1 + 2).unwrap();
    assert_eq!(left, right);
}

proptest! {
    /// The composition law over arbitrary in-range cuts.
    #[test]
    fn extract_composition_holds(
        (h, l, h2, l2) in (0u32..16, 0u32..16, 0u32..16, 0u32..16).prop_filter(
            "ranges must nest",
            |&(h, l, h2, l2)| l <= h && h < 16 && l2 <= h2 && h2 <= h - l,
        )
    ) {
        let mut s = Slicing::new();
        let v = s.add_var(16);
        let inner = s.mk_extract(v, h, l).unwrap();
        let left = s.mk_extract(inner, h2, l2).unwrap();
        let right = s.mk_extract(v, l + h2, l + l2).unwrap();
        prop_assert_eq!(left, right);
    }
}

/// Extracting the low end of a concat returns the original variable.
#[test]
fn concat_extract_low_end() {
    let mut s = Slicing::new();
    let x = s.add_var(4);
    let y = s.add_var(4);
    let c = s.mk_concat(&[x, y]).unwrap();
    assert_eq!(s.var_width(c), 8);
    assert_eq!(s.mk_extract(c, 3, 0).unwrap(), y);
    assert_eq!(s.mk_extract(c, 7, 4).unwrap(), x);
}

/// Two variables with pairwise-equal halves become equal after congruence
/// propagation; explanations carry both literals.
#[test]
fn congruence_equates_decomposed_variables() {
    let mut s = Slicing::new();
    let a = s.add_var(8);
    let b = s.add_var(8);
    let a_hi = s.mk_extract(a, 7, 4).unwrap();
    let a_lo = s.mk_extract(a, 3, 0).unwrap();
    let b_hi = s.mk_extract(b, 7, 4).unwrap();
    let b_lo = s.mk_extract(b, 3, 0).unwrap();
    let l1 = Lit::positive(10);
    let l2 = Lit::positive(11);
    assert!(s.assert_equal(a_hi, b_hi, l1).unwrap());
    assert!(s.assert_equal(a_lo, b_lo, l2).unwrap());
    assert!(s.propagate());
    assert!(!s.is_conflict());
    assert!(s.is_equal(a, b));

    let mut deps = Vec::new();
    s.explain_equal(a, b, &mut deps);
    assert!(deps.contains(&Dep::Lit(l1)));
    assert!(deps.contains(&Dep::Lit(l2)));
}

/// Conflicting values on overlapping slices are detected and explained.
#[test]
fn value_clash_is_a_conflict() {
    let mut s = Slicing::new();
    let a = s.add_var(8);
    let b = s.add_var(8);
    let a_hi = s.mk_extract(a, 7, 4).unwrap();
    let b_lo = s.mk_extract(b, 3, 0).unwrap();
    let lit = Lit::positive(2);
    assert!(s.assert_equal(a_hi, b_lo, lit).unwrap());

    // a[7:4] = 0xA but b[3:0] = 0xB
    assert!(s.add_value(a, &BigUint::from(0xA5u32)));
    assert!(!s.add_value(b, &BigUint::from(0x5Bu32)));
    assert!(s.is_conflict());
    let deps = s.explain();
    assert!(deps.contains(&Dep::Lit(lit)), "conflict blames the equation");
    assert!(
        deps.iter().any(|d| matches!(d, Dep::VarIdx(_))),
        "conflict blames a value assignment"
    );
}

/// A tracked disequality fires when its sides are forced together.
#[test]
fn disequality_conflict() {
    let mut s = Slicing::new();
    let a = s.add_var(4);
    let b = s.add_var(4);
    let ne = Lit::negative(5);
    s.assert_diseq(a, b, ne);
    assert!(!s.is_conflict());
    let eq = Lit::positive(6);
    let _ = s.assert_equal(a, b, eq);
    assert!(s.is_conflict());
    let deps = s.explain();
    assert!(deps.contains(&Dep::Lit(ne)));
    assert!(deps.contains(&Dep::Lit(eq)));
}

/// collect_fixed folds the values of base slices into a mask/value pair.
#[test]
fn collect_fixed_partial_mask() {
    let mut s = Slicing::new();
    let v = s.add_var(8);
    let hi = s.mk_extract(v, 7, 4).unwrap();
    let _lo = s.mk_extract(v, 3, 0).unwrap();
    assert!(s.add_value(hi, &BigUint::from(0x9u32)));
    let (mask, value) = s.collect_fixed(v);
    assert_eq!(mask, BigUint::from(0xF0u32));
    assert_eq!(value, BigUint::from(0x90u32));
}

/// Simple overlaps list the variables aligned at bit zero.
#[test]
fn simple_overlaps_walk_low_slices() {
    let mut s = Slicing::new();
    let v = s.add_var(8);
    let low4 = s.mk_extract(v, 3, 0).unwrap();
    let low2 = s.mk_extract(v, 1, 0).unwrap();
    let over = s.collect_simple_overlaps(v);
    assert!(over.contains(&v));
    assert!(over.contains(&low4));
    assert!(over.contains(&low2));
}

/// Scope pops unwind equalities.
#[test]
fn scope_pop_unwinds_equalities() {
    let mut s = Slicing::new();
    let a = s.add_var(4);
    let b = s.add_var(4);
    s.push_scope();
    assert!(s.assert_equal(a, b, Lit::positive(1)).unwrap());
    assert!(s.is_equal(a, b));
    s.pop_scope();
    assert!(!s.is_equal(a, b));
}

//! End-to-end tests for the bit-vector plugin.

use garnet_core::ast::{Sort, TermKind, TermManager};
use garnet_core::context::{Context, SimpleContext};
use garnet_core::plugin::Plugin;
use garnet_theories::BvCore;
use num_bigint::BigUint;

fn bv_value(tm: &TermManager, t: garnet_core::ast::TermId) -> BigUint {
    match tm.kind(t) {
        TermKind::BvNum(k) => k.clone(),
        other => panic!("expected bit-vector numeral, got {other:?}"),
    }
}

/// Asserting v >= 5 and v <= 5 pins the value; the singleton flows into
/// the slice layer and becomes visible as fixed bits.
#[test]
fn singleton_fixes_value_end_to_end() {
    let mut tm = TermManager::new();
    let mut ctx = SimpleContext::new(17);
    let v = tm.mk_var("v", Sort::BitVec(4));
    let five = tm.mk_bv(BigUint::from(5u32), 4);
    let ge = tm.mk_bv_ule(five, v);
    let le = tm.mk_bv_ule(v, five);
    let l1 = ctx.mk_literal(ge);
    let l2 = ctx.mk_literal(le);
    ctx.add_clause(&[l1]);
    ctx.add_clause(&[l2]);

    let mut core = BvCore::new();
    core.register_term(&tm, &mut ctx, v).unwrap();
    core.register_term(&tm, &mut ctx, ge).unwrap();
    core.register_term(&tm, &mut ctx, le).unwrap();

    ctx.assign(l1.var(), true);
    ctx.assign(l2.var(), true);
    core.propagate_literal(&mut ctx, l1).unwrap();
    core.propagate_literal(&mut ctx, l2).unwrap();
    assert!(ctx.conflict().is_none());
    assert!(core.is_sat(&ctx));

    let gv = <BvCore as garnet_core::plugin::Plugin<SimpleContext>>::get_value(&mut core, &mut tm, v).unwrap();
    let val = bv_value(&tm, gv);
    assert_eq!(val, BigUint::from(5u32));

    // the singleton reached the slicing layer
    let pv = core.pvar_of(v).unwrap();
    let (mask, value) = core.slicing().collect_fixed(pv);
    assert_eq!(mask, BigUint::from(0xFu32));
    assert_eq!(value, BigUint::from(5u32));
}

/// Contradictory bounds produce a conflict naming both literals.
#[test]
fn contradictory_bounds_conflict() {
    let mut tm = TermManager::new();
    let mut ctx = SimpleContext::new(23);
    let v = tm.mk_var("v", Sort::BitVec(4));
    let three = tm.mk_bv(BigUint::from(3u32), 4);
    let five = tm.mk_bv(BigUint::from(5u32), 4);
    let le = tm.mk_bv_ule(v, three);
    let ge = tm.mk_bv_ule(five, v);
    let l1 = ctx.mk_literal(le);
    let l2 = ctx.mk_literal(ge);
    ctx.add_clause(&[l1]);
    ctx.add_clause(&[l2]);

    let mut core = BvCore::new();
    core.register_term(&tm, &mut ctx, le).unwrap();
    core.register_term(&tm, &mut ctx, ge).unwrap();

    ctx.assign(l1.var(), true);
    ctx.assign(l2.var(), true);
    core.propagate_literal(&mut ctx, l1).unwrap();
    core.propagate_literal(&mut ctx, l2).unwrap();

    let conflict = ctx.conflict().expect("conflict reported");
    assert!(conflict.contains(&l1) && conflict.contains(&l2));
}

/// A negated comparison constrains the complement side.
#[test]
fn negated_comparison() {
    let mut tm = TermManager::new();
    let mut ctx = SimpleContext::new(29);
    let v = tm.mk_var("v", Sort::BitVec(4));
    let seven = tm.mk_bv(BigUint::from(7u32), 4);
    let le = tm.mk_bv_ule(v, seven);
    let lit = ctx.mk_literal(le);
    ctx.add_clause(&[lit.negate()]);

    let mut core = BvCore::new();
    core.register_term(&tm, &mut ctx, le).unwrap();
    // assert the negation: v > 7
    core.propagate_literal(&mut ctx, lit.negate()).unwrap();
    let gv = <BvCore as garnet_core::plugin::Plugin<SimpleContext>>::get_value(&mut core, &mut tm, v).unwrap();
    let val = bv_value(&tm, gv);
    assert!(val > BigUint::from(7u32), "got {val}");
}

/// Equalities between extractions go through the slice layer; a negated
/// equality over the same slices conflicts.
#[test]
fn slice_equations_through_the_plugin() {
    let mut tm = TermManager::new();
    let mut ctx = SimpleContext::new(31);
    let a = tm.mk_var("a", Sort::BitVec(8));
    let b = tm.mk_var("b", Sort::BitVec(8));
    let a_hi = tm.mk_bv_extract(7, 4, a);
    let b_lo = tm.mk_bv_extract(3, 0, b);
    let eq = tm.mk_eq(a_hi, b_lo);
    let leq = ctx.mk_literal(eq);
    ctx.add_clause(&[leq]);

    let mut core = BvCore::new();
    core.register_term(&tm, &mut ctx, a_hi).unwrap();
    core.register_term(&tm, &mut ctx, b_lo).unwrap();
    core.register_term(&tm, &mut ctx, eq).unwrap();

    ctx.assign(leq.var(), true);
    core.propagate_literal(&mut ctx, leq).unwrap();
    assert!(ctx.conflict().is_none());

    let pa = core.pvar_of(a_hi).unwrap();
    let pb = core.pvar_of(b_lo).unwrap();
    assert!(core.slicing().is_equal(pa, pb));
}

/// Concatenation terms decompose into their argument slices.
#[test]
fn concat_registration() {
    let mut tm = TermManager::new();
    let mut ctx = SimpleContext::new(37);
    let x = tm.mk_var("x", Sort::BitVec(4));
    let y = tm.mk_var("y", Sort::BitVec(4));
    let c = tm.mk_bv_concat(vec![x, y]);
    let c_lo = tm.mk_bv_extract(3, 0, c);

    let mut core = BvCore::new();
    core.register_term(&tm, &mut ctx, c_lo).unwrap();
    let py = core.pvar_of(y);
    let plo = core.pvar_of(c_lo);
    assert!(py.is_some());
    assert_eq!(py, plo, "low half of the concat is y itself");
}

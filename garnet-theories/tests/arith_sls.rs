//! Scenario and law tests for the SLS arithmetic core.

use garnet_core::ast::{Sort, TermKind, TermManager};
use garnet_core::context::{Context, SimpleContext};
use garnet_core::num::{CheckedInt, Rational};
use garnet_core::plugin::Plugin;
use garnet_theories::{ArithConfig, ArithSls};
use num_bigint::BigInt;
use num_rational::BigRational;

fn numeral(tm: &TermManager, t: garnet_core::ast::TermId) -> BigRational {
    match tm.kind(t) {
        TermKind::Numeral(r) => r.clone(),
        other => panic!("expected numeral, got {other:?}"),
    }
}

fn value_of<N: garnet_core::num::Num>(
    sls: &mut ArithSls<N>,
    tm: &mut TermManager,
    t: garnet_core::ast::TermId,
) -> BigRational {
    let id = <ArithSls<N> as Plugin<SimpleContext>>::get_value(sls, tm, t).unwrap();
    numeral(tm, id)
}

fn int(n: i64) -> BigRational {
    BigRational::from_integer(BigInt::from(n))
}

/// S1: x = 3, y = 1, clause {x <= y}. After asserting the literal the core
/// must produce an assignment with x <= y.
#[test]
fn le_repair_restores_order() {
    let mut tm = TermManager::new();
    let mut ctx = SimpleContext::new(0xfeed);
    let x = tm.mk_var("x", Sort::Int);
    let y = tm.mk_var("y", Sort::Int);
    let le = tm.mk_le(x, y);
    let lit = ctx.mk_literal(le);
    ctx.add_clause(&[lit]);

    let mut sls: ArithSls<CheckedInt> = ArithSls::new();
    sls.register_term(&tm, &mut ctx, le).unwrap();
    let three = tm.mk_int(3);
    let one = tm.mk_int(1);
    sls.set_value(&tm, &mut ctx, x, three).unwrap();
    sls.set_value(&tm, &mut ctx, y, one).unwrap();

    ctx.assign(lit.var(), true);
    sls.propagate_literal(&mut ctx, lit).unwrap();

    let vx = value_of(&mut sls, &mut tm, x);
    let vy = value_of(&mut sls, &mut tm, y);
    assert!(vx <= vy, "expected x <= y, got {vx} > {vy}");
    assert!(sls.is_sat(&ctx));
}

/// S2: 3x + 5y = 1 from x = y = 0. The pair-equation solver computes a
/// Bezout solution within the growth limit.
#[test]
fn eq_repair_solves_pair_equation() {
    let mut tm = TermManager::new();
    let mut ctx = SimpleContext::new(7);
    let x = tm.mk_var("x", Sort::Int);
    let y = tm.mk_var("y", Sort::Int);
    let three = tm.mk_int(3);
    let five = tm.mk_int(5);
    let one = tm.mk_int(1);
    let tx = tm.mk_mul(vec![three, x]);
    let ty = tm.mk_mul(vec![five, y]);
    let sum = tm.mk_add(vec![tx, ty]);
    let eq = tm.mk_eq(sum, one);
    let lit = ctx.mk_literal(eq);
    ctx.add_clause(&[lit]);

    // force the pair solver so the test does not depend on the 10% rate
    let config = ArithConfig {
        eq_pair_solve_percent: 100,
        ..ArithConfig::default()
    };
    let mut sls: ArithSls<CheckedInt> = ArithSls::with_config(config);
    sls.register_term(&tm, &mut ctx, eq).unwrap();

    ctx.assign(lit.var(), true);
    sls.propagate_literal(&mut ctx, lit).unwrap();

    let vx = value_of(&mut sls, &mut tm, x);
    let vy = value_of(&mut sls, &mut tm, y);
    assert_eq!(
        int(3) * &vx + int(5) * &vy,
        int(1),
        "3*{vx} + 5*{vy} should equal 1"
    );
    assert!(sls.is_sat(&ctx));
}

/// S3: w = x*y*z with x=2, y=3, z=5. Setting w to 60 and repairing down
/// must adjust the factors until the product is 60.
#[test]
fn mul_repair_adjusts_factor() {
    let mut tm = TermManager::new();
    let mut ctx = SimpleContext::new(99);
    let x = tm.mk_var("x", Sort::Int);
    let y = tm.mk_var("y", Sort::Int);
    let z = tm.mk_var("z", Sort::Int);
    let prod = tm.mk_mul(vec![x, y, z]);
    let sixty = tm.mk_int(60);
    let eq = tm.mk_eq(prod, sixty);
    let lit = ctx.mk_literal(eq);
    ctx.add_clause(&[lit]);

    let mut sls: ArithSls<CheckedInt> = ArithSls::new();
    sls.register_term(&tm, &mut ctx, eq).unwrap();
    let (two, three, five) = (tm.mk_int(2), tm.mk_int(3), tm.mk_int(5));
    sls.set_value(&tm, &mut ctx, x, two).unwrap();
    sls.set_value(&tm, &mut ctx, y, three).unwrap();
    sls.set_value(&tm, &mut ctx, z, five).unwrap();

    let mut solved = false;
    for _ in 0..64 {
        sls.set_value(&tm, &mut ctx, prod, sixty).unwrap();
        sls.repair_down(&mut ctx, prod).unwrap();
        let vx = value_of(&mut sls, &mut tm, x);
        let vy = value_of(&mut sls, &mut tm, y);
        let vz = value_of(&mut sls, &mut tm, z);
        if &vx * &vy * &vz == int(60) {
            solved = true;
            break;
        }
    }
    assert!(solved, "repair_down never reached a product of 60");
}

/// Law: updating a variable to its current value is a no-op.
#[test]
fn update_to_same_value_is_noop() {
    let mut tm = TermManager::new();
    let mut ctx = SimpleContext::new(5);
    let x = tm.mk_var("x", Sort::Int);
    let y = tm.mk_var("y", Sort::Int);
    let le = tm.mk_le(x, y);
    let _lit = ctx.mk_literal(le);
    let mut sls: ArithSls<CheckedInt> = ArithSls::new();
    sls.register_term(&tm, &mut ctx, le).unwrap();
    let five = tm.mk_int(5);
    sls.set_value(&tm, &mut ctx, x, five).unwrap();
    let flips = sls.stats().num_flips;
    sls.set_value(&tm, &mut ctx, x, five).unwrap();
    assert_eq!(sls.stats().num_flips, flips);
    assert_eq!(
        value_of(&mut sls, &mut tm, x),
        int(5)
    );
}

/// Law: structurally equal terms map to the same internal variable.
#[test]
fn mk_term_deduplicates() {
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", Sort::Int);
    let y = tm.mk_var("y", Sort::Int);
    let e = tm.mk_add(vec![x, y]);
    let mut sls: ArithSls<CheckedInt> = ArithSls::new();
    <ArithSls<CheckedInt> as Plugin<SimpleContext>>::get_value(&mut sls, &mut tm, e).unwrap();
    let n1 = sls.num_vars();
    <ArithSls<CheckedInt> as Plugin<SimpleContext>>::get_value(&mut sls, &mut tm, e).unwrap();
    assert_eq!(sls.num_vars(), n1);
}

/// Unit bounds flow into the variables, and the search loop settles into a
/// satisfying assignment.
#[test]
fn search_solves_bounded_variable() {
    let mut tm = TermManager::new();
    let mut ctx = SimpleContext::new(0xabcd);
    let x = tm.mk_var("x", Sort::Int);
    let three = tm.mk_int(3);
    let two = tm.mk_int(2);
    let le = tm.mk_le(x, three);
    let ge = tm.mk_ge(x, two);
    let l1 = ctx.mk_literal(le);
    let l2 = ctx.mk_literal(ge);
    ctx.add_clause(&[l1]);
    ctx.add_clause(&[l2]);

    let mut sls: ArithSls<CheckedInt> = ArithSls::new();
    sls.register_term(&tm, &mut ctx, le).unwrap();
    sls.register_term(&tm, &mut ctx, ge).unwrap();
    sls.initialize(&mut tm, &mut ctx).unwrap();
    assert!(sls.search(&mut ctx).unwrap());
    let vx = value_of(&mut sls, &mut tm, x);
    assert!(vx >= int(2) && vx <= int(3), "x = {vx} outside [2, 3]");
}

/// The arbitrary-precision instantiation handles coefficients the checked
/// engine rejects.
#[test]
fn rational_instantiation_handles_reals() {
    let mut tm = TermManager::new();
    let mut ctx = SimpleContext::new(21);
    let x = tm.mk_var("x", Sort::Real);
    let y = tm.mk_var("y", Sort::Real);
    let lt = tm.mk_lt(x, y);
    let lit = ctx.mk_literal(lt);
    ctx.add_clause(&[lit]);

    let mut sls: ArithSls<Rational> = ArithSls::new();
    sls.register_term(&tm, &mut ctx, lt).unwrap();
    let four = tm.mk_int(4);
    sls.set_value(&tm, &mut ctx, x, four).unwrap();

    ctx.assign(lit.var(), true);
    sls.propagate_literal(&mut ctx, lit).unwrap();
    let vx = value_of(&mut sls, &mut tm, x);
    let vy = value_of(&mut sls, &mut tm, y);
    assert!(vx < vy, "expected x < y, got {vx} >= {vy}");
}

/// repair_literal aligns the Boolean assignment with the atom's truth
/// value without touching the numeric state.
#[test]
fn repair_literal_syncs_assignment() {
    let mut tm = TermManager::new();
    let mut ctx = SimpleContext::new(11);
    let x = tm.mk_var("x", Sort::Int);
    let zero = tm.mk_int(0);
    let le = tm.mk_le(x, zero);
    let lit = ctx.mk_literal(le);
    let mut sls: ArithSls<CheckedInt> = ArithSls::new();
    sls.register_term(&tm, &mut ctx, le).unwrap();
    // x = 0 satisfies the atom, but the Boolean starts out false
    assert!(!ctx.is_true(lit));
    sls.repair_literal(&mut ctx, lit).unwrap();
    assert!(ctx.is_true(lit));
    assert_eq!(value_of(&mut sls, &mut tm, x), int(0));
}

/// on_restart re-synchronises every atom with the Boolean assignment.
#[test]
fn restart_resyncs_atoms() {
    let mut tm = TermManager::new();
    let mut ctx = SimpleContext::new(13);
    let x = tm.mk_var("x", Sort::Int);
    let zero = tm.mk_int(0);
    let le = tm.mk_le(x, zero);
    let lit = ctx.mk_literal(le);
    let mut sls: ArithSls<CheckedInt> = ArithSls::new();
    sls.register_term(&tm, &mut ctx, le).unwrap();
    // atom holds at x = 0 but the var is assigned false
    sls.on_restart(&mut ctx).unwrap();
    assert!(ctx.is_true(lit));
    sls.on_restart(&mut ctx).unwrap();
    assert!(ctx.is_true(lit), "restart must be idempotent");
}

/// Overflow in the checked instantiation surfaces as an error instead of
/// wrapping.
#[test]
fn checked_overflow_aborts_the_move() {
    let mut tm = TermManager::new();
    let mut ctx = SimpleContext::new(3);
    let x = tm.mk_var("x", Sort::Int);
    let big = tm.mk_int_big(BigInt::from(i64::MAX) * 4);
    let eq = tm.mk_eq(x, big);
    let _lit = ctx.mk_literal(eq);
    let mut sls: ArithSls<CheckedInt> = ArithSls::new();
    assert!(sls.register_term(&tm, &mut ctx, eq).is_err());
}

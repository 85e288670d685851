//! Axiom-shape tests for the datatype elaborator.

use garnet_core::ast::{Sort, TermManager};
use garnet_core::context::{Context, SimpleContext};
use garnet_core::literal::Lit;
use garnet_core::plugin::Plugin;
use garnet_theories::DatatypeAxioms;

fn list_sort(tm: &mut TermManager) -> Sort {
    tm.declare_datatype(
        "List",
        vec![
            ("nil".to_string(), vec![]),
            (
                "cons".to_string(),
                vec![
                    ("head".to_string(), Sort::Int),
                    ("tail".to_string(), Sort::Datatype(0)),
                ],
            ),
        ],
    )
}

/// A bare datatype constant gets recognizer coverage: at-least-one,
/// at-most-one, and the zero-arity iff for nil.
#[test]
fn recognizer_axioms_for_constant() {
    let mut tm = TermManager::new();
    let mut ctx = SimpleContext::new(1);
    let list = list_sort(&mut tm);
    let l = tm.mk_var("l", list);

    let mut dt = DatatypeAxioms::new();
    dt.register_term(&tm, &mut ctx, l).unwrap();
    dt.initialize(&mut tm, &mut ctx).unwrap();

    // at-least-one + at-most-one + nil-iff (two directions)
    assert_eq!(ctx.num_clauses(), 4);
    let sizes: Vec<usize> = ctx.clauses().iter().map(|c| c.lits.len()).collect();
    assert!(sizes.contains(&2), "binary recognizer clauses expected");
}

/// Constructor applications produce recognizer, accessor and sibling
/// negation clauses.
#[test]
fn constructor_axioms() {
    let mut tm = TermManager::new();
    let mut ctx = SimpleContext::new(2);
    let list = list_sort(&mut tm);
    let cons = tm.constructors(list)[1];
    let l = tm.mk_var("l", list);
    let one = tm.mk_int(1);
    let t = tm.mk_ctor(cons, vec![one, l]);

    let mut dt = DatatypeAxioms::new();
    dt.register_term(&tm, &mut ctx, t).unwrap();
    dt.initialize(&mut tm, &mut ctx).unwrap();

    // t contributes: is_cons(t), two accessor equations, not is_nil(t),
    // plus 4 recognizer-coverage clauses; l contributes 4 more. The unit
    // equation l = tail(t) additionally induces the path axiom l != t.
    assert_eq!(ctx.num_clauses(), 13);
    let units = ctx
        .clauses()
        .iter()
        .filter(|c| c.lits.len() == 1)
        .count();
    assert_eq!(units, 5);
}

/// Accessor chains over a recursive sort yield guarded path axioms
/// `-guard \/ s != t`.
#[test]
fn path_axioms_for_recursive_accessors() {
    let mut tm = TermManager::new();
    let mut ctx = SimpleContext::new(3);
    let list = list_sort(&mut tm);
    let cons = tm.constructors(list)[1];
    let l = tm.mk_var("l", list);
    let y = tm.mk_var("y", list);
    let tail = tm.mk_accessor(cons, 1, l);
    let eq = tm.mk_eq(y, tail);
    let guard = ctx.mk_literal(eq);
    // a second clause keeps the equation from being a unit
    let other = ctx.new_bool_var(None);
    ctx.add_clause(&[guard, Lit::positive(other)]);

    let mut dt = DatatypeAxioms::new();
    dt.register_term(&tm, &mut ctx, tail).unwrap();
    dt.initialize(&mut tm, &mut ctx).unwrap();

    // expect a clause -guard \/ -(y = l)
    let y_eq_l = tm.mk_eq(y, l);
    let le = ctx.bool_var(y_eq_l).expect("path axiom literal exists");
    let expected = [guard.negate(), Lit::negative(le)];
    let found = ctx.clauses().iter().any(|c| {
        c.lits.len() == 2 && expected.iter().all(|l| c.lits.contains(l))
    });
    assert!(found, "guarded path axiom missing");
}

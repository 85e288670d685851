//! Scenario tests for the viable-value engine.

use garnet_theories::bv::forbidden::UnaryConstraint;
use garnet_theories::config::ViableConfig;
use garnet_theories::{FindResult, Viable};
use num_bigint::BigUint;
use num_traits::ToPrimitive;

fn val(n: u64) -> BigUint {
    BigUint::from(n)
}

/// S4: 4-bit v with v >= 5 and v <= 5 leaves exactly one value.
#[test]
fn singleton_viable_value() {
    let mut viable = Viable::new();
    viable.ensure_var(0, 4);
    let ge = viable.register_constraint(UnaryConstraint::ge_const(4, 5));
    let le = viable.register_constraint(UnaryConstraint::le_const(4, 5));
    viable.add_unitary(0, ge);
    viable.add_unitary(0, le);

    match viable.find_viable(0) {
        FindResult::Singleton(v) => assert_eq!(v, val(5)),
        other => panic!("expected singleton, got {other:?}"),
    }
    assert!(viable.has_core());
    let core = viable.core();
    assert!(core.contains(&ge) && core.contains(&le));
}

/// S5: 4-bit v with v <= 3 and v >= 5 has no viable value; the core names
/// both constraints.
#[test]
fn empty_viable_set_with_core() {
    let mut viable = Viable::new();
    viable.ensure_var(0, 4);
    let le = viable.register_constraint(UnaryConstraint::le_const(4, 3));
    let ge = viable.register_constraint(UnaryConstraint::ge_const(4, 5));
    viable.add_unitary(0, le);
    viable.add_unitary(0, ge);

    assert_eq!(viable.find_viable(0), FindResult::Empty);
    assert!(viable.has_core());
    let core = viable.explain();
    assert!(core.contains(&le) && core.contains(&ge));
}

/// Law: after a find, excluding the found value either moves the find or
/// empties the domain.
#[test]
fn refind_after_exclusion_progresses() {
    let mut viable = Viable::new();
    viable.ensure_var(0, 4);
    let ge = viable.register_constraint(UnaryConstraint::ge_const(4, 14));
    viable.add_unitary(0, ge);

    let first = match viable.find_viable(0) {
        FindResult::Multiple(v) | FindResult::Singleton(v) => v,
        other => panic!("expected a value, got {other:?}"),
    };
    let first_u64 = first.to_u64().unwrap();
    let ne = viable.register_constraint(UnaryConstraint::diseq_const(4, first_u64));
    viable.add_unitary(0, ne);
    match viable.find_viable(0) {
        FindResult::Multiple(v) | FindResult::Singleton(v) => assert_ne!(v, first),
        FindResult::Empty => {}
        FindResult::ResourceOut => panic!("budget should suffice"),
    }
}

/// Excluding the singleton of S4 empties the domain.
#[test]
fn excluding_singleton_empties() {
    let mut viable = Viable::new();
    viable.ensure_var(0, 4);
    for c in [
        UnaryConstraint::ge_const(4, 5),
        UnaryConstraint::le_const(4, 5),
    ] {
        let idx = viable.register_constraint(c);
        viable.add_unitary(0, idx);
    }
    assert!(matches!(viable.find_viable(0), FindResult::Singleton(_)));
    let ne = viable.register_constraint(UnaryConstraint::diseq_const(4, 5));
    viable.add_unitary(0, ne);
    assert_eq!(viable.find_viable(0), FindResult::Empty);
    assert!(viable.explain().contains(&ne));
}

/// A one-probe budget runs out before the singleton check finishes.
#[test]
fn probe_budget_reports_resource_out() {
    let mut viable = Viable::with_config(ViableConfig { max_probes: 1 });
    viable.ensure_var(0, 4);
    for c in [
        UnaryConstraint::ge_const(4, 5),
        UnaryConstraint::le_const(4, 5),
    ] {
        let idx = viable.register_constraint(c);
        viable.add_unitary(0, idx);
    }
    assert_eq!(viable.find_viable(0), FindResult::ResourceOut);
}

/// Non-unit equality constraints participate through refinement.
#[test]
fn equal_lin_refinement_finds_solution() {
    let mut viable = Viable::new();
    viable.ensure_var(0, 4);
    // 2v == 6 (mod 16), i.e. 2v + 10 == 0
    let c = viable.register_constraint(UnaryConstraint::EqLin {
        width: 4,
        a: val(2),
        b: val(10),
    });
    viable.add_unitary(0, c);
    match viable.find_viable(0) {
        FindResult::Multiple(v) | FindResult::Singleton(v) => {
            assert_eq!((val(2) * &v) % val(16), val(6), "2*{v} != 6 mod 16");
        }
        other => panic!("expected a value, got {other:?}"),
    }
}

/// Scope pops restore previously forbidden values.
#[test]
fn scope_pop_restores_domain() {
    let mut viable = Viable::new();
    viable.ensure_var(0, 4);
    let base = viable.register_constraint(UnaryConstraint::ge_const(4, 8));
    viable.add_unitary(0, base);

    viable.push_scope();
    let tight = viable.register_constraint(UnaryConstraint::ge_const(4, 15));
    viable.add_unitary(0, tight);
    match viable.find_viable(0) {
        FindResult::Singleton(v) => assert_eq!(v, val(15)),
        other => panic!("expected singleton, got {other:?}"),
    }
    viable.pop_scope();

    match viable.find_viable(0) {
        FindResult::Multiple(v) | FindResult::Singleton(v) => {
            assert!(v.to_u64().unwrap() >= 8);
        }
        other => panic!("expected a value, got {other:?}"),
    }
}

/// Randomised agreement with brute force over a 4-bit domain.
#[test]
fn random_constraints_match_brute_force() {
    use rand::{Rng, SeedableRng};
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x00c0_ffee);
    for _ in 0..64 {
        let mut viable = Viable::new();
        viable.ensure_var(0, 4);
        let mut cs = Vec::new();
        for _ in 0..rng.gen_range(1..4) {
            let k = rng.gen_range(0..16u64);
            let c = if rng.gen_bool(0.5) {
                UnaryConstraint::le_const(4, k)
            } else {
                UnaryConstraint::ge_const(4, k)
            };
            cs.push(c.clone());
            let idx = viable.register_constraint(c);
            viable.add_unitary(0, idx);
        }
        let allowed: Vec<u64> = (0..16)
            .filter(|&x| cs.iter().all(|c| c.eval(&val(x))))
            .collect();
        match viable.find_viable(0) {
            FindResult::Empty => assert!(allowed.is_empty(), "constraints {cs:?}"),
            FindResult::Singleton(v) => {
                assert_eq!(allowed.len(), 1, "constraints {cs:?}");
                assert_eq!(v, val(allowed[0]));
            }
            FindResult::Multiple(v) => {
                assert!(allowed.len() > 1, "constraints {cs:?}");
                assert!(allowed.contains(&v.to_u64().unwrap()));
            }
            FindResult::ResourceOut => panic!("budget exhausted on a tiny domain"),
        }
    }
}

/// Conflicting constraints accumulated by overlapping merges are detected
/// at insertion time.
#[test]
fn overlapping_merge_covering_domain_conflicts() {
    let mut viable = Viable::new();
    viable.ensure_var(0, 3);
    // v <= 3 forbids [4,0); v >= 4 forbids [0,4); together they cover.
    let le = viable.register_constraint(UnaryConstraint::le_const(3, 3));
    let ge = viable.register_constraint(UnaryConstraint::ge_const(3, 4));
    viable.add_unitary(0, le);
    viable.add_unitary(0, ge);
    assert_eq!(viable.find_viable(0), FindResult::Empty);
    let core = viable.explain();
    assert!(core.contains(&le) && core.contains(&ge));
}

//! Bit-Vector Plugin.
//!
//! Adapts the viable-value engine and the slicing layer to the uniform
//! plugin contract. Bit-vector terms map to internal variables, asserted
//! comparison and equality literals become unary constraints or slice
//! equations, and an empty domain or slice conflict is reported to the host
//! through `set_conflict` with the guilty literals.
//!
//! A singleton domain feeds its value back into the slicing layer, so fixed
//! bits become visible to `collect_fixed` without further host involvement.

use super::forbidden::{ConstraintIdx, UnaryConstraint};
use super::slicing::{Dep, Slicing};
use super::viable::{FindResult, Viable};
use super::{pow2, PVar};
use crate::config::ViableConfig;
use garnet_core::ast::{TermId, TermKind, TermManager};
use garnet_core::context::Context;
use garnet_core::error::{Error, Result};
use garnet_core::literal::{Lit, Var};
use garnet_core::plugin::{Model, Plugin};
use num_bigint::BigUint;
use num_traits::{One, Zero};
use rustc_hash::FxHashMap;
use tracing::debug;

/// A constraint prepared for one phase of an atom.
#[derive(Debug, Clone)]
enum Prepared {
    /// The phase is trivially true or false on its own.
    Trivial(bool),
    /// Assert a unary constraint on a variable.
    Unary(PVar, UnaryConstraint),
}

#[derive(Debug, Clone)]
enum AtomAction {
    /// A comparison atom: prepared constraints for both phases.
    Constraint { pos: Prepared, neg: Prepared },
    /// An equality between two bit-vector variables.
    SliceEq(PVar, PVar),
}

/// The bit-vector core: viable domains plus slicing behind the plugin
/// contract.
#[derive(Debug, Default)]
pub struct BvCore {
    viable: Viable,
    slicing: Slicing,
    term_to_pvar: FxHashMap<TermId, PVar>,
    constraint_lit: FxHashMap<ConstraintIdx, Lit>,
    atoms: Vec<Option<AtomAction>>,
}

impl BvCore {
    /// Create a core with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a core with the given viable-search configuration.
    #[must_use]
    pub fn with_config(config: ViableConfig) -> Self {
        Self {
            viable: Viable::with_config(config),
            ..Self::default()
        }
    }

    /// The underlying viable engine.
    #[must_use]
    pub fn viable(&self) -> &Viable {
        &self.viable
    }

    /// The underlying slicing layer.
    #[must_use]
    pub fn slicing(&self) -> &Slicing {
        &self.slicing
    }

    /// Internal variable of a registered term, if any.
    #[must_use]
    pub fn pvar_of(&self, t: TermId) -> Option<PVar> {
        self.term_to_pvar.get(&t).copied()
    }

    /// Map a bit-vector term to its internal variable, creating slices for
    /// extractions and concatenations on the way.
    fn pvar(&mut self, tm: &TermManager, t: TermId) -> Result<PVar> {
        if let Some(&v) = self.term_to_pvar.get(&t) {
            return Ok(v);
        }
        let Some(width) = tm.bv_width(t) else {
            return Err(Error::InvalidTerm("not a bit-vector term"));
        };
        let v = match tm.kind(t).clone() {
            TermKind::Var(_) => {
                let v = self.slicing.add_var(width);
                self.viable.ensure_var(v, width);
                v
            }
            TermKind::BvExtract(hi, lo, x) => {
                let xv = self.pvar(tm, x)?;
                let v = self.slicing.mk_extract(xv, hi, lo)?;
                self.viable.ensure_var(v, width);
                v
            }
            TermKind::BvConcat(args) => {
                let mut pvars = Vec::with_capacity(args.len());
                for a in args {
                    pvars.push(self.pvar(tm, a)?);
                }
                let v = self.slicing.mk_concat(&pvars)?;
                self.viable.ensure_var(v, width);
                v
            }
            TermKind::BvNum(_) => {
                return Err(Error::InvalidTerm("numeral has no variable"));
            }
            _ => return Err(Error::InvalidTerm("unsupported bit-vector term")),
        };
        self.term_to_pvar.insert(t, v);
        Ok(v)
    }

    fn prepare_ule(&mut self, tm: &TermManager, a: TermId, b: TermId) -> Result<AtomAction> {
        let width = tm.bv_width(a).ok_or(Error::InvalidTerm("ule operand"))?;
        let max = pow2(width) - BigUint::one();
        let (ka, kb) = (constant(tm, a), constant(tm, b));
        let (pos, neg) = match (ka, kb) {
            (Some(ka), Some(kb)) => {
                let holds = ka <= kb;
                (Prepared::Trivial(holds), Prepared::Trivial(!holds))
            }
            (Some(k), None) => {
                // k <= v; negated: v <= k - 1
                let v = self.pvar(tm, b)?;
                let neg = if k.is_zero() {
                    Prepared::Trivial(false)
                } else {
                    Prepared::Unary(v, UnaryConstraint::le_val(width, &(&k - BigUint::one())))
                };
                (Prepared::Unary(v, UnaryConstraint::ge_val(width, &k)), neg)
            }
            (None, Some(k)) => {
                // v <= k; negated: v >= k + 1
                let v = self.pvar(tm, a)?;
                let neg = if k == max {
                    Prepared::Trivial(false)
                } else {
                    Prepared::Unary(v, UnaryConstraint::ge_val(width, &(&k + BigUint::one())))
                };
                (Prepared::Unary(v, UnaryConstraint::le_val(width, &k)), neg)
            }
            (None, None) => {
                let va = self.pvar(tm, a)?;
                let vb = self.pvar(tm, b)?;
                if va == vb {
                    (Prepared::Trivial(true), Prepared::Trivial(false))
                } else {
                    // comparisons between distinct variables are not unary
                    return Err(Error::Unsupported("binary bit-vector comparison"));
                }
            }
        };
        Ok(AtomAction::Constraint { pos, neg })
    }

    fn prepare_eq(&mut self, tm: &TermManager, x: TermId, y: TermId) -> Result<AtomAction> {
        let width = tm.bv_width(x).ok_or(Error::InvalidTerm("eq operand"))?;
        match (constant(tm, x), constant(tm, y)) {
            (Some(kx), Some(ky)) => Ok(AtomAction::Constraint {
                pos: Prepared::Trivial(kx == ky),
                neg: Prepared::Trivial(kx != ky),
            }),
            (Some(k), None) | (None, Some(k)) => {
                let t = if constant(tm, x).is_some() { y } else { x };
                let v = self.pvar(tm, t)?;
                Ok(AtomAction::Constraint {
                    pos: Prepared::Unary(v, UnaryConstraint::eq_val(width, &k)),
                    neg: Prepared::Unary(v, UnaryConstraint::diseq_val(width, &k)),
                })
            }
            (None, None) => {
                let vx = self.pvar(tm, x)?;
                let vy = self.pvar(tm, y)?;
                Ok(AtomAction::SliceEq(vx, vy))
            }
        }
    }

    fn set_atom(&mut self, bv: Var, action: AtomAction) {
        if self.atoms.len() <= bv as usize {
            self.atoms.resize_with(bv as usize + 1, || None);
        }
        self.atoms[bv as usize] = Some(action);
    }

    fn core_lits(&self) -> Vec<Lit> {
        self.viable
            .explain()
            .iter()
            .filter_map(|idx| self.constraint_lit.get(idx).copied())
            .collect()
    }

    fn slicing_lits(&self) -> Vec<Lit> {
        self.slicing
            .explain()
            .into_iter()
            .filter_map(|d| match d {
                Dep::Lit(l) => Some(l),
                _ => None,
            })
            .collect()
    }

    fn assert_unary<C: Context>(
        &mut self,
        ctx: &mut C,
        lit: Lit,
        v: PVar,
        c: UnaryConstraint,
    ) -> Result<()> {
        let idx = self.viable.register_constraint(c);
        self.constraint_lit.insert(idx, lit);
        self.viable.add_unitary(v, idx);
        match self.viable.find_viable(v) {
            FindResult::Empty => {
                debug!(var = v, "empty viable domain");
                let lits = self.core_lits();
                ctx.set_conflict(&lits);
            }
            FindResult::Singleton(val) => {
                // tie the fixed value into the slice layer
                if !self.slicing.add_value(v, &val) {
                    let lits = self.slicing_lits();
                    ctx.set_conflict(&lits);
                }
            }
            FindResult::Multiple(_) | FindResult::ResourceOut => {}
        }
        Ok(())
    }
}

fn constant(tm: &TermManager, t: TermId) -> Option<BigUint> {
    match tm.kind(t) {
        TermKind::BvNum(k) => Some(k.clone()),
        _ => None,
    }
}

impl<C: Context> Plugin<C> for BvCore {
    fn register_term(&mut self, tm: &TermManager, ctx: &mut C, t: TermId) -> Result<()> {
        match tm.kind(t).clone() {
            TermKind::Var(_) | TermKind::BvExtract(_, _, _) | TermKind::BvConcat(_)
                if tm.bv_width(t).is_some() =>
            {
                self.pvar(tm, t)?;
            }
            TermKind::BvUle(a, b) => {
                if let Some(bv) = ctx.bool_var(t) {
                    let action = self.prepare_ule(tm, a, b)?;
                    self.set_atom(bv, action);
                }
            }
            TermKind::Eq(x, y) if tm.bv_width(x).is_some() => {
                if let Some(bv) = ctx.bool_var(t) {
                    let action = self.prepare_eq(tm, x, y)?;
                    self.set_atom(bv, action);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn set_value(&mut self, tm: &TermManager, ctx: &mut C, t: TermId, value: TermId) -> Result<()> {
        let TermKind::BvNum(val) = tm.kind(value).clone() else {
            return Ok(());
        };
        let v = self.pvar(tm, t)?;
        if !self.slicing.add_value(v, &val) {
            let lits = self.slicing_lits();
            ctx.set_conflict(&lits);
        }
        Ok(())
    }

    fn get_value(&mut self, tm: &mut TermManager, t: TermId) -> Result<TermId> {
        if let TermKind::BvNum(k) = tm.kind(t) {
            let k = k.clone();
            let w = tm.bv_width(t).unwrap_or(0);
            return Ok(tm.mk_bv(k, w));
        }
        let width = tm.bv_width(t).ok_or(Error::InvalidTerm("not a bit-vector term"))?;
        let v = self.pvar(tm, t)?;
        match self.viable.find_viable(v) {
            FindResult::Singleton(val) | FindResult::Multiple(val) => Ok(tm.mk_bv(val, width)),
            FindResult::Empty => Err(Error::InvalidTerm("no viable value")),
            FindResult::ResourceOut => Err(Error::ResourceOut("viable")),
        }
    }

    fn initialize(&mut self, _tm: &mut TermManager, _ctx: &mut C) -> Result<()> {
        Ok(())
    }

    fn propagate_literal(&mut self, ctx: &mut C, lit: Lit) -> Result<()> {
        if !ctx.is_true(lit) {
            return Ok(());
        }
        let Some(action) = self.atoms.get(lit.var() as usize).and_then(Clone::clone) else {
            return Ok(());
        };
        match action {
            AtomAction::Constraint { pos, neg } => {
                let prepared = if lit.sign() { neg } else { pos };
                match prepared {
                    Prepared::Trivial(true) => {}
                    Prepared::Trivial(false) => ctx.set_conflict(&[lit]),
                    Prepared::Unary(v, c) => self.assert_unary(ctx, lit, v, c)?,
                }
            }
            AtomAction::SliceEq(x, y) => {
                let ok = if lit.sign() {
                    self.slicing.assert_diseq(x, y, lit);
                    !self.slicing.is_conflict()
                } else {
                    self.slicing.assert_equal(x, y, lit)?
                };
                if !ok {
                    let lits = self.slicing_lits();
                    ctx.set_conflict(&lits);
                }
            }
        }
        Ok(())
    }

    fn propagate(&mut self, ctx: &mut C) -> Result<bool> {
        let progress = self.slicing.propagate();
        if self.slicing.is_conflict() {
            let lits = self.slicing_lits();
            ctx.set_conflict(&lits);
        }
        Ok(progress)
    }

    fn repair_up(&mut self, _ctx: &mut C, _t: TermId) -> Result<()> {
        Ok(())
    }

    fn repair_down(&mut self, _ctx: &mut C, _t: TermId) -> Result<bool> {
        Ok(false)
    }

    fn repair_literal(&mut self, _ctx: &mut C, _lit: Lit) -> Result<()> {
        Ok(())
    }

    fn is_sat(&self, _ctx: &C) -> bool {
        !self.slicing.is_conflict()
    }

    fn on_restart(&mut self, _ctx: &mut C) -> Result<()> {
        Ok(())
    }

    fn on_rescale(&mut self) {}

    fn mk_model(&mut self, tm: &mut TermManager, model: &mut Model) -> Result<()> {
        let terms: Vec<(TermId, PVar)> = self
            .term_to_pvar
            .iter()
            .map(|(&t, &v)| (t, v))
            .collect();
        for (t, v) in terms {
            let Some(width) = tm.bv_width(t) else {
                continue;
            };
            match self.viable.find_viable(v) {
                FindResult::Singleton(val) | FindResult::Multiple(val) => {
                    let value = tm.mk_bv(val, width);
                    model.assign(t, value);
                }
                FindResult::Empty | FindResult::ResourceOut => {}
            }
        }
        Ok(())
    }
}

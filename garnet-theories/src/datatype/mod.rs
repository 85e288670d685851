//! Algebraic Datatype Axiom Elaboration.
//!
//! One-shot clause generation for datatype terms. For every registered
//! subterm the elaborator emits:
//!
//! - `is_c(c(t...))` for each constructor application
//! - `acc_i(c(...t_i...)) = t_i` for each field
//! - `is_c(t) -> t = c(acc_1(t), ..., acc_n(t))` for accessor targets
//! - at-least-one and at-most-one recognizer clauses per datatype term
//! - `is_c(t) <-> t = c` for zero-arity constructors
//! - path axioms `-guards \/ s != t` ruling out cyclic accessor chains
//!   through recursive sorts
//!
//! Clauses flow to the host through `mk_literal`/`add_clause`; accessor
//! interpretations on non-matching constructors are left to the host.

use garnet_core::ast::{Sort, TermId, TermKind, TermManager};
use garnet_core::context::Context;
use garnet_core::error::Result;
use garnet_core::literal::Lit;
use garnet_core::plugin::{Model, Plugin};
use rustc_hash::FxHashMap;
use tracing::debug;

/// The datatype axiom elaborator.
#[derive(Debug, Default)]
pub struct DatatypeAxioms {
    roots: Vec<TermId>,
    /// child term -> (parent term, guard literal) accessor edges.
    parents: FxHashMap<TermId, Vec<(TermId, Option<Lit>)>>,
    elaborated: bool,
}

impl DatatypeAxioms {
    /// Create an elaborator with no registered terms.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit all datatype axioms for the registered terms.
    pub fn add_axioms<C: Context>(&mut self, tm: &mut TermManager, ctx: &mut C) -> Result<()> {
        if self.elaborated {
            return Ok(());
        }
        self.elaborated = true;
        let roots = self.roots.clone();
        let subterms = tm.subterms(&roots);
        for &t in &subterms {
            match tm.kind(t).clone() {
                TermKind::Ctor(c, args) => {
                    let r = tm.mk_recognizer(c, t);
                    let lr = ctx.mk_literal(r);
                    ctx.add_clause(&[lr]);
                    for (i, &arg) in args.iter().enumerate() {
                        let acc = tm.mk_accessor(c, i as u32, t);
                        let eq = tm.mk_eq(arg, acc);
                        let le = ctx.mk_literal(eq);
                        ctx.add_clause(&[le]);
                    }
                    let sort = tm.sort(t);
                    for &c2 in tm.constructors(sort).to_vec().iter() {
                        if c2 != c {
                            let r2 = tm.mk_recognizer(c2, t);
                            let l2 = ctx.mk_literal(r2);
                            ctx.add_clause(&[l2.negate()]);
                        }
                    }
                }
                TermKind::Acc(c, _, u) if !matches!(tm.kind(u), TermKind::Ctor(_, _)) => {
                    // is_c(u) -> u = c(acc_1(u), ..., acc_n(u))
                    let n_fields = tm.constructor(c).fields.len();
                    let mut args = Vec::with_capacity(n_fields);
                    for i in 0..n_fields {
                        args.push(tm.mk_accessor(c, i as u32, u));
                    }
                    let ctor = tm.mk_ctor(c, args);
                    let eq = tm.mk_eq(u, ctor);
                    let r = tm.mk_recognizer(c, u);
                    let lr = ctx.mk_literal(r);
                    let le = ctx.mk_literal(eq);
                    ctx.add_clause(&[lr.negate(), le]);
                }
                _ => {}
            }
            let sort = tm.sort(t);
            if matches!(sort, Sort::Datatype(_)) {
                let cns = tm.constructors(sort).to_vec();
                let mut any: Vec<Lit> = Vec::with_capacity(cns.len());
                for &c in &cns {
                    let r = tm.mk_recognizer(c, t);
                    any.push(ctx.mk_literal(r));
                }
                ctx.add_clause(&any);
                for i in 0..cns.len() {
                    for j in i + 1..cns.len() {
                        ctx.add_clause(&[any[i].negate(), any[j].negate()]);
                    }
                }
                for (&c, &rl) in cns.iter().zip(&any) {
                    if tm.constructor(c).fields.is_empty() {
                        let value = tm.mk_ctor(c, Vec::new());
                        let eq = tm.mk_eq(t, value);
                        let le = ctx.mk_literal(eq);
                        ctx.add_clause(&[rl.negate(), le]);
                        ctx.add_clause(&[rl, le.negate()]);
                    }
                }
            }
        }
        self.collect_path_axioms(tm, ctx, &subterms);
        Ok(())
    }

    /// Build accessor edges over recursive sorts and emit path axioms.
    fn collect_path_axioms<C: Context>(
        &mut self,
        tm: &mut TermManager,
        ctx: &mut C,
        subterms: &[TermId],
    ) {
        for &s in subterms {
            if let TermKind::Acc(_, _, t) = *tm.kind(s) {
                if tm.is_recursive(tm.sort(t)) {
                    self.add_edge(s, t, None);
                }
            }
        }
        for bv in 0..ctx.num_bool_vars() {
            let Some(e) = ctx.atom(bv) else {
                continue;
            };
            let TermKind::Eq(x, y) = *tm.kind(e) else {
                continue;
            };
            let lp = Lit::positive(bv);
            let ln = Lit::negative(bv);
            if let TermKind::Acc(_, _, z) = *tm.kind(x) {
                if tm.is_recursive(tm.sort(z)) {
                    if ctx.is_unit(lp) {
                        self.add_edge(y, z, None);
                    } else if !ctx.is_unit(ln) {
                        self.add_edge(y, z, Some(lp));
                    }
                }
            }
            if let TermKind::Acc(_, _, z) = *tm.kind(y) {
                if tm.is_recursive(tm.sort(z)) {
                    if ctx.is_unit(lp) {
                        self.add_edge(x, z, None);
                    } else if !ctx.is_unit(ln) {
                        self.add_edge(x, z, Some(lp));
                    }
                }
            }
        }
        let children: Vec<TermId> = self.parents.keys().copied().collect();
        for child in children {
            let mut lits = Vec::new();
            let mut path = vec![child];
            self.path_axioms_from(tm, ctx, child, &mut path, &mut lits);
        }
    }

    fn add_edge(&mut self, child: TermId, parent: TermId, guard: Option<Lit>) {
        debug!("accessor edge {:?} -> {:?}", child, parent);
        self.parents.entry(child).or_default().push((parent, guard));
    }

    /// Walk parent edges from `path.last()`, accumulating negated guards.
    /// Reaching a term of the start's sort yields `-guards \/ start != t`;
    /// a term already on the path closes a cycle and yields `-guards`.
    fn path_axioms_from<C: Context>(
        &self,
        tm: &mut TermManager,
        ctx: &mut C,
        start: TermId,
        path: &mut Vec<TermId>,
        lits: &mut Vec<Lit>,
    ) {
        let current = *path.last().expect("non-empty path");
        let Some(edges) = self.parents.get(&current) else {
            return;
        };
        for &(parent, guard) in edges {
            if let Some(g) = guard {
                lits.push(g.negate());
            }
            if path.contains(&parent) {
                ctx.add_clause(lits);
            } else {
                if tm.sort(start) == tm.sort(parent) {
                    let eq = tm.mk_eq(start, parent);
                    let le = ctx.mk_literal(eq);
                    let mut clause = lits.clone();
                    clause.push(le.negate());
                    ctx.add_clause(&clause);
                }
                path.push(parent);
                self.path_axioms_from(tm, ctx, start, path, lits);
                path.pop();
            }
            if guard.is_some() {
                lits.pop();
            }
        }
    }
}

impl<C: Context> Plugin<C> for DatatypeAxioms {
    fn register_term(&mut self, tm: &TermManager, _ctx: &mut C, t: TermId) -> Result<()> {
        if matches!(tm.sort(t), Sort::Datatype(_))
            || matches!(
                tm.kind(t),
                TermKind::Ctor(_, _) | TermKind::Acc(_, _, _) | TermKind::Recognizer(_, _)
            )
        {
            self.roots.push(t);
        }
        Ok(())
    }

    fn set_value(
        &mut self,
        _tm: &TermManager,
        _ctx: &mut C,
        _t: TermId,
        _value: TermId,
    ) -> Result<()> {
        Ok(())
    }

    fn get_value(&mut self, _tm: &mut TermManager, t: TermId) -> Result<TermId> {
        Ok(t)
    }

    fn initialize(&mut self, tm: &mut TermManager, ctx: &mut C) -> Result<()> {
        self.add_axioms(tm, ctx)
    }

    fn propagate_literal(&mut self, _ctx: &mut C, _lit: Lit) -> Result<()> {
        Ok(())
    }

    fn propagate(&mut self, _ctx: &mut C) -> Result<bool> {
        Ok(false)
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
        true
    }

    fn on_restart(&mut self, _ctx: &mut C) -> Result<()> {
        Ok(())
    }

    fn on_rescale(&mut self) {}

    fn mk_model(&mut self, _tm: &mut TermManager, _model: &mut Model) -> Result<()> {
        Ok(())
    }
}

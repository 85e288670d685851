//! Stochastic Local Search over Arithmetic.
//!
//! Numeric local-search repair over integer/rational variables under linear
//! and nonlinear constraints. The engine tracks a value per variable,
//! maintains every atom's cached linear evaluation incrementally, and on
//! conflict proposes critical moves that flip one atom's truth value while
//! keeping the Boolean assignment and the definitional graph consistent.
//!
//! Generic over the numeric capability: instantiate with
//! [`garnet_core::CheckedInt`] for the fast checked 64-bit engine or with
//! [`garnet_core::Rational`] for arbitrary precision.

mod eq_solver;
mod ineq;
mod repair;

use garnet_core::ast::{Sort, TermId, TermKind, TermManager};
use garnet_core::context::Context;
use garnet_core::error::{Error, Result};
use garnet_core::literal::{Lit, Var};
use garnet_core::num::Num;
use garnet_core::plugin::{Model, Plugin};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::trace;

use crate::config::ArithConfig;

/// Index of an internal arithmetic variable.
pub type ArithVar = u32;

const NULL_IDX: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarSort {
    Int,
    Real,
}

/// Operator of an inequality atom, over `(Σ cᵢ·vᵢ) + const OP 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IneqKind {
    /// `<= 0`
    Le,
    /// `< 0`
    Lt,
    /// `== 0`
    Eq,
}

/// Kind of the operation defining a variable, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpKind {
    None,
    Add,
    Mul,
    Mod,
    Rem,
    Idiv,
    Div,
    Abs,
    ToInt,
    ToReal,
    Power,
}

#[derive(Debug, Clone)]
struct Bound<N> {
    strict: bool,
    value: N,
}

#[derive(Debug, Clone)]
struct LinearTerm<N: Num> {
    args: SmallVec<[(N, ArithVar); 4]>,
    coeff: N,
}

/// An inequality atom: a linear term, an operator and the cached evaluation
/// of the linear part.
#[derive(Debug, Clone)]
pub struct Ineq<N: Num> {
    args: SmallVec<[(N, ArithVar); 4]>,
    coeff: N,
    op: IneqKind,
    args_value: N,
    var_to_flip: Option<ArithVar>,
}

#[derive(Debug, Clone)]
struct VarInfo<N: Num> {
    term: TermId,
    value: N,
    best_value: N,
    sort: VarSort,
    op: OpKind,
    def_idx: u32,
    bool_vars: Vec<(N, Var)>,
    muls: Vec<u32>,
    adds: Vec<u32>,
    lo: Option<Bound<N>>,
    hi: Option<Bound<N>>,
}

impl<N: Num> VarInfo<N> {
    fn new(term: TermId, sort: VarSort) -> Self {
        Self {
            term,
            value: N::zero(),
            best_value: N::zero(),
            sort,
            op: OpKind::None,
            def_idx: NULL_IDX,
            bool_vars: Vec::new(),
            muls: Vec::new(),
            adds: Vec::new(),
            lo: None,
            hi: None,
        }
    }
}

#[derive(Debug, Clone)]
struct MulDef<N: Num> {
    var: ArithVar,
    coeff: N,
    monomial: Vec<ArithVar>,
}

#[derive(Debug, Clone)]
struct AddDef<N: Num> {
    var: ArithVar,
    args: SmallVec<[(N, ArithVar); 4]>,
    coeff: N,
}

#[derive(Debug, Clone, Copy)]
struct OpDef {
    var: ArithVar,
    op: OpKind,
    arg1: ArithVar,
    arg2: ArithVar,
}

/// Counters exposed for host statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArithStats {
    /// Boolean flips performed by the core.
    pub num_flips: u64,
}

/// The SLS arithmetic core.
#[derive(Debug)]
pub struct ArithSls<N: Num> {
    config: ArithConfig,
    stats: ArithStats,
    atoms: Vec<Option<Ineq<N>>>,
    vars: Vec<VarInfo<N>>,
    muls: Vec<MulDef<N>>,
    adds: Vec<AddDef<N>>,
    ops: Vec<OpDef>,
    expr_to_var: FxHashMap<TermId, ArithVar>,
    probs: Vec<f64>,
    dscore_mode: bool,
}

impl<N: Num> Default for ArithSls<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: Num> ArithSls<N> {
    /// Create a core with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ArithConfig::default())
    }

    /// Create a core with the given configuration.
    #[must_use]
    pub fn with_config(config: ArithConfig) -> Self {
        Self {
            config,
            stats: ArithStats::default(),
            atoms: Vec::new(),
            vars: Vec::new(),
            muls: Vec::new(),
            adds: Vec::new(),
            ops: Vec::new(),
            expr_to_var: FxHashMap::default(),
            probs: Vec::new(),
            dscore_mode: false,
        }
    }

    /// Statistics counters.
    #[must_use]
    pub fn stats(&self) -> ArithStats {
        self.stats
    }

    /// Number of internal variables.
    #[must_use]
    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    fn value(&self, v: ArithVar) -> &N {
        &self.vars[v as usize].value
    }

    fn is_int(&self, v: ArithVar) -> bool {
        self.vars[v as usize].sort == VarSort::Int
    }

    fn atom(&self, bv: Var) -> Option<&Ineq<N>> {
        self.atoms.get(bv as usize).and_then(|a| a.as_ref())
    }

    /// Current sign of a Boolean variable: `true` means assigned false.
    fn var_sign<C: Context>(ctx: &C, bv: Var) -> bool {
        !ctx.is_true(Lit::positive(bv))
    }

    fn in_bounds(&self, v: ArithVar, value: &N) -> bool {
        let vi = &self.vars[v as usize];
        if let Some(lo) = &vi.lo {
            if *value < lo.value || (lo.strict && *value <= lo.value) {
                return false;
            }
        }
        if let Some(hi) = &vi.hi {
            if *value > hi.value || (hi.strict && *value >= hi.value) {
                return false;
            }
        }
        true
    }

    fn is_fixed(&self, v: ArithVar) -> bool {
        let vi = &self.vars[v as usize];
        match (&vi.lo, &vi.hi) {
            (Some(lo), Some(hi)) => lo.value == hi.value && lo.value == vi.value,
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Term construction

    fn mk_var(&mut self, tm: &TermManager, e: TermId) -> ArithVar {
        if let Some(&v) = self.expr_to_var.get(&e) {
            return v;
        }
        let v = self.vars.len() as ArithVar;
        let sort = if tm.sort(e) == Sort::Real {
            VarSort::Real
        } else {
            VarSort::Int
        };
        self.expr_to_var.insert(e, v);
        self.vars.push(VarInfo::new(e, sort));
        v
    }

    /// Canonicalise an arithmetic term into definitions and an internal
    /// variable. Structurally equal terms map to the same variable.
    fn mk_term(&mut self, tm: &TermManager, e: TermId) -> Result<ArithVar> {
        if let Some(&v) = self.expr_to_var.get(&e) {
            return Ok(v);
        }
        let mut t = LinearTerm {
            args: SmallVec::new(),
            coeff: N::zero(),
        };
        self.add_args(tm, &mut t, e, N::one())?;
        // A singleton unit-coefficient sum collapses to its argument.
        if t.coeff.is_zero() && t.args.len() == 1 && t.args[0].0 == N::one() {
            return Ok(t.args[0].1);
        }
        let v = self.mk_var(tm, e);
        let idx = self.adds.len() as u32;
        let mut sum = t.coeff.clone();
        for (c, w) in &t.args {
            self.vars[*w as usize].adds.push(idx);
            sum = sum.add(&c.mul(self.value(*w))?)?;
        }
        self.adds.push(AddDef {
            var: v,
            args: t.args,
            coeff: t.coeff,
        });
        let vi = &mut self.vars[v as usize];
        vi.def_idx = idx;
        vi.op = OpKind::Add;
        vi.value = sum;
        Ok(v)
    }

    fn add_arg(term: &mut LinearTerm<N>, c: N, v: ArithVar) {
        if !c.is_zero() {
            term.args.push((c, v));
        }
    }

    fn add_args(
        &mut self,
        tm: &TermManager,
        term: &mut LinearTerm<N>,
        e: TermId,
        coeff: N,
    ) -> Result<()> {
        if let Some(&v) = self.expr_to_var.get(&e) {
            Self::add_arg(term, coeff, v);
            return Ok(());
        }
        match tm.kind(e) {
            TermKind::Numeral(r) => {
                term.coeff = term.coeff.add(&coeff.mul(&N::from_numeral(r)?)?)?;
            }
            TermKind::Add(xs) => {
                for &x in xs {
                    self.add_args(tm, term, x, coeff.clone())?;
                }
            }
            TermKind::Sub(x, y) => {
                let (x, y) = (*x, *y);
                self.add_args(tm, term, x, coeff.clone())?;
                self.add_args(tm, term, y, coeff.neg()?)?;
            }
            TermKind::Neg(x) => {
                let x = *x;
                self.add_args(tm, term, x, coeff.neg()?)?;
            }
            TermKind::Mul(xs) => {
                let mut c = N::one();
                let mut monomial: Vec<ArithVar> = Vec::new();
                for &arg in xs {
                    if let TermKind::Numeral(r) = tm.kind(arg) {
                        c = c.mul(&N::from_numeral(r)?)?;
                    } else {
                        monomial.push(self.mk_term(tm, arg)?);
                    }
                }
                match monomial.len() {
                    0 => term.coeff = term.coeff.add(&c.mul(&coeff)?)?,
                    1 => Self::add_arg(term, c.mul(&coeff)?, monomial[0]),
                    _ => {
                        let v = self.mk_var(tm, e);
                        let idx = self.muls.len() as u32;
                        let mut prod = c.clone();
                        for &w in &monomial {
                            self.vars[w as usize].muls.push(idx);
                            prod = prod.mul(self.value(w))?;
                        }
                        self.muls.push(MulDef {
                            var: v,
                            coeff: c,
                            monomial,
                        });
                        let vi = &mut self.vars[v as usize];
                        vi.def_idx = idx;
                        vi.op = OpKind::Mul;
                        vi.value = prod;
                        Self::add_arg(term, coeff, v);
                    }
                }
            }
            TermKind::Mod(x, y) => {
                let (x, y) = (*x, *y);
                let v = self.mk_op(tm, OpKind::Mod, e, x, y)?;
                Self::add_arg(term, coeff, v);
            }
            TermKind::Rem(x, y) => {
                let (x, y) = (*x, *y);
                let v = self.mk_op(tm, OpKind::Rem, e, x, y)?;
                Self::add_arg(term, coeff, v);
            }
            TermKind::Idiv(x, y) => {
                let (x, y) = (*x, *y);
                let v = self.mk_op(tm, OpKind::Idiv, e, x, y)?;
                Self::add_arg(term, coeff, v);
            }
            TermKind::Div(x, y) => {
                let (x, y) = (*x, *y);
                let v = self.mk_op(tm, OpKind::Div, e, x, y)?;
                Self::add_arg(term, coeff, v);
            }
            TermKind::Power(x, y) => {
                let (x, y) = (*x, *y);
                let v = self.mk_op(tm, OpKind::Power, e, x, y)?;
                Self::add_arg(term, coeff, v);
            }
            TermKind::Abs(x) => {
                let x = *x;
                let v = self.mk_op(tm, OpKind::Abs, e, x, x)?;
                Self::add_arg(term, coeff, v);
            }
            TermKind::ToInt(x) => {
                let x = *x;
                let v = self.mk_op(tm, OpKind::ToInt, e, x, x)?;
                Self::add_arg(term, coeff, v);
            }
            TermKind::ToReal(x) => {
                let x = *x;
                let v = self.mk_op(tm, OpKind::ToReal, e, x, x)?;
                Self::add_arg(term, coeff, v);
            }
            _ => {
                let v = self.mk_var(tm, e);
                Self::add_arg(term, coeff, v);
            }
        }
        Ok(())
    }

    fn mk_op(
        &mut self,
        tm: &TermManager,
        k: OpKind,
        e: TermId,
        x: TermId,
        y: TermId,
    ) -> Result<ArithVar> {
        let v = self.mk_var(tm, e);
        let w1 = self.mk_term(tm, x)?;
        let w2 = self.mk_term(tm, y)?;
        let idx = self.ops.len() as u32;
        let v1 = self.value(w1).clone();
        let v2 = self.value(w2).clone();
        let val = match k {
            OpKind::Mod => {
                if v2.is_zero() {
                    N::zero()
                } else {
                    v1.mod_euclid(&v2)?
                }
            }
            OpKind::Rem => {
                if v2.is_zero() {
                    N::zero()
                } else {
                    v1.rem_trunc(&v2)?
                }
            }
            OpKind::Idiv => {
                if v2.is_zero() {
                    N::zero()
                } else {
                    v1.div_floor(&v2)?
                }
            }
            OpKind::Div => {
                if v2.is_zero() {
                    N::zero()
                } else {
                    v1.div_real(&v2)?
                }
            }
            OpKind::Abs => v1.abs()?,
            OpKind::ToInt => v1.div_floor(&N::one())?,
            OpKind::ToReal => v1.clone(),
            OpKind::Power => {
                if v1.is_zero() && v2.is_zero() {
                    N::zero()
                } else {
                    return Err(Error::Unsupported("power over non-zero arguments"));
                }
            }
            _ => return Err(Error::Unsupported("operator")),
        };
        self.ops.push(OpDef {
            var: v,
            op: k,
            arg1: w1,
            arg2: w2,
        });
        let vi = &mut self.vars[v as usize];
        vi.def_idx = idx;
        vi.op = k;
        vi.value = val;
        Ok(v)
    }

    // ------------------------------------------------------------------
    // Atom construction

    fn init_bool_var(&mut self, tm: &TermManager, bv: Var, e: TermId) -> Result<()> {
        if self.atom(bv).is_some() {
            return Ok(());
        }
        let (op, init_coeff, x, y) = match tm.kind(e) {
            TermKind::Le(x, y) => (IneqKind::Le, N::zero(), *x, *y),
            TermKind::Lt(x, y) => {
                if tm.sort(*x) == Sort::Int {
                    // x < y over Int becomes x - y + 1 <= 0
                    (IneqKind::Le, N::one(), *x, *y)
                } else {
                    (IneqKind::Lt, N::zero(), *x, *y)
                }
            }
            TermKind::Eq(x, y) if tm.sort(*x).is_arith() => (IneqKind::Eq, N::zero(), *x, *y),
            TermKind::Distinct(args) if args.first().map_or(false, |&a| tm.sort(a).is_arith()) => {
                return Err(Error::Unsupported("distinct over arithmetic"));
            }
            TermKind::IsInt(_) => return Err(Error::Unsupported("is_int")),
            _ => return Ok(()),
        };
        let mut t = LinearTerm {
            args: SmallVec::new(),
            coeff: init_coeff,
        };
        self.add_args(tm, &mut t, x, N::one())?;
        self.add_args(tm, &mut t, y, N::one().neg()?)?;
        self.init_ineq(
            bv,
            Ineq {
                args: t.args,
                coeff: t.coeff,
                op,
                args_value: N::zero(),
                var_to_flip: None,
            },
        )
    }

    fn init_ineq(&mut self, bv: Var, mut ineq: Ineq<N>) -> Result<()> {
        let mut args_value = N::zero();
        for (c, v) in &ineq.args {
            self.vars[*v as usize].bool_vars.push((c.clone(), bv));
            args_value = args_value.add(&c.mul(self.value(*v))?)?;
        }
        ineq.args_value = args_value;
        if self.atoms.len() <= bv as usize {
            self.atoms.resize_with(bv as usize + 1, || None);
        }
        self.atoms[bv as usize] = Some(ineq);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Bounds

    fn add_le(&mut self, v: ArithVar, n: N) {
        let vi = &mut self.vars[v as usize];
        if let Some(hi) = &vi.hi {
            if hi.value <= n {
                return;
            }
        }
        vi.hi = Some(Bound {
            strict: false,
            value: n,
        });
    }

    fn add_ge(&mut self, v: ArithVar, n: N) {
        let vi = &mut self.vars[v as usize];
        if let Some(lo) = &vi.lo {
            if lo.value >= n {
                return;
            }
        }
        vi.lo = Some(Bound {
            strict: false,
            value: n,
        });
    }

    fn add_lt(&mut self, v: ArithVar, n: N) -> Result<()> {
        if self.is_int(v) {
            let n = n.sub(&N::one())?;
            self.add_le(v, n);
        } else {
            self.vars[v as usize].hi = Some(Bound {
                strict: true,
                value: n,
            });
        }
        Ok(())
    }

    fn add_gt(&mut self, v: ArithVar, n: N) -> Result<()> {
        if self.is_int(v) {
            let n = n.add(&N::one())?;
            self.add_ge(v, n);
        } else {
            self.vars[v as usize].lo = Some(Bound {
                strict: true,
                value: n,
            });
        }
        Ok(())
    }

    /// Extract variable bounds from a single-variable unit atom.
    fn initialize_unit<C: Context>(&mut self, tm: &TermManager, ctx: &C, lit: Lit) -> Result<()> {
        let bv = lit.var();
        if let Some(e) = ctx.atom(bv) {
            self.init_bool_var(tm, bv, e)?;
        }
        let Some(ineq) = self.atom(bv) else {
            return Ok(());
        };
        if ineq.args.len() != 1 {
            return Ok(());
        }
        let (c, v) = ineq.args[0].clone();
        let coeff = ineq.coeff.clone();
        let op = ineq.op;
        let one = N::one();
        let minus_one = one.neg()?;
        match op {
            IneqKind::Le => {
                if lit.sign() {
                    if c == minus_one {
                        self.add_le(v, coeff);
                    } else if c == one {
                        self.add_ge(v, coeff.neg()?);
                    }
                } else if c == minus_one {
                    self.add_ge(v, coeff);
                } else if c == one {
                    self.add_le(v, coeff.neg()?);
                }
            }
            IneqKind::Eq => {
                if !lit.sign() {
                    if c == minus_one {
                        self.add_ge(v, coeff.clone());
                        self.add_le(v, coeff);
                    } else if c == one {
                        self.add_ge(v, coeff.neg()?);
                        self.add_le(v, coeff.neg()?);
                    }
                }
            }
            IneqKind::Lt => {
                if lit.sign() {
                    if c == minus_one {
                        self.add_le(v, coeff);
                    } else if c == one {
                        self.add_ge(v, coeff.neg()?);
                    }
                } else if c == minus_one {
                    self.add_gt(v, coeff)?;
                } else if c == one {
                    self.add_lt(v, coeff.neg()?)?;
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Update

    /// Assign `new_value` to `v`: clamp into bounds, maintain every atom's
    /// cached evaluation (flipping Booleans that fall out of agreement),
    /// then re-propagate multiplication and addition definitions that
    /// mention `v`. Recursion terminates at a fixed point because an
    /// unchanged value does not recurse.
    fn update<C: Context>(&mut self, ctx: &mut C, v: ArithVar, new_value: N) -> Result<bool> {
        let old_value = self.value(v).clone();
        if old_value == new_value {
            return Ok(true);
        }
        if !self.in_bounds(v, &new_value) {
            if self.is_int(v) {
                let lo = self.vars[v as usize].lo.clone();
                let hi = self.vars[v as usize].hi.clone();
                if let Some(lo) = lo {
                    if !lo.strict && new_value < lo.value {
                        if lo.value != old_value {
                            return self.update(ctx, v, lo.value);
                        }
                        let up = old_value.add(&N::one())?;
                        if self.in_bounds(v, &up) {
                            return self.update(ctx, v, up);
                        }
                        return Ok(false);
                    }
                }
                if let Some(hi) = hi {
                    if !hi.strict && new_value > hi.value {
                        if hi.value != old_value {
                            return self.update(ctx, v, hi.value);
                        }
                        let down = old_value.sub(&N::one())?;
                        if self.in_bounds(v, &down) {
                            return self.update(ctx, v, down);
                        }
                        return Ok(false);
                    }
                }
            }
            return Ok(false);
        }
        trace!(var = v, "update {} -> {}", old_value, new_value);
        let delta = new_value.sub(&old_value)?;
        let bool_vars = self.vars[v as usize].bool_vars.clone();
        for (coeff, bv) in &bool_vars {
            let shift = coeff.mul(&delta)?;
            let ineq = self.atoms[*bv as usize]
                .as_mut()
                .expect("atom registered for occurrence");
            ineq.args_value = ineq.args_value.add(&shift)?;
            let old_sign = Self::var_sign(ctx, *bv);
            let dtt_new = self.atoms[*bv as usize].as_ref().unwrap().dtt(old_sign)?;
            if !dtt_new.is_zero() {
                ctx.flip(*bv);
                self.stats.num_flips += 1;
            }
        }
        self.vars[v as usize].value = new_value;
        ctx.new_value_eh(self.vars[v as usize].term);

        let mul_idxs = self.vars[v as usize].muls.clone();
        for idx in mul_idxs {
            let md = &self.muls[idx as usize];
            let (w, coeff, monomial) = (md.var, md.coeff.clone(), md.monomial.clone());
            let mut prod = coeff;
            for u in &monomial {
                prod = prod.mul(self.value(*u))?;
            }
            if *self.value(w) != prod {
                self.update(ctx, w, prod)?;
            }
        }
        let add_idxs = self.vars[v as usize].adds.clone();
        for idx in add_idxs {
            let ad = &self.adds[idx as usize];
            let (w, args, coeff) = (ad.var, ad.args.clone(), ad.coeff.clone());
            let mut sum = coeff;
            for (c, u) in &args {
                sum = sum.add(&c.mul(self.value(*u))?)?;
            }
            if *self.value(w) != sum {
                self.update(ctx, w, sum)?;
            }
        }
        Ok(true)
    }

    /// Align the Boolean assignment of `bv` with its atom's truth value.
    fn sync_bool_var<C: Context>(&mut self, ctx: &mut C, bv: Var) -> Result<()> {
        if let Some(ineq) = self.atom(bv) {
            if !ineq.dtt(Self::var_sign(ctx, bv))?.is_zero() {
                ctx.flip(bv);
                self.stats.num_flips += 1;
            }
        }
        Ok(())
    }

    fn save_best_values(&mut self) {
        for vi in &mut self.vars {
            vi.best_value = vi.value.clone();
        }
    }

    // ------------------------------------------------------------------
    // Satisfaction

    fn clause_is_sat<C: Context>(&self, ctx: &C, idx: u32) -> bool {
        ctx.get_clause(idx).lits.iter().any(|&lit| {
            if !ctx.is_true(lit) {
                return false;
            }
            match self.atom(lit.var()) {
                None => true,
                Some(ineq) => ineq.is_true().map(|t| t != lit.sign()).unwrap_or(false),
            }
        })
    }

    fn count_unsat<C: Context>(&self, ctx: &C) -> u32 {
        (0..ctx.num_clauses())
            .filter(|&i| !self.clause_is_sat(ctx, i))
            .count() as u32
    }

    /// Local-search outer loop: repeatedly pick an unsatisfied clause and
    /// repair its best-rewarded literal, until quiescence or until
    /// `max_no_improve` consecutive moves fail to reduce the number of
    /// unsatisfied clauses.
    pub fn search<C: Context>(&mut self, ctx: &mut C) -> Result<bool> {
        let mut no_improve = 0u32;
        let mut best_unsat = u32::MAX;
        loop {
            let unsat: Vec<u32> = (0..ctx.num_clauses())
                .filter(|&i| !self.clause_is_sat(ctx, i))
                .collect();
            if unsat.is_empty() {
                self.save_best_values();
                return Ok(true);
            }
            if no_improve > self.config.max_no_improve {
                return Ok(false);
            }
            let cl = unsat[ctx.rand(unsat.len() as u32) as usize];
            let lits: Vec<Lit> = ctx.get_clause(cl).lits.to_vec();
            let mut best: Option<(Lit, f64)> = None;
            for &lit in &lits {
                if self.atom(lit.var()).is_none() {
                    continue;
                }
                let r = self.reward(ctx, lit)?;
                if best.map_or(true, |(_, br)| r > br) {
                    best = Some((lit, r));
                }
            }
            match best {
                Some((lit, _)) => {
                    if !ctx.is_true(lit) {
                        ctx.flip(lit.var());
                        self.stats.num_flips += 1;
                    }
                    self.propagate_literal_impl(ctx, lit)?;
                }
                None => {
                    let lit = lits[ctx.rand(lits.len() as u32) as usize];
                    ctx.flip(lit.var());
                    self.stats.num_flips += 1;
                }
            }
            let now_unsat = self.count_unsat(ctx);
            if now_unsat < best_unsat {
                best_unsat = now_unsat;
                no_improve = 0;
                self.save_best_values();
            } else {
                no_improve += 1;
            }
        }
    }

    fn propagate_literal_impl<C: Context>(&mut self, ctx: &mut C, lit: Lit) -> Result<()> {
        if !ctx.is_true(lit) {
            return Ok(());
        }
        let Some(ineq) = self.atom(lit.var()) else {
            return Ok(());
        };
        if ineq.is_true()? != lit.sign() {
            return Ok(());
        }
        self.repair(ctx, lit)
    }

    // ------------------------------------------------------------------
    // Debug invariants

    #[cfg(debug_assertions)]
    fn check_invariants(&self) {
        for ineq in self.atoms.iter().flatten() {
            let mut val = N::zero();
            for (c, v) in &ineq.args {
                val = val
                    .add(&c.mul(self.value(*v)).expect("invariant eval"))
                    .expect("invariant eval");
            }
            debug_assert_eq!(val, ineq.args_value);
        }
        for md in &self.muls {
            let mut prod = md.coeff.clone();
            for v in &md.monomial {
                prod = prod.mul(self.value(*v)).expect("invariant eval");
            }
            debug_assert_eq!(&prod, self.value(md.var));
        }
        for ad in &self.adds {
            let mut sum = ad.coeff.clone();
            for (c, v) in &ad.args {
                sum = sum
                    .add(&c.mul(self.value(*v)).expect("invariant eval"))
                    .expect("invariant eval");
            }
            debug_assert_eq!(&sum, self.value(ad.var));
        }
    }

    #[cfg(not(debug_assertions))]
    fn check_invariants(&self) {}
}

impl<N: Num, C: Context> Plugin<C> for ArithSls<N> {
    fn register_term(&mut self, tm: &TermManager, ctx: &mut C, t: TermId) -> Result<()> {
        if let Some(bv) = ctx.bool_var(t) {
            self.init_bool_var(tm, bv, t)?;
        }
        let arith_family = matches!(
            tm.kind(t),
            TermKind::Numeral(_)
                | TermKind::Add(_)
                | TermKind::Sub(_, _)
                | TermKind::Mul(_)
                | TermKind::Neg(_)
                | TermKind::Mod(_, _)
                | TermKind::Rem(_, _)
                | TermKind::Idiv(_, _)
                | TermKind::Div(_, _)
                | TermKind::Abs(_)
                | TermKind::ToInt(_)
                | TermKind::ToReal(_)
                | TermKind::Power(_, _)
                | TermKind::Le(_, _)
                | TermKind::Lt(_, _)
                | TermKind::IsInt(_)
        );
        if !arith_family && !matches!(tm.kind(t), TermKind::Eq(_, _) | TermKind::Distinct(_)) {
            for arg in tm.args(t) {
                if tm.sort(arg).is_arith() {
                    self.mk_term(tm, arg)?;
                }
            }
        }
        Ok(())
    }

    fn set_value(&mut self, tm: &TermManager, ctx: &mut C, t: TermId, value: TermId) -> Result<()> {
        if !tm.sort(t).is_arith() {
            return Ok(());
        }
        let w = self.mk_term(tm, t)?;
        let TermKind::Numeral(r) = tm.kind(value) else {
            return Ok(());
        };
        let n = N::from_numeral(r)?;
        if n == *self.value(w) {
            return Ok(());
        }
        self.update(ctx, w, n)?;
        Ok(())
    }

    fn get_value(&mut self, tm: &mut TermManager, t: TermId) -> Result<TermId> {
        let sort = tm.sort(t);
        if let TermKind::Numeral(r) = tm.kind(t) {
            let r = r.clone();
            return Ok(tm.mk_numeral(r, sort));
        }
        let v = self.mk_term(tm, t)?;
        let r = self.value(v).to_numeral();
        Ok(tm.mk_numeral(r, sort))
    }

    fn initialize(&mut self, tm: &mut TermManager, ctx: &mut C) -> Result<()> {
        for lit in ctx.unit_literals() {
            self.initialize_unit(tm, ctx, lit)?;
        }
        Ok(())
    }

    fn propagate_literal(&mut self, ctx: &mut C, lit: Lit) -> Result<()> {
        self.propagate_literal_impl(ctx, lit)
    }

    fn propagate(&mut self, _ctx: &mut C) -> Result<bool> {
        Ok(false)
    }

    fn repair_up(&mut self, ctx: &mut C, t: TermId) -> Result<()> {
        let Some(&v) = self.expr_to_var.get(&t) else {
            return Ok(());
        };
        let vi = &self.vars[v as usize];
        if vi.def_idx == NULL_IDX {
            return Ok(());
        }
        let (op, def_idx) = (vi.op, vi.def_idx);
        let val = match op {
            OpKind::None => return Ok(()),
            OpKind::Add => {
                let ad = &self.adds[def_idx as usize];
                let (args, coeff) = (ad.args.clone(), ad.coeff.clone());
                let mut sum = coeff;
                for (c, w) in &args {
                    sum = sum.add(&c.mul(self.value(*w))?)?;
                }
                sum
            }
            OpKind::Mul => {
                let md = &self.muls[def_idx as usize];
                let (coeff, monomial) = (md.coeff.clone(), md.monomial.clone());
                let mut prod = coeff;
                for w in &monomial {
                    prod = prod.mul(self.value(*w))?;
                }
                prod
            }
            _ => {
                let od = self.ops[def_idx as usize];
                let v1 = self.value(od.arg1).clone();
                let v2 = self.value(od.arg2).clone();
                match op {
                    OpKind::Mod => {
                        if v2.is_zero() {
                            N::zero()
                        } else {
                            v1.mod_euclid(&v2)?
                        }
                    }
                    OpKind::Rem => {
                        if v2.is_zero() {
                            N::zero()
                        } else {
                            v1.rem_trunc(&v2)?
                        }
                    }
                    OpKind::Idiv => {
                        if v2.is_zero() {
                            N::zero()
                        } else {
                            v1.div_floor(&v2)?
                        }
                    }
                    OpKind::Div => {
                        if v2.is_zero() {
                            N::zero()
                        } else {
                            v1.div_real(&v2)?
                        }
                    }
                    OpKind::Abs => v1.abs()?,
                    OpKind::ToInt => v1.div_floor(&N::one())?,
                    OpKind::ToReal => v1,
                    _ => return Err(Error::Unsupported("repair_up operator")),
                }
            }
        };
        self.update(ctx, v, val)?;
        Ok(())
    }

    fn repair_down(&mut self, ctx: &mut C, t: TermId) -> Result<bool> {
        let Some(&v) = self.expr_to_var.get(&t) else {
            return Ok(false);
        };
        let vi = &self.vars[v as usize];
        if vi.def_idx == NULL_IDX {
            return Ok(false);
        }
        let (op, def_idx) = (vi.op, vi.def_idx);
        match op {
            OpKind::None => Ok(true),
            OpKind::Add => {
                let ad = self.adds[def_idx as usize].clone();
                self.repair_add(ctx, &ad)
            }
            OpKind::Mul => {
                let md = self.muls[def_idx as usize].clone();
                self.repair_mul(ctx, &md)
            }
            OpKind::Mod => self.repair_mod(ctx, self.ops[def_idx as usize]),
            OpKind::Rem => self.repair_rem(ctx, self.ops[def_idx as usize]),
            OpKind::Idiv => self.repair_idiv(ctx, self.ops[def_idx as usize]),
            OpKind::Div => self.repair_div(ctx, self.ops[def_idx as usize]),
            OpKind::Abs => self.repair_abs(ctx, self.ops[def_idx as usize]),
            OpKind::ToInt => self.repair_to_int(ctx, self.ops[def_idx as usize]),
            OpKind::ToReal => self.repair_to_real(ctx, self.ops[def_idx as usize]),
            OpKind::Power => self.repair_power(ctx, self.ops[def_idx as usize]),
        }
    }

    fn repair_literal(&mut self, ctx: &mut C, lit: Lit) -> Result<()> {
        let bv = lit.var();
        if let Some(ineq) = self.atom(bv) {
            if ineq.is_true()? != ctx.is_true(Lit::positive(bv)) {
                ctx.flip(bv);
                self.stats.num_flips += 1;
            }
        }
        Ok(())
    }

    fn is_sat(&self, ctx: &C) -> bool {
        self.check_invariants();
        (0..ctx.num_clauses()).all(|i| self.clause_is_sat(ctx, i))
    }

    fn on_restart(&mut self, ctx: &mut C) -> Result<()> {
        for bv in 0..ctx.num_bool_vars() {
            if let Some(ineq) = self.atom(bv) {
                let holds = ineq.dtt(false)?.is_zero();
                if ctx.is_true(Lit::positive(bv)) != holds {
                    ctx.flip(bv);
                    self.stats.num_flips += 1;
                }
            }
        }
        Ok(())
    }

    fn on_rescale(&mut self) {
        self.dscore_mode = true;
    }

    fn mk_model(&mut self, tm: &mut TermManager, model: &mut Model) -> Result<()> {
        // best values are re-snapshotted whenever the search improves, so
        // after a successful search they coincide with the live assignment
        for vi in &self.vars {
            let sort = tm.sort(vi.term);
            if !sort.is_arith() {
                continue;
            }
            let value = tm.mk_numeral(vi.best_value.to_numeral(), sort);
            model.assign(vi.term, value);
        }
        Ok(())
    }
}

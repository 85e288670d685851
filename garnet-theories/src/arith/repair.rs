//! Repair Moves and Rewards.
//!
//! A critical move proposes a new value for one variable that flips an
//! atom's truth value. Kind-specific repairs restore definitional equalities
//! for add/mul/op definitions. Rewards drive the choice of which variable to
//! move, sampling proportionally to the net gain in satisfied atoms.

use super::{AddDef, ArithSls, ArithVar, Ineq, IneqKind, MulDef, OpDef};
use garnet_core::context::Context;
use garnet_core::error::{Error, Result};
use garnet_core::literal::Lit;
use garnet_core::num::{factor, Num};
use tracing::trace;

impl<N: Num> ArithSls<N> {
    /// Division used when sizing a move: rounds away from zero for integer
    /// variables so the move always clears the bound, exact for reals.
    pub(super) fn divide(&self, v: ArithVar, delta: &N, coeff: &N) -> Result<N> {
        if self.is_int(v) {
            delta.add(&coeff.abs()?)?.sub(&N::one())?.div_floor(coeff)
        } else {
            delta.div_real(coeff)
        }
    }

    /// Critical move: compute a value for `v` that flips the atom's truth.
    pub(super) fn cm<C: Context>(
        &self,
        ctx: &mut C,
        ineq: &Ineq<N>,
        v: ArithVar,
        new_value: &mut N,
    ) -> Result<bool> {
        match ineq.coeff_of(v) {
            Some(c) => {
                let c = c.clone();
                self.cm_with_coeff(ctx, ineq, v, &c, new_value)
            }
            None => Ok(false),
        }
    }

    pub(super) fn cm_with_coeff<C: Context>(
        &self,
        ctx: &mut C,
        ineq: &Ineq<N>,
        v: ArithVar,
        coeff: &N,
        new_value: &mut N,
    ) -> Result<bool> {
        if self.is_fixed(v) {
            return Ok(false);
        }
        let bound = ineq.coeff.neg()?;
        let argsv = ineq.args_value.clone();
        let value = self.value(v).clone();
        let currently_true = ineq.is_true()?;
        let delta0 = argsv.sub(&bound)?;

        let well_formed = |nv: &N| -> Result<bool> {
            let new_args = argsv.add(&coeff.mul(&nv.sub(&value)?)?)?;
            Ok(if currently_true {
                match ineq.op {
                    IneqKind::Le => new_args > bound,
                    IneqKind::Lt => new_args >= bound,
                    IneqKind::Eq => new_args != bound,
                }
            } else {
                match ineq.op {
                    IneqKind::Le => new_args <= bound,
                    IneqKind::Lt => new_args < bound,
                    IneqKind::Eq => new_args == bound,
                }
            })
        };

        // Clamp a well-formed candidate into the variable's bounds: snap to
        // the violated bound, back off by one if the snap un-flips the atom,
        // then re-verify both conditions.
        let lo = self.vars[v as usize].lo.clone();
        let hi = self.vars[v as usize].hi.clone();
        let move_to_bounds = |nv: &mut N| -> Result<bool> {
            if !self.in_bounds(v, &value) {
                return Ok(true);
            }
            if self.in_bounds(v, nv) {
                return Ok(true);
            }
            if let Some(lo) = &lo {
                if lo.value > *nv {
                    *nv = lo.value.clone();
                    if !well_formed(nv)? {
                        *nv = nv.add(&N::one())?;
                    }
                }
            }
            if let Some(hi) = &hi {
                if hi.value < *nv {
                    *nv = hi.value.clone();
                    if !well_formed(nv)? {
                        *nv = nv.sub(&N::one())?;
                    }
                }
            }
            Ok(well_formed(nv)? && self.in_bounds(v, nv))
        };

        if currently_true {
            match ineq.op {
                IneqKind::Le => {
                    // args <= bound, push above the bound
                    let slack = N::from_i64(i64::from(ctx.rand(3)));
                    let d = delta0.sub(&N::one())?.sub(&slack)?.abs()?;
                    *new_value = value.add(&self.divide(v, &d, coeff)?)?;
                    move_to_bounds(new_value)
                }
                IneqKind::Lt => {
                    let slack = N::from_i64(i64::from(ctx.rand(3)));
                    let d = delta0.abs()?.add(&slack)?;
                    *new_value = value.add(&self.divide(v, &d, coeff)?)?;
                    move_to_bounds(new_value)
                }
                IneqKind::Eq => {
                    let offset = N::from_i64(i64::from(ctx.rand(10)));
                    let d = delta0.abs()?.add(&N::one())?.add(&offset)?;
                    let step = self.divide(v, &d.abs()?, coeff)?;
                    *new_value = if ctx.rand(2) == 0 {
                        value.add(&step)?
                    } else {
                        value.sub(&step)?
                    };
                    move_to_bounds(new_value)
                }
            }
        } else {
            match ineq.op {
                IneqKind::Le => {
                    let d = delta0.add(&N::from_i64(i64::from(ctx.rand(10))))?;
                    let d = d.add(&N::from_i64(i64::from(ctx.rand(3))))?;
                    *new_value = value.sub(&self.divide(v, &d, coeff)?)?;
                    move_to_bounds(new_value)
                }
                IneqKind::Lt => {
                    let d = delta0.add(&N::one())?.add(&N::from_i64(i64::from(ctx.rand(10))))?;
                    let d = d.add(&N::from_i64(i64::from(ctx.rand(3))))?;
                    *new_value = value.sub(&self.divide(v, &d, coeff)?)?;
                    move_to_bounds(new_value)
                }
                IneqKind::Eq => {
                    // only an exact division solves an equality
                    if delta0.is_negative() {
                        *new_value = value.add(&self.divide(v, &delta0.abs()?, coeff)?)?;
                    } else {
                        *new_value = value.sub(&self.divide(v, &delta0, coeff)?)?;
                    }
                    let solved = argsv.add(&coeff.mul(&new_value.sub(&value)?)?)? == bound;
                    Ok(solved && move_to_bounds(new_value)?)
                }
            }
        }
    }

    /// Repair the atom of an asserted literal: pick a variable by reward,
    /// try the equality path, then a critical move, and as a last resort
    /// flip the Boolean.
    pub(super) fn repair<C: Context>(&mut self, ctx: &mut C, lit: Lit) -> Result<()> {
        let bv = lit.var();
        self.dtt_reward(ctx, lit)?;
        let Some(ineq) = self.atom(bv).cloned() else {
            return Ok(());
        };
        let Some(v) = ineq.var_to_flip else {
            return Ok(());
        };
        if self.repair_eq(ctx, lit)? {
            return Ok(());
        }
        let mut new_value = N::zero();
        if self.cm(ctx, &ineq, v, &mut new_value)? {
            trace!(var = v, "repair move to {}", new_value);
            self.update(ctx, v, new_value)?;
        } else {
            trace!(var = v, "no critical move");
        }
        self.sync_bool_var(ctx, bv)
    }

    /// Equality repair: occasionally try the pair-equation solver before
    /// the critical move, and always after it fails.
    fn repair_eq<C: Context>(&mut self, ctx: &mut C, lit: Lit) -> Result<bool> {
        let bv = lit.var();
        let Some(ineq) = self.atom(bv).cloned() else {
            return Ok(false);
        };
        if lit.sign() || ineq.op != IneqKind::Eq {
            return Ok(false);
        }
        let Some(v) = ineq.var_to_flip else {
            return Ok(false);
        };
        let mut new_value = N::zero();
        let solved = if ctx.rand(100) < self.config.eq_pair_solve_percent
            && self.solve_eq_pairs(ctx, bv)?
        {
            true
        } else if self.cm(ctx, &ineq, v, &mut new_value)? && self.update(ctx, v, new_value)? {
            true
        } else {
            self.solve_eq_pairs(ctx, bv)?
        };
        if !solved {
            return Ok(false);
        }
        self.sync_bool_var(ctx, bv)?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Kind-specific repairs

    pub(super) fn repair_add<C: Context>(&mut self, ctx: &mut C, ad: &AddDef<N>) -> Result<bool> {
        let v = ad.var;
        let mut sum = ad.coeff.clone();
        for (c, w) in &ad.args {
            sum = sum.add(&c.mul(self.value(*w))?)?;
        }
        let val = self.value(v).clone();
        if val == sum {
            return Ok(true);
        }
        if ctx.rand(20) == 0 {
            return self.update(ctx, v, sum);
        }
        let (c, w) = ad.args[ctx.rand(ad.args.len() as u32) as usize].clone();
        let excess = sum.sub(&val)?;
        let step = if !self.is_int(w) {
            excess.div_real(&c)?
        } else if ctx.rand(2) == 0 {
            excess.div_floor(&c)?
        } else {
            excess.add(&c)?.sub(&N::one())?.div_floor(&c)?
        };
        let new_value = self.value(w).sub(&step)?;
        self.update(ctx, w, new_value)
    }

    /// Perfect-square pattern `v = coeff * w * w` over integers.
    fn repair_square<C: Context>(&mut self, ctx: &mut C, md: &MulDef<N>) -> Result<bool> {
        let v = md.var;
        if !self.is_int(v) || md.monomial.len() != 2 || md.monomial[0] != md.monomial[1] {
            return Ok(false);
        }
        let val = self.value(v).div_floor(&md.coeff)?;
        let w = md.monomial[0];
        if val.is_negative() {
            let r = ctx.rand(10);
            self.update(ctx, w, N::from_i64(i64::from(r)))?;
        } else {
            let mut root = val.sqrt_floor()?;
            if ctx.rand(3) == 0 {
                root = root.neg()?;
            }
            if root.mul(&root)? == val {
                self.update(ctx, w, root)?;
            } else {
                let jitter = N::from_i64(i64::from(ctx.rand(3))).sub(&N::one())?;
                self.update(ctx, w, root.add(&jitter)?)?;
            }
        }
        Ok(true)
    }

    /// Solve for one factor exactly when the others divide the target.
    fn repair_mul1<C: Context>(&mut self, ctx: &mut C, md: &MulDef<N>) -> Result<bool> {
        let v = md.var;
        if !self.is_int(v) {
            return Ok(false);
        }
        let val = self.value(v).div_floor(&md.coeff)?;
        if val.is_zero() {
            return Ok(false);
        }
        let sz = md.monomial.len();
        let start = ctx.rand(sz as u32) as usize;
        for i in 0..sz {
            let j = (start + i) % sz;
            let w = md.monomial[j];
            let mut product = N::one();
            for u in &md.monomial {
                if *u != w {
                    product = product.mul(self.value(*u))?;
                }
            }
            if product.is_zero() || !product.divides(&val) {
                continue;
            }
            if self.update(ctx, w, val.div_floor(&product)?)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub(super) fn repair_mul<C: Context>(&mut self, ctx: &mut C, md: &MulDef<N>) -> Result<bool> {
        let v = md.var;
        let mut product = md.coeff.clone();
        for w in &md.monomial {
            product = product.mul(self.value(*w))?;
        }
        let val = self.value(v).clone();
        if product == val {
            return Ok(true);
        }
        trace!(var = v, "repair mul target {} product {}", val, product);
        let sz = md.monomial.len() as u32;
        if ctx.rand(20) == 0 {
            return self.update(ctx, v, product);
        }
        if val.is_zero() {
            let w = md.monomial[ctx.rand(sz) as usize];
            return self.update(ctx, w, N::zero());
        }
        if self.repair_square(ctx, md)? {
            return Ok(true);
        }
        if ctx.rand(4) != 0 && self.repair_mul1(ctx, md)? {
            return Ok(true);
        }
        if !self.is_int(v) {
            // no factoring over the reals, recompute the result instead
            return self.update(ctx, v, product);
        }
        // Factor the target into small primes and distribute them randomly
        // over the monomial, respecting each variable's bound sign.
        let mut n = val.div_floor(&md.coeff)?;
        if !md.coeff.divides(&val) && ctx.rand(2) == 0 {
            n = val.add(&md.coeff)?.sub(&N::one())?.div_floor(&md.coeff)?;
        }
        let fs = factor(&n.abs()?)?;
        let mut coeffs: Vec<N> = Vec::with_capacity(md.monomial.len());
        for w in &md.monomial {
            let vi = &self.vars[*w as usize];
            let c = if vi.lo.as_ref().is_some_and(|lo| !lo.value.is_negative()) {
                N::one()
            } else if vi.hi.as_ref().is_some_and(|hi| hi.value.is_negative()) {
                N::one().neg()?
            } else if ctx.rand(2) == 0 {
                N::one()
            } else {
                N::one().neg()?
            };
            coeffs.push(c);
        }
        for f in fs {
            let j = ctx.rand(sz) as usize;
            coeffs[j] = coeffs[j].mul(&f)?;
        }
        let mut prod_sign = N::one();
        for c in &coeffs {
            prod_sign = prod_sign.mul(c)?;
        }
        if !n.is_zero() && prod_sign.is_negative() != n.is_negative() {
            let j = ctx.rand(sz) as usize;
            coeffs[j] = coeffs[j].neg()?;
        }
        for (i, w) in md.monomial.iter().enumerate() {
            if !self.update(ctx, *w, coeffs[i].clone())? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub(super) fn repair_mod<C: Context>(&mut self, ctx: &mut C, od: OpDef) -> Result<bool> {
        let val = self.value(od.var).clone();
        let v1 = self.value(od.arg1).clone();
        let v2 = self.value(od.arg2).clone();
        // result already in range: shift the first argument onto it
        if !val.is_negative() && val < v2 {
            let v3 = v1.mod_euclid(&v2)?;
            if v3 == val {
                return Ok(true);
            }
            let mut new_v1 = v1.add(&val)?.sub(&v3)?;
            match ctx.rand(6) {
                0 => new_v1 = new_v1.add(&v2)?,
                1 => new_v1 = new_v1.sub(&v2)?,
                _ => {}
            }
            return self.update(ctx, od.arg1, new_v1);
        }
        let fixed = if v2.is_zero() {
            N::zero()
        } else {
            v1.mod_euclid(&v2)?
        };
        self.update(ctx, od.var, fixed)
    }

    pub(super) fn repair_rem<C: Context>(&mut self, ctx: &mut C, od: OpDef) -> Result<bool> {
        let v1 = self.value(od.arg1).clone();
        let v2 = self.value(od.arg2).clone();
        if v2.is_zero() {
            return self.update(ctx, od.var, N::zero());
        }
        self.update(ctx, od.var, v1.rem_trunc(&v2)?)
    }

    pub(super) fn repair_idiv<C: Context>(&mut self, ctx: &mut C, od: OpDef) -> Result<bool> {
        let v1 = self.value(od.arg1).clone();
        let v2 = self.value(od.arg2).clone();
        let val = if v2.is_zero() {
            N::zero()
        } else {
            v1.div_floor(&v2)?
        };
        self.update(ctx, od.var, val)
    }

    pub(super) fn repair_div<C: Context>(&mut self, ctx: &mut C, od: OpDef) -> Result<bool> {
        let v1 = self.value(od.arg1).clone();
        let v2 = self.value(od.arg2).clone();
        let val = if v2.is_zero() {
            N::zero()
        } else {
            v1.div_real(&v2)?
        };
        self.update(ctx, od.var, val)
    }

    pub(super) fn repair_abs<C: Context>(&mut self, ctx: &mut C, od: OpDef) -> Result<bool> {
        let val = self.value(od.var).clone();
        let v1 = self.value(od.arg1).clone();
        if val.is_negative() {
            self.update(ctx, od.var, v1.abs()?)
        } else if ctx.rand(2) == 0 {
            self.update(ctx, od.arg1, val)
        } else {
            let neg = val.neg()?;
            self.update(ctx, od.arg1, neg)
        }
    }

    pub(super) fn repair_to_int<C: Context>(&mut self, ctx: &mut C, od: OpDef) -> Result<bool> {
        let val = self.value(od.var).clone();
        let v1 = self.value(od.arg1).clone();
        // accept when val - 1 < arg <= val
        if val.sub(&N::one())? < v1 && v1 <= val {
            return Ok(true);
        }
        self.update(ctx, od.arg1, val)
    }

    pub(super) fn repair_to_real<C: Context>(&mut self, ctx: &mut C, od: OpDef) -> Result<bool> {
        let val = self.value(od.var).clone();
        let v1 = self.value(od.arg1).clone();
        if ctx.rand(20) == 0 || !val.is_integral() {
            self.update(ctx, od.var, v1)
        } else {
            self.update(ctx, od.arg1, val)
        }
    }

    pub(super) fn repair_power<C: Context>(&mut self, ctx: &mut C, od: OpDef) -> Result<bool> {
        let v1 = self.value(od.arg1).clone();
        let v2 = self.value(od.arg2).clone();
        if v1.is_zero() && v2.is_zero() {
            return self.update(ctx, od.var, N::zero());
        }
        Err(Error::Unsupported("power repair"))
    }

    // ------------------------------------------------------------------
    // Rewards

    /// Reward of flipping a literal under the current scoring mode.
    pub fn reward<C: Context>(&mut self, ctx: &mut C, lit: Lit) -> Result<f64> {
        if self.dscore_mode {
            self.dscore_reward(ctx, lit.var())
        } else {
            self.dtt_reward(ctx, lit)
        }
    }

    /// Per-argument net change in satisfied atoms; samples one argument
    /// proportionally to its effect and records it as the variable to flip.
    /// Returns the best net effect seen.
    pub(super) fn dtt_reward<C: Context>(&mut self, ctx: &mut C, lit: Lit) -> Result<f64> {
        let bv = lit.var();
        let Some(ineq) = self.atom(bv).cloned() else {
            return Ok(-1.0);
        };
        if ineq.args.is_empty() {
            return Ok(-1.0);
        }
        self.probs.clear();
        let mut max_result = -100.0f64;
        let mut ties = 0u32;
        let mut sum_prob = 0.0f64;
        let mut new_value = N::zero();
        for (coeff, x) in &ineq.args {
            let prob = if self.is_fixed(*x) {
                0.0
            } else if !self.cm_with_coeff(ctx, &ineq, *x, coeff, &mut new_value)? {
                0.5
            } else {
                let mut result = 0.0f64;
                let old_value = self.value(*x).clone();
                for (coeff2, bv2) in self.vars[*x as usize].bool_vars.clone() {
                    let Some(atom2) = self.atom(bv2) else {
                        continue;
                    };
                    let old_sign = Self::var_sign(ctx, bv2);
                    let dtt_old = atom2.dtt(old_sign)?;
                    let dtt_new =
                        atom2.dtt_with_coeff(old_sign, &coeff2, &old_value, &new_value)?;
                    if dtt_new.is_zero() && !dtt_old.is_zero() {
                        result += 1.0;
                    }
                    if !dtt_new.is_zero() && dtt_old.is_zero() {
                        result -= 1.0;
                    }
                }
                let tied = result == max_result && {
                    ties += 1;
                    ctx.rand(ties) == 0
                };
                if result > max_result || max_result == -100.0 || tied {
                    max_result = result;
                }
                if result < 0.0 {
                    0.1
                } else if result == 0.0 {
                    0.2
                } else {
                    result
                }
            };
            self.probs.push(prob);
            sum_prob += prob;
        }
        let mut lim = sum_prob * (f64::from(ctx.rand_u32()) / f64::from(u32::MAX));
        let mut i = self.probs.len();
        loop {
            i -= 1;
            lim -= self.probs[i];
            if lim < 0.0 || i == 0 {
                break;
            }
        }
        self.atoms[bv as usize]
            .as_mut()
            .expect("atom present")
            .var_to_flip = Some(ineq.args[i].1);
        Ok(max_result)
    }

    /// Weighted-clause scoring used after a rescale: take the first
    /// variable whose move has a positive weighted gain.
    pub(super) fn dscore_reward<C: Context>(
        &mut self,
        ctx: &mut C,
        bv: garnet_core::literal::Var,
    ) -> Result<f64> {
        self.dscore_mode = false;
        let Some(ineq) = self.atom(bv).cloned() else {
            return Ok(0.0);
        };
        let mut new_value = N::zero();
        for (coeff, v) in &ineq.args {
            if self.cm_with_coeff(ctx, &ineq, *v, coeff, &mut new_value)? {
                let result = self.dscore(ctx, *v, &new_value)?;
                if result > 0.0 {
                    self.atoms[bv as usize]
                        .as_mut()
                        .expect("atom present")
                        .var_to_flip = Some(*v);
                    return Ok(result);
                }
            }
        }
        Ok(0.0)
    }

    /// `dscore(v, new) = Σ_cl (dts(cl) - dts(cl, v, new)) · weight(cl)` over
    /// clauses using any atom mentioning `v`, in both phases.
    fn dscore<C: Context>(&self, ctx: &C, v: ArithVar, new_value: &N) -> Result<f64> {
        let mut score = 0.0;
        for (_, bv) in &self.vars[v as usize].bool_vars {
            let lit = Lit::positive(*bv);
            for &cl in ctx.get_use_list(lit) {
                let before = self.compute_dts(ctx, cl)?.to_f64();
                let after = self.dts(ctx, cl, v, new_value)?.to_f64();
                score += (before - after) * ctx.get_weight(cl) as f64;
            }
            for &cl in ctx.get_use_list(lit.negate()) {
                let before = self.compute_dts(ctx, cl)?.to_f64();
                let after = self.dts(ctx, cl, v, new_value)?.to_f64();
                score += (before - after) * ctx.get_weight(cl) as f64;
            }
        }
        Ok(score)
    }

    /// Distance-to-satisfaction of a clause: minimum atom dtt.
    fn compute_dts<C: Context>(&self, ctx: &C, cl: u32) -> Result<N> {
        let mut d = N::one();
        let mut first = true;
        for &lit in &ctx.get_clause(cl).lits {
            let Some(atom) = self.atom(lit.var()) else {
                continue;
            };
            let d2 = atom.dtt(lit.sign())?;
            if first {
                d = d2;
                first = false;
            } else if d2 < d {
                d = d2;
            }
            if d.is_zero() {
                break;
            }
        }
        Ok(d)
    }

    /// Distance-to-satisfaction of a clause if `v` moved to `new_value`.
    fn dts<C: Context>(&self, ctx: &C, cl: u32, v: ArithVar, new_value: &N) -> Result<N> {
        let mut d = N::one();
        let mut first = true;
        let old_value = self.value(v);
        for &lit in &ctx.get_clause(cl).lits {
            let Some(atom) = self.atom(lit.var()) else {
                continue;
            };
            let d2 = atom.dtt_with_var(lit.sign(), v, old_value, new_value)?;
            if first {
                d = d2;
                first = false;
            } else if d2 < d {
                d = d2;
            }
            if d.is_zero() {
                break;
            }
        }
        Ok(d)
    }

    /// Clause-count delta of moving `v` to `new_value`: +1 for every
    /// unsatisfied clause gaining its first true literal, -1 for every
    /// clause losing its only one.
    pub fn cm_score<C: Context>(&self, ctx: &C, v: ArithVar, new_value: &N) -> Result<i32> {
        let mut score = 0i32;
        let old_value = self.value(v).clone();
        for (coeff, bv) in &self.vars[v as usize].bool_vars {
            let Some(ineq) = self.atom(*bv) else {
                continue;
            };
            let old_sign = Self::var_sign(ctx, *bv);
            let dtt_old = ineq.dtt(old_sign)?;
            let dtt_new = ineq.dtt_with_coeff(old_sign, coeff, &old_value, new_value)?;
            if dtt_old.is_zero() == dtt_new.is_zero() {
                continue;
            }
            let mut lit = Lit::new(*bv, old_sign);
            if dtt_old.is_zero() {
                lit = lit.negate();
            }
            // lit flips from false to true
            for &cl in ctx.get_use_list(lit) {
                if ctx.num_true_lits(cl) == 0 {
                    score += 1;
                }
            }
            for &cl in ctx.get_use_list(lit.negate()) {
                if ctx.num_true_lits(cl) == 1 {
                    score -= 1;
                }
            }
        }
        Ok(score)
    }
}

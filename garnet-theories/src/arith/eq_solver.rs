//! Pair-Equation Solver for Equality Atoms.
//!
//! For an equality atom with non-unit coefficients, fix all variables but
//! two and solve the remaining linear Diophantine equation `a·x + b·y = r`
//! with the extended Euclidean algorithm, shifting the general solution
//! along `(b/g, -a/g)` until both variables sit inside their bounds.

use super::{ArithSls, ArithVar, Bound, IneqKind};
use garnet_core::context::Context;
use garnet_core::error::Result;
use garnet_core::literal::Var;
use garnet_core::num::Num;
use tracing::trace;

impl<N: Num> ArithSls<N> {
    /// Try to satisfy the equality atom of `bv` by re-solving for the
    /// flip variable paired with one other non-unit-coefficient variable.
    pub(super) fn solve_eq_pairs<C: Context>(&mut self, ctx: &mut C, bv: Var) -> Result<bool> {
        let Some(ineq) = self.atom(bv).cloned() else {
            return Ok(false);
        };
        debug_assert_eq!(ineq.op, IneqKind::Eq);
        let Some(v) = ineq.var_to_flip else {
            return Ok(false);
        };
        if self.is_fixed(v) {
            return Ok(false);
        }
        let bound = ineq.coeff.neg()?;
        let mut a = N::zero();
        let mut argsv = ineq.args_value.clone();
        for (c, w) in &ineq.args {
            if *w == v {
                a = c.clone();
                argsv = argsv.sub(&c.mul(self.value(v))?)?;
            }
        }
        if a.abs()? == N::one() {
            return Ok(false);
        }
        trace!(var = v, "solve eq pairs for {}", ineq);
        let len = ineq.args.len();
        let start = ctx.rand(len as u32) as usize;
        for i in 0..len {
            let j = (start + i) % len;
            let (b, w) = ineq.args[j].clone();
            if w == v || b.abs()? == N::one() {
                continue;
            }
            let reduced = argsv.sub(&b.mul(self.value(w))?)?;
            let r = bound.sub(&reduced)?;
            if self.solve_eq_pair(ctx, &a, v, &b, w, &r)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Solve `a·x + b·y = r` inside the bounds of `x` and `y`, rejecting
    /// solutions that blow up past the configured growth limit.
    fn solve_eq_pair<C: Context>(
        &mut self,
        ctx: &mut C,
        a: &N,
        x: ArithVar,
        b: &N,
        y: ArithVar,
        r: &N,
    ) -> Result<bool> {
        if self.is_fixed(y) {
            return Ok(false);
        }
        let (g, mut x0, mut y0) = a.gcd_ext(b)?;
        debug_assert!(g >= N::one());
        if !g.divides(r) {
            return Ok(false);
        }
        let scale = r.div_floor(&g)?;
        x0 = x0.mul(&scale)?;
        y0 = y0.mul(&scale)?;

        let lo_x = self.vars[x as usize].lo.clone();
        let hi_x = self.vars[x as usize].hi.clone();
        let lo_y = self.vars[y as usize].lo.clone();
        let hi_y = self.vars[y as usize].hi.clone();

        if !self.shift_up(x, &mut x0, &mut y0, a, b, &g, &lo_x, &hi_x)? {
            return Ok(false);
        }
        if !self.shift_down(&mut x0, &mut y0, a, b, &g, &lo_x, &hi_x)? {
            return Ok(false);
        }
        if !self.shift_up(y, &mut y0, &mut x0, b, a, &g, &lo_y, &hi_y)? {
            return Ok(false);
        }
        if !self.shift_down(&mut y0, &mut x0, b, a, &g, &lo_y, &hi_y)? {
            return Ok(false);
        }

        // the y-side shifts may have pushed x back out
        if lo_x.as_ref().is_some_and(|lo| lo.value > x0) {
            return Ok(false);
        }
        if hi_x.as_ref().is_some_and(|hi| hi.value < x0) {
            return Ok(false);
        }
        if x0 == *self.value(x) {
            return Ok(false);
        }
        if self.blows_up(x, &x0)? || self.blows_up(y, &y0)? {
            return Ok(false);
        }
        trace!(
            "eq pair solution v{} := {}, v{} := {}",
            x,
            x0,
            y,
            y0
        );
        self.update(ctx, x, x0)?;
        self.update(ctx, y, y0)?;
        Ok(true)
    }

    /// Step applied to the partner value when the primary moves up by
    /// `|b/g|` along the solution ray.
    fn partner_step(a: &N, b: &N, g: &N) -> Result<N> {
        let bg = b.div_floor(g)?;
        let ag = a.div_floor(g)?;
        if bg.is_negative() {
            Ok(ag)
        } else {
            ag.neg()
        }
    }

    /// Raise `x0` to meet its low bound, compensating through `y0`.
    #[allow(clippy::too_many_arguments)]
    fn shift_up(
        &self,
        x: ArithVar,
        x0: &mut N,
        y0: &mut N,
        a: &N,
        b: &N,
        g: &N,
        lo: &Option<Bound<N>>,
        hi: &Option<Bound<N>>,
    ) -> Result<bool> {
        let Some(lo) = lo else {
            return Ok(true);
        };
        if lo.value <= *x0 {
            return Ok(true);
        }
        let delta = lo.value.sub(x0)?;
        let bg = b.div_floor(g)?.abs()?;
        if bg.is_zero() {
            return Ok(false);
        }
        let k = self.divide(x, &delta, &bg)?;
        let x1 = x0.add(&k.mul(&bg)?)?;
        if hi.as_ref().is_some_and(|hi| hi.value < x1) {
            return Ok(false);
        }
        *x0 = x1;
        *y0 = y0.add(&k.mul(&Self::partner_step(a, b, g)?)?)?;
        Ok(true)
    }

    /// Lower `x0` to meet its high bound, compensating through `y0`. Uses
    /// floor steps; a residual violation is caught by the caller's final
    /// bound re-check.
    #[allow(clippy::too_many_arguments)]
    fn shift_down(
        &self,
        x0: &mut N,
        y0: &mut N,
        a: &N,
        b: &N,
        g: &N,
        lo: &Option<Bound<N>>,
        hi: &Option<Bound<N>>,
    ) -> Result<bool> {
        let Some(hi) = hi else {
            return Ok(true);
        };
        if hi.value >= *x0 {
            return Ok(true);
        }
        let delta = x0.sub(&hi.value)?;
        let bg = b.div_floor(g)?.abs()?;
        if bg.is_zero() {
            return Ok(false);
        }
        let k = delta.div_floor(&bg)?;
        let x1 = x0.sub(&k.mul(&bg)?)?;
        if lo.as_ref().is_some_and(|lo| lo.value > x1) {
            return Ok(false);
        }
        *x0 = x1;
        *y0 = y0.sub(&k.mul(&Self::partner_step(a, b, g)?)?)?;
        Ok(true)
    }

    /// Anti-blow-up: reject values whose magnitude exceeds the growth limit
    /// times the current magnitude (with a floor of the limit itself, so a
    /// zero current value still admits small solutions).
    fn blows_up(&self, v: ArithVar, new_value: &N) -> Result<bool> {
        let limit = N::from_i64(self.config.eq_pair_growth_limit);
        let cur = self.value(v).abs()?;
        let allowance = if cur < N::one() {
            limit
        } else {
            cur.mul(&limit)?
        };
        Ok(new_value.abs()? > allowance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use garnet_core::num::CheckedInt;

    #[test]
    fn partner_step_signs() {
        let a = CheckedInt::from_i64(3);
        let b = CheckedInt::from_i64(5);
        let g = CheckedInt::from_i64(1);
        // moving x up by |b/g| changes y by -a/g when b/g > 0
        assert_eq!(
            ArithSls::<CheckedInt>::partner_step(&a, &b, &g).unwrap(),
            CheckedInt::from_i64(-3)
        );
        let b_neg = CheckedInt::from_i64(-5);
        assert_eq!(
            ArithSls::<CheckedInt>::partner_step(&a, &b_neg, &g).unwrap(),
            CheckedInt::from_i64(3)
        );
    }
}

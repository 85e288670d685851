//! Host Context Capability.
//!
//! Theory cores never own the Boolean state. They observe and mutate it
//! through this capability: reading the current assignment, flipping
//! variables, walking clause use-lists and drawing reproducible random
//! numbers. [`SimpleContext`] is a complete single-threaded implementation
//! used by the local-search driver and the test suites.

use crate::ast::TermId;
use crate::literal::{Lit, Var};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Index of a clause in the host clause store.
pub type ClauseIdx = u32;

/// A weighted clause.
#[derive(Debug, Clone)]
pub struct Clause {
    /// The literals of the clause.
    pub lits: SmallVec<[Lit; 4]>,
    /// Soft weight used by weighted scoring.
    pub weight: u64,
}

/// Capability through which a theory core interacts with the host SAT state.
///
/// All randomness used by the cores flows through [`Context::rand`] so runs
/// are reproducible from the host seed.
pub trait Context {
    /// Is the literal true under the current Boolean assignment?
    fn is_true(&self, lit: Lit) -> bool;
    /// Toggle the assignment of a variable, updating clause truth counts.
    fn flip(&mut self, var: Var);
    /// The theory atom attached to a Boolean variable, if any.
    fn atom(&self, var: Var) -> Option<TermId>;
    /// The Boolean variable attached to a term, if any.
    fn bool_var(&self, term: TermId) -> Option<Var>;
    /// Number of Boolean variables.
    fn num_bool_vars(&self) -> u32;

    /// Clause access by index.
    fn get_clause(&self, idx: ClauseIdx) -> &Clause;
    /// Number of clauses.
    fn num_clauses(&self) -> u32;
    /// Indices of clauses containing the literal.
    fn get_use_list(&self, lit: Lit) -> &[ClauseIdx];
    /// Weight of a clause.
    fn get_weight(&self, idx: ClauseIdx) -> u64 {
        self.get_clause(idx).weight
    }
    /// Number of currently true literals in a clause.
    fn num_true_lits(&self, idx: ClauseIdx) -> u32;
    /// Literals asserted at the top level (unit clauses).
    fn unit_literals(&self) -> Vec<Lit>;
    /// Is the literal a top-level unit?
    fn is_unit(&self, lit: Lit) -> bool;

    /// Uniform draw from `[0, bound)`; `bound` must be positive.
    fn rand(&mut self, bound: u32) -> u32;
    /// Uniform 32-bit draw.
    fn rand_u32(&mut self) -> u32;

    /// Notification that a theory value changed for the given term.
    fn new_value_eh(&mut self, term: TermId);
    /// Add a clause to the host store.
    fn add_clause(&mut self, lits: &[Lit]);
    /// Get or create the Boolean literal for a term.
    fn mk_literal(&mut self, term: TermId) -> Lit;
    /// Report a theory conflict expressed as the literals that caused it.
    fn set_conflict(&mut self, lits: &[Lit]);
}

/// Self-contained host context: clause store, assignment, use lists and a
/// deterministic xorshift PRNG.
#[derive(Debug)]
pub struct SimpleContext {
    assignment: Vec<bool>,
    atoms: Vec<Option<TermId>>,
    term_to_var: FxHashMap<TermId, Var>,
    clauses: Vec<Clause>,
    true_counts: Vec<u32>,
    use_lists: Vec<Vec<ClauseIdx>>,
    units: Vec<Lit>,
    conflict: Option<Vec<Lit>>,
    touched: Vec<TermId>,
    rng: u64,
}

impl SimpleContext {
    /// Create a context with the given PRNG seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            assignment: Vec::new(),
            atoms: Vec::new(),
            term_to_var: FxHashMap::default(),
            clauses: Vec::new(),
            true_counts: Vec::new(),
            use_lists: Vec::new(),
            units: Vec::new(),
            conflict: None,
            touched: Vec::new(),
            rng: seed | 1,
        }
    }

    /// Create a fresh Boolean variable, optionally attached to a term.
    pub fn new_bool_var(&mut self, term: Option<TermId>) -> Var {
        let v = self.assignment.len() as Var;
        self.assignment.push(false);
        self.atoms.push(term);
        self.use_lists.push(Vec::new());
        self.use_lists.push(Vec::new());
        if let Some(t) = term {
            self.term_to_var.insert(t, v);
        }
        v
    }

    /// Set the assignment of a variable directly (no use-list maintenance
    /// needed before clauses are added).
    pub fn assign(&mut self, var: Var, value: bool) {
        if self.assignment[var as usize] != value {
            self.flip(var);
        }
    }

    /// The terms reported through [`Context::new_value_eh`] since the last
    /// call; clears the buffer.
    pub fn take_touched(&mut self) -> Vec<TermId> {
        std::mem::take(&mut self.touched)
    }

    /// The conflict recorded by [`Context::set_conflict`], if any.
    #[must_use]
    pub fn conflict(&self) -> Option<&[Lit]> {
        self.conflict.as_deref()
    }

    /// All clauses, for host-side iteration.
    #[must_use]
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Is every clause satisfied by the Boolean assignment?
    #[must_use]
    pub fn all_clauses_true(&self) -> bool {
        self.true_counts.iter().all(|&n| n > 0)
    }

    fn recount(&mut self, idx: ClauseIdx) {
        let n = self.clauses[idx as usize]
            .lits
            .iter()
            .filter(|&&l| self.is_true(l))
            .count() as u32;
        self.true_counts[idx as usize] = n;
    }
}

impl Context for SimpleContext {
    fn is_true(&self, lit: Lit) -> bool {
        self.assignment[lit.var() as usize] != lit.sign()
    }

    fn flip(&mut self, var: Var) {
        self.assignment[var as usize] = !self.assignment[var as usize];
        let pos = Lit::positive(var);
        for &idx in &self.use_lists[pos.raw() as usize] {
            let delta = if self.assignment[var as usize] { 1 } else { -1i32 };
            let n = &mut self.true_counts[idx as usize];
            *n = n.wrapping_add(delta as u32);
        }
        for &idx in &self.use_lists[pos.negate().raw() as usize] {
            let delta = if self.assignment[var as usize] { -1i32 } else { 1 };
            let n = &mut self.true_counts[idx as usize];
            *n = n.wrapping_add(delta as u32);
        }
    }

    fn atom(&self, var: Var) -> Option<TermId> {
        self.atoms.get(var as usize).copied().flatten()
    }

    fn bool_var(&self, term: TermId) -> Option<Var> {
        self.term_to_var.get(&term).copied()
    }

    fn num_bool_vars(&self) -> u32 {
        self.assignment.len() as u32
    }

    fn get_clause(&self, idx: ClauseIdx) -> &Clause {
        &self.clauses[idx as usize]
    }

    fn num_clauses(&self) -> u32 {
        self.clauses.len() as u32
    }

    fn get_use_list(&self, lit: Lit) -> &[ClauseIdx] {
        &self.use_lists[lit.raw() as usize]
    }

    fn num_true_lits(&self, idx: ClauseIdx) -> u32 {
        self.true_counts[idx as usize]
    }

    fn unit_literals(&self) -> Vec<Lit> {
        self.units.clone()
    }

    fn is_unit(&self, lit: Lit) -> bool {
        self.units.contains(&lit)
    }

    fn rand(&mut self, bound: u32) -> u32 {
        debug_assert!(bound > 0);
        self.rand_u32() % bound
    }

    fn rand_u32(&mut self) -> u32 {
        // xorshift64*
        let mut x = self.rng;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.rng = x;
        (x.wrapping_mul(0x2545_f491_4f6c_dd1d) >> 32) as u32
    }

    fn new_value_eh(&mut self, term: TermId) {
        self.touched.push(term);
    }

    fn add_clause(&mut self, lits: &[Lit]) {
        let idx = self.clauses.len() as ClauseIdx;
        self.clauses.push(Clause {
            lits: SmallVec::from_slice(lits),
            weight: 1,
        });
        self.true_counts.push(0);
        for &l in lits {
            self.use_lists[l.raw() as usize].push(idx);
        }
        self.recount(idx);
        if let [unit] = lits {
            self.units.push(*unit);
        }
    }

    fn mk_literal(&mut self, term: TermId) -> Lit {
        if let Some(&v) = self.term_to_var.get(&term) {
            return Lit::positive(v);
        }
        let v = self.new_bool_var(Some(term));
        Lit::positive(v)
    }

    fn set_conflict(&mut self, lits: &[Lit]) {
        self.conflict = Some(lits.to_vec());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flip_maintains_true_counts() {
        let mut ctx = SimpleContext::new(42);
        let a = ctx.new_bool_var(None);
        let b = ctx.new_bool_var(None);
        ctx.add_clause(&[Lit::positive(a), Lit::negative(b)]);
        // a=false, b=false: -b is true
        assert_eq!(ctx.num_true_lits(0), 1);
        ctx.flip(b);
        assert_eq!(ctx.num_true_lits(0), 0);
        ctx.flip(a);
        assert_eq!(ctx.num_true_lits(0), 1);
        assert!(ctx.all_clauses_true());
    }

    #[test]
    fn unit_tracking() {
        let mut ctx = SimpleContext::new(1);
        let a = ctx.new_bool_var(None);
        ctx.add_clause(&[Lit::negative(a)]);
        assert!(ctx.is_unit(Lit::negative(a)));
        assert!(!ctx.is_unit(Lit::positive(a)));
        assert_eq!(ctx.unit_literals(), vec![Lit::negative(a)]);
    }

    #[test]
    fn rand_is_deterministic() {
        let mut a = SimpleContext::new(7);
        let mut b = SimpleContext::new(7);
        for _ in 0..16 {
            assert_eq!(a.rand(10), b.rand(10));
        }
    }

    #[test]
    fn conflict_round_trip() {
        let mut ctx = SimpleContext::new(9);
        let a = ctx.new_bool_var(None);
        assert!(ctx.conflict().is_none());
        ctx.set_conflict(&[Lit::negative(a)]);
        assert_eq!(ctx.conflict(), Some(&[Lit::negative(a)][..]));
    }
}

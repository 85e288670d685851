//! Uniform Plugin Contract.
//!
//! Every theory core implements this contract. The host drives the cores
//! through it: registering terms, forwarding literal assignments, asking for
//! repair moves and collecting model values. There is no parallelism; the
//! only scheduling is the host's dispatch order.

use crate::ast::{TermId, TermManager};
use crate::context::Context;
use crate::error::Result;
use crate::literal::Lit;
use rustc_hash::FxHashMap;

/// Model under construction, mapping terms to value terms.
#[derive(Debug, Clone, Default)]
pub struct Model {
    assignments: FxHashMap<TermId, TermId>,
}

impl Model {
    /// Create an empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a value for a term.
    pub fn assign(&mut self, term: TermId, value: TermId) {
        self.assignments.insert(term, value);
    }

    /// Look up the value of a term.
    #[must_use]
    pub fn get(&self, term: TermId) -> Option<TermId> {
        self.assignments.get(&term).copied()
    }

    /// Number of recorded assignments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    /// Is the model empty?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

/// Contract between the host solver and a theory core.
pub trait Plugin<C: Context> {
    /// A new term surfaced to the core.
    fn register_term(&mut self, tm: &TermManager, ctx: &mut C, t: TermId) -> Result<()>;

    /// Seed the assignment of a term with a value term.
    fn set_value(&mut self, tm: &TermManager, ctx: &mut C, t: TermId, value: TermId) -> Result<()>;

    /// Read back the current value of a term as a value term.
    fn get_value(&mut self, tm: &mut TermManager, t: TermId) -> Result<TermId>;

    /// One-time initialisation after all terms are registered. Takes the
    /// term manager mutably: axiom elaboration may create terms.
    fn initialize(&mut self, tm: &mut TermManager, ctx: &mut C) -> Result<()>;

    /// The host asserted a literal; reconcile or repair.
    fn propagate_literal(&mut self, ctx: &mut C, lit: Lit) -> Result<()>;

    /// Drain pending internal work. Returns `true` if anything happened.
    fn propagate(&mut self, ctx: &mut C) -> Result<bool>;

    /// Recompute the value of a defined term from its arguments.
    fn repair_up(&mut self, ctx: &mut C, t: TermId) -> Result<()>;

    /// Adjust the arguments of a defined term to match its value.
    fn repair_down(&mut self, ctx: &mut C, t: TermId) -> Result<bool>;

    /// Align the Boolean assignment of a literal with its atom.
    fn repair_literal(&mut self, ctx: &mut C, lit: Lit) -> Result<()>;

    /// Has the core reached local quiescence?
    fn is_sat(&self, ctx: &C) -> bool;

    /// The host restarted; re-synchronise with the Boolean assignment.
    fn on_restart(&mut self, ctx: &mut C) -> Result<()>;

    /// The host rescaled clause weights; switch scoring mode.
    fn on_rescale(&mut self);

    /// Contribute values to the model.
    fn mk_model(&mut self, tm: &mut TermManager, model: &mut Model) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_round_trip() {
        let mut model = Model::new();
        assert!(model.is_empty());
        model.assign(TermId(3), TermId(9));
        assert_eq!(model.get(TermId(3)), Some(TermId(9)));
        assert_eq!(model.get(TermId(4)), None);
        assert_eq!(model.len(), 1);
    }
}

//! Viable Value Domains for Bit-Vector Variables.
//!
//! For each variable, the set of values still allowed by asserted unary
//! constraints is the complement of a union of forbidden intervals. Unit
//! intervals live in circular doubly-linked layers keyed by bit-width in
//! descending order; constraints with non-unit multipliers sit in side
//! lists and contribute through refinement: a candidate value that violates
//! one gets its own single-value forbidden interval and the search resumes.
//!
//! An empty viable set is a conflict whose core is the chain of entries
//! that covered the whole domain. Entries are pooled in an arena with
//! `Option`-free id links and logically deleted, so scope pops restore them
//! cheaply.

use super::forbidden::{
    forbidden_intervals, ConstraintIdx, EntryKind, Forbidden, UnaryConstraint, WrapInterval,
};
use super::{pow2, truncate, PVar};
use crate::config::ViableConfig;
use num_bigint::BigUint;
use num_traits::{One, Zero};
use smallvec::SmallVec;
use tracing::debug;

type EntryId = u32;
const NIL: EntryId = u32::MAX;

/// Outcome of a viable-value search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindResult {
    /// No value is viable; the core explains why.
    Empty,
    /// Exactly one value remains.
    Singleton(BigUint),
    /// The returned value is viable and is not the only one.
    Multiple(BigUint),
    /// The probe budget ran out before an answer was established.
    ResourceOut,
}

#[derive(Debug, Clone)]
struct Entry {
    interval: WrapInterval,
    width: u32,
    srcs: SmallVec<[ConstraintIdx; 2]>,
    kind: EntryKind,
    active: bool,
    refined: bool,
    prev: EntryId,
    next: EntryId,
}

#[derive(Debug, Clone)]
struct Layer {
    width: u32,
    head: EntryId,
}

#[derive(Debug, Default)]
struct VarState {
    width: u32,
    /// Layers in descending width order.
    layers: Vec<Layer>,
    equal_lin: Vec<ConstraintIdx>,
    diseq_lin: Vec<ConstraintIdx>,
    conflict_core: Option<Vec<ConstraintIdx>>,
    last_value: BigUint,
}

#[derive(Debug)]
enum TrailOp {
    Insert { var: PVar, entry: EntryId },
    Deactivate { entry: EntryId },
    SideInsert { var: PVar, equal: bool },
    ConflictCore { var: PVar, prev: Option<Vec<ConstraintIdx>> },
}

/// The viable-value engine.
#[derive(Debug, Default)]
pub struct Viable {
    config: ViableConfig,
    entries: Vec<Entry>,
    free: Vec<EntryId>,
    vars: Vec<VarState>,
    constraints: Vec<UnaryConstraint>,
    explain: Vec<EntryId>,
    core: Vec<ConstraintIdx>,
    has_core: bool,
    trail: Vec<TrailOp>,
    scopes: Vec<usize>,
}

impl Viable {
    /// Create an engine with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ViableConfig::default())
    }

    /// Create an engine with the given configuration.
    #[must_use]
    pub fn with_config(config: ViableConfig) -> Self {
        Self {
            config,
            entries: Vec::new(),
            free: Vec::new(),
            vars: Vec::new(),
            constraints: Vec::new(),
            explain: Vec::new(),
            core: Vec::new(),
            has_core: false,
            trail: Vec::new(),
            scopes: Vec::new(),
        }
    }

    /// Ensure data structures track variable `v` of the given width.
    pub fn ensure_var(&mut self, v: PVar, width: u32) {
        while self.vars.len() <= v as usize {
            self.vars.push(VarState::default());
        }
        let vs = &mut self.vars[v as usize];
        if vs.width == 0 {
            vs.width = width;
        }
        debug_assert_eq!(vs.width, width);
    }

    /// Register a constraint, returning its index for `add_unitary`.
    pub fn register_constraint(&mut self, c: UnaryConstraint) -> ConstraintIdx {
        let idx = self.constraints.len() as ConstraintIdx;
        self.constraints.push(c);
        idx
    }

    /// Is there a forbidden-interval core from the last search?
    #[must_use]
    pub fn has_core(&self) -> bool {
        self.has_core
    }

    /// Constraint dependencies justifying the last `Empty` or `Singleton`.
    #[must_use]
    pub fn core(&self) -> &[ConstraintIdx] {
        debug_assert!(self.has_core);
        &self.core
    }

    /// Explain the current non-viability or singleton finding.
    #[must_use]
    pub fn explain(&self) -> Vec<ConstraintIdx> {
        self.core.clone()
    }

    // ------------------------------------------------------------------
    // Scopes

    /// Open a backtracking scope.
    pub fn push_scope(&mut self) {
        self.scopes.push(self.trail.len());
    }

    /// Release everything recorded since the matching `push_scope`.
    pub fn pop_scope(&mut self) {
        let mark = self.scopes.pop().expect("scope underflow");
        while self.trail.len() > mark {
            match self.trail.pop().expect("trail entry") {
                TrailOp::Insert { var, entry } => {
                    self.unlink(var, entry);
                    self.entries[entry as usize].active = false;
                    self.free.push(entry);
                }
                TrailOp::Deactivate { entry } => {
                    self.entries[entry as usize].active = true;
                }
                TrailOp::SideInsert { var, equal } => {
                    let vs = &mut self.vars[var as usize];
                    if equal {
                        vs.equal_lin.pop();
                    } else {
                        vs.diseq_lin.pop();
                    }
                }
                TrailOp::ConflictCore { var, prev } => {
                    self.vars[var as usize].conflict_core = prev;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Entry arena

    fn alloc_entry(
        &mut self,
        interval: WrapInterval,
        width: u32,
        srcs: SmallVec<[ConstraintIdx; 2]>,
        kind: EntryKind,
        refined: bool,
    ) -> EntryId {
        let entry = Entry {
            interval,
            width,
            srcs,
            kind,
            active: true,
            refined,
            prev: NIL,
            next: NIL,
        };
        if let Some(id) = self.free.pop() {
            self.entries[id as usize] = entry;
            id
        } else {
            let id = self.entries.len() as EntryId;
            self.entries.push(entry);
            id
        }
    }

    fn layer_position(&self, v: PVar, width: u32) -> Result<usize, usize> {
        // layers sorted by descending width
        self.vars[v as usize]
            .layers
            .binary_search_by(|l| width.cmp(&l.width))
    }

    fn unlink(&mut self, v: PVar, id: EntryId) {
        let (prev, next, width) = {
            let e = &self.entries[id as usize];
            (e.prev, e.next, e.width)
        };
        let pos = self
            .layer_position(v, width)
            .expect("layer exists for entry");
        if next == id {
            self.vars[v as usize].layers[pos].head = NIL;
        } else {
            self.entries[prev as usize].next = next;
            self.entries[next as usize].prev = prev;
            if self.vars[v as usize].layers[pos].head == id {
                self.vars[v as usize].layers[pos].head = next;
            }
        }
        let e = &mut self.entries[id as usize];
        e.prev = NIL;
        e.next = NIL;
    }

    fn link_sorted(&mut self, v: PVar, pos: usize, id: EntryId) {
        let head = self.vars[v as usize].layers[pos].head;
        if head == NIL {
            self.entries[id as usize].prev = id;
            self.entries[id as usize].next = id;
            self.vars[v as usize].layers[pos].head = id;
            return;
        }
        let lo = self.entries[id as usize].interval.lo.clone();
        // find the first entry with a larger lo, walking from the head
        let mut at = head;
        loop {
            if self.entries[at as usize].interval.lo > lo {
                break;
            }
            at = self.entries[at as usize].next;
            if at == head {
                break;
            }
        }
        // insert before `at`
        let prev = self.entries[at as usize].prev;
        self.entries[prev as usize].next = id;
        self.entries[at as usize].prev = id;
        self.entries[id as usize].prev = prev;
        self.entries[id as usize].next = at;
        if at == head && self.entries[head as usize].interval.lo > lo {
            self.vars[v as usize].layers[pos].head = id;
        }
    }

    fn active_entries(&self, v: PVar, pos: usize) -> Vec<EntryId> {
        let mut out = Vec::new();
        let head = self.vars[v as usize].layers[pos].head;
        if head == NIL {
            return out;
        }
        let mut at = head;
        loop {
            if self.entries[at as usize].active {
                out.push(at);
            }
            at = self.entries[at as usize].next;
            if at == head {
                break;
            }
        }
        out
    }

    fn set_conflict_core(&mut self, v: PVar, core: Vec<ConstraintIdx>) {
        let prev = self.vars[v as usize].conflict_core.take();
        self.trail.push(TrailOp::ConflictCore { var: v, prev });
        self.vars[v as usize].conflict_core = Some(core);
    }

    // ------------------------------------------------------------------
    // Insertion

    /// Register constraint `idx` as unitary in `v`: extract its forbidden
    /// interval and thread it into the layer of its width, merging
    /// overlapping entries.
    pub fn add_unitary(&mut self, v: PVar, idx: ConstraintIdx) {
        let c = self.constraints[idx as usize].clone();
        let fi = forbidden_intervals(&c);
        debug_assert!(fi.width <= self.vars[v as usize].width);
        match fi.kind {
            EntryKind::EqualLin => {
                self.vars[v as usize].equal_lin.push(idx);
                self.trail.push(TrailOp::SideInsert { var: v, equal: true });
                return;
            }
            EntryKind::DiseqLin => {
                self.vars[v as usize].diseq_lin.push(idx);
                self.trail.push(TrailOp::SideInsert {
                    var: v,
                    equal: false,
                });
                return;
            }
            EntryKind::Unit => {}
        }
        match fi.forbidden {
            Forbidden::Nothing => {}
            Forbidden::Everything => {
                self.set_conflict_core(v, vec![idx]);
            }
            Forbidden::Interval(iv) => {
                self.insert_unit(v, fi.width, iv, SmallVec::from_slice(&[idx]), false);
            }
        }
    }

    fn insert_unit(
        &mut self,
        v: PVar,
        width: u32,
        mut iv: WrapInterval,
        mut srcs: SmallVec<[ConstraintIdx; 2]>,
        refined: bool,
    ) {
        let pos = match self.layer_position(v, width) {
            Ok(pos) => pos,
            Err(pos) => {
                self.vars[v as usize]
                    .layers
                    .insert(pos, Layer { width, head: NIL });
                pos
            }
        };
        // absorb overlapping active entries into the union
        loop {
            let mut absorbed = false;
            for id in self.active_entries(v, pos) {
                let other = self.entries[id as usize].interval.clone();
                if other.covers(width, &iv) {
                    // an existing entry subsumes the new interval
                    return;
                }
                if iv.overlaps(width, &other) {
                    match iv.union(width, &other) {
                        Some(u) => {
                            iv = u;
                            for s in self.entries[id as usize].srcs.clone() {
                                if !srcs.contains(&s) {
                                    srcs.push(s);
                                }
                            }
                            self.entries[id as usize].active = false;
                            self.trail.push(TrailOp::Deactivate { entry: id });
                            absorbed = true;
                        }
                        None => {
                            // the union covers the whole domain
                            let mut core: Vec<ConstraintIdx> = srcs.to_vec();
                            for s in &self.entries[id as usize].srcs {
                                if !core.contains(s) {
                                    core.push(*s);
                                }
                            }
                            self.set_conflict_core(v, core);
                            return;
                        }
                    }
                    break;
                }
            }
            if !absorbed {
                break;
            }
        }
        let id = self.alloc_entry(iv, width, srcs, EntryKind::Unit, refined);
        self.link_sorted(v, pos, id);
        self.trail.push(TrailOp::Insert { var: v, entry: id });
        debug_assert!(self.well_formed(v));
    }

    // ------------------------------------------------------------------
    // Search

    /// Find a next viable value for `v`, starting from the last reported
    /// value. Detects singletons by probing once more past the find.
    pub fn find_viable(&mut self, v: PVar) -> FindResult {
        self.has_core = false;
        self.core.clear();
        self.explain.clear();
        if let Some(core) = self.vars[v as usize].conflict_core.clone() {
            self.core = core;
            self.has_core = true;
            return FindResult::Empty;
        }
        let width = self.vars[v as usize].width;
        let mut budget = self.config.max_probes;
        let start = self.vars[v as usize].last_value.clone();
        let mut chain: Vec<EntryId> = Vec::new();
        match self.walk(v, start, &mut budget, &mut chain) {
            Walk::Out => FindResult::ResourceOut,
            Walk::Covered => {
                self.install_core(&chain);
                FindResult::Empty
            }
            Walk::Found(val) => {
                let again = truncate(&(&val + BigUint::one()), width);
                let mut chain2: Vec<EntryId> = Vec::new();
                match self.walk(v, again, &mut budget, &mut chain2) {
                    Walk::Out => FindResult::ResourceOut,
                    Walk::Covered => {
                        // cannot happen: `val` itself remains viable
                        debug_assert!(false, "walk lost a viable value");
                        self.vars[v as usize].last_value = val.clone();
                        FindResult::Multiple(val)
                    }
                    Walk::Found(other) if other == val => {
                        self.install_core(&chain2);
                        self.vars[v as usize].last_value = val.clone();
                        debug!(var = v, "viable singleton {}", val);
                        FindResult::Singleton(val)
                    }
                    Walk::Found(_) => {
                        self.vars[v as usize].last_value = val.clone();
                        FindResult::Multiple(val)
                    }
                }
            }
        }
    }

    /// Extend the core with the dependencies of a covering chain. The core
    /// may already hold side-constraint dependencies from refinement.
    fn install_core(&mut self, chain: &[EntryId]) {
        self.explain = chain.to_vec();
        for &id in chain {
            for s in &self.entries[id as usize].srcs {
                if !self.core.contains(s) {
                    self.core.push(*s);
                }
            }
        }
        self.has_core = true;
    }

    fn walk(&mut self, v: PVar, start: BigUint, budget: &mut u32, chain: &mut Vec<EntryId>) -> Walk {
        let width = self.vars[v as usize].width;
        let domain = pow2(width);
        let mut val = truncate(&start, width);
        let mut moved = BigUint::zero();
        loop {
            // descend the layers, widest first; a hop restarts the descent
            let mut hopped = true;
            while hopped {
                hopped = false;
                let layer_count = self.vars[v as usize].layers.len();
                for pos in 0..layer_count {
                    let w = self.vars[v as usize].layers[pos].width;
                    let low = truncate(&val, w);
                    let Some(id) = self.find_containing(v, pos, &low) else {
                        continue;
                    };
                    if *budget == 0 {
                        return Walk::Out;
                    }
                    *budget -= 1;
                    if !chain.contains(&id) {
                        chain.push(id);
                    }
                    let hi = self.entries[id as usize].interval.hi.clone();
                    let delta = truncate(&(pow2(w) + &hi - &low), w);
                    debug_assert!(!delta.is_zero());
                    val = truncate(&(&val + &delta), width);
                    moved += &delta;
                    if moved >= domain {
                        return Walk::Covered;
                    }
                    hopped = true;
                    break;
                }
            }
            // val clears every unit layer; consult the refinement lists
            match self.violated_side_constraint(v, &val) {
                None => return Walk::Found(val),
                Some(idx) => {
                    if *budget == 0 {
                        return Walk::Out;
                    }
                    *budget -= 1;
                    let hi = truncate(&(&val + BigUint::one()), width);
                    debug!(var = v, "refine away {}", val);
                    self.insert_unit(
                        v,
                        width,
                        WrapInterval {
                            lo: val.clone(),
                            hi,
                        },
                        SmallVec::from_slice(&[idx]),
                        true,
                    );
                    if let Some(core) = self.vars[v as usize].conflict_core.clone() {
                        self.core = core;
                        return Walk::Covered;
                    }
                }
            }
        }
    }

    fn find_containing(&self, v: PVar, pos: usize, low: &BigUint) -> Option<EntryId> {
        let w = self.vars[v as usize].layers[pos].width;
        self.active_entries(v, pos)
            .into_iter()
            .find(|&id| self.entries[id as usize].interval.contains(w, low))
    }

    fn violated_side_constraint(&self, v: PVar, val: &BigUint) -> Option<ConstraintIdx> {
        let vs = &self.vars[v as usize];
        for &idx in vs.equal_lin.iter().chain(vs.diseq_lin.iter()) {
            let c = &self.constraints[idx as usize];
            let narrowed = truncate(val, c.width());
            if !c.eval(&narrowed) {
                return Some(idx);
            }
        }
        None
    }

    /// Pairwise disjointness of active entries per layer; only unit-kind
    /// entries may appear in layers.
    pub(crate) fn well_formed(&self, v: PVar) -> bool {
        for pos in 0..self.vars[v as usize].layers.len() {
            let w = self.vars[v as usize].layers[pos].width;
            let ids = self.active_entries(v, pos);
            for (i, &a) in ids.iter().enumerate() {
                if self.entries[a as usize].kind != EntryKind::Unit {
                    return false;
                }
                for &b in &ids[i + 1..] {
                    let ia = &self.entries[a as usize].interval;
                    let ib = &self.entries[b as usize].interval;
                    if ia.overlaps(w, ib) {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Number of active entries created by refinement, across all layers
    /// of `v`.
    #[must_use]
    pub fn num_refined(&self, v: PVar) -> usize {
        (0..self.vars[v as usize].layers.len())
            .flat_map(|pos| self.active_entries(v, pos))
            .filter(|&id| self.entries[id as usize].refined)
            .count()
    }
}

enum Walk {
    Found(BigUint),
    Covered,
    Out,
}

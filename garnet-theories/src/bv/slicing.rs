//! Bit-Precise Slicing.
//!
//! Relates bit-vector variables of different widths by extraction: each
//! variable owns a subdivision tree of slice nodes, and an e-graph over
//! those nodes maintains equivalences asserted via equations, values and
//! congruence. Splitting a slice splits every member of its equivalence
//! class and equates the corresponding children, so equalities survive
//! refinement of the decomposition.
//!
//! Notation: for a variable `x` of width `w` and `0 <= lo <= hi < w`,
//! `x[hi:lo]` extracts `hi - lo + 1` bits; `concat(x1, ..., xn)` places
//! `x1` at the high end.

use super::egraph::{EGraph, Mark, NodeId};
use super::{pow2, truncate, PVar};
use garnet_core::error::{Error, Result};
use garnet_core::literal::Lit;
use num_bigint::BigUint;
use num_traits::Zero;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

/// Justification attached to a merge, decoded during explanation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dep {
    /// No external dependency (structural identity).
    None,
    /// A Boolean literal asserted by the host.
    Lit(Lit),
    /// An index into the variable dependency table (a value assignment).
    VarIdx(u32),
}

impl Dep {
    /// Pack into a raw word.
    #[must_use]
    pub fn to_raw(self) -> u32 {
        match self {
            Dep::None => 0,
            Dep::Lit(l) => (l.raw() << 2) | 1,
            Dep::VarIdx(i) => (i << 2) | 2,
        }
    }

    /// Unpack from a raw word.
    #[must_use]
    pub fn from_raw(raw: u32) -> Self {
        match raw & 3 {
            1 => Dep::Lit(Lit::from_raw(raw >> 2)),
            2 => Dep::VarIdx(raw >> 2),
            _ => Dep::None,
        }
    }
}

/// Internal merge justification; derived variants expand recursively into
/// [`Dep`]s during explanation.
#[derive(Debug, Clone)]
enum Just {
    Dep(Dep),
    /// Children equated because their parents are equal.
    ChildOf(NodeId, NodeId),
    /// Concat nodes equated because their arguments are pairwise equal.
    Congruence(NodeId, NodeId),
}

#[derive(Debug, Clone)]
enum NodeKind {
    /// Proper slice of some variable.
    Slice,
    /// Interpreted value slice.
    Value(BigUint),
    /// Virtual concatenation, arguments msb-first.
    Concat(Vec<NodeId>),
    /// Equality node recording a tracked disequality.
    Equality(NodeId, NodeId),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    width: u32,
}

#[derive(Debug, Clone, Default)]
struct SliceInfo {
    /// Cut position; subdivided iff set.
    cut: Option<u32>,
    /// Variable this node stands for, if any.
    var: Option<PVar>,
    /// Parent in the subdivision tree.
    parent: Option<NodeId>,
    /// For concat nodes: the slice the concat represents.
    slice: Option<NodeId>,
    /// Upper subslice `s[w-1 : cut+1]`.
    sub_hi: Option<NodeId>,
    /// Lower subslice `s[cut : 0]`.
    sub_lo: Option<NodeId>,
}

#[derive(Debug)]
enum Conflict {
    /// Two distinct value slices were forced equal by `just`.
    ValueClash {
        a: NodeId,
        va: NodeId,
        b: NodeId,
        vb: NodeId,
        just: Just,
    },
    /// The two sides of a tracked disequality became class-equal.
    Diseq(usize),
}

#[derive(Debug)]
enum TrailItem {
    NewNode,
    AddVar(NodeId),
    SplitCore(NodeId),
    Extract((PVar, u32, u32)),
    Concat(Vec<NodeId>),
    ValueNode((u32, BigUint)),
    SliceLink(NodeId, Option<NodeId>),
    Diseq,
    VarDep,
}

/// The slicing machine.
#[derive(Debug, Default)]
pub struct Slicing {
    nodes: Vec<Node>,
    info: Vec<SliceInfo>,
    eg: EGraph<Just>,
    var2slice: Vec<NodeId>,
    extract_dedup: FxHashMap<(PVar, u32, u32), PVar>,
    concat_dedup: FxHashMap<Vec<NodeId>, NodeId>,
    value_dedup: FxHashMap<(u32, BigUint), NodeId>,
    concats: Vec<NodeId>,
    needs_congruence: Vec<PVar>,
    needs_set: FxHashSet<PVar>,
    /// Disequalities as equality nodes plus their guarding literal.
    diseqs: Vec<(NodeId, Lit)>,
    var_deps: Vec<PVar>,
    conflict: Option<Conflict>,
    trail: Vec<TrailItem>,
    scopes: Vec<(usize, Mark)>,
}

impl Slicing {
    /// Create an empty slicing machine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Node helpers

    fn alloc_node(&mut self, kind: NodeKind, width: u32) -> NodeId {
        let id = self.eg.add_node();
        debug_assert_eq!(id as usize, self.nodes.len());
        self.nodes.push(Node { kind, width });
        self.info.push(SliceInfo::default());
        self.trail.push(TrailItem::NewNode);
        id
    }

    fn width(&self, s: NodeId) -> u32 {
        self.nodes[s as usize].width
    }

    fn has_sub(&self, s: NodeId) -> bool {
        self.info[s as usize].sub_hi.is_some()
    }

    fn sub_hi(&self, s: NodeId) -> NodeId {
        self.info[s as usize].sub_hi.expect("subdivided slice")
    }

    fn sub_lo(&self, s: NodeId) -> NodeId {
        self.info[s as usize].sub_lo.expect("subdivided slice")
    }

    fn is_slice(&self, s: NodeId) -> bool {
        matches!(self.nodes[s as usize].kind, NodeKind::Slice)
    }

    fn owner_var(&self, mut s: NodeId) -> Option<PVar> {
        while let Some(p) = self.info[s as usize].parent {
            s = p;
        }
        self.info[s as usize].var
    }

    fn mark_needs_congruence(&mut self, v: PVar) {
        if self.needs_set.insert(v) {
            self.needs_congruence.push(v);
        }
    }

    fn attach_var(&mut self, s: NodeId) -> PVar {
        let v = self.var2slice.len() as PVar;
        self.var2slice.push(s);
        self.info[s as usize].var = Some(v);
        self.trail.push(TrailItem::AddVar(s));
        v
    }

    // ------------------------------------------------------------------
    // Public surface

    /// Declare a fresh variable of the given width.
    pub fn add_var(&mut self, width: u32) -> PVar {
        debug_assert!(width > 0);
        let s = self.alloc_node(NodeKind::Slice, width);
        self.attach_var(s)
    }

    /// Width of a variable.
    #[must_use]
    pub fn var_width(&self, v: PVar) -> u32 {
        self.width(self.var2slice[v as usize])
    }

    /// Number of declared variables.
    #[must_use]
    pub fn num_vars(&self) -> usize {
        self.var2slice.len()
    }

    /// Get or create the variable representing `v[hi:lo]`.
    pub fn mk_extract(&mut self, v: PVar, hi: u32, lo: u32) -> Result<PVar> {
        let s = self.var2slice[v as usize];
        let w = self.width(s);
        if !(lo <= hi && hi < w) {
            return Err(Error::InvalidTerm("extract range"));
        }
        if hi == w - 1 && lo == 0 {
            return Ok(v);
        }
        if let Some(&r) = self.extract_dedup.get(&(v, hi, lo)) {
            return Ok(r);
        }
        let mut out = Vec::new();
        self.mk_slice(s, hi, lo, &mut out);
        let r = if let [single] = out[..] {
            match self.info[single as usize].var {
                Some(r) => r,
                None => self.attach_var(single),
            }
        } else {
            let c = self.find_or_alloc_concat(&out);
            match self.info[c as usize].var {
                Some(r) => r,
                None => self.attach_var(c),
            }
        };
        self.extract_dedup.insert((v, hi, lo), r);
        self.trail.push(TrailItem::Extract((v, hi, lo)));
        Ok(r)
    }

    /// Get or create the variable representing `concat(args)`, `args[0]`
    /// at the high end.
    pub fn mk_concat(&mut self, args: &[PVar]) -> Result<PVar> {
        if args.is_empty() {
            return Err(Error::InvalidTerm("empty concat"));
        }
        let slices: Vec<NodeId> = args.iter().map(|&a| self.var2slice[a as usize]).collect();
        let c = self.find_or_alloc_concat(&slices);
        let r = match self.info[c as usize].var {
            Some(r) => r,
            None => self.attach_var(c),
        };
        Ok(r)
    }

    /// Track a value assignment for `v`, propagating to subslices.
    /// Returns `false` on conflict.
    pub fn add_value(&mut self, v: PVar, val: &BigUint) -> bool {
        let w = self.var_width(v);
        let val = truncate(val, w);
        let dep_idx = self.var_deps.len() as u32;
        self.var_deps.push(v);
        self.trail.push(TrailItem::VarDep);
        let vn = self.find_or_alloc_value(w, val);
        let s = self.var2slice[v as usize];
        self.merge_nodes(s, vn, Just::Dep(Dep::VarIdx(dep_idx)))
    }

    /// The variable behind a [`Dep::VarIdx`] dependency.
    #[must_use]
    pub fn dep_var(&self, idx: u32) -> PVar {
        self.var_deps[idx as usize]
    }

    /// Assert `x = y` under the given literal. Returns `false` on conflict.
    pub fn assert_equal(&mut self, x: PVar, y: PVar, lit: Lit) -> Result<bool> {
        if self.var_width(x) != self.var_width(y) {
            return Err(Error::InvalidTerm("equated widths differ"));
        }
        let mut xs = Vec::new();
        self.get_base(self.var2slice[x as usize], &mut xs);
        let mut ys = Vec::new();
        self.get_base(self.var2slice[y as usize], &mut ys);
        Ok(self.merge_vecs(xs, ys, Dep::Lit(lit)))
    }

    /// Track `x != y` under the given literal; the conflict fires when the
    /// two sides become class-equal.
    pub fn assert_diseq(&mut self, x: PVar, y: PVar, lit: Lit) {
        let sx = self.var2slice[x as usize];
        let sy = self.var2slice[y as usize];
        let n = self.alloc_node(NodeKind::Equality(sx, sy), 1);
        self.diseqs.push((n, lit));
        self.trail.push(TrailItem::Diseq);
        self.check_diseqs();
    }

    /// Are `x` and `y` known equal?
    #[must_use]
    pub fn is_equal(&self, x: PVar, y: PVar) -> bool {
        let sx = self.var2slice[x as usize];
        let sy = self.var2slice[y as usize];
        if self.width(sx) != self.width(sy) {
            return false;
        }
        if self.eg.is_equal(sx, sy) {
            return true;
        }
        let mut xs = Vec::new();
        self.get_base(sx, &mut xs);
        let mut ys = Vec::new();
        self.get_base(sy, &mut ys);
        if xs.len() != ys.len() {
            return false;
        }
        xs.iter()
            .zip(&ys)
            .all(|(&a, &b)| self.width(a) == self.width(b) && self.eg.is_equal(a, b))
    }

    /// Is there any pending congruence work?
    #[must_use]
    pub fn can_propagate(&self) -> bool {
        !self.needs_congruence.is_empty()
    }

    /// Has a merge or disequality conflict been detected?
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.conflict.is_some()
    }

    /// Drain pending congruences: install `concat(bases) = v` equations and
    /// merge concat nodes whose arguments are pairwise equal. Returns
    /// whether anything happened.
    pub fn propagate(&mut self) -> bool {
        let mut progress = false;
        while let Some(v) = self.needs_congruence.pop() {
            self.needs_set.remove(&v);
            if self.conflict.is_some() {
                break;
            }
            self.add_congruence(v);
            progress = true;
        }
        loop {
            if self.conflict.is_some() {
                break;
            }
            let mut changed = false;
            let mut table: FxHashMap<Vec<NodeId>, NodeId> = FxHashMap::default();
            for c in self.concats.clone() {
                let NodeKind::Concat(args) = &self.nodes[c as usize].kind else {
                    continue;
                };
                let key: Vec<NodeId> = args.iter().map(|&a| self.eg.find(a)).collect();
                match table.get(&key) {
                    Some(&c2) if !self.eg.is_equal(c, c2) => {
                        self.merge_nodes(c, c2, Just::Congruence(c, c2));
                        progress = true;
                        changed = true;
                    }
                    Some(_) => {}
                    None => {
                        table.insert(key, c);
                    }
                }
            }
            if !changed {
                break;
            }
        }
        progress
    }

    /// Collect the fixed portions of `v` as a `(mask, value)` pair over the
    /// base slices whose class carries a value. Call `add_value` for the
    /// relevant variables first; without value slices the mask is zero.
    #[must_use]
    pub fn collect_fixed(&self, v: PVar) -> (BigUint, BigUint) {
        let mut bases = Vec::new();
        self.get_base(self.var2slice[v as usize], &mut bases);
        let mut mask = BigUint::zero();
        let mut value = BigUint::zero();
        for b in bases {
            let w = self.width(b);
            mask <<= w;
            value <<= w;
            if let Some(vn) = self.eg.class_value(b) {
                if let NodeKind::Value(val) = &self.nodes[vn as usize].kind {
                    mask |= pow2(w) - BigUint::from(1u32);
                    value |= val.clone();
                }
            }
        }
        (mask, value)
    }

    /// Variables `w` with `w = v[|w|-1:0]`, including `v` itself.
    #[must_use]
    pub fn collect_simple_overlaps(&self, v: PVar) -> Vec<PVar> {
        let mut out = vec![v];
        let mut s = self.var2slice[v as usize];
        while self.has_sub(s) {
            s = self.sub_lo(s);
            if let Some(w) = self.info[s as usize].var {
                out.push(w);
            }
        }
        out
    }

    // ------------------------------------------------------------------
    // Explanation

    /// Why are `x` and `y` equal? Collects the external dependencies along
    /// the merge chains of their aligned base slices.
    pub fn explain_equal(&self, x: PVar, y: PVar, out: &mut Vec<Dep>) {
        debug_assert!(self.is_equal(x, y));
        let sx = self.var2slice[x as usize];
        let sy = self.var2slice[y as usize];
        if self.eg.is_equal(sx, sy) {
            self.explain_nodes(sx, sy, out);
            return;
        }
        let mut xs = Vec::new();
        self.get_base(sx, &mut xs);
        let mut ys = Vec::new();
        self.get_base(sy, &mut ys);
        for (&a, &b) in xs.iter().zip(&ys) {
            self.explain_nodes(a, b, out);
        }
    }

    /// Explanation of the current conflict.
    #[must_use]
    pub fn explain(&self) -> Vec<Dep> {
        let mut out = Vec::new();
        match &self.conflict {
            None => {}
            Some(Conflict::ValueClash { a, va, b, vb, just }) => {
                self.explain_nodes(*a, *va, &mut out);
                self.explain_nodes(*b, *vb, &mut out);
                self.expand_just(&just.clone(), &mut out);
            }
            Some(Conflict::Diseq(i)) => {
                let (n, lit) = self.diseqs[*i];
                if let NodeKind::Equality(a, b) = self.nodes[n as usize].kind {
                    self.explain_nodes(a, b, &mut out);
                }
                out.push(Dep::Lit(lit));
            }
        }
        out
    }

    fn explain_nodes(&self, a: NodeId, b: NodeId, out: &mut Vec<Dep>) {
        for j in self.eg.explain(a, b) {
            self.expand_just(&j, out);
        }
    }

    fn expand_just(&self, j: &Just, out: &mut Vec<Dep>) {
        match j {
            Just::Dep(Dep::None) => {}
            Just::Dep(d) => out.push(*d),
            Just::ChildOf(p, q) => self.explain_nodes(*p, *q, out),
            Just::Congruence(c1, c2) => {
                let (NodeKind::Concat(xs), NodeKind::Concat(ys)) = (
                    &self.nodes[*c1 as usize].kind,
                    &self.nodes[*c2 as usize].kind,
                ) else {
                    return;
                };
                for (&a, &b) in xs.iter().zip(ys) {
                    self.explain_nodes(a, b, out);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Scopes

    /// Open a backtracking scope.
    pub fn push_scope(&mut self) {
        self.scopes.push((self.trail.len(), self.eg.mark()));
    }

    /// Undo everything since the matching `push_scope`.
    pub fn pop_scope(&mut self) {
        let (tmark, emark) = self.scopes.pop().expect("scope underflow");
        self.eg.undo_to(emark);
        while self.trail.len() > tmark {
            match self.trail.pop().expect("trail entry") {
                TrailItem::NewNode => {
                    self.nodes.pop();
                    self.info.pop();
                    self.eg.pop_node();
                }
                TrailItem::AddVar(s) => {
                    self.var2slice.pop();
                    self.info[s as usize].var = None;
                }
                TrailItem::SplitCore(s) => {
                    let i = &mut self.info[s as usize];
                    i.cut = None;
                    i.sub_hi = None;
                    i.sub_lo = None;
                }
                TrailItem::Extract(key) => {
                    self.extract_dedup.remove(&key);
                }
                TrailItem::Concat(key) => {
                    self.concat_dedup.remove(&key);
                    self.concats.pop();
                }
                TrailItem::ValueNode(key) => {
                    self.value_dedup.remove(&key);
                }
                TrailItem::SliceLink(c, prev) => {
                    self.info[c as usize].slice = prev;
                }
                TrailItem::Diseq => {
                    self.diseqs.pop();
                }
                TrailItem::VarDep => {
                    self.var_deps.pop();
                }
            }
        }
        self.conflict = None;
        let live = self.var2slice.len() as PVar;
        self.needs_congruence.retain(|&v| v < live);
        self.needs_set.retain(|&v| v < live);
    }

    // ------------------------------------------------------------------
    // Structure

    /// Split slice `s` at `cut`: split every slice in its class and equate
    /// the corresponding children. Returns `false` on conflict.
    fn split(&mut self, s: NodeId, cut: u32) -> bool {
        debug_assert!(self.is_slice(s) && !self.has_sub(s));
        let members = self.eg.class_members(s);
        for &m in &members {
            if self.is_slice(m) && !self.has_sub(m) {
                self.split_core(m, cut);
            }
        }
        let shi = self.sub_hi(s);
        let slo = self.sub_lo(s);
        for &m in &members {
            if m == s || !self.is_slice(m) || self.info[m as usize].cut != Some(cut) {
                continue;
            }
            let mhi = self.sub_hi(m);
            let mlo = self.sub_lo(m);
            if !self.merge_nodes(mhi, shi, Just::ChildOf(m, s)) {
                return false;
            }
            if !self.merge_nodes(mlo, slo, Just::ChildOf(m, s)) {
                return false;
            }
        }
        self.propagate_value_down(s)
    }

    fn split_core(&mut self, s: NodeId, cut: u32) {
        let w = self.width(s);
        debug_assert!(self.is_slice(s) && cut + 1 < w);
        let hi = self.alloc_node(NodeKind::Slice, w - cut - 1);
        let lo = self.alloc_node(NodeKind::Slice, cut + 1);
        self.info[hi as usize].parent = Some(s);
        self.info[lo as usize].parent = Some(s);
        let i = &mut self.info[s as usize];
        i.cut = Some(cut);
        i.sub_hi = Some(hi);
        i.sub_lo = Some(lo);
        self.trail.push(TrailItem::SplitCore(s));
        if let Some(v) = self.owner_var(s) {
            self.mark_needs_congruence(v);
        }
    }

    /// Push a class value down to the subslices of `s`.
    fn propagate_value_down(&mut self, s: NodeId) -> bool {
        let Some(vn) = self.eg.class_value(s) else {
            return true;
        };
        let Some(cut) = self.info[s as usize].cut else {
            return true;
        };
        let NodeKind::Value(val) = &self.nodes[vn as usize].kind else {
            return true;
        };
        let val = val.clone();
        let w_lo = cut + 1;
        let w_hi = self.width(s) - w_lo;
        let v_hi = &val >> w_lo;
        let v_lo = truncate(&val, w_lo);
        let shi = self.sub_hi(s);
        let slo = self.sub_lo(s);
        let nhi = self.find_or_alloc_value(w_hi, v_hi);
        let nlo = self.find_or_alloc_value(w_lo, v_lo);
        self.merge_nodes(shi, nhi, Just::ChildOf(s, vn))
            && self.merge_nodes(slo, nlo, Just::ChildOf(s, vn))
    }

    /// Merge two nodes, propagating values downward and aligning children
    /// when both sides are subdivided at the same cut. Returns `false` on
    /// conflict.
    fn merge_nodes(&mut self, a: NodeId, b: NodeId, just: Just) -> bool {
        if self.conflict.is_some() {
            return false;
        }
        if self.eg.is_equal(a, b) {
            return true;
        }
        let va = self.eg.class_value(a);
        let vb = self.eg.class_value(b);
        if let (Some(va), Some(vb)) = (va, vb) {
            let (NodeKind::Value(x), NodeKind::Value(y)) = (
                &self.nodes[va as usize].kind,
                &self.nodes[vb as usize].kind,
            ) else {
                unreachable!("class values are value nodes")
            };
            if x != y {
                debug!("value clash {} != {}", x, y);
                self.conflict = Some(Conflict::ValueClash { a, va, b, vb, just });
                return false;
            }
        }
        self.eg.union(a, b, just);
        if self.has_sub(a) && !self.propagate_value_down(a) {
            return false;
        }
        if self.has_sub(b) && !self.propagate_value_down(b) {
            return false;
        }
        if self.has_sub(a)
            && self.has_sub(b)
            && self.info[a as usize].cut == self.info[b as usize].cut
        {
            let (ahi, alo) = (self.sub_hi(a), self.sub_lo(a));
            let (bhi, blo) = (self.sub_hi(b), self.sub_lo(b));
            if !self.merge_nodes(ahi, bhi, Just::ChildOf(a, b)) {
                return false;
            }
            if !self.merge_nodes(alo, blo, Just::ChildOf(a, b)) {
                return false;
            }
        }
        self.check_diseqs();
        self.conflict.is_none()
    }

    fn check_diseqs(&mut self) {
        if self.conflict.is_some() {
            return;
        }
        for (i, &(n, _)) in self.diseqs.iter().enumerate() {
            let NodeKind::Equality(a, b) = self.nodes[n as usize].kind else {
                continue;
            };
            if self.is_equal_nodes(a, b) {
                self.conflict = Some(Conflict::Diseq(i));
                return;
            }
        }
    }

    fn is_equal_nodes(&self, a: NodeId, b: NodeId) -> bool {
        if self.eg.is_equal(a, b) {
            return true;
        }
        let mut xs = Vec::new();
        self.get_base(a, &mut xs);
        let mut ys = Vec::new();
        self.get_base(b, &mut ys);
        xs.len() == ys.len()
            && xs
                .iter()
                .zip(&ys)
                .all(|(&x, &y)| self.width(x) == self.width(y) && self.eg.is_equal(x, y))
    }

    /// Merge `x1 ++ ... ++ xn = y1 ++ ... ++ yk`, both msb-first with equal
    /// total width, splitting the coarser side to align chunk boundaries.
    fn merge_vecs(&mut self, mut xs: Vec<NodeId>, mut ys: Vec<NodeId>, dep: Dep) -> bool {
        let just = Just::Dep(dep);
        while !(xs.is_empty() && ys.is_empty()) {
            if xs.is_empty() || ys.is_empty() {
                debug_assert!(false, "total widths differ");
                return false;
            }
            let (x, y) = (xs[0], ys[0]);
            let (wx, wy) = (self.width(x), self.width(y));
            if wx == wy {
                xs.remove(0);
                ys.remove(0);
                if !self.merge_nodes(x, y, just.clone()) {
                    return false;
                }
            } else if wx > wy {
                if !self.has_sub(x) && !self.split(x, wx - wy - 1) {
                    return false;
                }
                xs[0] = self.sub_hi(x);
                xs.insert(1, self.sub_lo(x));
            } else {
                if !self.has_sub(y) && !self.split(y, wy - wx - 1) {
                    return false;
                }
                ys[0] = self.sub_hi(y);
                ys.insert(1, self.sub_lo(y));
            }
        }
        true
    }

    /// Base slices of `s` (leaves of the subdivision tree), msb-first.
    fn get_base(&self, s: NodeId, out: &mut Vec<NodeId>) {
        match &self.nodes[s as usize].kind {
            NodeKind::Concat(args) => {
                for &a in args {
                    self.get_base(a, out);
                }
            }
            _ => {
                if self.has_sub(s) {
                    self.get_base(self.sub_hi(s), out);
                    self.get_base(self.sub_lo(s), out);
                } else {
                    out.push(s);
                }
            }
        }
    }

    /// Slices covering exactly `s[hi:lo]`, splitting along the boundaries
    /// as needed; output msb-first.
    fn mk_slice(&mut self, s: NodeId, hi: u32, lo: u32, out: &mut Vec<NodeId>) {
        let w = self.width(s);
        debug_assert!(lo <= hi && hi < w);
        if hi == w - 1 && lo == 0 {
            out.push(s);
            return;
        }
        if let NodeKind::Concat(args) = &self.nodes[s as usize].kind {
            let args = args.clone();
            let mut upper = w;
            for a in args {
                let wa = self.width(a);
                let a_hi = upper - 1;
                let a_lo = upper - wa;
                upper -= wa;
                if lo > a_hi || hi < a_lo {
                    continue;
                }
                let r_hi = std::cmp::min(hi, a_hi) - a_lo;
                let r_lo = lo.saturating_sub(a_lo);
                self.mk_slice(a, r_hi, r_lo, out);
            }
            return;
        }
        if !self.has_sub(s) {
            if hi < w - 1 {
                self.split(s, hi);
            } else {
                self.split(s, lo - 1);
            }
        }
        let cut = self.info[s as usize].cut.expect("just split");
        let shi = self.sub_hi(s);
        let slo = self.sub_lo(s);
        if lo >= cut + 1 {
            self.mk_slice(shi, hi - cut - 1, lo - cut - 1, out);
        } else if hi <= cut {
            self.mk_slice(slo, hi, lo, out);
        } else {
            self.mk_slice(shi, hi - cut - 1, 0, out);
            self.mk_slice(slo, cut, lo, out);
        }
    }

    // ------------------------------------------------------------------
    // Congruence

    fn add_congruence(&mut self, v: PVar) {
        let s = self.var2slice[v as usize];
        let mut bases = Vec::new();
        self.get_base(s, &mut bases);
        if bases.len() <= 1 {
            return;
        }
        let c = self.find_or_alloc_concat(&bases);
        if self.info[c as usize].slice == Some(s) && self.eg.is_equal(c, s) {
            // this congruence is already installed
            return;
        }
        if self.info[c as usize].slice.is_none() {
            self.info[c as usize].slice = Some(s);
            self.trail.push(TrailItem::SliceLink(c, None));
        }
        self.merge_nodes(c, s, Just::Dep(Dep::None));
    }

    fn find_or_alloc_concat(&mut self, args: &[NodeId]) -> NodeId {
        let key = args.to_vec();
        if let Some(&c) = self.concat_dedup.get(&key) {
            return c;
        }
        let width = args.iter().map(|&a| self.width(a)).sum();
        let c = self.alloc_node(NodeKind::Concat(key.clone()), width);
        self.concat_dedup.insert(key.clone(), c);
        self.concats.push(c);
        self.trail.push(TrailItem::Concat(key));
        c
    }

    fn find_or_alloc_value(&mut self, width: u32, val: BigUint) -> NodeId {
        let key = (width, val.clone());
        if let Some(&n) = self.value_dedup.get(&key) {
            return n;
        }
        let n = self.alloc_node(NodeKind::Value(val), width);
        self.eg.set_value_node(n);
        self.value_dedup.insert(key.clone(), n);
        self.trail.push(TrailItem::ValueNode(key));
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dep_raw_round_trip() {
        for d in [
            Dep::None,
            Dep::Lit(Lit::positive(11)),
            Dep::Lit(Lit::negative(3)),
            Dep::VarIdx(42),
        ] {
            assert_eq!(Dep::from_raw(d.to_raw()), d);
        }
    }

    #[test]
    fn identity_extract_is_the_variable() {
        let mut s = Slicing::new();
        let v = s.add_var(8);
        assert_eq!(s.mk_extract(v, 7, 0).unwrap(), v);
    }

    #[test]
    fn extract_out_of_range_is_rejected() {
        let mut s = Slicing::new();
        let v = s.add_var(8);
        assert!(s.mk_extract(v, 8, 0).is_err());
        assert!(s.mk_extract(v, 3, 4).is_err());
    }

    #[test]
    fn split_bookkeeping() {
        let mut s = Slicing::new();
        let v = s.add_var(8);
        let hi = s.mk_extract(v, 7, 4).unwrap();
        let lo = s.mk_extract(v, 3, 0).unwrap();
        assert_ne!(hi, lo);
        assert_eq!(s.var_width(hi), 4);
        assert_eq!(s.var_width(lo), 4);
        // both extracts resolve to the two children of one split
        let root = s.var2slice[v as usize];
        assert!(s.has_sub(root));
        assert_eq!(s.info[root as usize].cut, Some(3));
        // the split schedules a congruence for v
        assert!(s.can_propagate());
        assert!(s.propagate());
        assert!(!s.can_propagate());
    }

    #[test]
    fn extract_dedup_returns_same_var() {
        let mut s = Slicing::new();
        let v = s.add_var(8);
        let a = s.mk_extract(v, 6, 2).unwrap();
        let b = s.mk_extract(v, 6, 2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn scope_pop_restores_structure() {
        let mut s = Slicing::new();
        let v = s.add_var(8);
        s.push_scope();
        let x = s.mk_extract(v, 5, 2).unwrap();
        assert!(x != v);
        let root = s.var2slice[v as usize];
        assert!(s.has_sub(root));
        s.pop_scope();
        assert!(!s.has_sub(root));
        assert_eq!(s.num_vars(), 1);
        assert!(s.extract_dedup.is_empty());
        assert!(s.nodes.len() == 1);
    }

    #[test]
    fn value_propagates_to_subslices() {
        let mut s = Slicing::new();
        let v = s.add_var(8);
        let hi = s.mk_extract(v, 7, 4).unwrap();
        assert!(s.add_value(v, &BigUint::from(0xA5u32)));
        let (mask, val) = s.collect_fixed(hi);
        assert_eq!(mask, BigUint::from(0xFu32));
        assert_eq!(val, BigUint::from(0xAu32));
    }
}

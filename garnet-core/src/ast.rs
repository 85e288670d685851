//! Hash-Consed Term Arena.
//!
//! A compact term manager covering the fragments the theory cores consume:
//! linear and nonlinear arithmetic, Boolean structure, and algebraic
//! datatype constructors, accessors and recognizers. Structurally equal
//! applications share a [`TermId`], so term identity doubles as structural
//! equality.

use num_bigint::{BigInt, BigUint};
use num_rational::BigRational;
use rustc_hash::FxHashMap;

/// Reference to a term in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TermId(pub u32);

/// Reference to a datatype constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CtorId(pub u32);

/// Sorts known to the cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sort {
    /// Booleans.
    Bool,
    /// Mathematical integers.
    Int,
    /// Mathematical reals.
    Real,
    /// Fixed-width bit-vectors.
    BitVec(u32),
    /// A declared algebraic datatype, by index.
    Datatype(u32),
}

impl Sort {
    /// Is this an arithmetic sort?
    #[must_use]
    pub fn is_arith(self) -> bool {
        matches!(self, Sort::Int | Sort::Real)
    }
}

/// Term structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TermKind {
    /// Boolean constant true.
    True,
    /// Boolean constant false.
    False,
    /// Arithmetic numeral; the term's sort distinguishes Int from Real.
    Numeral(BigRational),
    /// Free constant.
    Var(String),
    /// n-ary sum.
    Add(Vec<TermId>),
    /// Difference.
    Sub(TermId, TermId),
    /// n-ary product.
    Mul(Vec<TermId>),
    /// Unary minus.
    Neg(TermId),
    /// Mathematical modulus.
    Mod(TermId, TermId),
    /// Truncated remainder.
    Rem(TermId, TermId),
    /// Floor division.
    Idiv(TermId, TermId),
    /// Real division.
    Div(TermId, TermId),
    /// Magnitude.
    Abs(TermId),
    /// Floor conversion to Int.
    ToInt(TermId),
    /// Widening conversion to Real.
    ToReal(TermId),
    /// Exponentiation.
    Power(TermId, TermId),
    /// Non-strict order atom.
    Le(TermId, TermId),
    /// Strict order atom.
    Lt(TermId, TermId),
    /// Equality atom.
    Eq(TermId, TermId),
    /// Pairwise disequality atom.
    Distinct(Vec<TermId>),
    /// Integrality test atom.
    IsInt(TermId),
    /// Negation.
    Not(TermId),
    /// n-ary disjunction.
    Or(Vec<TermId>),
    /// Implication.
    Implies(TermId, TermId),
    /// Bi-implication.
    Iff(TermId, TermId),
    /// Datatype constructor application.
    Ctor(CtorId, Vec<TermId>),
    /// Field accessor `acc_field(ctor)(arg)`.
    Acc(CtorId, u32, TermId),
    /// Constructor recognizer `is_ctor(arg)`.
    Recognizer(CtorId, TermId),
    /// Bit-vector numeral; the term's sort carries the width.
    BvNum(BigUint),
    /// Unsigned bit-vector comparison atom.
    BvUle(TermId, TermId),
    /// Bit extraction `arg[hi:lo]`.
    BvExtract(u32, u32, TermId),
    /// Concatenation, first argument at the high end.
    BvConcat(Vec<TermId>),
}

#[derive(Debug, Clone)]
struct Term {
    kind: TermKind,
    sort: Sort,
}

/// A datatype constructor declaration.
#[derive(Debug, Clone)]
pub struct Constructor {
    /// Constructor name.
    pub name: String,
    /// Index of the owning datatype.
    pub datatype: u32,
    /// Field name and sort per accessor position.
    pub fields: Vec<(String, Sort)>,
}

#[derive(Debug, Clone)]
struct Datatype {
    #[allow(dead_code)]
    name: String,
    ctors: Vec<CtorId>,
    recursive: bool,
}

/// Arena of hash-consed terms plus datatype declarations.
#[derive(Debug, Default)]
pub struct TermManager {
    terms: Vec<Term>,
    cons: FxHashMap<(TermKind, Sort), TermId>,
    datatypes: Vec<Datatype>,
    ctors: Vec<Constructor>,
}

impl TermManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&mut self, kind: TermKind, sort: Sort) -> TermId {
        if let Some(&id) = self.cons.get(&(kind.clone(), sort)) {
            return id;
        }
        let id = TermId(self.terms.len() as u32);
        self.terms.push(Term {
            kind: kind.clone(),
            sort,
        });
        self.cons.insert((kind, sort), id);
        id
    }

    /// Number of interned terms.
    #[must_use]
    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    /// The structure of a term.
    #[must_use]
    pub fn kind(&self, t: TermId) -> &TermKind {
        &self.terms[t.0 as usize].kind
    }

    /// The sort of a term.
    #[must_use]
    pub fn sort(&self, t: TermId) -> Sort {
        self.terms[t.0 as usize].sort
    }

    /// Boolean constant true.
    pub fn mk_true(&mut self) -> TermId {
        self.intern(TermKind::True, Sort::Bool)
    }

    /// Boolean constant false.
    pub fn mk_false(&mut self) -> TermId {
        self.intern(TermKind::False, Sort::Bool)
    }

    /// Free constant of the given sort. Re-declaring a name returns the
    /// original term.
    pub fn mk_var(&mut self, name: &str, sort: Sort) -> TermId {
        self.intern(TermKind::Var(name.to_string()), sort)
    }

    /// Integer numeral.
    pub fn mk_int(&mut self, n: i64) -> TermId {
        self.mk_int_big(BigInt::from(n))
    }

    /// Integer numeral from a big integer.
    pub fn mk_int_big(&mut self, n: BigInt) -> TermId {
        self.intern(TermKind::Numeral(BigRational::from_integer(n)), Sort::Int)
    }

    /// Numeral of the given arithmetic sort.
    pub fn mk_numeral(&mut self, r: BigRational, sort: Sort) -> TermId {
        debug_assert!(sort.is_arith());
        self.intern(TermKind::Numeral(r), sort)
    }

    fn join_arith(&self, args: &[TermId]) -> Sort {
        if args.iter().any(|&a| self.sort(a) == Sort::Real) {
            Sort::Real
        } else {
            Sort::Int
        }
    }

    /// n-ary sum.
    pub fn mk_add(&mut self, args: Vec<TermId>) -> TermId {
        let sort = self.join_arith(&args);
        self.intern(TermKind::Add(args), sort)
    }

    /// Difference.
    pub fn mk_sub(&mut self, a: TermId, b: TermId) -> TermId {
        let sort = self.join_arith(&[a, b]);
        self.intern(TermKind::Sub(a, b), sort)
    }

    /// n-ary product.
    pub fn mk_mul(&mut self, args: Vec<TermId>) -> TermId {
        let sort = self.join_arith(&args);
        self.intern(TermKind::Mul(args), sort)
    }

    /// Unary minus.
    pub fn mk_neg(&mut self, a: TermId) -> TermId {
        let sort = self.sort(a);
        self.intern(TermKind::Neg(a), sort)
    }

    /// Mathematical modulus.
    pub fn mk_mod(&mut self, a: TermId, b: TermId) -> TermId {
        self.intern(TermKind::Mod(a, b), Sort::Int)
    }

    /// Truncated remainder.
    pub fn mk_rem(&mut self, a: TermId, b: TermId) -> TermId {
        self.intern(TermKind::Rem(a, b), Sort::Int)
    }

    /// Floor division.
    pub fn mk_idiv(&mut self, a: TermId, b: TermId) -> TermId {
        self.intern(TermKind::Idiv(a, b), Sort::Int)
    }

    /// Real division.
    pub fn mk_div(&mut self, a: TermId, b: TermId) -> TermId {
        self.intern(TermKind::Div(a, b), Sort::Real)
    }

    /// Magnitude.
    pub fn mk_abs(&mut self, a: TermId) -> TermId {
        let sort = self.sort(a);
        self.intern(TermKind::Abs(a), sort)
    }

    /// Floor conversion to Int.
    pub fn mk_to_int(&mut self, a: TermId) -> TermId {
        self.intern(TermKind::ToInt(a), Sort::Int)
    }

    /// Widening conversion to Real.
    pub fn mk_to_real(&mut self, a: TermId) -> TermId {
        self.intern(TermKind::ToReal(a), Sort::Real)
    }

    /// Exponentiation.
    pub fn mk_power(&mut self, a: TermId, b: TermId) -> TermId {
        let sort = self.sort(a);
        self.intern(TermKind::Power(a, b), sort)
    }

    /// `a <= b`.
    pub fn mk_le(&mut self, a: TermId, b: TermId) -> TermId {
        self.intern(TermKind::Le(a, b), Sort::Bool)
    }

    /// `a < b`.
    pub fn mk_lt(&mut self, a: TermId, b: TermId) -> TermId {
        self.intern(TermKind::Lt(a, b), Sort::Bool)
    }

    /// `a >= b`, normalised to `b <= a`.
    pub fn mk_ge(&mut self, a: TermId, b: TermId) -> TermId {
        self.mk_le(b, a)
    }

    /// `a > b`, normalised to `b < a`.
    pub fn mk_gt(&mut self, a: TermId, b: TermId) -> TermId {
        self.mk_lt(b, a)
    }

    /// `a = b`.
    pub fn mk_eq(&mut self, a: TermId, b: TermId) -> TermId {
        self.intern(TermKind::Eq(a, b), Sort::Bool)
    }

    /// Pairwise disequality.
    pub fn mk_distinct(&mut self, args: Vec<TermId>) -> TermId {
        self.intern(TermKind::Distinct(args), Sort::Bool)
    }

    /// Integrality test.
    pub fn mk_is_int(&mut self, a: TermId) -> TermId {
        self.intern(TermKind::IsInt(a), Sort::Bool)
    }

    /// Negation.
    pub fn mk_not(&mut self, a: TermId) -> TermId {
        self.intern(TermKind::Not(a), Sort::Bool)
    }

    /// n-ary disjunction.
    pub fn mk_or(&mut self, args: Vec<TermId>) -> TermId {
        self.intern(TermKind::Or(args), Sort::Bool)
    }

    /// Implication.
    pub fn mk_implies(&mut self, a: TermId, b: TermId) -> TermId {
        self.intern(TermKind::Implies(a, b), Sort::Bool)
    }

    /// Bi-implication.
    pub fn mk_iff(&mut self, a: TermId, b: TermId) -> TermId {
        self.intern(TermKind::Iff(a, b), Sort::Bool)
    }

    /// Declare a datatype from `(constructor name, fields)` pairs, where a
    /// field is an accessor name plus its sort. Recursion is detected
    /// through fields of the declared sort itself.
    pub fn declare_datatype(
        &mut self,
        name: &str,
        ctors: Vec<(String, Vec<(String, Sort)>)>,
    ) -> Sort {
        let dt_idx = self.datatypes.len() as u32;
        let sort = Sort::Datatype(dt_idx);
        let mut ids = Vec::with_capacity(ctors.len());
        let mut recursive = false;
        for (cname, fields) in ctors {
            recursive |= fields.iter().any(|&(_, s)| s == sort);
            let id = CtorId(self.ctors.len() as u32);
            self.ctors.push(Constructor {
                name: cname,
                datatype: dt_idx,
                fields,
            });
            ids.push(id);
        }
        self.datatypes.push(Datatype {
            name: name.to_string(),
            ctors: ids,
            recursive,
        });
        sort
    }

    /// Constructors of a datatype sort.
    #[must_use]
    pub fn constructors(&self, sort: Sort) -> &[CtorId] {
        match sort {
            Sort::Datatype(i) => &self.datatypes[i as usize].ctors,
            _ => &[],
        }
    }

    /// Declaration of a constructor.
    #[must_use]
    pub fn constructor(&self, c: CtorId) -> &Constructor {
        &self.ctors[c.0 as usize]
    }

    /// Is this a recursive datatype sort?
    #[must_use]
    pub fn is_recursive(&self, sort: Sort) -> bool {
        match sort {
            Sort::Datatype(i) => self.datatypes[i as usize].recursive,
            _ => false,
        }
    }

    /// Constructor application.
    pub fn mk_ctor(&mut self, c: CtorId, args: Vec<TermId>) -> TermId {
        debug_assert_eq!(args.len(), self.ctors[c.0 as usize].fields.len());
        let sort = Sort::Datatype(self.ctors[c.0 as usize].datatype);
        self.intern(TermKind::Ctor(c, args), sort)
    }

    /// Accessor application for field `field` of constructor `c`.
    pub fn mk_accessor(&mut self, c: CtorId, field: u32, arg: TermId) -> TermId {
        let sort = self.ctors[c.0 as usize].fields[field as usize].1;
        self.intern(TermKind::Acc(c, field, arg), sort)
    }

    /// Recognizer application `is_c(arg)`.
    pub fn mk_recognizer(&mut self, c: CtorId, arg: TermId) -> TermId {
        self.intern(TermKind::Recognizer(c, arg), Sort::Bool)
    }

    /// Bit-vector numeral of the given width.
    pub fn mk_bv(&mut self, value: BigUint, width: u32) -> TermId {
        debug_assert!(value.bits() <= u64::from(width));
        self.intern(TermKind::BvNum(value), Sort::BitVec(width))
    }

    /// Unsigned comparison `a <=u b`.
    pub fn mk_bv_ule(&mut self, a: TermId, b: TermId) -> TermId {
        debug_assert_eq!(self.sort(a), self.sort(b));
        self.intern(TermKind::BvUle(a, b), Sort::Bool)
    }

    /// Extraction `arg[hi:lo]`.
    pub fn mk_bv_extract(&mut self, hi: u32, lo: u32, arg: TermId) -> TermId {
        debug_assert!(lo <= hi);
        self.intern(TermKind::BvExtract(hi, lo, arg), Sort::BitVec(hi - lo + 1))
    }

    /// Concatenation with the first argument at the high end.
    pub fn mk_bv_concat(&mut self, args: Vec<TermId>) -> TermId {
        let width = args
            .iter()
            .map(|&a| self.bv_width(a).unwrap_or(0))
            .sum();
        self.intern(TermKind::BvConcat(args), Sort::BitVec(width))
    }

    /// Width of a bit-vector term, if it is one.
    #[must_use]
    pub fn bv_width(&self, t: TermId) -> Option<u32> {
        match self.sort(t) {
            Sort::BitVec(w) => Some(w),
            _ => None,
        }
    }

    /// Direct subterms of a term.
    #[must_use]
    pub fn args(&self, t: TermId) -> Vec<TermId> {
        use TermKind::*;
        match self.kind(t) {
            True | False | Numeral(_) | Var(_) | BvNum(_) => Vec::new(),
            Add(xs) | Mul(xs) | Or(xs) | Distinct(xs) | BvConcat(xs) => xs.clone(),
            Sub(a, b) | Mod(a, b) | Rem(a, b) | Idiv(a, b) | Div(a, b) | Power(a, b)
            | Le(a, b) | Lt(a, b) | Eq(a, b) | Implies(a, b) | Iff(a, b) | BvUle(a, b) => {
                vec![*a, *b]
            }
            Neg(a) | Abs(a) | ToInt(a) | ToReal(a) | IsInt(a) | Not(a) | Acc(_, _, a)
            | Recognizer(_, a) | BvExtract(_, _, a) => vec![*a],
            Ctor(_, xs) => xs.clone(),
        }
    }

    /// All distinct subterms of the given roots, in first-visit order.
    #[must_use]
    pub fn subterms(&self, roots: &[TermId]) -> Vec<TermId> {
        let mut seen = rustc_hash::FxHashSet::default();
        let mut out = Vec::new();
        let mut stack: Vec<TermId> = roots.to_vec();
        while let Some(t) = stack.pop() {
            if !seen.insert(t) {
                continue;
            }
            out.push(t);
            stack.extend(self.args(t));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_consing() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", Sort::Int);
        let y = tm.mk_var("y", Sort::Int);
        let a = tm.mk_add(vec![x, y]);
        let b = tm.mk_add(vec![x, y]);
        assert_eq!(a, b);
        let c = tm.mk_add(vec![y, x]);
        assert_ne!(a, c);
    }

    #[test]
    fn numeral_sorts_do_not_collide() {
        let mut tm = TermManager::new();
        let i = tm.mk_int(3);
        let r = tm.mk_numeral(BigRational::from_integer(BigInt::from(3)), Sort::Real);
        assert_ne!(i, r);
        assert_eq!(tm.sort(i), Sort::Int);
        assert_eq!(tm.sort(r), Sort::Real);
    }

    #[test]
    fn ge_normalises_to_le() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", Sort::Int);
        let y = tm.mk_var("y", Sort::Int);
        assert_eq!(tm.mk_ge(x, y), tm.mk_le(y, x));
    }

    #[test]
    fn datatype_recursion_flag() {
        let mut tm = TermManager::new();
        let list = tm.declare_datatype(
            "List",
            vec![
                ("nil".to_string(), vec![]),
                (
                    "cons".to_string(),
                    vec![
                        ("head".to_string(), Sort::Int),
                        ("tail".to_string(), Sort::Datatype(0)),
                    ],
                ),
            ],
        );
        assert!(tm.is_recursive(list));
        assert_eq!(tm.constructors(list).len(), 2);
    }
}

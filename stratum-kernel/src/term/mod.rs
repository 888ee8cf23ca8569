use std::{
    fmt,
    hash::{Hash, Hasher},
    rc::Rc,
};

use arrayvec::ArrayVec;
use bitflags::bitflags;

use crate::level::{Level, Name};

pub mod instantiate;
pub mod lparams;
mod replace;

/// A node making up a term
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum GNode<T> {
    /// A bound variable, as a de Bruijn index
    BVar(u32),
    /// A free variable
    Local(Name),
    /// A typing universe
    Sort(Level),
    /// A reference to a declaration, specialized at the given universe levels
    Const(Name, Rc<[Level]>),
    /// An application
    App([T; 2]),
    /// A lambda abstraction: binder type, then body
    Lam(Name, [T; 2]),
    /// A dependent function type: binder type, then body
    Pi(Name, [T; 2]),
    /// A let-binding: bound type, bound value, then body
    Let(Name, [T; 3]),
    /// A natural number literal
    NatLit(u64),
}

impl<T> GNode<T> {
    /// Map this node's children
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> GNode<U> {
        match self {
            GNode::BVar(x) => GNode::BVar(x),
            GNode::Local(n) => GNode::Local(n),
            GNode::Sort(l) => GNode::Sort(l),
            GNode::Const(n, ls) => GNode::Const(n, ls),
            GNode::App([x, y]) => GNode::App([f(x), f(y)]),
            GNode::Lam(n, [x, y]) => GNode::Lam(n, [f(x), f(y)]),
            GNode::Pi(n, [x, y]) => GNode::Pi(n, [f(x), f(y)]),
            GNode::Let(n, [x, y, z]) => GNode::Let(n, [f(x), f(y), f(z)]),
            GNode::NatLit(x) => GNode::NatLit(x),
        }
    }

    /// Annotate this node's children with the number of binders they sit under
    pub fn with_binders(self) -> GNode<(u32, T)> {
        match self {
            GNode::BVar(x) => GNode::BVar(x),
            GNode::Local(n) => GNode::Local(n),
            GNode::Sort(l) => GNode::Sort(l),
            GNode::Const(n, ls) => GNode::Const(n, ls),
            GNode::App([x, y]) => GNode::App([(0, x), (0, y)]),
            GNode::Lam(n, [x, y]) => GNode::Lam(n, [(0, x), (1, y)]),
            GNode::Pi(n, [x, y]) => GNode::Pi(n, [(0, x), (1, y)]),
            GNode::Let(n, [x, y, z]) => GNode::Let(n, [(0, x), (0, y), (1, z)]),
            GNode::NatLit(x) => GNode::NatLit(x),
        }
    }

    /// Borrow this node's children
    pub fn as_ref(&self) -> GNode<&T> {
        match self {
            GNode::BVar(x) => GNode::BVar(*x),
            GNode::Local(n) => GNode::Local(n.clone()),
            GNode::Sort(l) => GNode::Sort(l.clone()),
            GNode::Const(n, ls) => GNode::Const(n.clone(), ls.clone()),
            GNode::App([x, y]) => GNode::App([x, y]),
            GNode::Lam(n, [x, y]) => GNode::Lam(n.clone(), [x, y]),
            GNode::Pi(n, [x, y]) => GNode::Pi(n.clone(), [x, y]),
            GNode::Let(n, [x, y, z]) => GNode::Let(n.clone(), [x, y, z]),
            GNode::NatLit(x) => GNode::NatLit(*x),
        }
    }

    /// Get this node's children
    pub fn children(&self) -> &[T] {
        match self {
            GNode::App(x) => &x[..],
            GNode::Lam(_, x) => &x[..],
            GNode::Pi(_, x) => &x[..],
            GNode::Let(_, x) => &x[..],
            _ => &[],
        }
    }

    /// Get the number of binders for each child of this node
    pub fn binders(&self) -> ArrayVec<u32, 3> {
        match self {
            GNode::App(_) => [0, 0].into_iter().collect(),
            GNode::Lam(..) | GNode::Pi(..) => [0, 1].into_iter().collect(),
            GNode::Let(..) => [0, 0, 1].into_iter().collect(),
            _ => ArrayVec::new(),
        }
    }
}

bitflags! {
    /// Precomputed facts about a term
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
    pub struct TermFlags: u8 {
        /// Whether some universe level in this term mentions a universe parameter
        const HAS_PARAM_UNIV = 1 << 0;
    }
}

/// An immutable, reference-counted term
///
/// Cloning a term is cheap and shares structure. Metadata is computed once, when the node is
/// built.
#[derive(Clone)]
pub struct Term(Rc<TermData>);

struct TermData {
    node: GNode<Term>,
    /// One more than the largest loose bound variable, or 0
    loose_bvar_range: u32,
    flags: TermFlags,
    hash: u64,
}

/// # Construction
impl Term {
    /// Build a term from a node, computing its metadata
    ///
    /// # Panics
    /// If a bound variable index is `u32::MAX`
    ///
    /// # Examples
    /// ```rust
    /// # use stratum_kernel::*;
    /// let x = Term::bvar(0);
    /// let y = Term::bvar(3);
    /// let ty = Term::sort(Level::param("u"));
    /// let f = Term::lam("x", ty, Term::app(x.clone(), y));
    /// assert_eq!(x.loose_bvar_range(), 1);
    /// assert_eq!(f.loose_bvar_range(), 3);
    /// assert!(f.has_param_univ());
    /// ```
    pub fn new(node: GNode<Term>) -> Term {
        let loose_bvar_range = match &node {
            GNode::BVar(x) => x.checked_add(1).expect("bound variable index overflow"),
            node => node
                .children()
                .iter()
                .zip(node.binders())
                .map(|(x, b)| x.loose_bvar_range().saturating_sub(b))
                .max()
                .unwrap_or(0),
        };
        let mut flags = match &node {
            GNode::Sort(l) if l.has_param() => TermFlags::HAS_PARAM_UNIV,
            GNode::Const(_, ls) if ls.iter().any(Level::has_param) => TermFlags::HAS_PARAM_UNIV,
            _ => TermFlags::empty(),
        };
        for child in node.children() {
            flags |= child.flags();
        }
        let hash = fxhash::hash64(&node);
        Term(Rc::new(TermData {
            node,
            loose_bvar_range,
            flags,
            hash,
        }))
    }

    /// A bound variable
    pub fn bvar(ix: u32) -> Term {
        Term::new(GNode::BVar(ix))
    }

    /// A free variable
    pub fn local(name: impl Into<Name>) -> Term {
        Term::new(GNode::Local(name.into()))
    }

    /// A typing universe
    pub fn sort(level: Level) -> Term {
        Term::new(GNode::Sort(level))
    }

    /// A reference to a declaration at the given universe levels
    pub fn constant(name: impl Into<Name>, levels: impl IntoIterator<Item = Level>) -> Term {
        Term::new(GNode::Const(name.into(), levels.into_iter().collect()))
    }

    /// An application
    pub fn app(f: Term, a: Term) -> Term {
        Term::new(GNode::App([f, a]))
    }

    /// A lambda abstraction
    pub fn lam(name: impl Into<Name>, ty: Term, body: Term) -> Term {
        Term::new(GNode::Lam(name.into(), [ty, body]))
    }

    /// A dependent function type
    pub fn pi(name: impl Into<Name>, ty: Term, body: Term) -> Term {
        Term::new(GNode::Pi(name.into(), [ty, body]))
    }

    /// A let-binding
    pub fn let_in(name: impl Into<Name>, ty: Term, val: Term, body: Term) -> Term {
        Term::new(GNode::Let(name.into(), [ty, val, body]))
    }

    /// A natural number literal
    pub fn nat(n: u64) -> Term {
        Term::new(GNode::NatLit(n))
    }

    /// Rebuild this term with a node having the same shape
    ///
    /// Returns `self` if every child of `node` is identical to the corresponding child of this
    /// term and the payloads agree, so that rewrites which change nothing allocate nothing.
    pub fn update(&self, node: GNode<Term>) -> Term {
        let same = match (self.node(), &node) {
            (GNode::Sort(l), GNode::Sort(m)) => l == m,
            (GNode::Const(n, ls), GNode::Const(m, ms)) => n == m && ls == ms,
            (GNode::App(_), GNode::App(_)) => true,
            (GNode::Lam(n, _), GNode::Lam(m, _)) | (GNode::Pi(n, _), GNode::Pi(m, _)) => n == m,
            (GNode::Let(n, _), GNode::Let(m, _)) => n == m,
            (old, new) => old == new,
        } && self
            .node()
            .children()
            .iter()
            .zip(node.children())
            .all(|(x, y)| x.ptr_eq(y));
        if same { self.clone() } else { Term::new(node) }
    }
}

/// # Inspection
impl Term {
    /// Get this term's node
    pub fn node(&self) -> &GNode<Term> {
        &self.0.node
    }

    /// Get one more than the largest loose bound variable of this term, or 0 if it has none
    pub fn loose_bvar_range(&self) -> u32 {
        self.0.loose_bvar_range
    }

    /// Get whether this term has any loose bound variable
    pub fn has_loose_bvars(&self) -> bool {
        self.0.loose_bvar_range > 0
    }

    /// Get this term's flags
    pub fn flags(&self) -> TermFlags {
        self.0.flags
    }

    /// Get whether any universe level in this term mentions a universe parameter
    pub fn has_param_univ(&self) -> bool {
        self.0.flags.contains(TermFlags::HAS_PARAM_UNIV)
    }

    /// Check whether two terms are the same object
    pub fn ptr_eq(&self, other: &Term) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Get whether this term object is referenced from more than one place
    pub(crate) fn is_shared(&self) -> bool {
        Rc::strong_count(&self.0) > 1
    }

    pub(crate) fn as_ptr(&self) -> *const () {
        Rc::as_ptr(&self.0) as *const ()
    }

    pub fn as_bvar(&self) -> Option<u32> {
        match self.node() {
            GNode::BVar(x) => Some(*x),
            _ => None,
        }
    }

    pub fn is_app(&self) -> bool {
        matches!(self.node(), GNode::App(_))
    }

    pub fn is_lambda(&self) -> bool {
        matches!(self.node(), GNode::Lam(..))
    }

    /// Get the body of a lambda, if this is one
    pub fn lambda_body(&self) -> Option<&Term> {
        match self.node() {
            GNode::Lam(_, [_, body]) => Some(body),
            _ => None,
        }
    }
}

/// # Applications
impl Term {
    /// Apply a term to a list of arguments, first argument first
    pub fn mk_app(self, args: impl IntoIterator<Item = Term>) -> Term {
        args.into_iter().fold(self, Term::app)
    }

    /// Apply a term to a list of arguments given last argument first
    ///
    /// # Examples
    /// ```rust
    /// # use stratum_kernel::*;
    /// let [f, a, b] = ["f", "a", "b"].map(Term::local);
    /// let t = f.clone().mk_rev_app(&[b.clone(), a.clone()]);
    /// assert_eq!(t, f.mk_app([a, b]));
    /// ```
    pub fn mk_rev_app(self, rev_args: &[Term]) -> Term {
        rev_args.iter().rev().cloned().fold(self, Term::app)
    }

    /// Get the head of an application spine
    pub fn get_app_fn(&self) -> &Term {
        let mut head = self;
        while let GNode::App([f, _]) = head.node() {
            head = f;
        }
        head
    }

    /// Get the arguments of an application spine, first argument first
    pub fn get_app_args(&self) -> Vec<Term> {
        let mut args = Vec::new();
        let head = self.get_app_rev_args(&mut args);
        debug_assert!(!head.is_app());
        args.reverse();
        args
    }

    /// Push the arguments of an application spine onto `args`, last argument first, and return
    /// the head
    pub fn get_app_rev_args<'a>(&'a self, args: &mut Vec<Term>) -> &'a Term {
        let mut head = self;
        while let GNode::App([f, a]) = head.node() {
            args.push(a.clone());
            head = f;
        }
        head
    }
}

impl PartialEq for Term {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || (self.0.hash == other.0.hash && self.node() == other.node())
    }
}

impl Eq for Term {}

impl Hash for Term {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash)
    }
}

impl fmt::Debug for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.node(), f)
    }
}

use fxhash::FxBuildHasher;
use hashbrown::HashMap;

use super::Term;

/// An outside-in rewrite of a term
///
/// The visitor is called on each node together with the number of binders crossed to reach it.
/// If it returns a replacement, that replacement is used as-is; otherwise the node's children
/// are rewritten and the node rebuilt (or reused, if no child changed). Results for shared
/// subterms are memoized per binder offset, so a subterm referenced from many places is visited
/// once per offset.
struct Replacer<F> {
    f: F,
    cache: HashMap<(*const (), u32), Term, FxBuildHasher>,
}

impl<F: FnMut(&Term, u32) -> Option<Term>> Replacer<F> {
    fn apply(&mut self, term: &Term, offset: u32) -> Term {
        let shared = term.is_shared();
        if shared {
            if let Some(result) = self.cache.get(&(term.as_ptr(), offset)) {
                return result.clone();
            }
        }
        let result = match (self.f)(term, offset) {
            Some(result) => result,
            None => {
                let node = term
                    .node()
                    .as_ref()
                    .with_binders()
                    .map(|(b, child)| self.apply(child, offset.saturating_add(b)));
                term.update(node)
            }
        };
        if shared {
            self.cache.insert((term.as_ptr(), offset), result.clone());
        }
        result
    }
}

impl Term {
    /// Rewrite this term outside-in
    ///
    /// `f` receives each visited node and the number of binders between it and the root.
    ///
    /// # Examples
    /// ```rust
    /// # use stratum_kernel::*;
    /// let t = Term::app(Term::local("f"), Term::lam("x", Term::nat(0), Term::local("f")));
    /// let g = Term::local("g");
    /// let r = t.replace(|m, offset| match m.node() {
    ///     GNode::Local(n) if n == "f" && offset == 0 => Some(g.clone()),
    ///     _ => None,
    /// });
    /// assert_eq!(r, Term::app(g, Term::lam("x", Term::nat(0), Term::local("f"))));
    /// ```
    pub fn replace(&self, f: impl FnMut(&Term, u32) -> Option<Term>) -> Term {
        let mut replacer = Replacer {
            f,
            cache: HashMap::default(),
        };
        replacer.apply(self, 0)
    }
}

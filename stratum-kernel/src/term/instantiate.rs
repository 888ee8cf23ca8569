use super::{GNode, Term};

/// # Lifting and lowering
impl Term {
    /// Add `d` to every loose bound variable
    pub fn lift_loose_bvars(&self, d: u32) -> Term {
        self.lift_loose_bvars_from(0, d)
    }

    /// Add `d` to every loose bound variable with index at least `s`
    ///
    /// # Panics
    /// If a lifted index would exceed `u32::MAX - 1`
    ///
    /// # Examples
    /// ```rust
    /// # use stratum_kernel::*;
    /// let t = Term::lam("x", Term::bvar(0), Term::app(Term::bvar(0), Term::bvar(1)));
    /// let lifted = t.lift_loose_bvars(2);
    /// assert_eq!(lifted, Term::lam("x", Term::bvar(2), Term::app(Term::bvar(0), Term::bvar(3))));
    /// assert!(t.lift_loose_bvars_from(1, 2).ptr_eq(&t));
    /// ```
    pub fn lift_loose_bvars_from(&self, s: u32, d: u32) -> Term {
        if d == 0 || s >= self.loose_bvar_range() {
            return self.clone();
        }
        self.replace(|m, offset| {
            let Some(s1) = s.checked_add(offset) else {
                return Some(m.clone());
            };
            if s1 >= m.loose_bvar_range() {
                return Some(m.clone());
            }
            let ix = m.as_bvar()?;
            Some(Term::bvar(
                ix.checked_add(d).expect("bound variable index overflow"),
            ))
        })
    }

    /// Subtract `d` from every loose bound variable with index at least `s`
    ///
    /// The caller must ensure that no loose bound variable lies in `[s - d, s)`, so that no
    /// variable is captured.
    pub fn lower_loose_bvars(&self, s: u32, d: u32) -> Term {
        debug_assert!(d <= s);
        if d == 0 || s >= self.loose_bvar_range() {
            return self.clone();
        }
        self.replace(|m, offset| {
            let Some(s1) = s.checked_add(offset) else {
                return Some(m.clone());
            };
            if s1 >= m.loose_bvar_range() {
                return Some(m.clone());
            }
            let ix = m.as_bvar()?;
            Some(Term::bvar(ix - d))
        })
    }
}

/// # Instantiation
impl Term {
    /// Substitute `subst[i]` for the loose bound variable `i`
    ///
    /// Loose bound variables at or above `subst.len()` are lowered by `subst.len()`.
    ///
    /// # Examples
    /// ```rust
    /// # use stratum_kernel::*;
    /// let [a, b] = ["a", "b"].map(Term::local);
    /// let t = Term::app(Term::app(Term::bvar(0), Term::bvar(1)), Term::bvar(2));
    /// assert_eq!(
    ///     t.instantiate(&[a.clone(), b.clone()]),
    ///     Term::app(Term::app(a, b), Term::bvar(0))
    /// );
    /// assert!(t.instantiate(&[]).ptr_eq(&t));
    /// ```
    pub fn instantiate(&self, subst: &[Term]) -> Term {
        self.instantiate_at(0, subst)
    }

    /// Substitute `value` for the loose bound variable 0
    pub fn instantiate1(&self, value: &Term) -> Term {
        self.instantiate_at(0, std::slice::from_ref(value))
    }

    /// Substitute `subst[i]` for the loose bound variable `s + i`
    ///
    /// Loose bound variables below `s` are untouched, and those at or above `s + subst.len()`
    /// are lowered by `subst.len()`. Substituted terms are lifted over the binders they are
    /// moved under.
    ///
    /// # Examples
    /// ```rust
    /// # use stratum_kernel::*;
    /// let a = Term::bvar(0);
    /// let t = Term::lam("x", Term::nat(0), Term::app(Term::bvar(0), Term::bvar(2)));
    /// // Under the binder, index 2 is the outer index 1; `a` must skip the binder
    /// let r = t.instantiate_at(1, &[a]);
    /// assert_eq!(r, Term::lam("x", Term::nat(0), Term::app(Term::bvar(0), Term::bvar(1))));
    /// ```
    pub fn instantiate_at(&self, s: u32, subst: &[Term]) -> Term {
        if subst.is_empty() || s >= self.loose_bvar_range() {
            return self.clone();
        }
        if s == 0 {
            if let Some(result) = instantiate_easy(self, subst, false, true) {
                return result;
            }
        }
        instantiate_general(self, s, subst, false)
    }

    /// Substitute `subst[subst.len() - 1 - i]` for the loose bound variable `i`
    ///
    /// This is [`Term::instantiate`] with the substitution reversed, for callers that produce
    /// arguments last-first.
    ///
    /// # Examples
    /// ```rust
    /// # use stratum_kernel::*;
    /// let [a, b] = ["a", "b"].map(Term::local);
    /// let t = Term::app(Term::bvar(0), Term::bvar(1));
    /// assert_eq!(
    ///     t.instantiate_rev(&[a.clone(), b.clone()]),
    ///     t.instantiate(&[b, a])
    /// );
    /// ```
    pub fn instantiate_rev(&self, subst: &[Term]) -> Term {
        if subst.is_empty() || !self.has_loose_bvars() {
            return self.clone();
        }
        if let Some(result) = instantiate_easy(self, subst, true, true) {
            return result;
        }
        instantiate_general(self, 0, subst, true)
    }
}

/// Pick the substitution for relative index `ix < subst.len()`
fn pick(subst: &[Term], ix: usize, rev: bool) -> &Term {
    if rev {
        &subst[subst.len() - 1 - ix]
    } else {
        &subst[ix]
    }
}

/// Instantiate without crossing binders
///
/// Only handles application spines whose leaves are closed or directly substituted; gives up
/// with `None` on anything else.
fn instantiate_easy(term: &Term, subst: &[Term], rev: bool, app: bool) -> Option<Term> {
    if !term.has_loose_bvars() {
        return Some(term.clone());
    }
    match term.node() {
        GNode::BVar(ix) if (*ix as usize) < subst.len() => {
            Some(pick(subst, *ix as usize, rev).clone())
        }
        GNode::App([f, a]) if app => {
            let a = instantiate_easy(a, subst, rev, false)?;
            let f = instantiate_easy(f, subst, rev, true)?;
            Some(term.update(GNode::App([f, a])))
        }
        _ => None,
    }
}

fn instantiate_general(term: &Term, s: u32, subst: &[Term], rev: bool) -> Term {
    term.replace(|m, offset| {
        let Some(s1) = s.checked_add(offset) else {
            return Some(m.clone());
        };
        if s1 >= m.loose_bvar_range() {
            return Some(m.clone());
        }
        // Any remaining variable is loose, so its index is at least `s1`
        let ix = m.as_bvar()?;
        let rel = (ix - s1) as usize;
        if rel < subst.len() {
            Some(pick(subst, rel, rev).lift_loose_bvars(offset))
        } else {
            Some(Term::bvar(ix - subst.len() as u32))
        }
    })
}

/// # Beta reduction
impl Term {
    /// Get whether this term is an application of a lambda
    pub fn is_head_beta(&self) -> bool {
        self.is_app() && self.get_app_fn().is_lambda()
    }

    /// Apply this term to arguments given last argument first, beta reducing as far as the
    /// arguments go
    ///
    /// All binders consumed are instantiated in a single pass. Arguments left over once the
    /// body is no longer a lambda are applied to the result.
    ///
    /// # Examples
    /// ```rust
    /// # use stratum_kernel::*;
    /// let ty = Term::sort(Level::ZERO);
    /// // λx. λy. x y
    /// let body = Term::app(Term::bvar(1), Term::bvar(0));
    /// let f = Term::lam("x", ty.clone(), Term::lam("y", ty, body));
    /// let [a, b, c] = ["a", "b", "c"].map(Term::local);
    /// let r = f.apply_beta(&[c.clone(), b.clone(), a.clone()]);
    /// assert_eq!(r, Term::app(Term::app(a, b), c));
    /// ```
    pub fn apply_beta(&self, rev_args: &[Term]) -> Term {
        if rev_args.is_empty() {
            return self.clone();
        }
        let Some(mut body) = self.lambda_body() else {
            return self.clone().mk_rev_app(rev_args);
        };
        let num_args = rev_args.len();
        let mut consumed = 1;
        while consumed < num_args {
            let Some(inner) = body.lambda_body() else {
                break;
            };
            body = inner;
            consumed += 1;
        }
        let rest = num_args - consumed;
        body.instantiate(&rev_args[rest..])
            .mk_rev_app(&rev_args[..rest])
    }

    /// Beta reduce this term at its head until the head is not a lambda
    ///
    /// # Examples
    /// ```rust
    /// # use stratum_kernel::*;
    /// let ty = Term::sort(Level::ZERO);
    /// let id = Term::lam("x", ty.clone(), Term::bvar(0));
    /// // (λf. f) id id a  ~>  a
    /// let app_id = Term::lam("f", ty, Term::bvar(0));
    /// let a = Term::local("a");
    /// let t = app_id.mk_app([id.clone(), id, a.clone()]);
    /// assert!(t.is_head_beta());
    /// assert_eq!(t.head_beta_reduce(), a);
    /// ```
    pub fn head_beta_reduce(&self) -> Term {
        let mut term = self.clone();
        let mut rev_args = Vec::new();
        while term.is_head_beta() {
            rev_args.clear();
            let head = term.get_app_rev_args(&mut rev_args).clone();
            term = head.apply_beta(&rev_args);
        }
        term
    }
}

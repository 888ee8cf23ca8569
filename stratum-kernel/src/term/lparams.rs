use std::rc::Rc;

use super::{GNode, Term};
use crate::kernel::Error;
use crate::level::{Level, Name};

impl Term {
    /// Substitute `levels[i]` for the universe parameter `params[i]` throughout this term
    ///
    /// Only sorts and constants carry levels; subterms without universe parameters are shared
    /// with the result as-is. The caller is responsible for `params` and `levels` having the same
    /// length.
    ///
    /// # Examples
    /// ```rust
    /// # use stratum_kernel::*;
    /// let u = Level::param("u");
    /// let t = Term::pi("x", Term::sort(u.clone()), Term::constant("List", [u]));
    /// let r = t.instantiate_lparams(&["u".into()], &[Level::ZERO]).unwrap();
    /// let list = Term::constant("List", [Level::ZERO]);
    /// assert_eq!(r, Term::pi("x", Term::sort(Level::ZERO), list));
    /// assert!(!r.has_param_univ());
    /// ```
    pub fn instantiate_lparams(&self, params: &[Name], levels: &[Level]) -> Result<Term, Error> {
        if params.is_empty() || !self.has_param_univ() {
            return Ok(self.clone());
        }
        let mut error = None;
        let result = self.replace(|m, _| {
            if error.is_some() || !m.has_param_univ() {
                return Some(m.clone());
            }
            let node = match m.node() {
                GNode::Sort(l) => l.instantiate(params, levels).map(GNode::Sort),
                GNode::Const(name, ls) => ls
                    .iter()
                    .map(|l| l.instantiate(params, levels))
                    .collect::<Result<Rc<[Level]>, Error>>()
                    .map(|ls| GNode::Const(name.clone(), ls)),
                _ => return None,
            };
            match node {
                Ok(node) => Some(m.update(node)),
                Err(err) => {
                    error = Some(err);
                    Some(m.clone())
                }
            }
        });
        match error {
            Some(err) => Err(err),
            None => Ok(result),
        }
    }
}

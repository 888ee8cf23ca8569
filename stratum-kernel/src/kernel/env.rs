use std::ops::Deref;

use fxhash::FxBuildHasher;
use hashbrown::HashMap;
use log::debug;
use typed_generational_arena::{SmallArena, SmallIndex};

use super::*;

/// A universe-polymorphic declaration
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Declaration {
    name: Name,
    lparams: Vec<Name>,
    ty: Term,
    value: Option<Term>,
}

impl Declaration {
    /// Construct a new declaration
    pub fn new(
        name: impl Into<Name>,
        lparams: impl IntoIterator<Item = Name>,
        ty: Term,
        value: Option<Term>,
    ) -> Declaration {
        Declaration {
            name: name.into(),
            lparams: lparams.into_iter().collect(),
            ty,
            value,
        }
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    /// Get this declaration's universe parameters, in order
    pub fn lparams(&self) -> &[Name] {
        &self.lparams
    }

    pub fn num_lparams(&self) -> usize {
        self.lparams.len()
    }

    pub fn ty(&self) -> &Term {
        &self.ty
    }

    /// Get this declaration's value, if it is a definition
    pub fn value(&self) -> Option<&Term> {
        self.value.as_ref()
    }
}

/// A handle for a declaration in an [`Environment`]
///
/// Handles are never reused: redefining a name issues a new handle, and a handle whose
/// declaration has been removed or replaced no longer resolves.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct DeclId(SmallIndex<Declaration>);

/// A declaration together with its identity
#[derive(Debug, Copy, Clone)]
pub struct Constant<'e> {
    id: DeclId,
    decl: &'e Declaration,
}

impl<'e> Constant<'e> {
    pub fn new(id: DeclId, decl: &'e Declaration) -> Constant<'e> {
        Constant { id, decl }
    }

    pub fn id(&self) -> DeclId {
        self.id
    }

    pub fn decl(&self) -> &'e Declaration {
        self.decl
    }
}

impl Deref for Constant<'_> {
    type Target = Declaration;

    fn deref(&self) -> &Declaration {
        self.decl
    }
}

/// A set of declarations, indexed by name
#[derive(Default, Clone)]
pub struct Environment {
    decls: SmallArena<Declaration>,
    names: HashMap<Name, DeclId, FxBuildHasher>,
}

impl Environment {
    /// Construct a new, empty environment
    pub fn new() -> Environment {
        Environment::default()
    }

    /// Add a declaration, failing if one with the same name already exists
    ///
    /// # Examples
    /// ```rust
    /// # use stratum_kernel::*;
    /// let mut env = Environment::new();
    /// let nat = Declaration::new("Nat", [], Term::sort(Level::ZERO.succ().unwrap()), None);
    /// let id = env.add(nat.clone()).unwrap();
    /// assert_eq!(env.get(id), Some(&nat));
    /// assert_eq!(env.add(nat), Err(Error::DuplicateDeclaration("Nat".into())));
    /// ```
    pub fn add(&mut self, decl: Declaration) -> Result<DeclId, Error> {
        if self.names.contains_key(&decl.name) {
            return Err(Error::DuplicateDeclaration(decl.name));
        }
        Ok(self.insert(decl))
    }

    /// Add a declaration, replacing any existing declaration with the same name
    ///
    /// The replacement always receives a fresh handle.
    ///
    /// # Examples
    /// ```rust
    /// # use stratum_kernel::*;
    /// let mut env = Environment::new();
    /// let ty = Term::sort(Level::ZERO);
    /// let old = env.redefine(Declaration::new("c", [], ty.clone(), None));
    /// let new = env.redefine(Declaration::new("c", [], ty, Some(Term::nat(0))));
    /// assert_ne!(old, new);
    /// assert_eq!(env.get(old), None);
    /// assert_eq!(env.lookup("c").unwrap().id(), new);
    /// ```
    pub fn redefine(&mut self, decl: Declaration) -> DeclId {
        self.remove(&decl.name);
        self.insert(decl)
    }

    /// Remove a declaration by name
    pub fn remove(&mut self, name: &str) -> Option<Declaration> {
        let id = self.names.remove(name)?;
        debug!("retiring declaration {name} ({id:?})");
        self.decls.remove(id.0)
    }

    /// Get a declaration by handle
    pub fn get(&self, id: DeclId) -> Option<&Declaration> {
        self.decls.get(id.0)
    }

    /// Look up a declaration by name
    pub fn lookup(&self, name: &str) -> Option<Constant<'_>> {
        let id = *self.names.get(name)?;
        Some(Constant::new(id, &self.decls[id.0]))
    }

    /// Get the number of declarations in this environment
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn insert(&mut self, decl: Declaration) -> DeclId {
        let name = decl.name.clone();
        let id = DeclId(self.decls.insert(decl));
        debug!("issuing {id:?} for declaration {name}");
        self.names.insert(name, id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axiom(name: &str) -> Declaration {
        Declaration::new(name, [], Term::sort(Level::ZERO), None)
    }

    #[test]
    fn lookup_returns_current_identity() {
        let mut env = Environment::new();
        let a = env.add(axiom("a")).unwrap();
        let b = env.add(axiom("b")).unwrap();
        assert_ne!(a, b);
        let c = env.lookup("a").unwrap();
        assert_eq!(c.id(), a);
        assert_eq!(c.name(), "a");
        assert!(env.lookup("z").is_none());
        assert_eq!(env.len(), 2);
    }

    #[test]
    fn failed_add_leaves_environment_unchanged() {
        let mut env = Environment::new();
        let a = env.add(axiom("a")).unwrap();
        let dup = Declaration::new("a", ["u".into()], Term::nat(1), None);
        assert_eq!(env.add(dup), Err(Error::DuplicateDeclaration("a".into())));
        assert_eq!(env.lookup("a").unwrap().id(), a);
        assert_eq!(env.get(a), Some(&axiom("a")));
    }

    #[test]
    fn removed_handles_do_not_resolve() {
        let mut env = Environment::new();
        let a = env.add(axiom("a")).unwrap();
        assert_eq!(env.remove("a"), Some(axiom("a")));
        assert_eq!(env.remove("a"), None);
        assert_eq!(env.get(a), None);
        assert!(env.is_empty());
        // A new declaration may reuse the slot, but never the handle
        let again = env.add(axiom("a")).unwrap();
        assert_ne!(again, a);
        assert_eq!(env.get(a), None);
    }

    #[test]
    fn constants_deref_to_declarations() {
        let mut env = Environment::new();
        let decl = Declaration::new(
            "id",
            ["u".into()],
            Term::sort(Level::param("u")),
            Some(Term::nat(0)),
        );
        env.add(decl).unwrap();
        let c = env.lookup("id").unwrap();
        assert_eq!(c.num_lparams(), 1);
        assert_eq!(c.lparams(), &["u".into()] as &[Name]);
        assert_eq!(c.value(), Some(&Term::nat(0)));
    }
}

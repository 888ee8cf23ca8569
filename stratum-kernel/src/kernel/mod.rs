use thiserror::Error;

pub mod cache;
pub mod env;
pub mod univ;

pub use cache::{
    clear_thread_caches, with_thread_caches, InstCache, InstCaches, DEFAULT_CACHE_CAPACITY,
};
pub use env::{Constant, DeclId, Declaration, Environment};
pub use univ::UnivCtx;

pub use crate::level::{Level, Name, UVar};
pub use crate::term::{GNode, Term};

/// An instance of the `stratum` kernel
///
/// A kernel owns a universe context, an environment of declarations, and the caches used to
/// specialize those declarations at concrete universe levels.
#[derive(Default, Clone)]
pub struct Kernel {
    univ: UnivCtx,
    env: Environment,
    caches: InstCaches,
}

impl Kernel {
    /// Construct a new kernel
    pub fn new() -> Kernel {
        Kernel::default()
    }

    /// Construct a new kernel whose instantiation caches have `capacity` slots each
    pub fn with_cache_capacity(capacity: usize) -> Kernel {
        Kernel {
            caches: InstCaches::new(capacity),
            ..Kernel::default()
        }
    }

    /// Get this kernel's universe context
    pub fn univ(&self) -> &UnivCtx {
        &self.univ
    }

    /// Get this kernel's environment
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Get this kernel's instantiation caches
    pub fn caches(&self) -> &InstCaches {
        &self.caches
    }
}

/// # Universe Management
///
/// Functions for declaring universe variables and comparing levels
impl Kernel {
    /// Declare a new, unconstrained universe variable
    ///
    /// # Example
    /// ```
    /// # use stratum_kernel::*;
    /// # let mut ker = Kernel::new();
    /// let u = ker.declare_univ("u").unwrap();
    /// assert_eq!(ker.univ().lookup("u"), Some(u));
    /// assert!(ker.declare_univ("u").is_err());
    /// ```
    pub fn declare_univ(&mut self, name: impl Into<Name>) -> Result<Level, Error> {
        self.univ.declare_variable(name)
    }

    /// Declare a new universe variable lying above `level`
    ///
    /// # Example
    /// ```
    /// # use stratum_kernel::*;
    /// # let mut ker = Kernel::new();
    /// let u = ker.declare_univ("u").unwrap();
    /// let v = ker.define_univ("v", &u.clone().succ().unwrap()).unwrap();
    /// assert_eq!(ker.is_ge(&v, &u, 1), Ok(true));
    /// assert_eq!(ker.is_ge(&u, &v, 0), Ok(false));
    /// ```
    pub fn define_univ(&mut self, name: impl Into<Name>, level: &Level) -> Result<Level, Error> {
        self.univ.define_variable(name, level)
    }

    /// Check whether `l1 ≥ l2 + k` follows from the known constraints
    pub fn is_ge(&self, l1: &Level, l2: &Level, k: i32) -> Result<bool, Error> {
        self.univ.is_ge(l1, l2, k)
    }
}

/// # Declarations
///
/// Functions for adding and replacing declarations
impl Kernel {
    /// Add a declaration
    ///
    /// Fails if a declaration with the same name already exists.
    pub fn add_decl(&mut self, decl: Declaration) -> Result<DeclId, Error> {
        self.env.add(decl)
    }

    /// Add a declaration, replacing any existing declaration with the same name
    ///
    /// # Example
    /// ```
    /// # use stratum_kernel::*;
    /// # let mut ker = Kernel::new();
    /// let ty = Term::sort(Level::param("u"));
    /// let old = ker.add_decl(Declaration::new("T", ["u".into()], ty.clone(), None)).unwrap();
    /// let new = ker.redefine_decl(Declaration::new("T", ["u".into()], ty, Some(Term::nat(0))));
    /// assert_ne!(old, new);
    /// assert_eq!(ker.instantiate_value("T", &[Level::ZERO]), Ok(Term::nat(0)));
    /// ```
    pub fn redefine_decl(&mut self, decl: Declaration) -> DeclId {
        self.env.redefine(decl)
    }

    /// Look up a declaration by name
    pub fn lookup_decl(&self, name: &str) -> Result<Constant<'_>, Error> {
        self.env
            .lookup(name)
            .ok_or_else(|| Error::UnknownDecl(name.into()))
    }
}

/// # Instantiation
///
/// Functions for specializing declarations at universe levels
impl Kernel {
    /// Get the type of a declaration at the given universe levels
    ///
    /// # Example
    /// ```
    /// # use stratum_kernel::*;
    /// # let mut ker = Kernel::new();
    /// let u = Level::param("u");
    /// let ty = Term::pi("x", Term::sort(u.clone()), Term::sort(u));
    /// ker.add_decl(Declaration::new("F", ["u".into()], ty, None)).unwrap();
    /// let one = Level::ZERO.succ().unwrap();
    /// let inst = ker.instantiate_type("F", &[one.clone()]).unwrap();
    /// assert_eq!(inst, Term::pi("x", Term::sort(one.clone()), Term::sort(one.clone())));
    /// assert!(ker.instantiate_type("F", &[one]).unwrap().ptr_eq(&inst));
    /// assert_eq!(ker.instantiate_type("G", &[]), Err(Error::UnknownDecl("G".into())));
    /// ```
    pub fn instantiate_type(&mut self, name: &str, levels: &[Level]) -> Result<Term, Error> {
        let decl = self
            .env
            .lookup(name)
            .ok_or_else(|| Error::UnknownDecl(name.into()))?;
        self.caches.instantiate_type_lparams(decl, levels)
    }

    /// Get the value of a definition at the given universe levels
    pub fn instantiate_value(&mut self, name: &str, levels: &[Level]) -> Result<Term, Error> {
        let decl = self
            .env
            .lookup(name)
            .ok_or_else(|| Error::UnknownDecl(name.into()))?;
        self.caches.instantiate_value_lparams(decl, levels)
    }

    /// Empty this kernel's instantiation caches
    pub fn clear_caches(&mut self) {
        self.caches.clear()
    }
}

/// A kernel error
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum Error {
    /// Arithmetic overflow
    #[error("overflow: {0}")]
    Overflow(&'static str),
    /// Duplicate declaration
    #[error("duplicate declaration: {0}")]
    DuplicateDeclaration(Name),
    /// Empty maximum
    #[error("max of no levels")]
    EmptyMax,
    /// Unexpected universe parameter
    #[error("unexpected universe parameter: {0}")]
    UnexpectedParam(Name),
    /// Unknown universe variable
    #[error("unknown universe variable: #{0}")]
    UnknownVar(u32),
    /// Unknown declaration
    #[error("unknown declaration: {0}")]
    UnknownDecl(Name),
    /// Universe argument count mismatch
    #[error("expected {expected} universe levels, found {found}")]
    LevelArity { expected: usize, found: usize },
    /// Declaration has no value
    #[error("declaration has no value: {0}")]
    NoValue(Name),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_round_trip() {
        let mut ker = Kernel::with_cache_capacity(4);
        let u = ker.declare_univ("u").unwrap();
        let v = ker.define_univ("v", &Level::max([u.clone(), Level::ZERO]).unwrap()).unwrap();
        assert_eq!(ker.is_ge(&v, &u, 0), Ok(true));
        assert_eq!(ker.univ().num_vars(), 3);

        let p = Level::param("p");
        let arrow = Term::pi("x", Term::bvar(0), Term::bvar(1));
        let id_ty = Term::pi("A", Term::sort(p.clone()), arrow);
        let id_val = Term::lam("A", Term::sort(p), Term::lam("x", Term::bvar(0), Term::bvar(0)));
        ker.add_decl(Declaration::new("id", ["p".into()], id_ty, Some(id_val)))
            .unwrap();

        let ty = ker.instantiate_type("id", &[v.clone()]).unwrap();
        assert_eq!(
            ty,
            Term::pi("A", Term::sort(v.clone()), Term::pi("x", Term::bvar(0), Term::bvar(1)))
        );
        let val = ker.instantiate_value("id", &[v.clone()]).unwrap();
        assert!(!val.has_param_univ());
        assert_eq!(ker.caches().ty().stats(), (0, 1));
        assert_eq!(ker.caches().value().stats(), (0, 1));

        ker.instantiate_type("id", &[v.clone()]).unwrap();
        assert_eq!(ker.caches().ty().stats(), (1, 1));
        ker.clear_caches();
        ker.instantiate_type("id", &[v]).unwrap();
        assert_eq!(ker.caches().ty().stats(), (1, 2));
    }

    #[test]
    fn lookup_errors() {
        let mut ker = Kernel::new();
        assert_eq!(ker.lookup_decl("x").err(), Some(Error::UnknownDecl("x".into())));
        ker.add_decl(Declaration::new("x", [], Term::nat(0), None)).unwrap();
        assert_eq!(ker.lookup_decl("x").map(|c| c.num_lparams()), Ok(0));
        assert_eq!(
            ker.add_decl(Declaration::new("x", [], Term::nat(1), None)),
            Err(Error::DuplicateDeclaration("x".into()))
        );
        assert_eq!(ker.instantiate_value("x", &[]), Err(Error::NoValue("x".into())));
    }

    #[test]
    fn errors_display() {
        assert_eq!(
            Error::LevelArity {
                expected: 2,
                found: 1
            }
            .to_string(),
            "expected 2 universe levels, found 1"
        );
        assert_eq!(Error::UnknownVar(3).to_string(), "unknown universe variable: #3");
    }
}

use std::{fmt, rc::Rc};

use smol_str::SmolStr;

use crate::kernel::Error;

/// A name for a universe variable, universe parameter, declaration or binder
pub type Name = SmolStr;

/// A handle for a universe variable
///
/// Universe variables are numbered densely, in declaration order, by a
/// [`UnivCtx`](crate::kernel::univ::UnivCtx). Index 0 is the implicit zero variable.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct UVar(u32);

impl UVar {
    /// The implicit zero variable
    pub const ZERO: Self = Self(0);

    pub(crate) fn new(ix: u32) -> Self {
        Self(ix)
    }

    /// Get this variable's index
    pub fn index(&self) -> u32 {
        self.0
    }

    pub fn ix(&self) -> usize {
        self.0 as usize
    }
}

/// A universe level
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Level {
    /// A declared universe variable
    Var(UVar),
    /// A level plus a constant offset
    Lift(Rc<Level>, u32),
    /// The least upper bound of a non-empty list of levels
    Max(Rc<[Level]>),
    /// A universe parameter of a universe-polymorphic declaration
    Param(Name),
}

impl Level {
    /// The implicit zero level
    pub const ZERO: Self = Level::Var(UVar::ZERO);

    /// Reference a universe parameter
    pub fn param(name: impl Into<Name>) -> Self {
        Level::Param(name.into())
    }

    /// Add a constant offset to this level
    ///
    /// Nested lifts are collapsed, so the offset arithmetic is checked.
    ///
    /// # Examples
    /// ```rust
    /// # use stratum_kernel::*;
    /// let u = Level::param("u");
    /// let u3 = u.clone().lift(1).unwrap().lift(2).unwrap();
    /// assert_eq!(u3, u.clone().lift(3).unwrap());
    /// assert_eq!(u.clone().lift(0).unwrap(), u);
    /// assert!(u.lift(u32::MAX).unwrap().lift(1).is_err());
    /// ```
    pub fn lift(self, offset: u32) -> Result<Self, Error> {
        if offset == 0 {
            return Ok(self);
        }
        match self {
            Level::Lift(base, o) => {
                let o = o
                    .checked_add(offset)
                    .ok_or(Error::Overflow("Level::lift (offset)"))?;
                Ok(Level::Lift(base, o))
            }
            level => Ok(Level::Lift(Rc::new(level), offset)),
        }
    }

    /// The successor of this level
    pub fn succ(self) -> Result<Self, Error> {
        self.lift(1)
    }

    /// Take the least upper bound of a list of levels
    ///
    /// # Examples
    /// ```rust
    /// # use stratum_kernel::*;
    /// let m = Level::max([Level::param("u"), Level::param("v")]).unwrap();
    /// assert_eq!(m.to_string(), "max(u, v)");
    /// assert_eq!(Level::max(std::iter::empty()), Err(Error::EmptyMax));
    /// ```
    pub fn max(ops: impl IntoIterator<Item = Level>) -> Result<Self, Error> {
        let ops: Rc<[Level]> = ops.into_iter().collect();
        if ops.is_empty() {
            return Err(Error::EmptyMax);
        }
        Ok(Level::Max(ops))
    }

    /// Get whether this level mentions any universe parameter
    pub fn has_param(&self) -> bool {
        match self {
            Level::Var(_) => false,
            Level::Lift(base, _) => base.has_param(),
            Level::Max(ops) => ops.iter().any(Level::has_param),
            Level::Param(_) => true,
        }
    }

    /// Substitute `levels[i]` for every occurrence of the parameter `params[i]`
    ///
    /// Parameters without a counterpart are left alone. If nothing is substituted, the result
    /// shares all of its structure with `self`. Lifts of substituted levels are collapsed, so
    /// this fails if an offset overflows.
    ///
    /// # Examples
    /// ```rust
    /// # use stratum_kernel::*;
    /// let u = Level::param("u");
    /// let l = Level::max([u.clone().succ().unwrap(), Level::param("w")]).unwrap();
    /// let r = l.instantiate(&["u".into()], &[Level::ZERO]).unwrap();
    /// assert_eq!(r.to_string(), "max(#0+1, w)");
    /// ```
    pub fn instantiate(&self, params: &[Name], levels: &[Level]) -> Result<Level, Error> {
        Ok(self
            .instantiate_helper(params, levels)?
            .unwrap_or_else(|| self.clone()))
    }

    /// Returns `None` if nothing changed
    fn instantiate_helper(
        &self,
        params: &[Name],
        levels: &[Level],
    ) -> Result<Option<Level>, Error> {
        if !self.has_param() {
            return Ok(None);
        }
        match self {
            Level::Var(_) => Ok(None),
            Level::Param(name) => Ok(params
                .iter()
                .position(|p| p == name)
                .and_then(|ix| levels.get(ix))
                .cloned()),
            Level::Lift(base, offset) => match base.instantiate_helper(params, levels)? {
                Some(base) => Ok(Some(base.lift(*offset)?)),
                None => Ok(None),
            },
            Level::Max(ops) => {
                let mut changed = false;
                let mut new_ops = Vec::with_capacity(ops.len());
                for op in ops.iter() {
                    match op.instantiate_helper(params, levels)? {
                        Some(op) => {
                            changed = true;
                            new_ops.push(op);
                        }
                        None => new_ops.push(op.clone()),
                    }
                }
                Ok(changed.then(|| Level::Max(new_ops.into())))
            }
        }
    }
}

impl From<UVar> for Level {
    fn from(var: UVar) -> Self {
        Level::Var(var)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Var(v) => write!(f, "#{}", v.0),
            Level::Lift(base, offset) => write!(f, "{base}+{offset}"),
            Level::Max(ops) => {
                write!(f, "max(")?;
                for (i, op) in ops.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{op}")?;
                }
                write!(f, ")")
            }
            Level::Param(name) => write!(f, "{name}"),
        }
    }
}

use std::fmt;

use fxhash::FxBuildHasher;
use indexmap::IndexSet;
use log::{debug, trace};

use super::*;

/// The name of the implicit zero variable
pub const ZERO_NAME: &str = "zero";

/// The largest distance representable in a [`UnivCtx`]
pub const MAX_DISTANCE: u32 = i32::MAX as u32 - 1;

/// A universe context
///
/// Tracks the declared universe variables together with the transitive closure of the known
/// ordering constraints between them: for every pair of variables `(v1, v2)`, the largest `d`
/// such that `v1 ≥ v2 + d` has been established, if any.
#[derive(Debug, Clone)]
pub struct UnivCtx {
    /// Variable names, indexed by variable
    names: IndexSet<Name, FxBuildHasher>,
    /// `dist[v1][v2]` is the largest known `d` such that `v1 ≥ v2 + d`
    dist: Vec<Vec<Option<u32>>>,
}

impl Default for UnivCtx {
    fn default() -> Self {
        Self::new()
    }
}

impl UnivCtx {
    /// Construct a new universe context containing only the zero variable
    ///
    /// # Examples
    /// ```rust
    /// # use stratum_kernel::*;
    /// let ctx = UnivCtx::new();
    /// assert_eq!(ctx.num_vars(), 1);
    /// assert_eq!(ctx.lookup("zero"), Some(Level::ZERO));
    /// assert_eq!(ctx.distance(UVar::ZERO, UVar::ZERO), Some(0));
    /// ```
    pub fn new() -> Self {
        let mut names = IndexSet::with_hasher(FxBuildHasher::default());
        names.insert(Name::new_static(ZERO_NAME));
        Self {
            names,
            dist: vec![vec![Some(0)]],
        }
    }

    /// Get the number of declared variables, including zero
    pub fn num_vars(&self) -> usize {
        self.names.len()
    }

    /// Get a variable's name
    pub fn name(&self, var: UVar) -> Option<&Name> {
        self.names.get_index(var.ix())
    }

    /// Look up a variable by name
    pub fn lookup(&self, name: &str) -> Option<Level> {
        self.names
            .get_index_of(name)
            .map(|ix| Level::Var(UVar::new(ix as u32)))
    }

    /// Get the largest known `d` such that `v1 ≥ v2 + d`
    ///
    /// Returns `None` if no relation between `v1` and `v2` is known, or if either variable is
    /// not declared in this context.
    pub fn distance(&self, v1: UVar, v2: UVar) -> Option<u32> {
        *self.dist.get(v1.ix())?.get(v2.ix())?
    }

    /// Iterate over all known constraints `v1 ≥ v2 + d` with `v1 ≠ v2`
    pub fn constraints(&self) -> impl Iterator<Item = (UVar, UVar, u32)> + '_ {
        self.dist.iter().enumerate().flat_map(|(i1, row)| {
            row.iter().enumerate().filter_map(move |(i2, d)| {
                let d = (*d)?;
                (i1 != i2).then(|| (UVar::new(i1 as u32), UVar::new(i2 as u32), d))
            })
        })
    }

    /// Declare a new universe variable
    ///
    /// # Examples
    /// ```rust
    /// # use stratum_kernel::*;
    /// let mut ctx = UnivCtx::new();
    /// let u = ctx.declare_variable("u").unwrap();
    /// assert_eq!(ctx.lookup("u"), Some(u.clone()));
    /// assert!(ctx.is_ge(&u, &u, 0).unwrap());
    /// assert!(!ctx.is_ge(&u, &Level::ZERO, 0).unwrap());
    /// assert_eq!(
    ///     ctx.declare_variable("u"),
    ///     Err(Error::DuplicateDeclaration("u".into()))
    /// );
    /// ```
    pub fn declare_variable(&mut self, name: impl Into<Name>) -> Result<Level, Error> {
        let var = self.declare(name.into())?;
        Ok(Level::Var(var))
    }

    /// Declare a new universe variable `v` satisfying `v ≥ level`
    ///
    /// # Examples
    /// ```rust
    /// # use stratum_kernel::*;
    /// let mut ctx = UnivCtx::new();
    /// let u1 = ctx.declare_variable("u1").unwrap();
    /// let u2 = ctx.define_variable("u2", &u1.clone().lift(3).unwrap()).unwrap();
    /// assert!(ctx.is_ge(&u2, &u1, 3).unwrap());
    /// assert!(!ctx.is_ge(&u2, &u1, 4).unwrap());
    /// assert!(!ctx.is_ge(&u2, &Level::ZERO, 0).unwrap());
    /// ```
    pub fn define_variable(
        &mut self,
        name: impl Into<Name>,
        level: &Level,
    ) -> Result<Level, Error> {
        let name = name.into();
        if self.names.contains(&name) {
            return Err(Error::DuplicateDeclaration(name));
        }
        let mut edges = Vec::new();
        self.collect_edges(level, 0, &mut edges)?;
        let var = self.declare(name)?;
        for (target, d) in edges {
            if let Err(err) = self.add_constraint(var, target, d) {
                self.pop_variable();
                return Err(err);
            }
        }
        Ok(Level::Var(var))
    }

    /// Check whether `l1 ≥ l2 + k` follows from the known constraints
    ///
    /// A negative `k` asks only whether _any_ relation between the two sides is known.
    ///
    /// # Examples
    /// ```rust
    /// # use stratum_kernel::*;
    /// let mut ctx = UnivCtx::new();
    /// let u = ctx.declare_variable("u").unwrap();
    /// let v = ctx.declare_variable("v").unwrap();
    /// let uv1 = Level::max([u.clone(), v.clone().succ().unwrap()]).unwrap();
    /// let w = ctx.define_variable("w", &uv1).unwrap();
    /// assert!(ctx.is_ge(&w, &u, 0).unwrap());
    /// assert!(ctx.is_ge(&w, &v, 1).unwrap());
    /// assert!(!ctx.is_ge(&w, &u, 1).unwrap());
    /// let uv = Level::max([u.clone(), v.clone()]).unwrap();
    /// assert!(ctx.is_ge(&w, &uv, 0).unwrap());
    /// assert!(ctx.is_ge(&w.clone().succ().unwrap(), &uv, 1).unwrap());
    /// ```
    pub fn is_ge(&self, l1: &Level, l2: &Level, k: i32) -> Result<bool, Error> {
        match l2 {
            Level::Var(v2) => match l1 {
                Level::Var(v1) => {
                    let d = self.checked_distance(*v1, *v2)?;
                    Ok(d.is_some_and(|d| k < 0 || d >= k as u32))
                }
                Level::Lift(base, offset) => self.is_ge(base, l2, sub_offset(k, *offset)?),
                Level::Max(ops) => self.any_ge(ops, l2, k),
                Level::Param(_) => Ok(false),
            },
            Level::Lift(base, offset) => self.is_ge(l1, base, add_offset(k, *offset)?),
            Level::Max(ops) => {
                if ops.is_empty() {
                    return Err(Error::EmptyMax);
                }
                for op in ops.iter() {
                    if !self.is_ge(l1, op, k)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Level::Param(p) => match l1 {
                Level::Param(q) => Ok(p == q && k <= 0),
                Level::Lift(base, offset) => self.is_ge(base, l2, sub_offset(k, *offset)?),
                Level::Max(ops) => self.any_ge(ops, l2, k),
                Level::Var(_) => Ok(false),
            },
        }
    }

    /// Check whether `l1 ≥ l2` follows from the known constraints
    pub fn is_ge0(&self, l1: &Level, l2: &Level) -> Result<bool, Error> {
        self.is_ge(l1, l2, 0)
    }

    fn any_ge(&self, ops: &[Level], l2: &Level, k: i32) -> Result<bool, Error> {
        if ops.is_empty() {
            return Err(Error::EmptyMax);
        }
        for op in ops {
            if self.is_ge(op, l2, k)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn checked_distance(&self, v1: UVar, v2: UVar) -> Result<Option<u32>, Error> {
        for v in [v1, v2] {
            if v.ix() >= self.num_vars() {
                return Err(Error::UnknownVar(v.index()));
            }
        }
        Ok(self.dist[v1.ix()][v2.ix()])
    }

    fn declare(&mut self, name: Name) -> Result<UVar, Error> {
        if self.names.contains(&name) {
            return Err(Error::DuplicateDeclaration(name));
        }
        let ix = self.names.len();
        let Ok(ix32) = u32::try_from(ix) else {
            return Err(Error::Overflow("UnivCtx::declare (too many variables)"));
        };
        debug!("declaring universe variable {name} (#{ix})");
        self.names.insert(name);
        for row in &mut self.dist {
            row.push(None);
        }
        let mut row = vec![None; ix + 1];
        row[ix] = Some(0);
        self.dist.push(row);
        Ok(UVar::new(ix32))
    }

    /// Forget the most recently declared variable, along with its constraints
    fn pop_variable(&mut self) {
        if let Some(name) = self.names.pop() {
            debug!("retracting universe variable {name}");
        }
        self.dist.pop();
        for row in &mut self.dist {
            row.pop();
        }
    }

    /// Decompose `var ≥ level + k` into constraints between variables
    fn collect_edges(
        &self,
        level: &Level,
        k: u32,
        edges: &mut Vec<(UVar, u32)>,
    ) -> Result<(), Error> {
        match level {
            Level::Var(v) => {
                if v.ix() >= self.num_vars() {
                    return Err(Error::UnknownVar(v.index()));
                }
                edges.push((*v, k));
            }
            Level::Lift(base, offset) => {
                self.collect_edges(base, add_distance(k, *offset)?, edges)?;
            }
            Level::Max(ops) => {
                if ops.is_empty() {
                    return Err(Error::EmptyMax);
                }
                for op in ops.iter() {
                    self.collect_edges(op, k, edges)?;
                }
            }
            Level::Param(name) => return Err(Error::UnexpectedParam(name.clone())),
        }
        Ok(())
    }

    /// Record `v1 ≥ v2 + d`
    ///
    /// The table must be transitively closed beforehand, and no variable may yet depend on `v1`;
    /// then following `v2`'s outgoing edges one hop restores the closure.
    fn add_constraint(&mut self, v1: UVar, v2: UVar, d: u32) -> Result<(), Error> {
        debug_assert_ne!(v1, v2);
        if d > MAX_DISTANCE {
            return Err(Error::Overflow("UnivCtx::add_constraint (distance)"));
        }
        let (i1, i2) = (v1.ix(), v2.ix());
        if self.dist[i1][i2].is_some_and(|old| old >= d) {
            return Ok(());
        }
        trace!("adding universe constraint #{i1} >= #{i2} + {d}");
        self.dist[i1][i2] = Some(d);
        for i3 in 0..self.dist.len() {
            if i3 == i1 {
                debug_assert!(self.dist[i2][i3].is_none_or(|d2| d2 == 0 && d == 0));
                continue;
            }
            let Some(d2) = self.dist[i2][i3] else {
                continue;
            };
            let d13 = add_distance(d, d2)?;
            if self.dist[i1][i3].is_none_or(|old| d13 > old) {
                trace!("propagating universe constraint #{i1} >= #{i3} + {d13}");
                self.dist[i1][i3] = Some(d13);
            }
        }
        Ok(())
    }
}

/// Display all known constraints, one per line
impl fmt::Display for UnivCtx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (v1, v2, d) in self.constraints() {
            write!(f, "{} >= {}", self.names[v1.ix()], self.names[v2.ix()])?;
            if d > 0 {
                write!(f, " + {d}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

fn add_distance(d1: u32, d2: u32) -> Result<u32, Error> {
    d1.checked_add(d2)
        .filter(|d| *d <= MAX_DISTANCE)
        .ok_or(Error::Overflow("universe distance"))
}

fn add_offset(k: i32, offset: u32) -> Result<i32, Error> {
    k.checked_add_unsigned(offset)
        .ok_or(Error::Overflow("universe offset"))
}

fn sub_offset(k: i32, offset: u32) -> Result<i32, Error> {
    k.checked_sub_unsigned(offset)
        .ok_or(Error::Overflow("universe offset"))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn var(level: &Level) -> UVar {
        match level {
            Level::Var(v) => *v,
            _ => panic!("expected a variable"),
        }
    }

    #[test]
    fn self_distance_is_zero() {
        let mut ctx = UnivCtx::new();
        let vars: Vec<_> = (0..5)
            .map(|i| ctx.declare_variable(format!("u{i}")).unwrap())
            .collect();
        assert_eq!(ctx.distance(UVar::ZERO, UVar::ZERO), Some(0));
        for v in &vars {
            assert_eq!(ctx.distance(var(v), var(v)), Some(0));
        }
        assert_eq!(ctx.constraints().count(), 0);
    }

    #[test]
    fn add_constraint_is_monotone() {
        let mut ctx = UnivCtx::new();
        let u = var(&ctx.declare_variable("u").unwrap());
        let v = var(&ctx.declare_variable("v").unwrap());
        ctx.add_constraint(v, u, 2).unwrap();
        assert!(ctx.is_ge(&v.into(), &u.into(), 2).unwrap());
        // Looser facts never weaken the table
        ctx.add_constraint(v, u, 1).unwrap();
        assert_eq!(ctx.distance(v, u), Some(2));
        ctx.add_constraint(v, u, 5).unwrap();
        assert_eq!(ctx.distance(v, u), Some(5));
        assert!(ctx.is_ge(&v.into(), &u.into(), 5).unwrap());
        assert!(!ctx.is_ge(&v.into(), &u.into(), 6).unwrap());
    }

    #[test]
    fn negative_offset_asks_for_any_relation() {
        let mut ctx = UnivCtx::new();
        let u = ctx.declare_variable("u").unwrap();
        let v = ctx.declare_variable("v").unwrap();
        let w = ctx.define_variable("w", &u).unwrap();
        assert!(ctx.is_ge(&w, &u, -3).unwrap());
        assert!(!ctx.is_ge(&w, &v, -3).unwrap());
        // w + 2 ≥ u + 1
        assert!(ctx.is_ge(&w.clone().lift(2).unwrap(), &u.clone().succ().unwrap(), 0).unwrap());
    }

    #[test]
    fn definitions_chain_transitively() {
        let mut ctx = UnivCtx::new();
        let a = ctx.declare_variable("a").unwrap();
        let b = ctx.define_variable("b", &a.clone().lift(2).unwrap()).unwrap();
        let c = ctx.define_variable("c", &b.clone().lift(3).unwrap()).unwrap();
        assert_eq!(ctx.distance(var(&c), var(&a)), Some(5));
        assert!(ctx.is_ge(&c, &a, 5).unwrap());
        assert!(!ctx.is_ge(&a, &c, 0).unwrap());
    }

    #[test]
    fn max_definition_keeps_the_tightest_bound() {
        let mut ctx = UnivCtx::new();
        let a = ctx.declare_variable("a").unwrap();
        let b = ctx.define_variable("b", &a.clone().lift(4).unwrap()).unwrap();
        let level = Level::max([a.clone().lift(1).unwrap(), b.clone()]).unwrap();
        let c = ctx.define_variable("c", &level).unwrap();
        assert_eq!(ctx.distance(var(&c), var(&a)), Some(4));
        assert_eq!(ctx.distance(var(&c), var(&b)), Some(0));
    }

    #[test]
    fn definition_errors_leave_the_context_unchanged() {
        let mut ctx = UnivCtx::new();
        assert_eq!(
            ctx.define_variable("p", &Level::param("u")),
            Err(Error::UnexpectedParam("u".into()))
        );
        assert_eq!(
            ctx.define_variable("p", &Level::Var(UVar::new(7))),
            Err(Error::UnknownVar(7))
        );
        assert_eq!(
            ctx.define_variable("zero", &Level::ZERO),
            Err(Error::DuplicateDeclaration("zero".into()))
        );
        assert_eq!(
            ctx.define_variable("p", &Level::Max(Vec::new().into())),
            Err(Error::EmptyMax)
        );
        assert_eq!(ctx.num_vars(), 1);
        assert!(ctx.lookup("p").is_none());
    }

    #[test]
    fn empty_max_is_rejected() {
        let mut ctx = UnivCtx::new();
        let u = ctx.declare_variable("u").unwrap();
        let empty = Level::Max(Vec::new().into());
        assert_eq!(ctx.is_ge(&Level::ZERO, &empty, 5), Err(Error::EmptyMax));
        assert_eq!(ctx.is_ge(&empty, &u, 0), Err(Error::EmptyMax));
        assert_eq!(ctx.is_ge(&empty, &Level::param("p"), 0), Err(Error::EmptyMax));
        let nested = Level::max([u.clone(), empty]).unwrap();
        assert_eq!(ctx.is_ge(&u, &nested, 0), Err(Error::EmptyMax));
    }

    #[test]
    fn distances_past_the_limit_overflow() {
        let mut ctx = UnivCtx::new();
        let a = ctx.declare_variable("a").unwrap();
        let b = ctx
            .define_variable("b", &a.clone().lift(MAX_DISTANCE).unwrap())
            .unwrap();
        assert!(matches!(
            ctx.define_variable("c", &b.clone().succ().unwrap()),
            Err(Error::Overflow(_))
        ));
        assert_eq!(ctx.num_vars(), 3);
        assert!(ctx.lookup("c").is_none());
        assert_eq!(ctx.distance(var(&b), var(&a)), Some(MAX_DISTANCE));
        assert!(matches!(
            ctx.define_variable("d", &a.clone().lift(MAX_DISTANCE + 1).unwrap()),
            Err(Error::Overflow(_))
        ));
        let huge = a.clone().lift(u32::MAX).unwrap();
        assert!(matches!(ctx.is_ge(&b, &huge, 0), Err(Error::Overflow(_))));
    }

    #[test]
    fn params_are_rigid() {
        let ctx = UnivCtx::new();
        let p = Level::param("p");
        let q = Level::param("q");
        assert!(ctx.is_ge(&p, &p, 0).unwrap());
        assert!(ctx.is_ge(&p.clone().succ().unwrap(), &p, 1).unwrap());
        assert!(!ctx.is_ge(&p, &p, 1).unwrap());
        assert!(!ctx.is_ge(&p, &q, 0).unwrap());
        assert!(!ctx.is_ge(&p, &Level::ZERO, 0).unwrap());
        assert!(!ctx.is_ge(&Level::ZERO, &p, 0).unwrap());
    }

    #[test]
    fn unknown_variables_are_rejected() {
        let ctx = UnivCtx::new();
        let ghost = Level::Var(UVar::new(3));
        assert_eq!(ctx.is_ge(&ghost, &Level::ZERO, 0), Err(Error::UnknownVar(3)));
    }

    #[test]
    fn display_lists_constraints() {
        let mut ctx = UnivCtx::new();
        let u = ctx.declare_variable("u").unwrap();
        let v = ctx.define_variable("v", &u.clone().lift(2).unwrap()).unwrap();
        ctx.define_variable("w", &v).unwrap();
        assert_eq!(ctx.to_string(), "v >= u + 2\nw >= u + 2\nw >= v\n");
    }

    /// A random sequence of definitions: variable `i + 1` is defined above some earlier
    /// variables, each with an offset
    fn definitions() -> impl Strategy<Value = Vec<Vec<(usize, u32)>>> {
        (1usize..8).prop_flat_map(|n| {
            (0..n)
                .map(|i| prop::collection::vec((0..=i, 0u32..4), 0..3))
                .collect::<Vec<_>>()
        })
    }

    fn build(defs: &[Vec<(usize, u32)>]) -> (UnivCtx, Vec<Level>) {
        let mut ctx = UnivCtx::new();
        let mut vars = vec![Level::ZERO];
        for (i, edges) in defs.iter().enumerate() {
            let name = format!("v{}", i + 1);
            let v = if edges.is_empty() {
                ctx.declare_variable(name).unwrap()
            } else {
                let ops = edges
                    .iter()
                    .map(|(j, d)| vars[*j].clone().lift(*d).unwrap());
                ctx.define_variable(name, &Level::max(ops).unwrap()).unwrap()
            };
            vars.push(v);
        }
        (ctx, vars)
    }

    /// Longest paths computed from scratch
    fn longest_paths(defs: &[Vec<(usize, u32)>]) -> Vec<Vec<Option<u32>>> {
        let n = defs.len() + 1;
        let mut dist = vec![vec![None; n]; n];
        for i in 0..n {
            dist[i][i] = Some(0);
            if i == 0 {
                continue;
            }
            for &(j, d) in &defs[i - 1] {
                for k in 0..n {
                    if let Some(dk) = dist[j][k] {
                        let cand = d + dk;
                        if k != i && dist[i][k].is_none_or(|old: u32| cand > old) {
                            dist[i][k] = Some(cand);
                        }
                    }
                }
            }
        }
        dist
    }

    proptest! {
        #[test]
        fn closure_matches_longest_paths(defs in definitions()) {
            let (ctx, vars) = build(&defs);
            let expected = longest_paths(&defs);
            for (i, a) in vars.iter().enumerate() {
                for (j, b) in vars.iter().enumerate() {
                    prop_assert_eq!(ctx.distance(var(a), var(b)), expected[i][j]);
                }
            }
        }

        #[test]
        fn is_ge_is_transitive(defs in definitions()) {
            let (ctx, vars) = build(&defs);
            for a in &vars {
                for b in &vars {
                    let Some(d1) = ctx.distance(var(a), var(b)) else { continue };
                    prop_assert!(ctx.is_ge(a, b, d1 as i32).unwrap());
                    for c in &vars {
                        let Some(d2) = ctx.distance(var(b), var(c)) else { continue };
                        prop_assert!(ctx.is_ge(b, c, d2 as i32).unwrap());
                        prop_assert!(ctx.is_ge(a, c, (d1 + d2) as i32).unwrap());
                    }
                }
            }
        }

        #[test]
        fn is_ge_is_reflexive(
            defs in definitions(),
            picks in prop::collection::vec((0usize..8, 0u32..3), 1..4)
        ) {
            let (_, vars) = build(&defs);
            // Structural reflexivity holds without consulting any constraint
            let empty = UnivCtx { names: IndexSet::default(), dist: Vec::new() };
            let mut ctx = UnivCtx::new();
            for i in 1..vars.len() {
                ctx.declare_variable(format!("v{i}")).unwrap();
            }
            let ops: Vec<Level> = picks
                .iter()
                .map(|(i, d)| vars[i % vars.len()].clone().lift(*d).unwrap())
                .collect();
            let l = Level::max(ops).unwrap();
            prop_assert!(ctx.is_ge(&l, &l, 0).unwrap());
            let lifted = l.clone().lift(2).unwrap();
            prop_assert!(ctx.is_ge(&lifted, &lifted, 0).unwrap());
            prop_assert!(ctx.is_ge(&lifted, &l, 2).unwrap());
            let p = Level::max([Level::param("p"), Level::param("q").succ().unwrap()]).unwrap();
            prop_assert!(empty.is_ge(&p, &p, 0).unwrap());
        }
    }
}

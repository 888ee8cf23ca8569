use std::cell::RefCell;

use log::{trace, warn};

use super::*;

/// The default number of slots in an [`InstCache`]
pub const DEFAULT_CACHE_CAPACITY: usize = 1023;

#[derive(Debug, Clone)]
struct Entry {
    id: DeclId,
    levels: Vec<Level>,
    result: Term,
}

/// A direct-mapped cache of universe instantiations of declarations
///
/// Each declaration name hashes to exactly one slot; saving overwrites whatever the slot held.
/// An entry only answers a lookup for the same declaration identity at structurally equal
/// levels, so a redefined declaration never sees the instantiations of its predecessor.
#[derive(Debug, Clone)]
pub struct InstCache {
    capacity: usize,
    slots: Vec<Option<Entry>>,
    hits: u64,
    misses: u64,
}

impl Default for InstCache {
    fn default() -> Self {
        InstCache::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl InstCache {
    /// Construct an empty cache with the given number of slots
    ///
    /// A capacity of 0 is treated as 1. No slot storage is allocated until the first save.
    pub fn new(capacity: usize) -> InstCache {
        InstCache {
            capacity: capacity.max(1),
            slots: Vec::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Get this cache's number of slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn slot(&self, name: &Name) -> usize {
        (fxhash::hash64(name) % self.capacity as u64) as usize
    }

    /// Look up the instantiation of `decl` at `levels`
    pub fn lookup(&mut self, decl: Constant<'_>, levels: &[Level]) -> Option<Term> {
        let slot = self.slot(decl.name());
        let hit = self
            .slots
            .get(slot)
            .and_then(Option::as_ref)
            .filter(|entry| entry.id == decl.id() && entry.levels == levels)
            .map(|entry| entry.result.clone());
        if hit.is_some() {
            trace!("cache hit for {} in slot {slot}", decl.name());
            self.hits += 1;
        } else {
            trace!("cache miss for {} in slot {slot}", decl.name());
            self.misses += 1;
        }
        hit
    }

    /// Record the instantiation of `decl` at `levels`, overwriting the slot
    pub fn save(&mut self, decl: Constant<'_>, levels: &[Level], result: Term) {
        if self.slots.is_empty() {
            self.slots.resize(self.capacity, None);
        }
        let slot = self.slot(decl.name());
        if let Some(old) = &self.slots[slot] {
            if old.id != decl.id() {
                warn!(
                    "cache slot {slot}: {:?} evicted by {} ({:?})",
                    old.id,
                    decl.name(),
                    decl.id()
                );
            }
        }
        trace!("cache save for {} in slot {slot}", decl.name());
        self.slots[slot] = Some(Entry {
            id: decl.id(),
            levels: levels.to_vec(),
            result,
        });
    }

    /// Empty every slot
    pub fn clear(&mut self) {
        trace!("clearing instantiation cache");
        self.slots.clear();
    }

    /// Get the number of lookups which hit and missed, in that order
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

/// A pair of caches, for instantiating the types and the values of declarations
#[derive(Debug, Clone, Default)]
pub struct InstCaches {
    ty: InstCache,
    value: InstCache,
}

impl InstCaches {
    pub fn new(capacity: usize) -> InstCaches {
        InstCaches {
            ty: InstCache::new(capacity),
            value: InstCache::new(capacity),
        }
    }

    pub fn ty(&self) -> &InstCache {
        &self.ty
    }

    pub fn value(&self) -> &InstCache {
        &self.value
    }

    /// Get the type of `decl` at the universe levels `levels`
    ///
    /// # Examples
    /// ```rust
    /// # use stratum_kernel::*;
    /// let mut env = Environment::new();
    /// let u = Level::param("u");
    /// let ty = Term::sort(u.succ().unwrap());
    /// env.add(Declaration::new("List", ["u".into()], ty, None)).unwrap();
    /// let list = env.lookup("List").unwrap();
    /// let mut caches = InstCaches::default();
    /// let ty = caches.instantiate_type_lparams(list, &[Level::ZERO]).unwrap();
    /// assert_eq!(ty, Term::sort(Level::ZERO.succ().unwrap()));
    /// assert_eq!(
    ///     caches.instantiate_type_lparams(list, &[]),
    ///     Err(Error::LevelArity { expected: 1, found: 0 })
    /// );
    /// ```
    pub fn instantiate_type_lparams(
        &mut self,
        decl: Constant<'_>,
        levels: &[Level],
    ) -> Result<Term, Error> {
        check_arity(decl, levels)?;
        instantiate_cached(&mut self.ty, decl, decl.ty(), levels)
    }

    /// Get the value of `decl` at the universe levels `levels`
    pub fn instantiate_value_lparams(
        &mut self,
        decl: Constant<'_>,
        levels: &[Level],
    ) -> Result<Term, Error> {
        check_arity(decl, levels)?;
        let value = decl
            .value()
            .ok_or_else(|| Error::NoValue(decl.name().clone()))?;
        instantiate_cached(&mut self.value, decl, value, levels)
    }

    /// Empty both caches
    pub fn clear(&mut self) {
        self.ty.clear();
        self.value.clear();
    }
}

fn check_arity(decl: Constant<'_>, levels: &[Level]) -> Result<(), Error> {
    if decl.num_lparams() != levels.len() {
        return Err(Error::LevelArity {
            expected: decl.num_lparams(),
            found: levels.len(),
        });
    }
    Ok(())
}

fn instantiate_cached(
    cache: &mut InstCache,
    decl: Constant<'_>,
    term: &Term,
    levels: &[Level],
) -> Result<Term, Error> {
    if levels.is_empty() || !term.has_param_univ() {
        return Ok(term.clone());
    }
    if let Some(result) = cache.lookup(decl, levels) {
        return Ok(result);
    }
    let result = term.instantiate_lparams(decl.lparams(), levels)?;
    cache.save(decl, levels, result.clone());
    Ok(result)
}

thread_local! {
    static THREAD_CACHES: RefCell<InstCaches> = RefCell::new(InstCaches::default());
}

/// Run `f` with this thread's shared pair of caches
///
/// # Panics
/// If called from within `f`
pub fn with_thread_caches<R>(f: impl FnOnce(&mut InstCaches) -> R) -> R {
    THREAD_CACHES.with(|caches| f(&mut caches.borrow_mut()))
}

/// Empty this thread's shared pair of caches
pub fn clear_thread_caches() {
    with_thread_caches(InstCaches::clear)
}

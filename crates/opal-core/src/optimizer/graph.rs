use crate::ast::{FieldId, MethodId};
use crate::errors::InternalError;
use crate::ice;
use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxBuildHasher;
use std::fmt::Debug;
use std::hash::Hash;

pub type FxIndexMap<K, V> = IndexMap<K, V, FxBuildHasher>;
pub type FxIndexSet<T> = IndexSet<T, FxBuildHasher>;

/// A set of `(left, right)` pairs indexed in both directions.
///
/// Every mutation updates the forward and backward index together, so
/// `r ∈ rights_of(l)` holds exactly when `l ∈ lefts_of(r)`. Iteration
/// follows insertion order; removal uses `shift_remove` to keep it.
#[derive(Debug, Clone)]
pub struct BiRelation<L, R> {
    forward: FxIndexMap<L, FxIndexSet<R>>,
    backward: FxIndexMap<R, FxIndexSet<L>>,
    len: usize,
}

impl<L, R> Default for BiRelation<L, R> {
    fn default() -> Self {
        BiRelation {
            forward: FxIndexMap::default(),
            backward: FxIndexMap::default(),
            len: 0,
        }
    }
}

impl<L, R> BiRelation<L, R>
where
    L: Copy + Eq + Hash + Debug,
    R: Copy + Eq + Hash + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct pairs
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `false` if the pair was already present
    pub fn insert(&mut self, left: L, right: R) -> bool {
        if !self.forward.entry(left).or_default().insert(right) {
            return false;
        }
        self.backward.entry(right).or_default().insert(left);
        self.len += 1;
        true
    }

    /// Returns `false` if the pair was absent
    pub fn remove(&mut self, left: L, right: R) -> bool {
        if !remove_from(&mut self.forward, &left, &right) {
            return false;
        }
        remove_from(&mut self.backward, &right, &left);
        self.len -= 1;
        true
    }

    pub fn contains(&self, left: L, right: R) -> bool {
        self.forward
            .get(&left)
            .is_some_and(|rights| rights.contains(&right))
    }

    pub fn rights_of(&self, left: L) -> impl Iterator<Item = R> + '_ {
        self.forward.get(&left).into_iter().flatten().copied()
    }

    pub fn lefts_of(&self, right: R) -> impl Iterator<Item = L> + '_ {
        self.backward.get(&right).into_iter().flatten().copied()
    }

    /// Remove every pair with this left side, returning the right sides
    pub fn remove_left(&mut self, left: L) -> Vec<R> {
        let Some(rights) = self.forward.shift_remove(&left) else {
            return Vec::new();
        };
        for right in &rights {
            remove_from(&mut self.backward, right, &left);
        }
        self.len -= rights.len();
        rights.into_iter().collect()
    }

    /// Remove every pair with this right side, returning the left sides
    pub fn remove_right(&mut self, right: R) -> Vec<L> {
        let Some(lefts) = self.backward.shift_remove(&right) else {
            return Vec::new();
        };
        for left in &lefts {
            remove_from(&mut self.forward, left, &right);
        }
        self.len -= lefts.len();
        lefts.into_iter().collect()
    }

    /// All pairs, grouped by left side in insertion order
    pub fn pairs(&self) -> impl Iterator<Item = (L, R)> + '_ {
        self.forward
            .iter()
            .flat_map(|(left, rights)| rights.iter().map(move |right| (*left, *right)))
    }

    /// Verify that both indices describe the same pairs
    pub fn check_consistency(&self) -> Result<(), InternalError> {
        let mut count = 0;
        for (left, rights) in &self.forward {
            if rights.is_empty() {
                return Err(ice!("empty forward entry for {:?}", left));
            }
            for right in rights {
                if !self.backward.get(right).is_some_and(|l| l.contains(left)) {
                    return Err(ice!("pair ({:?}, {:?}) missing from backward index", left, right));
                }
                count += 1;
            }
        }
        let backward_count: usize = self.backward.values().map(IndexSet::len).sum();
        if count != backward_count || count != self.len {
            return Err(ice!(
                "index sizes disagree: forward {}, backward {}, recorded {}",
                count,
                backward_count,
                self.len
            ));
        }
        Ok(())
    }
}

/// Drop `value` from the set under `key`, and the key once its set is empty
fn remove_from<K, V>(map: &mut FxIndexMap<K, FxIndexSet<V>>, key: &K, value: &V) -> bool
where
    K: Eq + Hash,
    V: Eq + Hash,
{
    let Some(set) = map.get_mut(key) else {
        return false;
    };
    let removed = set.shift_remove(value);
    if set.is_empty() {
        map.shift_remove(key);
    }
    removed
}

/// Caller → callee relation over methods. Pairs are deduplicated; the
/// number of call sites is not recorded.
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    edges: BiRelation<MethodId, MethodId>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_call(&mut self, caller: MethodId, callee: MethodId) -> bool {
        self.edges.insert(caller, callee)
    }

    pub fn remove_call(&mut self, caller: MethodId, callee: MethodId) -> bool {
        self.edges.remove(caller, callee)
    }

    pub fn has_call(&self, caller: MethodId, callee: MethodId) -> bool {
        self.edges.contains(caller, callee)
    }

    pub fn callees_of(&self, caller: MethodId) -> impl Iterator<Item = MethodId> + '_ {
        self.edges.rights_of(caller)
    }

    pub fn callers_of(&self, callee: MethodId) -> impl Iterator<Item = MethodId> + '_ {
        self.edges.lefts_of(callee)
    }

    /// Drop every edge touching `method` on either side
    pub fn remove_method(&mut self, method: MethodId) {
        self.edges.remove_left(method);
        self.edges.remove_right(method);
    }

    pub fn calls(&self) -> impl Iterator<Item = (MethodId, MethodId)> + '_ {
        self.edges.pairs()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn check_consistency(&self) -> Result<(), InternalError> {
        self.edges
            .check_consistency()
            .map_err(|e| e.with_context("in the call graph"))
    }
}

/// Method → field relation for every read or write of a field
#[derive(Debug, Clone, Default)]
pub struct FieldReferenceGraph {
    edges: BiRelation<MethodId, FieldId>,
}

impl FieldReferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_reference(&mut self, method: MethodId, field: FieldId) -> bool {
        self.edges.insert(method, field)
    }

    pub fn remove_reference(&mut self, method: MethodId, field: FieldId) -> bool {
        self.edges.remove(method, field)
    }

    pub fn references(&self, method: MethodId, field: FieldId) -> bool {
        self.edges.contains(method, field)
    }

    pub fn fields_of(&self, method: MethodId) -> impl Iterator<Item = FieldId> + '_ {
        self.edges.rights_of(method)
    }

    pub fn methods_referencing(&self, field: FieldId) -> impl Iterator<Item = MethodId> + '_ {
        self.edges.lefts_of(field)
    }

    pub fn remove_method(&mut self, method: MethodId) -> Vec<FieldId> {
        self.edges.remove_left(method)
    }

    pub fn remove_field(&mut self, field: FieldId) -> Vec<MethodId> {
        self.edges.remove_right(field)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn check_consistency(&self) -> Result<(), InternalError> {
        self.edges
            .check_consistency()
            .map_err(|e| e.with_context("in the field reference graph"))
    }
}

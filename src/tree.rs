//! Nested collections of values with a fixed topology
//!
//! A [`Tree`] is a leaf, an ordered sequence of trees, or a mapping from
//! names to trees. Running expectations keep their functions and their
//! running means in two trees of identical topology and walk them together
//! with [`Tree::try_zip_with`].

use std::collections::BTreeMap;

use crate::traits::StatsError;

/// A value, or a nested sequence/mapping of values
#[derive(Clone, Debug, PartialEq)]
pub enum Tree<T> {
    /// A single value
    Leaf(T),
    /// Ordered children
    Seq(Vec<Tree<T>>),
    /// Children keyed by name, iterated in key order
    Named(BTreeMap<String, Tree<T>>),
}

impl<T> Tree<T> {
    /// Single-value tree
    pub fn leaf(value: T) -> Self {
        Tree::Leaf(value)
    }

    /// Sequence of subtrees
    pub fn seq<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Tree<T>>,
    {
        Tree::Seq(items.into_iter().collect())
    }

    /// Mapping of names to subtrees
    pub fn named<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Tree<T>)>,
    {
        Tree::Named(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// The value if this is a leaf
    pub fn as_leaf(&self) -> Option<&T> {
        match self {
            Tree::Leaf(value) => Some(value),
            _ => None,
        }
    }

    /// Child at `index` of a sequence
    pub fn get_index(&self, index: usize) -> Option<&Tree<T>> {
        match self {
            Tree::Seq(items) => items.get(index),
            _ => None,
        }
    }

    /// Child under `key` of a mapping
    pub fn get(&self, key: &str) -> Option<&Tree<T>> {
        match self {
            Tree::Named(entries) => entries.get(key),
            _ => None,
        }
    }

    /// Leaves in depth-first order
    pub fn leaves(&self) -> Vec<&T> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a T>) {
        match self {
            Tree::Leaf(value) => out.push(value),
            Tree::Seq(items) => items.iter().for_each(|item| item.collect_leaves(out)),
            Tree::Named(entries) => entries.values().for_each(|item| item.collect_leaves(out)),
        }
    }

    /// Number of leaves
    pub fn num_leaves(&self) -> usize {
        match self {
            Tree::Leaf(_) => 1,
            Tree::Seq(items) => items.iter().map(Tree::num_leaves).sum(),
            Tree::Named(entries) => entries.values().map(Tree::num_leaves).sum(),
        }
    }

    /// Apply `f` to every leaf, keeping the topology
    ///
    /// The results may borrow from the leaves, e.g. a tree of views over a
    /// tree of arrays.
    pub fn map<'a, U, G>(&'a self, mut f: G) -> Tree<U>
    where
        G: FnMut(&'a T) -> U,
    {
        self.map_with(&mut f)
    }

    fn map_with<'a, U, G>(&'a self, f: &mut G) -> Tree<U>
    where
        G: FnMut(&'a T) -> U,
    {
        match self {
            Tree::Leaf(value) => Tree::Leaf(f(value)),
            Tree::Seq(items) => Tree::Seq(items.iter().map(|item| item.map_with(f)).collect()),
            Tree::Named(entries) => Tree::Named(
                entries
                    .iter()
                    .map(|(k, item)| (k.clone(), item.map_with(f)))
                    .collect(),
            ),
        }
    }

    /// Check if `other` has the same topology
    pub fn same_structure<U>(&self, other: &Tree<U>) -> bool {
        match (self, other) {
            (Tree::Leaf(_), Tree::Leaf(_)) => true,
            (Tree::Seq(a), Tree::Seq(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_structure(y))
            }
            (Tree::Named(a), Tree::Named(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, x), (kb, y))| ka == kb && x.same_structure(y))
            }
            _ => false,
        }
    }

    /// Pair every leaf with the matching leaf of `other` and combine them
    ///
    /// Fails with [`StatsError::StructureMismatch`] if the topologies differ,
    /// or with the first error returned by `f`.
    pub fn try_zip_with<U, V, G>(&self, other: &Tree<U>, mut f: G) -> Result<Tree<V>, StatsError>
    where
        G: FnMut(&T, &U) -> Result<V, StatsError>,
    {
        self.zip_with_at(other, &mut f, "")
    }

    fn zip_with_at<U, V, G>(&self, other: &Tree<U>, f: &mut G, path: &str) -> Result<Tree<V>, StatsError>
    where
        G: FnMut(&T, &U) -> Result<V, StatsError>,
    {
        match (self, other) {
            (Tree::Leaf(a), Tree::Leaf(b)) => Ok(Tree::Leaf(f(a, b)?)),
            (Tree::Seq(a), Tree::Seq(b)) => {
                if a.len() != b.len() {
                    return Err(StatsError::StructureMismatch(format!(
                        "sequence at '{}' has {} items, expected {}",
                        path,
                        b.len(),
                        a.len()
                    )));
                }
                a.iter()
                    .zip(b)
                    .enumerate()
                    .map(|(i, (x, y))| x.zip_with_at(y, f, &format!("{}/{}", path, i)))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Tree::Seq)
            }
            (Tree::Named(a), Tree::Named(b)) => {
                let mut out = BTreeMap::new();
                for (key, x) in a {
                    let y = b.get(key).ok_or_else(|| {
                        StatsError::StructureMismatch(format!("missing key '{}' at '{}'", key, path))
                    })?;
                    out.insert(key.clone(), x.zip_with_at(y, f, &format!("{}/{}", path, key))?);
                }
                if let Some(extra) = b.keys().find(|k| !a.contains_key(*k)) {
                    return Err(StatsError::StructureMismatch(format!(
                        "unexpected key '{}' at '{}'",
                        extra, path
                    )));
                }
                Ok(Tree::Named(out))
            }
            _ => Err(StatsError::StructureMismatch(format!(
                "node kinds differ at '{}'",
                path
            ))),
        }
    }
}

impl<T> From<T> for Tree<T> {
    fn from(value: T) -> Self {
        Tree::Leaf(value)
    }
}

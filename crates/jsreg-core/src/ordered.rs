//! # Ordered Set - Dependency-Respecting Iteration
//!
//! An [`OrderedSet`] stores named items together with "must come after"
//! edges and yields them in a deterministic topological order.
//!
//! ## Ordering Rules
//!
//! - An item is yielded only after every item it depends on.
//! - Among items whose dependencies are all satisfied, the one registered
//!   first is yielded first. Identical registrations therefore always
//!   produce identical orders.
//! - A dependency may name an item that is registered later. Iterating
//!   while such a name is still missing fails with
//!   [`OrderError::UnknownDependency`].
//! - Registering an item that would close a cycle fails immediately with
//!   [`OrderError::Cycle`] and leaves the set unchanged.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::OrderError;

#[derive(Debug, Clone)]
struct Entry<T> {
    name: String,
    item: T,
    dependencies: Vec<String>,
}

/// A set of named items iterated in dependency order.
#[derive(Debug, Clone)]
pub struct OrderedSet<T> {
    entries: Vec<Entry<T>>,
    index: HashMap<String, usize>,
}

impl<T> Default for OrderedSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OrderedSet<T> {
    /// Create an empty set.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register `item` under `name`, to be yielded after every item named in
    /// `dependencies`.
    ///
    /// # Errors
    ///
    /// - [`OrderError::DuplicateItem`] if `name` is already registered.
    /// - [`OrderError::Cycle`] if the new edges would create a cycle.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        item: T,
        dependencies: &[&str],
    ) -> Result<(), OrderError> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(OrderError::DuplicateItem(name));
        }

        let mut deps: Vec<String> = Vec::with_capacity(dependencies.len());
        for dep in dependencies {
            if !deps.iter().any(|d| d == dep) {
                deps.push((*dep).to_string());
            }
        }

        for dep in &deps {
            let mut seen = HashSet::new();
            if let Some(path) = self.path_to(dep, &name, &mut seen) {
                let mut cycle = Vec::with_capacity(path.len() + 1);
                cycle.push(name.clone());
                cycle.extend(path);
                return Err(OrderError::Cycle { cycle });
            }
        }

        self.index.insert(name.clone(), self.entries.len());
        self.entries.push(Entry {
            name,
            item,
            dependencies: deps,
        });
        Ok(())
    }

    /// Dependency path from `from` to `target`, following "depends on" edges
    /// through registered items. Includes both endpoints.
    fn path_to(&self, from: &str, target: &str, seen: &mut HashSet<String>) -> Option<Vec<String>> {
        if from == target {
            return Some(vec![from.to_string()]);
        }
        if !seen.insert(from.to_string()) {
            return None;
        }
        let idx = *self.index.get(from)?;
        for dep in &self.entries[idx].dependencies {
            if let Some(mut rest) = self.path_to(dep, target, seen) {
                rest.insert(0, from.to_string());
                return Some(rest);
            }
        }
        None
    }

    /// Number of registered items.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if an item is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Look up an item by name.
    pub fn get(&self, name: &str) -> Option<&T> {
        self.index.get(name).map(|&i| &self.entries[i].item)
    }

    /// Items in dependency order, each paired with its name.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::UnknownDependency`] if some item depends on a
    /// name that was never registered.
    pub fn ordered_with_names(&self) -> Result<Vec<(&str, &T)>, OrderError> {
        let mut indegree = vec![0usize; self.entries.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.entries.len()];

        for (i, entry) in self.entries.iter().enumerate() {
            for dep in &entry.dependencies {
                let Some(&d) = self.index.get(dep) else {
                    return Err(OrderError::UnknownDependency {
                        item: entry.name.clone(),
                        dependency: dep.clone(),
                    });
                };
                indegree[i] += 1;
                dependents[d].push(i);
            }
        }

        let mut ready: BTreeSet<usize> = indegree
            .iter()
            .enumerate()
            .filter(|(_, &n)| n == 0)
            .map(|(i, _)| i)
            .collect();
        let mut out = Vec::with_capacity(self.entries.len());

        while let Some(i) = ready.pop_first() {
            let entry = &self.entries[i];
            out.push((entry.name.as_str(), &entry.item));
            for &next in &dependents[i] {
                indegree[next] -= 1;
                if indegree[next] == 0 {
                    ready.insert(next);
                }
            }
        }

        if out.len() < self.entries.len() {
            // Unreachable while `add` rejects cycles; reported rather than dropped.
            let cycle = self
                .entries
                .iter()
                .enumerate()
                .filter(|(i, _)| indegree[*i] > 0)
                .map(|(_, e)| e.name.clone())
                .collect();
            return Err(OrderError::Cycle { cycle });
        }

        Ok(out)
    }

    /// Items in dependency order.
    ///
    /// # Errors
    ///
    /// See [`OrderedSet::ordered_with_names`].
    pub fn ordered(&self) -> Result<Vec<&T>, OrderError> {
        Ok(self
            .ordered_with_names()?
            .into_iter()
            .map(|(_, item)| item)
            .collect())
    }

    /// Invoke `f` on every item in dependency order.
    ///
    /// The order is computed before the first call, so a failure is
    /// reported without invoking `f` at all.
    pub fn for_each<F>(&self, mut f: F) -> Result<(), OrderError>
    where
        F: FnMut(&T),
    {
        for item in self.ordered()? {
            f(item);
        }
        Ok(())
    }
}

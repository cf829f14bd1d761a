use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use log::{info, warn};

use super::container;
use super::model::Dataset;
use crate::error::DbError;

// ---------------------------------------------------------------------------
// Keys and notices
// ---------------------------------------------------------------------------

/// `(tool, name)` identity of a stored dataset.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DatasetKey {
    pub tool: String,
    pub name: String,
}

impl DatasetKey {
    pub fn new(tool: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            name: name.into(),
        }
    }

    /// Group name used inside container files.
    pub fn group_name(&self) -> String {
        format!("{}__{}", self.tool, self.name)
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.tool, self.name)
    }
}

/// Informational: a dataset was stored under a different name than requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateNameResolved {
    pub requested: String,
    pub assigned: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOutcome {
    pub key: DatasetKey,
    pub renamed: Option<DuplicateNameResolved>,
}

/// Make `name` unique among `taken` by appending ` (1)` or bumping the last
/// `(n)` already present.
pub fn unique_name(name: &str, taken: &BTreeSet<String>) -> String {
    let mut candidate = name.to_string();
    while taken.contains(&candidate) {
        candidate = match last_counter(&candidate) {
            Some((start, end, n)) => format!("{}({}){}", &candidate[..start], n + 1, &candidate[end..]),
            None => format!("{candidate} (1)"),
        };
    }
    candidate
}

/// Byte span and value of the last `(<digits>)` group.
fn last_counter(s: &str) -> Option<(usize, usize, u64)> {
    let mut search_end = s.len();
    while let Some(close) = s[..search_end].rfind(')') {
        if let Some(open) = s[..close].rfind('(') {
            let digits = &s[open + 1..close];
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(n) = digits.parse::<u64>() {
                    return Some((open, close + 1, n));
                }
            }
        }
        search_end = close;
    }
    None
}

// ---------------------------------------------------------------------------
// Database – registry of datasets
// ---------------------------------------------------------------------------

/// All loaded datasets, grouped by tool, with names unique across tools.
///
/// Mutation requires `&mut self`; hosts sharing one database between threads
/// wrap it in a lock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Database {
    entries: BTreeMap<DatasetKey, Dataset>,
    names: BTreeSet<String>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, tool: &str, name: &str) -> bool {
        self.entries.contains_key(&DatasetKey::new(tool, name))
    }

    pub fn get(&self, tool: &str, name: &str) -> Option<&Dataset> {
        self.entries.get(&DatasetKey::new(tool, name))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DatasetKey, &Dataset)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &DatasetKey> {
        self.entries.keys()
    }

    /// Distinct tool names, sorted.
    pub fn tools(&self) -> Vec<&str> {
        let tools: BTreeSet<&str> = self.entries.keys().map(|k| k.tool.as_str()).collect();
        tools.into_iter().collect()
    }

    /// Datasets of one tool, keyed by name.
    pub fn datasets_of<'a>(&'a self, tool: &'a str) -> impl Iterator<Item = (&'a str, &'a Dataset)> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k.tool == tool)
            .map(|(k, ds)| (k.name.as_str(), ds))
    }

    /// Register a dataset; a taken name gets a numeric suffix.
    pub fn add(&mut self, tool: &str, name: &str, dataset: Dataset) -> AddOutcome {
        let assigned = unique_name(name, &self.names);
        let renamed = (assigned != name).then(|| {
            warn!("dataset name '{name}' is already in use, stored as '{assigned}'");
            DuplicateNameResolved {
                requested: name.to_string(),
                assigned: assigned.clone(),
            }
        });

        let key = DatasetKey::new(tool, assigned.clone());
        self.names.insert(assigned);
        self.entries.insert(key.clone(), dataset);
        info!("registered dataset {key}");
        AddOutcome { key, renamed }
    }

    pub fn remove(&mut self, tool: &str, name: &str) -> Result<Dataset, DbError> {
        let key = DatasetKey::new(tool, name);
        let dataset = self.entries.remove(&key).ok_or_else(|| DbError::NotFound {
            tool: tool.to_string(),
            name: name.to_string(),
        })?;
        self.names.remove(name);
        info!("removed dataset {key}");
        Ok(dataset)
    }

    /// Remove every dataset of one tool; returns how many were removed.
    pub fn remove_tool(&mut self, tool: &str) -> Result<usize, DbError> {
        let keys: Vec<DatasetKey> = self.entries.keys().filter(|k| k.tool == tool).cloned().collect();
        if keys.is_empty() {
            return Err(DbError::ToolNotFound(tool.to_string()));
        }
        for key in &keys {
            self.entries.remove(key);
            self.names.remove(&key.name);
        }
        Ok(keys.len())
    }

    /// Move a dataset to a new name (made unique like [`Database::add`]).
    pub fn rename(&mut self, tool: &str, name: &str, new_name: &str) -> Result<AddOutcome, DbError> {
        let dataset = self.remove(tool, name)?;
        Ok(self.add(tool, new_name, dataset))
    }

    /// Replace a dataset with a copy lacking the given coupled modes.
    pub fn remove_modes(&mut self, tool: &str, name: &str, modes: &[usize]) -> Result<(), DbError> {
        let key = DatasetKey::new(tool, name);
        let current = self.entries.get(&key).ok_or_else(|| DbError::NotFound {
            tool: tool.to_string(),
            name: name.to_string(),
        })?;
        let reduced = current.without_modes(modes)?;
        self.entries.insert(key, reduced);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Write the selected datasets (all when `subset` is `None`) to a container.
    pub fn save(&self, path: &Path, subset: Option<&[DatasetKey]>) -> Result<(), DbError> {
        let selected: Vec<(&DatasetKey, &Dataset)> = match subset {
            None => self.entries.iter().collect(),
            Some(keys) => keys
                .iter()
                .map(|k| {
                    self.entries.get_key_value(k).ok_or_else(|| DbError::NotFound {
                        tool: k.tool.clone(),
                        name: k.name.clone(),
                    })
                })
                .collect::<Result<_, _>>()?,
        };
        container::write(path, &selected)?;
        info!("saved {} datasets to {}", selected.len(), path.display());
        Ok(())
    }

    /// Rehydrate a database from a container; any invalid group fails the load.
    pub fn load(path: &Path) -> Result<Database, DbError> {
        let groups = container::read(path)?;
        let mut db = Database::new();
        for (key, dataset) in groups {
            if db.names.contains(&key.name) {
                return Err(DbError::CorruptContainer {
                    path: path.to_path_buf(),
                    reason: format!("dataset name '{}' appears more than once", key.name),
                });
            }
            db.names.insert(key.name.clone());
            db.entries.insert(key, dataset);
        }
        info!("loaded {} datasets from {}", db.len(), path.display());
        Ok(db)
    }

    /// Add every dataset of a container, renaming on collision.
    ///
    /// The container is read completely first, so `self` is unchanged on error.
    pub fn merge_from(&mut self, path: &Path) -> Result<Vec<AddOutcome>, DbError> {
        let loaded = Database::load(path)?;
        Ok(loaded
            .entries
            .into_iter()
            .map(|(key, dataset)| self.add(&key.tool, &key.name, dataset))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::tests::sample_dataset;

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn unique_names_count_upwards() {
        assert_eq!(unique_name("run", &names(&[])), "run");
        assert_eq!(unique_name("run", &names(&["run"])), "run (1)");
        assert_eq!(unique_name("run", &names(&["run", "run (1)"])), "run (2)");
        assert_eq!(unique_name("run (4)", &names(&["run (4)"])), "run (5)");
        assert_eq!(unique_name("v(2) x", &names(&["v(2) x"])), "v(3) x");
        assert_eq!(unique_name("a (b)", &names(&["a (b)"])), "a (b) (1)");
    }

    #[test]
    fn same_name_in_one_tool_is_disambiguated() {
        let mut db = Database::new();
        let first = db.add("HAWCStab2", "case", sample_dataset());
        let second = db.add("HAWCStab2", "case", sample_dataset());

        assert_eq!(first.key.name, "case");
        assert!(first.renamed.is_none());
        assert_eq!(second.key.name, "case (1)");
        assert_eq!(
            second.renamed,
            Some(DuplicateNameResolved {
                requested: "case".into(),
                assigned: "case (1)".into()
            })
        );
        assert!(db.get("HAWCStab2", "case").is_some());
        assert!(db.get("HAWCStab2", "case (1)").is_some());
        assert_eq!(db.len(), 2);
    }

    #[test]
    fn names_are_unique_across_tools() {
        let mut db = Database::new();
        db.add("HAWCStab2", "case", sample_dataset());
        let other = db.add("Bladed (lin.)", "case", sample_dataset());

        assert_eq!(other.key, DatasetKey::new("Bladed (lin.)", "case (1)"));
        assert_eq!(db.tools(), vec!["Bladed (lin.)", "HAWCStab2"]);
        assert_eq!(db.datasets_of("HAWCStab2").count(), 1);
    }

    #[test]
    fn removal_is_not_idempotent() {
        let mut db = Database::new();
        db.add("HAWCStab2", "case", sample_dataset());

        assert!(db.remove("HAWCStab2", "case").is_ok());
        assert!(matches!(
            db.remove("HAWCStab2", "case"),
            Err(DbError::NotFound { .. })
        ));
        // The freed name can be used again without a suffix.
        assert_eq!(db.add("HAWCStab2", "case", sample_dataset()).key.name, "case");
    }

    #[test]
    fn rename_and_tool_removal() {
        let mut db = Database::new();
        db.add("HAWCStab2", "a", sample_dataset());
        db.add("HAWCStab2", "b", sample_dataset());
        db.add("Bladed (lin.)", "c", sample_dataset());

        let moved = db.rename("HAWCStab2", "a", "b").unwrap();
        assert_eq!(moved.key.name, "b (1)");
        assert!(!db.contains("HAWCStab2", "a"));

        assert_eq!(db.remove_tool("HAWCStab2").unwrap(), 2);
        assert!(matches!(db.remove_tool("HAWCStab2"), Err(DbError::ToolNotFound(_))));
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn removing_modes_replaces_the_entry() {
        let mut db = Database::new();
        db.add("HAWCStab2", "a", sample_dataset());
        db.remove_modes("HAWCStab2", "a", &[1]).unwrap();
        assert_eq!(db.get("HAWCStab2", "a").unwrap().num_modes(), 1);

        assert!(matches!(
            db.remove_modes("HAWCStab2", "a", &[3]),
            Err(DbError::InvalidDataset(_))
        ));
        assert!(matches!(
            db.remove_modes("HAWCStab2", "zzz", &[0]),
            Err(DbError::NotFound { .. })
        ));
    }
}

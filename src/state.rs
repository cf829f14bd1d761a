use std::path::Path;

use log::info;

use crate::data::database::{AddOutcome, Database, DatasetKey, DuplicateNameResolved};
use crate::data::filter::{filtered_modes, ModeFilter};
use crate::data::model::Dataset;
use crate::error::SessionError;
use crate::import::{ImportRequest, ImportWarning};

// ---------------------------------------------------------------------------
// Import report
// ---------------------------------------------------------------------------

/// What an import produced and where it was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub key: DatasetKey,
    pub warnings: Vec<ImportWarning>,
    pub renamed: Option<DuplicateNameResolved>,
}

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// Session state, independent of any front end. Owns the database.
#[derive(Debug, Default)]
pub struct AppState {
    pub database: Database,

    /// Dataset shown by the view layer.
    pub selected: Option<DatasetKey>,

    /// Category selection applied to the selected dataset's modes.
    pub mode_filter: ModeFilter,

    /// Indices of modes passing `mode_filter` (cached).
    pub visible_modes: Vec<usize>,

    /// Status / error message for the front end.
    pub status_message: Option<String>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run an importer and store its dataset under `name` (made unique).
    ///
    /// The database is only touched once the import has succeeded.
    pub fn import(&mut self, name: &str, request: &ImportRequest) -> Result<ImportReport, SessionError> {
        let imported = match request.run() {
            Ok(imported) => imported,
            Err(e) => {
                self.status_message = Some(e.to_string());
                return Err(e.into());
            }
        };

        let outcome = self.database.add(imported.tool.name(), name, imported.dataset);
        self.status_message = Some(match imported.warnings.len() {
            0 => format!("imported {}", outcome.key),
            n => format!("imported {} with {n} warning(s)", outcome.key),
        });
        self.select(outcome.key.clone());

        Ok(ImportReport {
            key: outcome.key,
            warnings: imported.warnings,
            renamed: outcome.renamed,
        })
    }

    /// Replace the database with the contents of a container.
    pub fn open_database(&mut self, path: &Path) -> Result<(), SessionError> {
        self.database = Database::load(path)?;
        self.selected = None;
        self.visible_modes.clear();
        self.status_message = Some(format!("opened {}", path.display()));
        Ok(())
    }

    /// Add every dataset of a container to the current database.
    pub fn merge_database(&mut self, path: &Path) -> Result<Vec<AddOutcome>, SessionError> {
        let outcomes = self.database.merge_from(path)?;
        info!("merged {} datasets from {}", outcomes.len(), path.display());
        Ok(outcomes)
    }

    pub fn save_database(&self, path: &Path, subset: Option<&[DatasetKey]>) -> Result<(), SessionError> {
        Ok(self.database.save(path, subset)?)
    }

    pub fn remove(&mut self, tool: &str, name: &str) -> Result<Dataset, SessionError> {
        let dataset = self.database.remove(tool, name)?;
        if self
            .selected
            .as_ref()
            .is_some_and(|k| k.tool == tool && k.name == name)
        {
            self.selected = None;
            self.visible_modes.clear();
        }
        Ok(dataset)
    }

    pub fn selected_dataset(&self) -> Option<&Dataset> {
        let key = self.selected.as_ref()?;
        self.database.get(&key.tool, &key.name)
    }

    pub fn select(&mut self, key: DatasetKey) {
        self.selected = Some(key);
        self.refilter();
    }

    pub fn set_mode_filter(&mut self, filter: ModeFilter) {
        self.mode_filter = filter;
        self.refilter();
    }

    /// Recompute `visible_modes` after a selection or filter change.
    pub fn refilter(&mut self) {
        self.visible_modes = match self.selected_dataset() {
            Some(ds) => filtered_modes(ds, &self.mode_filter),
            None => Vec::new(),
        };
    }
}

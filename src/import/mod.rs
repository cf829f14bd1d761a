//! Tool importers: turn one producer's output files into a [`Dataset`].
//!
//! ```text
//!   ImportRequest ──► hawcstab2 (.cmb/.opt/.amp text via table, .bin via codec)
//!                 └─► bladed    (delimited summary via csv)
//!                          │
//!                          ▼
//!                 Imported { dataset, warnings }
//! ```
//!
//! Importers never touch a database; the caller decides where a result goes.

pub mod bladed;
pub mod hawcstab2;
pub mod table;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use log::{info, warn};

pub use bladed::BladedOptions;
pub use hawcstab2::{CmbLayout, HawcStab2Files, HawcStab2Options};

use crate::data::model::Dataset;
use crate::error::ImportError;

// ---------------------------------------------------------------------------
// Tool identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    HawcStab2,
    BladedLin,
}

impl Tool {
    pub const ALL: [Tool; 2] = [Tool::HawcStab2, Tool::BladedLin];

    /// Display name, also the tool part of a dataset key.
    pub fn name(self) -> &'static str {
        match self {
            Tool::HawcStab2 => "HAWCStab2",
            Tool::BladedLin => "Bladed (lin.)",
        }
    }

    /// Command-line identifier.
    pub fn id(self) -> &'static str {
        match self {
            Tool::HawcStab2 => "hawcstab2",
            Tool::BladedLin => "bladed-lin",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Tool {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tool::ALL
            .into_iter()
            .find(|t| t.id().eq_ignore_ascii_case(s) || t.name() == s)
            .ok_or_else(|| ImportError::UnknownTool(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Warnings and results
// ---------------------------------------------------------------------------

/// Non-fatal import finding. The dataset is still produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportWarning {
    /// Source files disagreed on the length of `axis`; everything was cut to
    /// `kept` entries.
    PartialData {
        axis: &'static str,
        kept: usize,
        counts: Vec<(String, usize)>,
    },
}

impl fmt::Display for ImportWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportWarning::PartialData { axis, kept, counts } => {
                let found: Vec<String> = counts.iter().map(|(src, n)| format!("{src}: {n}")).collect();
                write!(f, "{axis} counts differ ({}), kept {kept}", found.join(", "))
            }
        }
    }
}

/// Compare the length one axis has in several sources.
///
/// Returns the common minimum and, when the sources disagree, the warning
/// describing the truncation.
pub(crate) fn reconcile(axis: &'static str, counts: Vec<(String, usize)>) -> (usize, Option<ImportWarning>) {
    let kept = counts.iter().map(|(_, n)| *n).min().unwrap_or(0);
    let agree = counts.iter().all(|(_, n)| *n == kept);
    let warning = (!agree).then_some(ImportWarning::PartialData { axis, kept, counts });
    (kept, warning)
}

pub(crate) fn import_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Imported {
    pub tool: Tool,
    pub dataset: Dataset,
    pub warnings: Vec<ImportWarning>,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// One import job: which tool, which files, which options.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportRequest {
    HawcStab2 {
        files: HawcStab2Files,
        options: HawcStab2Options,
    },
    BladedLin {
        summary: PathBuf,
        options: BladedOptions,
    },
}

impl ImportRequest {
    pub fn tool(&self) -> Tool {
        match self {
            ImportRequest::HawcStab2 { .. } => Tool::HawcStab2,
            ImportRequest::BladedLin { .. } => Tool::BladedLin,
        }
    }

    /// Parse the files into a validated dataset.
    pub fn run(&self) -> Result<Imported, ImportError> {
        let tool = self.tool();
        let (dataset, warnings) = match self {
            ImportRequest::HawcStab2 { files, options } => hawcstab2::import(files, options)?,
            ImportRequest::BladedLin { summary, options } => bladed::import(summary, options)?,
        };

        for w in &warnings {
            warn!("{tool} import: {w}");
        }
        info!(
            "{tool} import: {} operating points, {} modes, {} participation modes",
            dataset.num_operating_points(),
            dataset.num_modes(),
            dataset.num_participation_modes()
        );
        Ok(Imported {
            tool,
            dataset,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tools_parse_from_id_or_name() {
        assert_eq!("hawcstab2".parse::<Tool>().unwrap(), Tool::HawcStab2);
        assert_eq!("Bladed-Lin".parse::<Tool>().unwrap(), Tool::BladedLin);
        assert_eq!("Bladed (lin.)".parse::<Tool>().unwrap(), Tool::BladedLin);
        assert!(matches!("flex5".parse::<Tool>(), Err(ImportError::UnknownTool(t)) if t == "flex5"));
        assert_eq!(Tool::HawcStab2.to_string(), "HAWCStab2");
    }

    #[test]
    fn reconcile_keeps_the_shortest_axis() {
        let (kept, warning) = reconcile("operating_point", vec![("cmb".into(), 3), ("opt".into(), 3)]);
        assert_eq!(kept, 3);
        assert!(warning.is_none());

        let (kept, warning) = reconcile("mode", vec![("cmb".into(), 4), ("amp".into(), 2)]);
        assert_eq!(kept, 2);
        assert_eq!(
            warning.unwrap().to_string(),
            "mode counts differ (cmb: 4, amp: 2), kept 2"
        );
    }
}

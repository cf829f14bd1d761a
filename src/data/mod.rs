/// Data layer: canonical dataset model, filtering, and the database.
///
/// Architecture:
/// ```text
///   importers (HAWCStab2, Bladed)
///        │
///        ▼
///   ┌──────────────┐
///   │ DatasetBuilder│  partial arrays → validated Dataset
///   └──────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ database  │  (tool, name) → Dataset, unique names
///   └──────────┘
///        │  ▲
///        ▼  │
///   ┌──────────┐
///   │ container │  one Parquet row per dataset
///   └──────────┘
///
///   filter: label predicates over AEMode → selected mode indices
/// ```

pub mod container;
pub mod database;
pub mod filter;
pub mod model;

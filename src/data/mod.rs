/// Data layer: core types, loading, and filtering.
///
/// Architecture:
/// ```text
///  .xlsx / .ods / .csv / .txt / .xy        .parquet / .json / .csv
///        │                                        │
///        ▼                                        ▼
///   ┌──────────┐                            ┌──────────┐
///   │  table    │  layout → RawTable         │  loader   │  list columns → CurveSet
///   └──────────┘                            └──────────┘
///        │                                        │
///        ├──────────────┐                         │
///        ▼              ▼                         │
///   ┌─────────────┐ ┌──────────┐                  │
///   │ measurement │ │  curve    │ ────────────────┤
///   └─────────────┘ └──────────┘                  ▼
///    Vec<Measurement>                        ┌──────────┐
///                                            │  filter   │  metadata predicates → indices
///                                            └──────────┘
/// ```

pub mod curve;
pub mod filter;
pub mod layout;
pub mod loader;
pub mod measurement;
pub mod model;
pub mod table;

//! Pure pricing logic for print jobs.
//!
//! - [`range`]: turns a page-range expression into the set of pages to print
//! - [`cost`]: turns pages, copies and paper size into page units
//!
//! Nothing in here touches I/O; settlement composes these with the normalizer and
//! the ledger.

pub mod cost;
pub mod range;

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

pub use cost::{CostError, CostInput, calculate_cost};
pub use range::{PageSelection, select_pages};

/// Integer page units, the indivisible charge unit of the ledger.
pub type PageUnits = i64;

/// Supported paper sizes. A4 is the baseline size; A3 is charged with a configured multiplier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum PaperSize {
    #[default]
    A4,
    A3,
}

impl fmt::Display for PaperSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaperSize::A4 => write!(f, "A4"),
            PaperSize::A3 => write!(f, "A3"),
        }
    }
}

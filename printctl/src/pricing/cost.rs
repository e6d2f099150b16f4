//! Page-unit cost of a print job.
//!
//! `cost = effective_pages × copies × size_factor`, where the size factor is 1 for A4 and the
//! configured multiplier for A3. Charging is per page-image, so duplex printing costs exactly the
//! same as simplex.

use super::{PageUnits, PaperSize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CostError {
    #[error("effective page count must be positive")]
    NoPages,

    #[error("copies must be positive")]
    NoCopies,

    #[error("paper size multiplier must be a positive finite number, got {0}")]
    InvalidMultiplier(f64),

    #[error("cost of {pages} pages x {copies} copies overflows the ledger")]
    Overflow { pages: u32, copies: u32 },
}

/// Everything that determines the charge of a print job.
#[derive(Debug, Clone, Copy)]
pub struct CostInput {
    pub effective_pages: u32,
    pub copies: u32,
    pub paper_size: PaperSize,
    /// Multiplier applied to [`PaperSize::A3`].
    pub a3_multiplier: f64,
    /// Carried for completeness; it never changes the charge.
    pub duplex: bool,
}

/// Compute the page-unit cost. Preconditions are reported, never clamped.
pub fn calculate_cost(input: &CostInput) -> Result<PageUnits, CostError> {
    if input.effective_pages == 0 {
        return Err(CostError::NoPages);
    }
    if input.copies == 0 {
        return Err(CostError::NoCopies);
    }
    if !input.a3_multiplier.is_finite() || input.a3_multiplier <= 0.0 {
        return Err(CostError::InvalidMultiplier(input.a3_multiplier));
    }

    let overflow = || CostError::Overflow {
        pages: input.effective_pages,
        copies: input.copies,
    };

    let base = PageUnits::from(input.effective_pages)
        .checked_mul(PageUnits::from(input.copies))
        .ok_or_else(overflow)?;

    match input.paper_size {
        PaperSize::A4 => Ok(base),
        PaperSize::A3 => {
            // Fractional multipliers round up to the next whole page unit
            let scaled = (base as f64 * input.a3_multiplier).ceil();
            if scaled >= PageUnits::MAX as f64 {
                return Err(overflow());
            }
            Ok(scaled as PageUnits)
        }
    }
}

//! Page-range selection.
//!
//! Expressions are comma-separated tokens, each either a single page (`7`) or an
//! inclusive pair (`2-5`). Selection is lenient: tokens that cannot be honoured are
//! dropped rather than rejected, and the caller decides what an empty selection means.
//!
//! | Token | Total = 10 | Result |
//! |-------|------------|--------|
//! | `3`   |            | `[3]` |
//! | `3-1` |            | `[]` (reversed pair) |
//! | `5-100` |          | `[5..=10]` (clipped) |
//! | `12`  |            | `[]` (out of range) |
//! | `x`   |            | `[]` (unparseable) |

use std::collections::BTreeSet;

/// Literal that authorizes every page without running the parser.
const ALL_PAGES: &str = "all";

/// Pages authorized for printing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSelection {
    /// Every page of the document.
    All,
    /// An explicit, strictly ascending, duplicate-free list of pages (possibly empty).
    Pages(Vec<u32>),
}

impl PageSelection {
    /// Number of pages that will actually be printed for a document of `total_pages`.
    pub fn effective_page_count(&self, total_pages: u32) -> u32 {
        match self {
            PageSelection::All => total_pages,
            PageSelection::Pages(pages) => pages.len() as u32,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, PageSelection::Pages(pages) if pages.is_empty())
    }
}

/// Resolve an optional page-range expression against a document of `total_pages`.
///
/// An absent or blank expression, or the literal `all`, bypasses parsing.
pub fn select_pages(expression: Option<&str>, total_pages: u32) -> PageSelection {
    match expression.map(str::trim) {
        None | Some("") => PageSelection::All,
        Some(expr) if expr.eq_ignore_ascii_case(ALL_PAGES) => PageSelection::All,
        Some(expr) => PageSelection::Pages(parse_page_range(expr, total_pages)),
    }
}

/// Parse an explicit range expression into pages within `[1, total_pages]`.
pub fn parse_page_range(expression: &str, total_pages: u32) -> Vec<u32> {
    let mut pages = BTreeSet::new();

    for token in expression.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        match token.split_once('-') {
            Some((start, end)) => {
                let (Ok(start), Ok(end)) = (start.trim().parse::<u32>(), end.trim().parse::<u32>()) else {
                    continue;
                };
                if start > end {
                    continue;
                }
                let lo = start.max(1);
                let hi = end.min(total_pages);
                if lo <= hi {
                    pages.extend(lo..=hi);
                }
            }
            None => {
                if let Ok(page) = token.parse::<u32>()
                    && (1..=total_pages).contains(&page)
                {
                    pages.insert(page);
                }
            }
        }
    }

    pages.into_iter().collect()
}

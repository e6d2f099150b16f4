//! Offset pagination for the history endpoints (print jobs, top-ups).
//!
//! Histories are ordered newest first, so `skip=0` is always the most recent activity.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

/// `?skip=&limit=` on a history endpoint. Out-of-range values are clamped rather than rejected.
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct Pagination {
    /// Entries to skip from the newest
    #[param(default = 0, minimum = 0)]
    pub skip: Option<i64>,

    /// Entries to return, at most 100
    #[param(default = 10, minimum = 1, maximum = 100)]
    pub limit: Option<i64>,
}

impl Pagination {
    /// `(skip, limit)` after defaults and clamping.
    pub fn params(&self) -> (i64, i64) {
        let skip = self.skip.map_or(0, |skip| skip.max(0));
        let limit = self.limit.map_or(DEFAULT_LIMIT, |limit| limit.clamp(1, MAX_LIMIT));
        (skip, limit)
    }
}

/// A window of a student's history, echoing the window that was applied.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PageOf<T: ToSchema> {
    pub data: Vec<T>,
    pub skip: i64,
    pub limit: i64,
}

impl<T: ToSchema> PageOf<T> {
    pub fn new(data: Vec<T>, skip: i64, limit: i64) -> Self {
        Self { data, skip, limit }
    }
}

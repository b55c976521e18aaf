//! Domain services. Each service owns a handle to the shared pool and the event
//! sender; multi-row writes run inside a single database transaction.

pub mod alerts;
pub mod analytics;
pub mod business;
pub mod checkout;
pub mod inventory;
pub mod products;
pub mod stock;
pub mod suppliers;

use crate::ListQuery;

/// Highest page number served. Keeps `page * limit` well inside `u64` and SQL
/// offset ranges.
pub const MAX_PAGE: u64 = 1_000_000;

/// Page and limit after clamping, in the order sea-orm paginators expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u64,
    pub limit: u64,
}

impl Page {
    pub fn new(page: u64, limit: u64) -> Self {
        Self {
            page: page.clamp(1, MAX_PAGE),
            limit: limit.clamp(1, 100),
        }
    }

    /// Zero-based page index for `Paginator::fetch_page`.
    pub fn index(&self) -> u64 {
        self.page - 1
    }

    pub fn offset(&self) -> usize {
        usize::try_from(self.index().saturating_mul(self.limit)).unwrap_or(usize::MAX)
    }

    /// Slices an in-memory result set.
    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        items
            .iter()
            .skip(self.offset())
            .take(self.limit as usize)
            .cloned()
            .collect()
    }
}

impl From<&ListQuery> for Page {
    fn from(query: &ListQuery) -> Self {
        let (page, limit) = query.normalized();
        Self::new(page, limit)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, 20)
    }
}

//! Pagination envelope returned by [`crate::AsyncQuerySet::paginated`].

use serde::Serialize;

use restmodel_core::Record;

/// One page of results plus the pre-window total and the echo of the
/// pagination arguments.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub results: Vec<Record>,
    /// Row count before the window was applied.
    pub total: usize,
    pub order_by: Option<Vec<String>>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Page {
    /// JSON envelope: `{results, total, order_by, limit, offset}`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "results": self.results.iter().map(Record::to_json).collect::<Vec<_>>(),
            "total": self.total,
            "order_by": self.order_by,
            "limit": self.limit,
            "offset": self.offset,
        })
    }
}

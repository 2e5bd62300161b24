use crate::schemas::PageMeta;

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Page {
    pub(crate) page: i64,
    pub(crate) limit: i64,
}

impl Page {
    /// Clamps raw query values: page floors at 1, limit to 1..=100 with a
    /// default of 20.
    pub(crate) fn resolve(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        Self { page, limit }
    }

    pub(crate) fn skip(&self) -> i64 {
        (self.page - 1) * self.limit
    }

    pub(crate) fn meta(&self, total: i64) -> PageMeta {
        PageMeta { total, page: self.page, limit: self.limit }
    }
}

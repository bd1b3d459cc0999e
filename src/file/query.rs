//! Listing parameters for a user's files.

use serde::Serialize;

use super::FileRecord;

/// Default page size.
pub const DEFAULT_LIMIT: u32 = 20;

/// Largest accepted page size.
pub const MAX_LIMIT: u32 = 100;

/// Sortable columns. Anything unrecognized falls back to newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    CreatedAt,
    FileSize,
    DownloadCount,
    OriginalName,
}

impl SortKey {
    /// Parse a client-supplied column name, `None` when unrecognized.
    pub fn try_parse(s: &str) -> Option<Self> {
        match s {
            "created_at" => Some(SortKey::CreatedAt),
            "file_size" => Some(SortKey::FileSize),
            "download_count" => Some(SortKey::DownloadCount),
            "original_name" => Some(SortKey::OriginalName),
            _ => None,
        }
    }

    /// Parse a client-supplied column name, falling back to `created_at`.
    pub fn parse(s: &str) -> Self {
        Self::try_parse(s).unwrap_or_default()
    }

    /// Column name; only these fixed strings are ever spliced into SQL.
    pub fn column(&self) -> &'static str {
        match self {
            SortKey::CreatedAt => "created_at",
            SortKey::FileSize => "file_size",
            SortKey::DownloadCount => "download_count",
            SortKey::OriginalName => "original_name",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    /// `ASC` in any case selects ascending; anything else is descending.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("asc") {
            SortOrder::Asc
        } else {
            SortOrder::Desc
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Page, sort and search options for a file listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    page: u32,
    limit: u32,
    pub sort: SortKey,
    pub order: SortOrder,
    pub search: Option<String>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIMIT,
            sort: SortKey::default(),
            order: SortOrder::default(),
            search: None,
        }
    }
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw client parameters, applying every default and clamp.
    pub fn from_params(
        page: Option<u32>,
        limit: Option<u32>,
        sort: Option<&str>,
        order: Option<&str>,
        search: Option<&str>,
    ) -> Self {
        let mut query = Self::default()
            .with_page(page.unwrap_or(1))
            .with_limit(limit.unwrap_or(DEFAULT_LIMIT));
        let order = order.map(SortOrder::parse).unwrap_or_default();
        (query.sort, query.order) = match sort.map(SortKey::try_parse) {
            None => (SortKey::default(), order),
            Some(Some(key)) => (key, order),
            // an unknown column ignores the requested direction
            Some(None) => (SortKey::CreatedAt, SortOrder::Desc),
        };
        if let Some(search) = search {
            query = query.with_search(search);
        }
        query
    }

    /// 1-based page; 0 is treated as 1.
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    /// Clamped to `1..=100`.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit.clamp(1, MAX_LIMIT);
        self
    }

    pub fn with_sort(mut self, sort: SortKey, order: SortOrder) -> Self {
        self.sort = sort;
        self.order = order;
        self
    }

    /// Case-insensitive substring filter on the original name. Blank is none.
    pub fn with_search(mut self, search: &str) -> Self {
        let search = search.trim();
        self.search = (!search.is_empty()).then(|| search.to_string());
        self
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.limit as i64
    }

    /// `LIKE` pattern for the search term with `%`, `_` and `\` escaped.
    pub fn like_pattern(&self) -> Option<String> {
        self.search.as_ref().map(|term| {
            let mut escaped = String::with_capacity(term.len() + 2);
            escaped.push('%');
            for c in term.chars() {
                if matches!(c, '%' | '_' | '\\') {
                    escaped.push('\\');
                }
                escaped.push(c);
            }
            escaped.push('%');
            escaped
        })
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Serialize)]
pub struct FilePage {
    pub files: Vec<FileRecord>,
    /// Matches across all pages, honouring the search filter.
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub pages: i64,
}

impl FilePage {
    pub fn new(files: Vec<FileRecord>, total: i64, query: &ListQuery) -> Self {
        let limit = query.limit() as i64;
        Self {
            files,
            total,
            page: query.page(),
            limit: query.limit(),
            pages: (total + limit - 1) / limit,
        }
    }
}

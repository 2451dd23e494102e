use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Query string accepted by every paginated listing.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub q: Option<String>,
    pub page: Option<u32>,
}

impl ListQuery {
    /// The search term, or `None` when absent or blank.
    pub fn search(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }
}

/// A 1-indexed page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub fn new(page: Option<u32>, size: u32) -> AppResult<Self> {
        let page = page.unwrap_or(1);
        if page == 0 {
            return Err(AppError::validation("page", "Pages start at 1."));
        }
        if size == 0 {
            return Err(AppError::validation("page_size", "Page size must be positive."));
        }
        Ok(Self { page, size })
    }

    pub fn first(size: u32) -> Self {
        Self { page: 1, size }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.size)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn new(results: Vec<T>, total: i64, request: PageRequest) -> Self {
        let size = i64::from(request.size);
        let total_pages = ((total + size - 1) / size).max(1) as u32;
        Self {
            results,
            total,
            page: request.page,
            total_pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            results: self.results.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            total_pages: self.total_pages,
        }
    }
}

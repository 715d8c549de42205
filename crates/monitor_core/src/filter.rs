//! Job-list view state and its URL query representation.
//!
//! The same pairs are used for the browser address bar and for `GET /jobs`, with
//! multi-select filters in repeat format (`status=running&status=failed`).

use url::form_urlencoded;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobListView {
    status: Vec<String>,
    job_type: Vec<String>,
    framework: Vec<String>,
    card_count: Vec<String>,
    node_id: Option<String>,
    sort_by: Option<String>,
    sort_order: SortOrder,
    page: u32,
    page_size: u32,
}

impl Default for JobListView {
    fn default() -> Self {
        Self {
            status: Vec::new(),
            job_type: Vec::new(),
            framework: Vec::new(),
            card_count: Vec::new(),
            node_id: None,
            sort_by: None,
            sort_order: SortOrder::default(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl JobListView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a query string (with or without the leading `?`).
    ///
    /// Unknown keys are ignored; malformed numbers fall back to defaults.
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut view = Self::default();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "status" => push_unique(&mut view.status, value),
                "type" => push_unique(&mut view.job_type, value),
                "framework" => push_unique(&mut view.framework, value),
                "cardCount" => push_unique(&mut view.card_count, value),
                "nodeId" => view.node_id = Some(value.to_string()),
                "sortBy" => view.sort_by = Some(value.to_string()),
                "sortOrder" => {
                    if let Some(order) = SortOrder::parse(value) {
                        view.sort_order = order;
                    }
                }
                "page" => {
                    if let Ok(page) = value.parse::<u32>() {
                        view.page = page.max(1);
                    }
                }
                "pageSize" => {
                    if let Ok(size) = value.parse::<u32>() {
                        view.page_size = clamp_page_size(size);
                    }
                }
                _ => {}
            }
        }
        view
    }

    /// Query pairs in a stable order; defaults for page and sort are omitted.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        pairs.extend(self.status.iter().map(|v| ("status", v.clone())));
        pairs.extend(self.job_type.iter().map(|v| ("type", v.clone())));
        pairs.extend(self.framework.iter().map(|v| ("framework", v.clone())));
        pairs.extend(self.card_count.iter().map(|v| ("cardCount", v.clone())));
        if let Some(node_id) = &self.node_id {
            pairs.push(("nodeId", node_id.clone()));
        }
        if let Some(sort_by) = &self.sort_by {
            pairs.push(("sortBy", sort_by.clone()));
            pairs.push(("sortOrder", self.sort_order.as_str().to_string()));
        }
        if self.page != 1 {
            pairs.push(("page", self.page.to_string()));
        }
        if self.page_size != DEFAULT_PAGE_SIZE {
            pairs.push(("pageSize", self.page_size.to_string()));
        }
        pairs
    }

    /// Like [`to_query_pairs`](Self::to_query_pairs) but always carries paging,
    /// which is what the list endpoints expect.
    pub fn to_request_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs: Vec<_> = self
            .to_query_pairs()
            .into_iter()
            .filter(|(key, _)| *key != "page" && *key != "pageSize")
            .collect();
        pairs.push(("page", self.page.to_string()));
        pairs.push(("pageSize", self.page_size.to_string()));
        pairs
    }

    /// Encoded query string without the leading `?`; empty for the default view.
    pub fn to_query_string(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in self.to_query_pairs() {
            serializer.append_pair(key, &value);
        }
        serializer.finish()
    }

    pub fn status(&self) -> &[String] {
        &self.status
    }

    pub fn job_type(&self) -> &[String] {
        &self.job_type
    }

    pub fn framework(&self) -> &[String] {
        &self.framework
    }

    pub fn card_count(&self) -> &[String] {
        &self.card_count
    }

    pub fn node_id(&self) -> Option<&str> {
        self.node_id.as_deref()
    }

    pub fn sort(&self) -> Option<(&str, SortOrder)> {
        self.sort_by.as_deref().map(|field| (field, self.sort_order))
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    // Filter changes invalidate the current page.

    pub fn set_status(&mut self, status: Vec<String>) {
        self.status = dedupe(status);
        self.page = 1;
    }

    pub fn set_job_type(&mut self, job_type: Vec<String>) {
        self.job_type = dedupe(job_type);
        self.page = 1;
    }

    pub fn set_framework(&mut self, framework: Vec<String>) {
        self.framework = dedupe(framework);
        self.page = 1;
    }

    pub fn set_card_count(&mut self, card_count: Vec<String>) {
        self.card_count = dedupe(card_count);
        self.page = 1;
    }

    pub fn set_node_id(&mut self, node_id: Option<String>) {
        self.node_id = node_id.filter(|id| !id.trim().is_empty());
        self.page = 1;
    }

    pub fn set_sort(&mut self, field: Option<String>, order: SortOrder) {
        self.sort_by = field;
        self.sort_order = order;
        self.page = 1;
    }

    pub fn set_page(&mut self, page: u32) {
        self.page = page.max(1);
    }

    pub fn set_page_size(&mut self, page_size: u32) {
        self.page_size = clamp_page_size(page_size);
        self.page = 1;
    }

    /// Clear all filters, keeping the page size.
    pub fn reset(&mut self) {
        *self = Self {
            page_size: self.page_size,
            ..Self::default()
        };
    }
}

fn clamp_page_size(size: u32) -> u32 {
    if size == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        size.min(MAX_PAGE_SIZE)
    }
}

fn push_unique(values: &mut Vec<String>, value: &str) {
    if !values.iter().any(|v| v == value) {
        values.push(value.to_string());
    }
}

fn dedupe(values: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        push_unique(&mut out, value.trim());
    }
    out.retain(|v| !v.is_empty());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_view_has_empty_query() {
        assert_eq!(JobListView::new().to_query_string(), "");
    }

    #[test]
    fn page_size_is_clamped() {
        assert_eq!(JobListView::from_query("pageSize=500").page_size(), MAX_PAGE_SIZE);
        assert_eq!(JobListView::from_query("pageSize=0").page_size(), DEFAULT_PAGE_SIZE);
        assert_eq!(JobListView::from_query("pageSize=abc").page_size(), DEFAULT_PAGE_SIZE);
        assert_eq!(JobListView::from_query("page=0").page(), 1);
    }
}

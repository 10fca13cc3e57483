//! List-filter query dialects
//!
//! Every adapter supports the same four filter dimensions plus offset
//! pagination; vendors only disagree on parameter names and date encoding.

use billsync_domain::{PageRequest, TimeEntryFilter};

use super::dates::DateStyle;

/// Parameter names a vendor uses for the common filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterDialect {
    pub date_from: &'static str,
    pub date_to: &'static str,
    pub client: &'static str,
    pub matter: &'static str,
    pub user: &'static str,
    pub limit: &'static str,
    pub offset: &'static str,
    pub date_style: DateStyle,
}

/// Query string pairs in insertion order
pub type QueryParams = Vec<(&'static str, String)>;

impl FilterDialect {
    /// Query parameters for a time-entry listing
    pub fn time_entry_params(&self, filter: &TimeEntryFilter) -> QueryParams {
        let mut params = QueryParams::new();
        if let Some(from) = filter.date_from {
            params.push((self.date_from, self.date_style.format(from)));
        }
        if let Some(to) = filter.date_to {
            params.push((self.date_to, self.date_style.format(to)));
        }
        if let Some(client) = non_blank(filter.client_id.as_deref()) {
            params.push((self.client, client.to_string()));
        }
        if let Some(matter) = non_blank(filter.matter_id.as_deref()) {
            params.push((self.matter, matter.to_string()));
        }
        if let Some(user) = non_blank(filter.user_id.as_deref()) {
            params.push((self.user, user.to_string()));
        }
        params.extend(self.page_params(filter.page));
        params
    }

    /// Pagination parameters, with the limit clamped to the supported range
    pub fn page_params(&self, page: PageRequest) -> QueryParams {
        let page = PageRequest::new(page.limit, page.offset);
        vec![(self.limit, page.limit.to_string()), (self.offset, page.offset.to_string())]
    }

    /// Pagination plus an optional client scope, as used for matter listings
    pub fn scoped_page_params(&self, client_id: Option<&str>, page: PageRequest) -> QueryParams {
        let mut params = QueryParams::new();
        if let Some(client) = non_blank(client_id) {
            params.push((self.client, client.to_string()));
        }
        params.extend(self.page_params(page));
        params
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

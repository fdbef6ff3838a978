use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;
use utoipa::ToSchema;

/// Maps public field names to trusted, qualified column expressions.
///
/// Column identifiers placed in SQL text only ever come from here; request
/// values are always bound as parameters.
#[derive(Debug, Clone, Copy)]
pub struct FieldWhitelist {
    fields: &'static [(&'static str, &'static str)],
}

impl FieldWhitelist {
    pub const fn new(fields: &'static [(&'static str, &'static str)]) -> Self {
        Self { fields }
    }

    pub fn column(&self, key: &str) -> Option<&'static str> {
        self.fields
            .iter()
            .find(|(public, _)| *public == key)
            .map(|(_, column)| *column)
    }

    #[cfg(test)]
    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|(_, column)| *column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SortField {
    #[schema(example = "name")]
    pub key: String,
    #[schema(example = "asc")]
    #[serde(default)]
    pub order: String,
}

/// List request body shared by every `GetData`/`logs` endpoint.
#[derive(Debug, Default, Clone, Deserialize, ToSchema)]
pub struct QueryParams {
    #[schema(example = 1)]
    pub page: Option<i64>,
    #[schema(example = 10)]
    pub per_page: Option<i64>,
    #[serde(default)]
    pub sort_by: Vec<SortField>,
    /// Keys may end in `.gte`, `.lte` or `.like`; bare keys match as substrings.
    #[serde(default)]
    #[schema(example = json!({"name": "john", "dateAttendance.gte": "2024-01-01"}))]
    pub filter: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub offset: i64,
    pub limit: i64,
    /// false: no LIMIT/OFFSET, the whole result set is returned.
    pub enabled: bool,
}

/// `WHERE` continuation plus its positional arguments, in clause order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSql {
    pub sql: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ListMeta {
    #[schema(example = 25)]
    pub total: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = 2)]
    pub page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = 10)]
    pub per_page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = 3)]
    pub total_pages: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<Vec<SortField>>,
}

const DEFAULT_PER_PAGE: i64 = 10;

/// Builds `ORDER BY col DIR, ...` from whitelisted keys, or `""` when none survive.
pub fn build_sort_sql(sort_by: &[SortField], whitelist: &FieldWhitelist) -> String {
    let clauses: Vec<String> = sort_by
        .iter()
        .filter_map(|sort| {
            let Some(column) = whitelist.column(&sort.key) else {
                warn!(field = %sort.key, "Sort field is not allowed");
                return None;
            };

            let order = match sort.order.to_uppercase().as_str() {
                "DESC" => "DESC",
                _ => "ASC",
            };

            Some(format!("{} {}", column, order))
        })
        .collect();

    if clauses.is_empty() {
        return String::new();
    }

    format!("ORDER BY {}", clauses.join(", "))
}

/// Splits a filter key into its base field, SQL operator and bound argument.
fn filter_clause<'a>(key: &'a str, value: &str) -> (&'a str, &'static str, String) {
    if let Some(field) = key.strip_suffix(".gte") {
        (field, ">=", value.to_string())
    } else if let Some(field) = key.strip_suffix(".lte") {
        (field, "<=", value.to_string())
    } else if let Some(field) = key.strip_suffix(".like") {
        (field, "LIKE", format!("%{}%", value))
    } else {
        (key, "LIKE", format!("%{}%", value))
    }
}

/// Builds `AND col OP ? AND ...` for whitelisted filter keys.
///
/// The fragment starts with `AND`, so the caller's `WHERE` must already hold
/// a condition (the soft-delete check in practice).
pub fn build_filter_sql(
    filter: &BTreeMap<String, String>,
    whitelist: &FieldWhitelist,
) -> FilterSql {
    let mut clauses = Vec::new();
    let mut args = Vec::new();

    for (key, value) in filter {
        let (field, op, arg) = filter_clause(key, value);

        let Some(column) = whitelist.column(field) else {
            warn!(field = %key, "Filter field is not allowed");
            continue;
        };

        clauses.push(format!("{} {} ?", column, op));
        args.push(arg);
    }

    if clauses.is_empty() {
        return FilterSql::default();
    }

    FilterSql {
        sql: format!("AND {}", clauses.join(" AND ")),
        args,
    }
}

pub fn build_pagination(page: Option<i64>, per_page: Option<i64>) -> Pagination {
    let (Some(page), Some(per_page)) = (page, per_page) else {
        return Pagination {
            offset: 0,
            limit: 0,
            enabled: false,
        };
    };

    let page = page.max(1);
    let per_page = if per_page < 1 { DEFAULT_PER_PAGE } else { per_page };

    Pagination {
        // saturates instead of wrapping negative on huge client values
        offset: (page - 1).saturating_mul(per_page),
        limit: per_page,
        enabled: true,
    }
}

/// `meta` block of a list response. Page fields echo the normalized values
/// used for LIMIT/OFFSET.
pub fn build_meta(
    page: Option<i64>,
    per_page: Option<i64>,
    total: i64,
    sort_by: &[SortField],
) -> ListMeta {
    let mut meta = ListMeta {
        total,
        page: None,
        per_page: None,
        total_pages: None,
        sort_by: None,
    };

    if let (Some(page), Some(per_page)) = (page, per_page) {
        let per_page = if per_page < 1 { DEFAULT_PER_PAGE } else { per_page };
        meta.page = Some(page.max(1));
        meta.per_page = Some(per_page);
        meta.total_pages = Some(total / per_page + (total % per_page != 0) as i64);
    }

    if !sort_by.is_empty() {
        meta.sort_by = Some(sort_by.to_vec());
    }

    meta
}

/// Everything a list handler needs to assemble its data and count queries.
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub filter: FilterSql,
    pub order_by: String,
    pub pagination: Pagination,
}

impl ListQuery {
    pub fn new(params: &QueryParams, whitelist: &FieldWhitelist) -> Self {
        Self {
            filter: build_filter_sql(&params.filter, whitelist),
            order_by: build_sort_sql(&params.sort_by, whitelist),
            pagination: build_pagination(params.page, params.per_page),
        }
    }

    /// `LIMIT ? OFFSET ?` when paginating; bind `limit` then `offset` after the filter args.
    pub fn limit_sql(&self) -> &'static str {
        if self.pagination.enabled {
            "LIMIT ? OFFSET ?"
        } else {
            ""
        }
    }
}

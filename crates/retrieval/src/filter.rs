//! Rendering of a disjunctive scope set into backend filter syntax.
//!
//! The vector store keeps passage metadata as JSON with `file_name` and
//! `page_number` keys. Each [`DocumentScope`] becomes one conjunctive clause;
//! clauses are OR-joined.

use mathtutor_core::error::RetrievalError;
use mathtutor_core::retrieval::DocumentScope;

/// A value bound to a placeholder in a rendered filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterBind {
    Text(String),
    Page(i32),
}

/// A parameterized SQL predicate plus its binds, in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFilter {
    pub clause: String,
    pub binds: Vec<FilterBind>,
}

/// Render a scope set as a SQL predicate over `metadata` whose first
/// placeholder is `$first_placeholder`.
///
/// Returns `Ok(None)` for an empty scope set (no restriction).
pub fn to_sql(
    scopes: &[DocumentScope],
    first_placeholder: usize,
) -> Result<Option<SqlFilter>, RetrievalError> {
    if scopes.is_empty() {
        return Ok(None);
    }

    let mut clauses = Vec::with_capacity(scopes.len());
    let mut binds = Vec::with_capacity(scopes.len() * 3);
    let mut next = first_placeholder;

    for scope in scopes {
        if scope.page_min > scope.page_max {
            return Err(RetrievalError::InvalidFilter(format!(
                "page range {}..{} for '{}' is inverted",
                scope.page_min, scope.page_max, scope.source_id
            )));
        }
        let min = page_bind(scope.page_min)?;
        let max = page_bind(scope.page_max)?;

        clauses.push(format!(
            "(metadata->>'file_name' = ${} AND (metadata->>'page_number')::int BETWEEN ${} AND ${})",
            next,
            next + 1,
            next + 2
        ));
        binds.push(FilterBind::Text(scope.source_id.clone()));
        binds.push(FilterBind::Page(min));
        binds.push(FilterBind::Page(max));
        next += 3;
    }

    Ok(Some(SqlFilter {
        clause: format!("({})", clauses.join(" OR ")),
        binds,
    }))
}

fn page_bind(page: u32) -> Result<i32, RetrievalError> {
    i32::try_from(page)
        .map_err(|_| RetrievalError::InvalidFilter(format!("page {page} out of range")))
}

/// Human-readable filter expression, for logs.
///
/// `file_name == 'a.pdf' && page_number >= 1 && page_number <= 9 || ...`
pub fn describe(scopes: &[DocumentScope]) -> String {
    if scopes.is_empty() {
        return "<unrestricted>".into();
    }
    scopes
        .iter()
        .map(|s| {
            format!(
                "file_name == '{}' && page_number >= {} && page_number <= {}",
                s.source_id, s.page_min, s.page_max
            )
        })
        .collect::<Vec<_>>()
        .join(" || ")
}

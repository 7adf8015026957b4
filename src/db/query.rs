//! Backend-neutral query description.
//!
//! Engines describe what they want as a `Query` (table, predicates, ordering,
//! window, count flag); the store decides how to execute it.

use serde_json::Value;

use super::schema::Table;

/// A JSON object keyed by column name.
pub type Row = serde_json::Map<String, Value>;

/// A single predicate. All predicates of a query are AND-ed.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(&'static str, Value),
    Neq(&'static str, Value),
    /// `column IS NULL OR column = false`
    NullOrFalse(&'static str),
    Gte(&'static str, Value),
    Lte(&'static str, Value),
    In(&'static str, Vec<Value>),
    /// Case-insensitive substring match OR-ed across the columns.
    ContainsAny(Vec<&'static str>, String),
}

impl Filter {
    pub fn eq(column: &'static str, value: impl Into<Value>) -> Self {
        Self::Eq(column, value.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub column: &'static str,
    pub ascending: bool,
}

/// Row window, expressed as an offset plus page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: Table,
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub window: Option<Window>,
    /// Also report the number of rows matching `filters`, ignoring the window.
    pub count: bool,
}

impl Query {
    pub fn table(table: Table) -> Self {
        Self {
            table,
            filters: Vec::new(),
            order: Vec::new(),
            window: None,
            count: false,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn order_by(mut self, column: &'static str, ascending: bool) -> Self {
        self.order.push(Order { column, ascending });
        self
    }

    pub fn range(mut self, offset: u64, limit: u64) -> Self {
        self.window = Some(Window { offset, limit });
        self
    }

    pub fn with_count(mut self) -> Self {
        self.count = true;
        self
    }
}

/// Result of a select: the rows in the window, plus the total when requested.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub rows: Vec<Row>,
    pub count: Option<u64>,
}

/// Escape `%`, `_` and the escape character itself for a LIKE pattern.
pub fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates_parts() {
        let q = Query::table(Table::Patients)
            .filter(Filter::eq("user_id", "u1"))
            .filter(Filter::NullOrFalse("is_deleted"))
            .order_by("created_at", false)
            .range(10, 5)
            .with_count();
        assert_eq!(q.filters.len(), 2);
        assert_eq!(q.order, vec![Order { column: "created_at", ascending: false }]);
        assert_eq!(q.window, Some(Window { offset: 10, limit: 5 }));
        assert!(q.count);
    }

    #[test]
    fn escape_like_handles_wildcards() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }
}

//! Translation of [`FilterCriteria`] into SQL over the `entries` table.
//!
//! Keyword search goes through a [`TextIndex`]. The FTS5 trigram index is
//! preferred; keywords too short for trigrams fall back to a folded `LIKE`
//! scan over the same column text, so both paths return the same rows.

use super::fts5::column_expr;
use crate::config::StoreConfig;
use crate::criteria::{FilterCriteria, SearchField, SortColumn, SortOrder, StatusFilter};
use rusqlite::types::Value;
use std::collections::BTreeSet;

/// Name of the scalar function registered on every store connection for
/// Unicode-aware lower-casing.
pub const FOLD_FUNCTION: &str = "poview_fold";

/// FTS5 column holding the text of a search field.
pub fn search_column(field: SearchField) -> &'static str {
    match field {
        SearchField::Context => "msgctxt",
        SearchField::Source => "msgid",
        SearchField::Translation => "msgstr",
        SearchField::Comments => "comments",
        SearchField::References => "refs",
    }
}

/// Capability for resolving a keyword to a SQL predicate on `e` (the
/// `entries` alias).
pub trait TextIndex: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether this index can answer the (normalized) keyword.
    fn supports(&self, keyword: &str) -> bool;

    /// Build a predicate restricting `e` to rows whose scoped fields contain
    /// `keyword`, pushing its bind values onto `params`.
    fn predicate(
        &self,
        keyword: &str,
        scope: &BTreeSet<SearchField>,
        params: &mut Vec<Value>,
    ) -> String;
}

/// Keyword search through the FTS5 trigram table.
#[derive(Debug, Clone)]
pub struct Fts5TrigramIndex {
    table: String,
}

impl Fts5TrigramIndex {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }
}

impl Default for Fts5TrigramIndex {
    fn default() -> Self {
        Self::new(StoreConfig::FTS_TABLE)
    }
}

impl TextIndex for Fts5TrigramIndex {
    fn name(&self) -> &'static str {
        "fts5-trigram"
    }

    fn supports(&self, keyword: &str) -> bool {
        keyword.chars().count() >= StoreConfig::TRIGRAM_MIN_CHARS
    }

    fn predicate(
        &self,
        keyword: &str,
        scope: &BTreeSet<SearchField>,
        params: &mut Vec<Value>,
    ) -> String {
        params.push(Value::Text(build_match_expression(keyword, scope)));
        format!(
            "e.key IN (SELECT key FROM {table} WHERE {table} MATCH ?)",
            table = self.table
        )
    }
}

/// Keyword search by scanning folded column text with `LIKE`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringScan;

impl TextIndex for SubstringScan {
    fn name(&self) -> &'static str {
        "substring-scan"
    }

    fn supports(&self, keyword: &str) -> bool {
        !keyword.is_empty()
    }

    fn predicate(
        &self,
        keyword: &str,
        scope: &BTreeSet<SearchField>,
        params: &mut Vec<Value>,
    ) -> String {
        let pattern = format!("%{}%", escape_like(keyword));
        let parts: Vec<String> = scope
            .iter()
            .filter_map(|field| column_expr(search_column(*field), "e"))
            .map(|expr| {
                params.push(Value::Text(pattern.clone()));
                format!("{}({}) LIKE ? ESCAPE '\\'", FOLD_FUNCTION, expr)
            })
            .collect();

        if parts.is_empty() {
            "0".to_string()
        } else {
            format!("({})", parts.join(" OR "))
        }
    }
}

/// Build an FTS5 MATCH expression: one quoted phrase restricted to the
/// scoped columns.
///
/// - `cat`, scope {Source} → `{msgid} : "cat"`
/// - `say "hi"`, scope {Source, Translation} → `{msgid msgstr} : "say ""hi"""`
pub fn build_match_expression(keyword: &str, scope: &BTreeSet<SearchField>) -> String {
    let columns: Vec<&str> = scope.iter().map(|f| search_column(*f)).collect();
    format!(
        "{{{}}} : \"{}\"",
        columns.join(" "),
        keyword.replace('"', "\"\"")
    )
}

/// Escape `LIKE` wildcards with a backslash.
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

/// A compiled query: `WHERE` body, its parameters, and ordering/paging.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub where_clause: String,
    pub params: Vec<Value>,
    pub order_by: String,
    pub limit: Option<(usize, usize)>,
    /// Index that served the keyword, if any.
    pub text_index: Option<&'static str>,
}

impl QueryPlan {
    /// SQL selecting the given columns of matching rows, ordered and paged.
    pub fn select_sql(&self, columns: &str) -> String {
        let mut sql = format!(
            "SELECT {} FROM entries e WHERE {} ORDER BY {}",
            columns, self.where_clause, self.order_by
        );
        if let Some((limit, offset)) = self.limit {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset));
        }
        sql
    }

    /// SQL counting all matching rows, ignoring paging.
    pub fn count_sql(&self) -> String {
        format!("SELECT COUNT(*) FROM entries e WHERE {}", self.where_clause)
    }
}

/// Planner from criteria to [`QueryPlan`].
pub struct QueryEngine {
    indexes: Vec<Box<dyn TextIndex>>,
}

impl QueryEngine {
    /// Engine preferring the trigram index, with the scan as fallback.
    pub fn new() -> Self {
        Self::with_indexes(vec![
            Box::new(Fts5TrigramIndex::default()),
            Box::new(SubstringScan),
        ])
    }

    /// Engine that never touches the FTS5 table.
    pub fn substring_only() -> Self {
        Self::with_indexes(vec![Box::new(SubstringScan)])
    }

    /// Indexes are tried in order; the first that supports a keyword wins.
    pub fn with_indexes(indexes: Vec<Box<dyn TextIndex>>) -> Self {
        Self { indexes }
    }

    pub fn plan(&self, criteria: &FilterCriteria) -> QueryPlan {
        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<Value> = Vec::new();
        let mut text_index = None;

        let keyword = criteria.keyword();
        if !keyword.is_empty() {
            let scope = criteria.scope();
            match self.indexes.iter().find(|idx| idx.supports(&keyword)) {
                Some(index) => {
                    clauses.push(index.predicate(&keyword, &scope, &mut params));
                    text_index = Some(index.name());
                }
                None => {
                    // No index can serve the keyword
                    tracing::warn!("No text index supports keyword {:?}", keyword);
                    clauses.push("0".to_string());
                }
            }
        }

        if let Some(clause) = status_clause(criteria.status()) {
            clauses.push(clause.to_string());
        }

        for flag in criteria.include_flags() {
            clauses.push(
                "EXISTS (SELECT 1 FROM json_each(e.flags_json) WHERE value = ?)".to_string(),
            );
            params.push(Value::Text(flag.to_string()));
        }
        for flag in criteria.exclude_flags() {
            clauses.push(
                "NOT EXISTS (SELECT 1 FROM json_each(e.flags_json) WHERE value = ?)".to_string(),
            );
            params.push(Value::Text(flag.to_string()));
        }

        let where_clause = if clauses.is_empty() {
            "1=1".to_string()
        } else {
            clauses.join(" AND ")
        };

        let sort = criteria.sort();
        let order_by = format!(
            "{} {}, e.position ASC, e.key ASC",
            sort_expression(sort.column),
            match sort.order {
                SortOrder::Asc => "ASC",
                SortOrder::Desc => "DESC",
            }
        );

        QueryPlan {
            where_clause,
            params,
            order_by,
            limit: criteria.page().map(|p| (p.limit, p.offset)),
            text_index,
        }
    }
}

impl Default for QueryEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn status_clause(status: StatusFilter) -> Option<&'static str> {
    match status {
        StatusFilter::All => None,
        StatusFilter::Translated => Some("(e.msgstr <> '' AND e.fuzzy = 0)"),
        StatusFilter::Untranslated => Some("(e.msgstr = '' AND e.fuzzy = 0)"),
        StatusFilter::Fuzzy => Some("e.fuzzy = 1"),
        StatusFilter::FuzzyOrUntranslated => Some("(e.fuzzy = 1 OR e.msgstr = '')"),
        StatusFilter::Obsolete => Some("e.obsolete = 1"),
    }
}

fn sort_expression(column: SortColumn) -> &'static str {
    match column {
        SortColumn::Position => "e.position",
        SortColumn::Source => "e.msgid COLLATE NOCASE",
        SortColumn::Translation => "e.msgstr COLLATE NOCASE",
        SortColumn::Context => "COALESCE(e.msgctxt, '') COLLATE NOCASE",
        // untranslated < fuzzy < translated
        SortColumn::Status => {
            "CASE WHEN e.fuzzy = 1 THEN 1 WHEN e.msgstr = '' THEN 0 ELSE 2 END"
        }
        SortColumn::Score => "COALESCE(e.score, -1)",
    }
}

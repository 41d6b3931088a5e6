//! Filter criteria and cache key derivation.
//!
//! [`FilterCriteria`] is the closed description of a filtered entry list:
//! keyword, status predicate, flag inclusion/exclusion, search scope, sort
//! and page. [`FilterCriteria::cache_key`] hashes a canonical form of it so
//! that criteria denoting the same query share one filter-result slot, no
//! matter how they were built.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Translation-state predicate.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    #[default]
    All,
    /// Non-empty translation, not fuzzy.
    Translated,
    /// Empty translation, not fuzzy.
    Untranslated,
    Fuzzy,
    FuzzyOrUntranslated,
    Obsolete,
}

/// Entry field a keyword is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchField {
    Context,
    Source,
    Translation,
    Comments,
    References,
}

impl SearchField {
    pub const ALL: [SearchField; 5] = [
        SearchField::Context,
        SearchField::Source,
        SearchField::Translation,
        SearchField::Comments,
        SearchField::References,
    ];

    /// Fields searched when no scope is given.
    pub const DEFAULT_SCOPE: [SearchField; 2] = [SearchField::Source, SearchField::Translation];
}

/// Column a filtered list is ordered by.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    #[default]
    Position,
    Source,
    Translation,
    Context,
    Status,
    Score,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// Parse `asc`/`desc` in any case; anything else is ascending.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("desc") {
            SortOrder::Desc
        } else {
            SortOrder::Asc
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SortSpec {
    #[serde(default)]
    pub column: SortColumn,
    #[serde(default)]
    pub order: SortOrder,
}

impl SortSpec {
    pub fn new(column: SortColumn, order: SortOrder) -> Self {
        Self { column, order }
    }
}

/// Pagination window pushed into the store query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Page {
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

/// Immutable description of a filtered entry list.
///
/// Build one with [`FilterCriteria::builder`]. Raw inputs are kept as given;
/// [`FilterCriteria::keyword`], [`FilterCriteria::scope`] and
/// [`FilterCriteria::cache_key`] expose the normalized view the query engine
/// and the cache agree on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    keyword: String,
    status: StatusFilter,
    include_flags: BTreeSet<String>,
    exclude_flags: BTreeSet<String>,
    scope: BTreeSet<SearchField>,
    sort: SortSpec,
    page: Option<Page>,
}

impl FilterCriteria {
    pub fn builder() -> FilterCriteriaBuilder {
        FilterCriteriaBuilder::default()
    }

    /// Criteria matching every entry in display order.
    pub fn all() -> Self {
        Self::default()
    }

    /// Criteria with only a keyword.
    pub fn keyword_only(keyword: impl Into<String>) -> Self {
        Self::builder().keyword(keyword).build()
    }

    /// Normalized keyword: trimmed and lower-cased.
    pub fn keyword(&self) -> String {
        self.keyword.trim().to_lowercase()
    }

    pub fn has_keyword(&self) -> bool {
        !self.keyword.trim().is_empty()
    }

    pub fn status(&self) -> StatusFilter {
        self.status
    }

    pub fn include_flags(&self) -> impl Iterator<Item = &str> {
        normalized_flags(&self.include_flags)
    }

    pub fn exclude_flags(&self) -> impl Iterator<Item = &str> {
        normalized_flags(&self.exclude_flags)
    }

    /// Effective search scope; empty input means the default scope.
    pub fn scope(&self) -> BTreeSet<SearchField> {
        if self.scope.is_empty() {
            SearchField::DEFAULT_SCOPE.into_iter().collect()
        } else {
            self.scope.clone()
        }
    }

    pub fn sort(&self) -> SortSpec {
        self.sort
    }

    pub fn page(&self) -> Option<Page> {
        self.page
    }

    /// Canonical form used for hashing.
    fn canonical(&self) -> CanonicalCriteria {
        let keyword = self.keyword();
        // Scope only matters when there is something to search for
        let scope = if keyword.is_empty() {
            Vec::new()
        } else {
            self.scope().into_iter().collect()
        };
        CanonicalCriteria {
            version: CanonicalCriteria::VERSION,
            keyword,
            status: self.status,
            include_flags: self.include_flags().map(str::to_string).collect(),
            exclude_flags: self.exclude_flags().map(str::to_string).collect(),
            scope,
            sort: self.sort,
            page: self.page,
        }
    }

    /// Derive the filter-result cache key.
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::from_canonical(&self.canonical())
    }
}

fn normalized_flags(flags: &BTreeSet<String>) -> impl Iterator<Item = &str> {
    // BTreeSet keeps the order canonical; trimming may create duplicates
    let mut seen = BTreeSet::new();
    flags
        .iter()
        .map(|f| f.trim())
        .filter(move |f| !f.is_empty() && seen.insert(*f))
}

#[derive(Serialize)]
struct CanonicalCriteria {
    version: u8,
    keyword: String,
    status: StatusFilter,
    include_flags: BTreeSet<String>,
    exclude_flags: BTreeSet<String>,
    scope: Vec<SearchField>,
    sort: SortSpec,
    page: Option<Page>,
}

impl CanonicalCriteria {
    const VERSION: u8 = 1;
}

/// Builder for [`FilterCriteria`].
#[derive(Debug, Clone, Default)]
pub struct FilterCriteriaBuilder {
    inner: FilterCriteria,
}

impl FilterCriteriaBuilder {
    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.inner.keyword = keyword.into();
        self
    }

    pub fn status(mut self, status: StatusFilter) -> Self {
        self.inner.status = status;
        self
    }

    pub fn include_flag(mut self, flag: impl Into<String>) -> Self {
        self.inner.include_flags.insert(flag.into());
        self
    }

    pub fn exclude_flag(mut self, flag: impl Into<String>) -> Self {
        self.inner.exclude_flags.insert(flag.into());
        self
    }

    pub fn search_field(mut self, field: SearchField) -> Self {
        self.inner.scope.insert(field);
        self
    }

    pub fn scope(mut self, fields: impl IntoIterator<Item = SearchField>) -> Self {
        self.inner.scope = fields.into_iter().collect();
        self
    }

    pub fn sort(mut self, column: SortColumn, order: SortOrder) -> Self {
        self.inner.sort = SortSpec::new(column, order);
        self
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.inner.page = Some(Page { limit, offset });
        self
    }

    pub fn build(self) -> FilterCriteria {
        self.inner
    }
}

/// Fixed-size identifier of a filter-result cache slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(blake3::Hash);

impl CacheKey {
    fn from_canonical(canonical: &CanonicalCriteria) -> Self {
        // Serializing a struct of plain values and ordered sets cannot fail
        let encoded = serde_json::to_vec(canonical).unwrap_or_default();
        CacheKey(blake3::hash(&encoded))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ignores_predicate_order() {
        let a = FilterCriteria::builder()
            .include_flag("c-format")
            .include_flag("fuzzy")
            .exclude_flag("no-wrap")
            .build();
        let b = FilterCriteria::builder()
            .exclude_flag("no-wrap")
            .include_flag("fuzzy")
            .include_flag("c-format")
            .build();
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_key_ignores_keyword_case_and_padding() {
        let a = FilterCriteria::keyword_only("  Cat ");
        let b = FilterCriteria::keyword_only("cat");
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_key_ignores_scope_order() {
        let a = FilterCriteria::builder()
            .keyword("x")
            .search_field(SearchField::Comments)
            .search_field(SearchField::Source)
            .build();
        let b = FilterCriteria::builder()
            .keyword("x")
            .scope([SearchField::Source, SearchField::Comments])
            .build();
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_default_scope_equals_explicit_default() {
        let implicit = FilterCriteria::keyword_only("x");
        let explicit = FilterCriteria::builder()
            .keyword("x")
            .scope(SearchField::DEFAULT_SCOPE)
            .build();
        assert_eq!(implicit.cache_key(), explicit.cache_key());
    }

    #[test]
    fn test_scope_is_irrelevant_without_keyword() {
        let a = FilterCriteria::builder().search_field(SearchField::Comments).build();
        assert_eq!(a.cache_key(), FilterCriteria::all().cache_key());
    }

    #[test]
    fn test_trimmed_flags_collapse() {
        let a = FilterCriteria::builder().include_flag(" fuzzy").include_flag("fuzzy").build();
        let b = FilterCriteria::builder().include_flag("fuzzy").build();
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(a.include_flags().collect::<Vec<_>>(), vec!["fuzzy"]);
    }

    #[test]
    fn test_different_queries_get_different_keys() {
        let base = FilterCriteria::keyword_only("cat");
        let variants = [
            FilterCriteria::keyword_only("dog"),
            FilterCriteria::builder().keyword("cat").status(StatusFilter::Fuzzy).build(),
            FilterCriteria::builder()
                .keyword("cat")
                .sort(SortColumn::Source, SortOrder::Desc)
                .build(),
            FilterCriteria::builder().keyword("cat").page(10, 0).build(),
            FilterCriteria::builder().keyword("cat").include_flag("fuzzy").build(),
            FilterCriteria::builder().keyword("cat").exclude_flag("fuzzy").build(),
        ];
        for variant in &variants {
            assert_ne!(base.cache_key(), variant.cache_key(), "{:?}", variant);
        }
    }

    #[test]
    fn test_cache_key_display_is_hex() {
        let key = FilterCriteria::all().cache_key();
        let hex = key.to_string();
        assert_eq!(hex.len(), 64);
        assert_eq!(hex, key.to_hex());
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_deserialize_from_partial_json() {
        let criteria: FilterCriteria =
            serde_json::from_str(r#"{"keyword": "Cat", "status": "fuzzy"}"#).unwrap();
        assert_eq!(criteria.keyword(), "cat");
        assert_eq!(criteria.status(), StatusFilter::Fuzzy);
        assert_eq!(criteria.sort(), SortSpec::default());
    }

    #[test]
    fn test_sort_order_parse() {
        assert_eq!(SortOrder::parse("DESC"), SortOrder::Desc);
        assert_eq!(SortOrder::parse("asc"), SortOrder::Asc);
        assert_eq!(SortOrder::parse("sideways"), SortOrder::Asc);
    }
}

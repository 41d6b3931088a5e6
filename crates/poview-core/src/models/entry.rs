//! Translation entry records.

use crate::config::StoreConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Separator between context and source text in a composite key.
pub const CONTEXT_SEPARATOR: char = '\u{4}';

/// One translatable unit as held by the entry store.
///
/// Records are plain owned values. The cache shares them as
/// `Arc<EntryRecord>` and never mutates them; edits go through the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EntryRecord {
    /// Composite identity: context + source text. Derived from
    /// `msgctxt`/`msgid` when left empty, see [`EntryRecord::ensure_key`].
    #[serde(default)]
    pub key: String,
    /// Display position within the catalog.
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub msgctxt: Option<String>,
    pub msgid: String,
    #[serde(default)]
    pub msgid_plural: Option<String>,
    #[serde(default)]
    pub msgstr: String,
    /// Plural translations indexed by plural form.
    #[serde(default)]
    pub msgstr_plural: BTreeMap<u32, String>,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub obsolete: bool,
    /// Extracted (developer) comment.
    #[serde(default)]
    pub comment: Option<String>,
    /// Translator comment.
    #[serde(default)]
    pub tcomment: Option<String>,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub review: Option<ReviewData>,
    /// Stamped by the store on every write.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Review metadata attached to an entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReviewData {
    #[serde(default)]
    pub score: Option<u32>,
    #[serde(default)]
    pub review_comments: Vec<ReviewComment>,
    #[serde(default)]
    pub metric_scores: BTreeMap<String, u32>,
}

/// A reviewer comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewComment {
    pub id: String,
    #[serde(default)]
    pub author: Option<String>,
    pub comment: String,
}

/// Translation state of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Translated,
    Untranslated,
    Fuzzy,
}

impl EntryRecord {
    /// Create a record, deriving its key from context and source text.
    pub fn new(msgctxt: Option<&str>, msgid: impl Into<String>, msgstr: impl Into<String>) -> Self {
        let msgid = msgid.into();
        let msgctxt = msgctxt.filter(|c| !c.is_empty()).map(str::to_string);
        Self {
            key: Self::make_key(msgctxt.as_deref(), &msgid),
            position: 0,
            msgctxt,
            msgid,
            msgid_plural: None,
            msgstr: msgstr.into(),
            msgstr_plural: BTreeMap::new(),
            flags: Vec::new(),
            obsolete: false,
            comment: None,
            tcomment: None,
            references: Vec::new(),
            review: None,
            updated_at: None,
        }
    }

    /// Build the composite key for a context/source pair.
    ///
    /// - with context: `"{msgctxt}\u{4}{msgid}"`
    /// - without: `"|{msgid}"`
    pub fn make_key(msgctxt: Option<&str>, msgid: &str) -> String {
        match msgctxt {
            Some(ctx) if !ctx.is_empty() => format!("{}{}{}", ctx, CONTEXT_SEPARATOR, msgid),
            _ => format!("|{}", msgid),
        }
    }

    /// Fill in the composite key if it was left empty.
    pub fn ensure_key(&mut self) {
        if self.key.is_empty() {
            self.key = Self::make_key(self.msgctxt.as_deref(), &self.msgid);
        }
    }

    pub fn with_position(mut self, position: i64) -> Self {
        self.position = position;
        self
    }

    pub fn with_flag(mut self, flag: &str) -> Self {
        self.set_flag(flag, true);
        self
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    /// Add or remove a flag. Returns whether the record changed.
    pub fn set_flag(&mut self, flag: &str, on: bool) -> bool {
        let flag = flag.trim();
        if flag.is_empty() {
            return false;
        }
        match (on, self.has_flag(flag)) {
            (true, false) => {
                self.flags.push(flag.to_string());
                true
            }
            (false, true) => {
                self.flags.retain(|f| f != flag);
                true
            }
            _ => false,
        }
    }

    pub fn is_fuzzy(&self) -> bool {
        self.has_flag(StoreConfig::FUZZY_FLAG)
    }

    /// Translated: non-empty translation and not fuzzy.
    pub fn is_translated(&self) -> bool {
        !self.msgstr.is_empty() && !self.is_fuzzy()
    }

    pub fn status(&self) -> EntryStatus {
        if self.is_fuzzy() {
            EntryStatus::Fuzzy
        } else if self.msgstr.is_empty() {
            EntryStatus::Untranslated
        } else {
            EntryStatus::Translated
        }
    }

    /// Rough heap footprint used for cache memory accounting.
    pub fn estimated_size(&self) -> usize {
        let opt = |s: &Option<String>| s.as_ref().map_or(0, String::len);
        let mut size = std::mem::size_of::<Self>()
            + self.key.len()
            + self.msgid.len()
            + self.msgstr.len()
            + opt(&self.msgctxt)
            + opt(&self.msgid_plural)
            + opt(&self.comment)
            + opt(&self.tcomment);
        size += self
            .msgstr_plural
            .values()
            .map(|s| s.len() + std::mem::size_of::<(u32, String)>())
            .sum::<usize>();
        size += self
            .flags
            .iter()
            .chain(self.references.iter())
            .map(|s| s.len() + std::mem::size_of::<String>())
            .sum::<usize>();
        if let Some(review) = &self.review {
            size += std::mem::size_of::<ReviewData>();
            size += review
                .review_comments
                .iter()
                .map(|c| c.id.len() + c.comment.len() + opt(&c.author))
                .sum::<usize>();
            size += review.metric_scores.keys().map(|k| k.len() + 4).sum::<usize>();
        }
        size
    }
}

/// Catalog-wide translation progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryStatistics {
    pub total: usize,
    pub translated: usize,
    pub fuzzy: usize,
    pub untranslated: usize,
    pub obsolete: usize,
    /// Percentage of translated entries (0.0-100.0).
    pub progress: f64,
}

impl EntryStatistics {
    pub fn new(
        total: usize,
        translated: usize,
        fuzzy: usize,
        untranslated: usize,
        obsolete: usize,
    ) -> Self {
        let progress = if total == 0 {
            0.0
        } else {
            translated as f64 / total as f64 * 100.0
        };
        Self {
            total,
            translated,
            fuzzy,
            untranslated,
            obsolete,
            progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_without_context() {
        let record = EntryRecord::new(None, "Open", "Ouvrir");
        assert_eq!(record.key, "|Open");
    }

    #[test]
    fn test_ensure_key_from_json() {
        let mut record: EntryRecord =
            serde_json::from_str(r#"{"msgctxt": "menu", "msgid": "Open"}"#).unwrap();
        assert!(record.key.is_empty());
        record.ensure_key();
        assert_eq!(record.key, EntryRecord::make_key(Some("menu"), "Open"));
    }

    #[test]
    fn test_key_with_context() {
        let record = EntryRecord::new(Some("menu"), "Open", "");
        assert_eq!(record.key, "menu\u{4}Open");
        // Empty context behaves like no context
        assert_eq!(EntryRecord::new(Some(""), "Open", "").key, "|Open");
    }

    #[test]
    fn test_status() {
        let translated = EntryRecord::new(None, "a", "b");
        let untranslated = EntryRecord::new(None, "a", "");
        let fuzzy = EntryRecord::new(None, "a", "b").with_flag("fuzzy");

        assert_eq!(translated.status(), EntryStatus::Translated);
        assert_eq!(untranslated.status(), EntryStatus::Untranslated);
        assert_eq!(fuzzy.status(), EntryStatus::Fuzzy);
        assert!(!fuzzy.is_translated());
    }

    #[test]
    fn test_set_flag_is_idempotent() {
        let mut record = EntryRecord::new(None, "a", "b");
        assert!(record.set_flag("fuzzy", true));
        assert!(!record.set_flag("fuzzy", true));
        assert_eq!(record.flags, vec!["fuzzy"]);
        assert!(record.set_flag("fuzzy", false));
        assert!(record.flags.is_empty());
        assert!(!record.set_flag("  ", true));
    }

    #[test]
    fn test_estimated_size_grows_with_text() {
        let small = EntryRecord::new(None, "a", "b");
        let large = EntryRecord::new(None, "a".repeat(1000), "b".repeat(1000));
        assert!(large.estimated_size() >= small.estimated_size() + 2000);
    }

    #[test]
    fn test_statistics_progress() {
        let stats = EntryStatistics::new(4, 1, 1, 2, 0);
        assert_eq!(stats.progress, 25.0);
        assert_eq!(EntryStatistics::new(0, 0, 0, 0, 0).progress, 0.0);
    }
}

//! FTS5 virtual table setup and management for entry text.

use crate::Result;
use rusqlite::Connection;
use tracing::{debug, info};

/// Configuration for the entry FTS5 table.
#[derive(Debug, Clone)]
pub struct FTS5Config {
    /// Name of the FTS5 virtual table.
    pub table_name: String,
    /// Tokenizer configuration.
    ///
    /// The trigram tokenizer gives case-insensitive substring matching,
    /// which keeps keyword semantics identical to the `LIKE` fallback.
    pub tokenizer: String,
}

impl Default for FTS5Config {
    fn default() -> Self {
        Self {
            table_name: crate::config::StoreConfig::FTS_TABLE.to_string(),
            tokenizer: "trigram".to_string(),
        }
    }
}

/// Expressions feeding each FTS5 column from an `entries` row.
///
/// `{row}` is replaced by `NEW`, `OLD` or a table alias.
const COLUMN_SOURCES: [(&str, &str); 5] = [
    ("msgctxt", "COALESCE({row}.msgctxt, '')"),
    ("msgid", "{row}.msgid || COALESCE(char(10) || {row}.msgid_plural, '')"),
    (
        "msgstr",
        "{row}.msgstr || COALESCE((SELECT char(10) || GROUP_CONCAT(value, char(10)) \
         FROM json_each({row}.msgstr_plural_json)), '')",
    ),
    (
        "comments",
        "COALESCE({row}.comment, '') || char(10) || COALESCE({row}.tcomment, '')",
    ),
    (
        "refs",
        "COALESCE((SELECT GROUP_CONCAT(value, char(10)) FROM json_each({row}.references_json)), '')",
    ),
];

/// SQL expression that produces FTS5 column `column` for `row`.
///
/// Shared with the substring scan so both see exactly the same text.
pub(crate) fn column_expr(column: &str, row: &str) -> Option<String> {
    COLUMN_SOURCES
        .iter()
        .find(|(name, _)| *name == column)
        .map(|(_, expr)| expr.replace("{row}", row))
}

fn column_list() -> String {
    COLUMN_SOURCES
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn value_list(row: &str) -> String {
    COLUMN_SOURCES
        .iter()
        .map(|(_, expr)| expr.replace("{row}", row))
        .collect::<Vec<_>>()
        .join(",\n                    ")
}

/// Manager for FTS5 setup and maintenance.
pub struct FTS5Manager<'a> {
    config: &'a FTS5Config,
}

impl<'a> FTS5Manager<'a> {
    /// Create a new FTS5 manager.
    pub fn new(config: &'a FTS5Config) -> Self {
        Self { config }
    }

    /// Check if the FTS5 table exists.
    pub fn table_exists(&self, conn: &Connection) -> Result<bool> {
        let count: i32 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [&self.config.table_name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Check if the FTS5 triggers exist.
    pub fn triggers_exist(&self, conn: &Connection) -> Result<bool> {
        let trigger_name = format!("{}_ai", self.config.table_name);
        let count: i32 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='trigger' AND name=?1",
            [&trigger_name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Ensure FTS5 is fully set up.
    pub fn ensure_setup(&self, conn: &Connection) -> Result<()> {
        if !self.table_exists(conn)? {
            self.create_table(conn)?;
            self.populate_from_entries(conn)?;
        } else if !self.triggers_exist(conn)? {
            // Table exists but triggers missing - rebuild
            self.populate_from_entries(conn)?;
        }

        self.create_triggers(conn)?;
        Ok(())
    }

    /// Create the FTS5 virtual table.
    ///
    /// The entry key is stored unindexed so matches join back to `entries`.
    pub fn create_table(&self, conn: &Connection) -> Result<()> {
        let sql = format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS {} USING fts5(
                key UNINDEXED,
                {},
                tokenize='{}'
            )",
            self.config.table_name,
            column_list(),
            self.config.tokenizer
        );

        conn.execute(&sql, [])?;
        info!("Created FTS5 table: {}", self.config.table_name);
        Ok(())
    }

    /// Create triggers to keep FTS5 in sync with the entries table.
    pub fn create_triggers(&self, conn: &Connection) -> Result<()> {
        let table = &self.config.table_name;
        let columns = column_list();

        let insert_trigger = format!(
            "CREATE TRIGGER IF NOT EXISTS {table}_ai AFTER INSERT ON entries BEGIN
                INSERT INTO {table} (key, {columns}) VALUES (
                    NEW.key,
                    {values}
                );
            END",
            table = table,
            columns = columns,
            values = value_list("NEW"),
        );
        conn.execute(&insert_trigger, [])?;

        let update_trigger = format!(
            "CREATE TRIGGER IF NOT EXISTS {table}_au AFTER UPDATE ON entries BEGIN
                DELETE FROM {table} WHERE key = OLD.key;
                INSERT INTO {table} (key, {columns}) VALUES (
                    NEW.key,
                    {values}
                );
            END",
            table = table,
            columns = columns,
            values = value_list("NEW"),
        );
        conn.execute(&update_trigger, [])?;

        let delete_trigger = format!(
            "CREATE TRIGGER IF NOT EXISTS {table}_ad AFTER DELETE ON entries BEGIN
                DELETE FROM {table} WHERE key = OLD.key;
            END",
            table = table,
        );
        conn.execute(&delete_trigger, [])?;

        debug!("Created FTS5 triggers for {}", table);
        Ok(())
    }

    /// Populate FTS5 from the existing entries table.
    pub fn populate_from_entries(&self, conn: &Connection) -> Result<()> {
        let table = &self.config.table_name;

        conn.execute_batch(&format!("DELETE FROM {};", table))?;

        let sql = format!(
            "INSERT INTO {table} (key, {columns})
             SELECT e.key, {values} FROM entries e",
            table = table,
            columns = column_list(),
            values = value_list("e"),
        );
        conn.execute(&sql, [])?;

        info!("Populated FTS5 table from entries");
        Ok(())
    }

    /// Rebuild the FTS5 index completely.
    pub fn rebuild(&self, conn: &Connection) -> Result<()> {
        let table = &self.config.table_name;
        conn.execute(&format!("DROP TABLE IF EXISTS {}", table), [])?;
        for suffix in ["ai", "au", "ad"] {
            conn.execute(&format!("DROP TRIGGER IF EXISTS {}_{}", table, suffix), [])?;
        }

        self.create_table(conn)?;
        self.create_triggers(conn)?;
        self.populate_from_entries(conn)?;

        info!("Rebuilt FTS5 index");
        Ok(())
    }

    /// Optimize the FTS5 index.
    pub fn optimize(&self, conn: &Connection) -> Result<()> {
        let sql = format!(
            "INSERT INTO {}({}) VALUES('optimize')",
            self.config.table_name, self.config.table_name
        );
        conn.execute(&sql, [])?;
        debug!("Optimized FTS5 index");
        Ok(())
    }

    /// Get statistics about the FTS5 index.
    pub fn get_stats(&self, conn: &Connection) -> Result<FTS5Stats> {
        let row_count: usize = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.config.table_name),
            [],
            |row| row.get(0),
        )?;

        Ok(FTS5Stats {
            table_name: self.config.table_name.clone(),
            row_count,
            tokenizer: self.config.tokenizer.clone(),
        })
    }
}

/// Statistics about an FTS5 index.
#[derive(Debug, Clone)]
pub struct FTS5Stats {
    pub table_name: String,
    pub row_count: usize,
    pub tokenizer: String,
}

//! Engine configuration.
//!
//! [`CbConfig`] can be built in code with builder-style setters or loaded from
//! a TOML file:
//!
//! ```toml
//! dialect = "postgres"
//! in_chunk_size = 1000
//! checked_invalid_query = true
//!
//! [paging]
//! count_later = true
//! safety_max_result_size = 10000
//! ```

use crate::error::{CbError, CbResult};
use serde::Deserialize;
use std::path::Path;

/// Target database dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    #[default]
    Postgres,
    #[serde(rename = "mysql")]
    MySql,
    #[serde(rename = "sqlserver")]
    SqlServer,
    Db2,
}

impl Dialect {
    /// Whether parameters may be bound inside CASE expressions.
    pub fn binds_in_case(self) -> bool {
        !matches!(self, Dialect::Db2)
    }

    /// Whether `NULLS FIRST/LAST` is supported natively.
    pub fn supports_nulls_ordering(self) -> bool {
        matches!(self, Dialect::Postgres | Dialect::Db2)
    }

    /// Whether positional parameters are numbered (`$1`) or anonymous (`?`).
    pub fn numbered_placeholders(self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    /// Fetch-window clause appended after ORDER BY.
    pub fn paging_clause(self, offset: u64, limit: u64) -> String {
        match self {
            Dialect::Postgres | Dialect::MySql => {
                if offset == 0 {
                    format!("LIMIT {limit}")
                } else {
                    format!("LIMIT {limit} OFFSET {offset}")
                }
            }
            Dialect::SqlServer | Dialect::Db2 => {
                format!("OFFSET {offset} ROWS FETCH NEXT {limit} ROWS ONLY")
            }
        }
    }

    /// Row-lock clause appended at the end of a select.
    pub fn for_update_clause(self) -> Option<&'static str> {
        match self {
            Dialect::SqlServer => None,
            _ => Some("FOR UPDATE"),
        }
    }
}

/// Paging section of the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PagingConfig {
    /// Fetch first and derive the total count on the last page.
    pub count_later: bool,
    /// Re-run once at the last page when the requested page is out of range.
    pub reselect: bool,
    /// Fail when the total count exceeds this many rows.
    pub safety_max_result_size: Option<u64>,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            count_later: false,
            reselect: true,
            safety_max_result_size: None,
        }
    }
}

/// Configuration shared by every descriptor created from it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CbConfig {
    pub dialect: Dialect,
    /// IN lists longer than this are split into chunks.
    pub in_chunk_size: usize,
    /// Reject null/empty operands instead of skipping the predicate.
    pub checked_invalid_query: bool,
    /// Treat `''` as a value rather than as absent.
    pub empty_string_query_allowed: bool,
    /// Let a second registration on the same column and operator replace the first.
    pub override_allowed: bool,
    /// Render joins with NOT NULL foreign keys as INNER JOIN.
    pub structural_inner_join: bool,
    /// Render joins referenced by eligible WHERE predicates as INNER JOIN.
    pub where_used_inner_join: bool,
    /// Reject mutation of a descriptor while a sub-statement is built from it.
    pub lock_detection: bool,
    pub like_escape: char,
    /// Truncate logged SQL to this many bytes; `None` logs it whole.
    pub log_sql_max_length: Option<usize>,
    pub paging: PagingConfig,
}

impl Default for CbConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::Postgres,
            in_chunk_size: 1000,
            checked_invalid_query: false,
            empty_string_query_allowed: false,
            override_allowed: false,
            structural_inner_join: false,
            where_used_inner_join: false,
            lock_detection: true,
            like_escape: '|',
            log_sql_max_length: Some(200),
            paging: PagingConfig::default(),
        }
    }
}

impl CbConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document.
    pub fn from_toml_str(raw: &str) -> CbResult<Self> {
        let config: CbConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> CbResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CbError::configuration(format!(
                "failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&raw).map_err(|e| {
            CbError::configuration(format!("failed to parse config file {}: {e}", path.display()))
        })
    }

    pub fn validate(&self) -> CbResult<()> {
        if self.in_chunk_size == 0 {
            return Err(CbError::configuration("in_chunk_size must be greater than zero"));
        }
        if matches!(self.like_escape, '%' | '_') {
            return Err(CbError::configuration(format!(
                "'{}' cannot be used as the like escape character",
                self.like_escape
            )));
        }
        if self.paging.safety_max_result_size == Some(0) {
            return Err(CbError::configuration(
                "safety_max_result_size must be greater than zero when set",
            ));
        }
        Ok(())
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn in_chunk_size(mut self, size: usize) -> Self {
        self.in_chunk_size = size;
        self
    }

    /// Reject null/empty operands with `InvalidQueryValue`.
    pub fn checked_invalid_query(mut self) -> Self {
        self.checked_invalid_query = true;
        self
    }

    pub fn allow_empty_string_query(mut self) -> Self {
        self.empty_string_query_allowed = true;
        self
    }

    pub fn allow_override(mut self) -> Self {
        self.override_allowed = true;
        self
    }

    pub fn structural_inner_join(mut self) -> Self {
        self.structural_inner_join = true;
        self
    }

    pub fn where_used_inner_join(mut self) -> Self {
        self.where_used_inner_join = true;
        self
    }

    pub fn disable_lock_detection(mut self) -> Self {
        self.lock_detection = false;
        self
    }

    pub fn like_escape(mut self, escape: char) -> Self {
        self.like_escape = escape;
        self
    }

    pub fn log_sql_max_length(mut self, len: usize) -> Self {
        self.log_sql_max_length = Some(len);
        self
    }

    /// Log SQL without truncation.
    pub fn no_log_truncate(mut self) -> Self {
        self.log_sql_max_length = None;
        self
    }

    pub fn paging_count_later(mut self) -> Self {
        self.paging.count_later = true;
        self
    }

    pub fn no_paging_reselect(mut self) -> Self {
        self.paging.reselect = false;
        self
    }

    pub fn safety_max_result_size(mut self, max: u64) -> Self {
        self.paging.safety_max_result_size = Some(max);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = CbConfig::default();
        assert_eq!(config.in_chunk_size, 1000);
        assert!(config.paging.reselect);
        assert!(!config.checked_invalid_query);
        assert!(config.lock_detection);
    }

    #[test]
    fn parse_toml_with_partial_sections() {
        let config = CbConfig::from_toml_str(
            r#"
dialect = "mysql"
in_chunk_size = 3
checked_invalid_query = true

[paging]
count_later = true
safety_max_result_size = 500
"#,
        )
        .unwrap();
        assert_eq!(config.dialect, Dialect::MySql);
        assert_eq!(config.in_chunk_size, 3);
        assert!(config.checked_invalid_query);
        assert!(config.paging.count_later);
        assert!(config.paging.reselect);
        assert_eq!(config.paging.safety_max_result_size, Some(500));
    }

    #[test]
    fn reject_invalid_values() {
        assert!(CbConfig::from_toml_str("in_chunk_size = 0").is_err());
        assert!(CbConfig::from_toml_str("like_escape = \"%\"").is_err());
        assert!(CbConfig::from_toml_str("dialect = \"oracle\"").is_err());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "dialect = \"db2\"\nwhere_used_inner_join = true").unwrap();
        let config = CbConfig::load(file.path()).unwrap();
        assert_eq!(config.dialect, Dialect::Db2);
        assert!(config.where_used_inner_join);
        assert!(!config.dialect.binds_in_case());
    }

    #[test]
    fn load_missing_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = CbConfig::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, CbError::Configuration(_)));
    }

    #[test]
    fn paging_clause_per_dialect() {
        assert_eq!(Dialect::Postgres.paging_clause(0, 20), "LIMIT 20");
        assert_eq!(Dialect::MySql.paging_clause(40, 20), "LIMIT 20 OFFSET 40");
        assert_eq!(
            Dialect::SqlServer.paging_clause(40, 20),
            "OFFSET 40 ROWS FETCH NEXT 20 ROWS ONLY"
        );
    }
}

//! Rendered statements.
//!
//! A [`BoundStatement`] keeps the named-placeholder SQL (`#{cq.member_name.equal}`)
//! together with its [`ParamMap`]. It converts into positional SQL for a
//! driver or into display SQL with literals embedded.

use crate::config::Dialect;
use crate::error::{CbError, CbResult};
use crate::param::{ParamMap, Segment, scan_placeholders};
use crate::value::BindValue;
use tokio_postgres::types::ToSql;

/// What kind of statement was rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Count,
    Update,
    Delete,
    Insert,
}

/// SQL text with named placeholders and the values they refer to.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    kind: StatementKind,
    sql: String,
    params: ParamMap,
    dialect: Dialect,
}

impl BoundStatement {
    pub fn new(kind: StatementKind, sql: String, params: ParamMap, dialect: Dialect) -> Self {
        Self {
            kind,
            sql,
            params,
            dialect,
        }
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// SQL with named placeholders.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &ParamMap {
        &self.params
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn lookup(&self, name: &str) -> CbResult<&BindValue> {
        self.params.get(name).ok_or_else(|| {
            CbError::validation(format!("placeholder '{name}' has no bound value"))
        })
    }

    /// Convert into positional SQL (`$1` or `?`) with ordered values.
    ///
    /// List values expand into one placeholder per element.
    pub fn to_positional(&self) -> CbResult<PositionalStatement> {
        let mut sql = String::with_capacity(self.sql.len());
        let mut values = Vec::new();
        let mut missing = None;
        scan_placeholders(&self.sql, |segment| {
            let name = match segment {
                Segment::Literal(lit) => {
                    sql.push_str(lit);
                    return;
                }
                Segment::Param(name) => name,
            };
            let value = match self.lookup(name) {
                Ok(v) => v,
                Err(e) => {
                    missing.get_or_insert(e);
                    return;
                }
            };
            let items: Vec<&BindValue> = match value {
                BindValue::List(items) if !items.is_empty() => items.iter().collect(),
                other => vec![other],
            };
            for (i, item) in items.into_iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                values.push(item.clone());
                if self.dialect.numbered_placeholders() {
                    sql.push('$');
                    sql.push_str(&values.len().to_string());
                } else {
                    sql.push('?');
                }
            }
        });
        if let Some(err) = missing {
            return Err(err);
        }
        Ok(PositionalStatement { sql, values })
    }

    /// SQL with every placeholder replaced by its literal, for logs.
    pub fn display_sql(&self) -> String {
        let mut out = String::with_capacity(self.sql.len() + 32);
        scan_placeholders(&self.sql, |segment| match segment {
            Segment::Literal(lit) => out.push_str(lit),
            Segment::Param(name) => match self.params.get(name) {
                Some(value) => out.push_str(&value.to_literal()),
                None => {
                    out.push_str("#{");
                    out.push_str(name);
                    out.push('}');
                }
            },
        });
        out
    }
}

/// Positional SQL ready for a driver.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionalStatement {
    pub sql: String,
    pub values: Vec<BindValue>,
}

impl PositionalStatement {
    /// Parameter refs compatible with `tokio-postgres`.
    pub fn params_ref(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.values
            .iter()
            .map(|v| v as &(dyn ToSql + Sync))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement(dialect: Dialect) -> BoundStatement {
        let mut params = ParamMap::new();
        params.insert("cq.member_name.equal", BindValue::from("O'Hara"));
        params.insert("cq.member_id.in_scope", BindValue::from(vec![3, 4, 5]));
        BoundStatement::new(
            StatementKind::Select,
            "SELECT t0.member_id FROM member t0 WHERE t0.member_name = #{cq.member_name.equal} AND t0.member_id IN (#{cq.member_id.in_scope})".to_string(),
            params,
            dialect,
        )
    }

    #[test]
    fn positional_expands_lists() {
        let positional = statement(Dialect::Postgres).to_positional().unwrap();
        assert_eq!(
            positional.sql,
            "SELECT t0.member_id FROM member t0 WHERE t0.member_name = $1 AND t0.member_id IN ($2, $3, $4)"
        );
        assert_eq!(positional.values.len(), 4);
        assert_eq!(positional.params_ref().len(), 4);
    }

    #[test]
    fn positional_question_marks() {
        let positional = statement(Dialect::MySql).to_positional().unwrap();
        assert!(positional.sql.ends_with("IN (?, ?, ?)"));
    }

    #[test]
    fn display_embeds_literals() {
        assert_eq!(
            statement(Dialect::Postgres).display_sql(),
            "SELECT t0.member_id FROM member t0 WHERE t0.member_name = 'O''Hara' AND t0.member_id IN (3, 4, 5)"
        );
    }

    #[test]
    fn missing_param_is_error() {
        let stmt = BoundStatement::new(
            StatementKind::Select,
            "SELECT 1 WHERE x = #{nope}".to_string(),
            ParamMap::new(),
            Dialect::Postgres,
        );
        assert!(stmt.to_positional().is_err());
        assert_eq!(stmt.display_sql(), "SELECT 1 WHERE x = #{nope}");
    }
}

//! `tracing` helpers. Events go to the `cbsql` target; no subscriber is installed here.

use crate::statement::BoundStatement;

pub(crate) const TARGET: &str = "cbsql";

/// Cut `sql` to at most `max_bytes`, backing off to a char boundary.
pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

pub(crate) fn truncate_sql(sql: &str, max: Option<usize>) -> String {
    match max {
        Some(max) if sql.len() > max => format!("{}...", truncate_sql_bytes(sql, max)),
        _ => sql.to_string(),
    }
}

/// Emit a debug event for a freshly rendered statement.
pub(crate) fn log_statement(statement: &BoundStatement, max_sql_length: Option<usize>) {
    if !tracing::enabled!(target: TARGET, tracing::Level::DEBUG) {
        return;
    }
    let sql = truncate_sql(statement.sql(), max_sql_length);
    tracing::debug!(
        target: TARGET,
        kind = ?statement.kind(),
        param_count = statement.params().len(),
        sql = %sql,
        "rendered statement"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundary() {
        let sql = "SELECT 'é'";
        assert_eq!(truncate_sql_bytes(sql, 9), "SELECT '");
        assert_eq!(truncate_sql(sql, Some(100)), sql);
        assert_eq!(truncate_sql("SELECT 1", Some(6)), "SELECT...");
        assert_eq!(truncate_sql("SELECT 1", None), "SELECT 1");
    }
}

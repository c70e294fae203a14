//! Path-addressed invocation for callers that only hold strings.
//!
//! A path is a dotted list of foreign-relation properties ending in a
//! column (`member_status.display_order`), or ending in a relation for
//! [`QueryDescriptor::invoke_select`]. Every segment is resolved against
//! metadata before anything is registered, so a failed invocation leaves
//! the descriptor untouched.

use crate::error::{CbError, CbResult};
use crate::operator::OperatorKind;
use crate::query::{ConditionQuery, OrderByQuery, QueryDescriptor, SpecifyQuery};
use crate::relation::NodeId;
use crate::value::BindValue;
use std::str::FromStr;

/// A path resolved against metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ResolvedPath {
    relations: Vec<String>,
    column: Option<String>,
}

impl QueryDescriptor {
    fn resolve_invocation(&self, path: &str, ends_in_column: bool) -> CbResult<ResolvedPath> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.trim().is_empty()) {
            return Err(CbError::unresolved(path, path, "empty path segment"));
        }
        let (relations, column) = if ends_in_column {
            match segments.split_last() {
                Some((column, relations)) => (relations, Some(*column)),
                None => return Err(CbError::unresolved(path, path, "empty path")),
            }
        } else {
            (segments.as_slice(), None)
        };

        let mut table = self.meta.require_table(self.table())?;
        for segment in relations {
            let foreign = table.find_foreign(segment).ok_or_else(|| {
                CbError::unresolved(
                    path,
                    *segment,
                    format!("table '{}' has no foreign relation '{segment}'", table.name),
                )
            })?;
            table = self.meta.require_table(&foreign.foreign_table)?;
        }
        if let Some(column) = column {
            if table.find_column(column).is_none() {
                return Err(CbError::unresolved(
                    path,
                    column,
                    format!("table '{}' has no column '{column}'", table.name),
                ));
            }
        }
        Ok(ResolvedPath {
            relations: relations.iter().map(|s| s.to_string()).collect(),
            column: column.map(str::to_string),
        })
    }

    fn invocation_node(&mut self, resolved: &ResolvedPath) -> CbResult<NodeId> {
        self.ensure_path(&resolved.relations)
    }

    /// Register `column {operator} value` addressed by `path`.
    ///
    /// Operator names accept snake_case keys (`greater_equal`), camelCase
    /// (`greaterEqual`) and short aliases (`ge`). Two-operand operators take
    /// a two-element list; null checks ignore `value`.
    pub fn invoke_query(
        &mut self,
        path: &str,
        operator_name: &str,
        value: impl Into<BindValue>,
    ) -> CbResult<()> {
        let operator = OperatorKind::from_str(operator_name).map_err(|_| {
            CbError::unresolved(path, operator_name, "unknown operator name")
        })?;
        let resolved = self.resolve_invocation(path, true)?;
        let column = resolved.column.clone().unwrap_or_default();
        let node = self.invocation_node(&resolved)?;
        ConditionQuery::new(self, node).set(&column, operator, value)?;
        Ok(())
    }

    /// Setup-select the relation at `path`.
    pub fn invoke_select(&mut self, path: &str) -> CbResult<()> {
        self.resolve_invocation(path, false)?;
        self.setup_select(path)?;
        Ok(())
    }

    /// Specify the column at `path`.
    pub fn invoke_specify(&mut self, path: &str) -> CbResult<()> {
        let resolved = self.resolve_invocation(path, true)?;
        let column = resolved.column.clone().unwrap_or_default();
        let node = self.invocation_node(&resolved)?;
        SpecifyQuery::new(self, node).column(&column)?;
        Ok(())
    }

    /// Order by the column at `path`.
    pub fn invoke_order_by(&mut self, path: &str, ascending: bool) -> CbResult<()> {
        let resolved = self.resolve_invocation(path, true)?;
        let column = resolved.column.clone().unwrap_or_default();
        let node = self.invocation_node(&resolved)?;
        let mut order = OrderByQuery::new(self, node);
        if ascending {
            order.asc(&column)?;
        } else {
            order.desc(&column)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::CbError;
    use crate::meta::{ForeignInfo, SchemaRegistry, TableInfo};
    use crate::query::QueryDescriptor;
    use crate::value::{BindValue, ValueType};

    fn member() -> QueryDescriptor {
        let meta = SchemaRegistry::new()
            .with_table(
                TableInfo::new("member")
                    .with_primary_key("member_id", ValueType::Integer)
                    .with_column("member_name", ValueType::Text)
                    .with_column("member_status_code", ValueType::Text)
                    .with_foreign(ForeignInfo::new(
                        "member_status",
                        "member_status",
                        &[("member_status_code", "member_status_code")],
                    )),
            )
            .unwrap()
            .with_table(
                TableInfo::new("member_status")
                    .with_primary_key("member_status_code", ValueType::Text)
                    .with_column("display_order", ValueType::Integer),
            )
            .unwrap()
            .into_ref();
        QueryDescriptor::new(meta, "member").unwrap()
    }

    #[test]
    fn query_through_relation() {
        let mut cb = member();
        cb.invoke_query("member_status.display_order", "ge", 3).unwrap();
        cb.invoke_order_by("member_name", false).unwrap();
        let sql = cb.to_statement().unwrap().sql().to_string();
        assert!(sql.contains(
            "LEFT JOIN member_status t0r_0 ON t0.member_status_code = t0r_0.member_status_code"
        ));
        assert!(sql.contains(
            "WHERE t0r_0.display_order >= #{cq.member_status.display_order.greater_equal}"
        ));
        assert!(sql.ends_with("ORDER BY t0.member_name DESC"));
    }

    #[test]
    fn unknown_segment_is_named() {
        let mut cb = member();
        let err = cb
            .invoke_query("member_service.service_rank", "equal", 1)
            .unwrap_err();
        match err {
            CbError::DynamicResolutionFailure { segment, .. } => {
                assert_eq!(segment, "member_service");
            }
            other => panic!("unexpected error: {other}"),
        }
        let err = cb.invoke_specify("member_status.nickname").unwrap_err();
        assert!(matches!(
            err,
            CbError::DynamicResolutionFailure { ref segment, .. } if segment == "nickname"
        ));
        assert_eq!(cb.graph().len(), 1);
    }

    #[test]
    fn unknown_operator_is_named() {
        let mut cb = member();
        let err = cb
            .invoke_query("member_name", "sounds_like", "x")
            .unwrap_err();
        assert!(matches!(
            err,
            CbError::DynamicResolutionFailure { ref segment, .. } if segment == "sounds_like"
        ));
    }

    #[test]
    fn select_and_null_check() {
        let mut cb = member();
        cb.invoke_select("member_status").unwrap();
        cb.invoke_query("member_name", "is_not_null", BindValue::Null).unwrap();
        let sql = cb.to_statement().unwrap().sql().to_string();
        assert!(sql.contains("t0r_0.display_order AS display_order_0"));
        assert!(sql.ends_with("WHERE t0.member_name IS NOT NULL"));
    }
}

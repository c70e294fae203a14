use super::SubqueryKind;
use super::derived::{AggregateFn, DerivedOption, aggregate_expr, comparison_sql};
use crate::clause::{RenderScope, WherePredicate};
use crate::config::CbConfig;
use crate::error::{CbError, CbResult};
use crate::meta::MetaRef;
use crate::operator::OperatorKind;
use crate::purpose::{Operation, Purpose, QueryModes};
use crate::query::{ConditionQuery, QueryDescriptor};
use crate::relation::NodeId;
use crate::statement::{BoundStatement, StatementKind};
use std::sync::Arc;

impl ConditionQuery<'_> {
    /// `column {operator} (SELECT function(column) FROM same_table WHERE ...)`
    ///
    /// The compared column is the one specified inside `build`.
    pub fn scalar_condition<F>(
        &mut self,
        operator: OperatorKind,
        function: AggregateFn,
        build: F,
    ) -> CbResult<&mut Self>
    where
        F: FnOnce(&mut QueryDescriptor) -> CbResult<()>,
    {
        self.scalar_sub(operator, function, build, None::<fn(&mut QueryDescriptor) -> CbResult<()>>)
    }

    /// Scalar condition whose aggregate is computed per partition: every
    /// column specified by `partition` is correlated with the outer row.
    pub fn scalar_condition_partition_by<F, P>(
        &mut self,
        operator: OperatorKind,
        function: AggregateFn,
        build: F,
        partition: P,
    ) -> CbResult<&mut Self>
    where
        F: FnOnce(&mut QueryDescriptor) -> CbResult<()>,
        P: FnOnce(&mut QueryDescriptor) -> CbResult<()>,
    {
        self.scalar_sub(operator, function, build, Some(partition))
    }

    fn scalar_sub<F, P>(
        &mut self,
        operator: OperatorKind,
        function: AggregateFn,
        build: F,
        partition: Option<P>,
    ) -> CbResult<&mut Self>
    where
        F: FnOnce(&mut QueryDescriptor) -> CbResult<()>,
        P: FnOnce(&mut QueryDescriptor) -> CbResult<()>,
    {
        self.desc.guard(Operation::Predicate)?;
        self.require_where("a scalar condition")?;
        let sql_op = comparison_sql(operator)?;
        let table = self.desc.graph.node(self.node).table.clone();
        let outer_alias = self.alias().to_string();

        let partition_columns = match partition {
            None => Vec::new(),
            Some(partition) => {
                let mut spec = self.desc.spawn_child(Purpose::ScalarConditionPartitionBy, &table)?;
                partition(&mut spec)?;
                let info = spec.table_info(NodeId::ROOT)?;
                let columns = spec
                    .specified
                    .get(&NodeId::ROOT)
                    .map(|cols| {
                        cols.iter()
                            .map(|c| info.column(c).map(|col| col.sql_name.clone()))
                            .collect::<CbResult<Vec<_>>>()
                    })
                    .transpose()?
                    .unwrap_or_default();
                if columns.is_empty() {
                    return Err(CbError::GuaranteedSelectAll {
                        table,
                        message: "partition-by specified no column".to_string(),
                    });
                }
                columns
            }
        };

        let mut child = self.desc.build_substatement(
            Purpose::ScalarCondition,
            &table,
            |child| {
                let inner_alias = child.alias().to_string();
                for col in &partition_columns {
                    child.add_root_predicate(format!("{inner_alias}.{col} = {outer_alias}.{col}"))?;
                }
                Ok(())
            },
            build,
        )?;
        let column = child
            .single_specified()
            .ok_or_else(|| CbError::validation("a scalar condition needs a specified column"))?
            .to_string();
        let column_sql = child.table_info(NodeId::ROOT)?.column(&column)?.sql_name.clone();
        let (expr, value_type) = aggregate_expr(&mut child, &function, &DerivedOption::new())?;
        let identity = self.desc.attach_subquery(
            self.node,
            SubqueryKind::ScalarCondition,
            &column,
            Some(value_type),
            child,
            expr,
        );
        let outer = format!("{outer_alias}.{column_sql}");
        let text = Arc::new(move |scope: &RenderScope| -> CbResult<String> {
            Ok(format!("{outer} {sql_op} ({})", scope.fragment(&identity)?))
        });
        let is_root = self.desc.graph.node(self.node).is_root();
        let predicate = WherePredicate::deferred(text, &outer_alias);
        self.desc
            .clause
            .add_predicate(self.placement, &outer_alias, is_root, predicate)?;
        Ok(self)
    }
}

/// Render `SELECT function(column) FROM table WHERE ...` as a standalone statement.
///
/// `build` specifies the aggregated column and adds predicates.
pub fn scalar_select<F>(
    meta: MetaRef,
    config: impl Into<Arc<CbConfig>>,
    table: &str,
    function: AggregateFn,
    build: F,
) -> CbResult<BoundStatement>
where
    F: FnOnce(&mut QueryDescriptor) -> CbResult<()>,
{
    let config = config.into();
    config.validate()?;
    let modes = QueryModes::from_config(&config);
    let mut desc = QueryDescriptor::create(meta, config, table, Purpose::ScalarSelect, 0, modes)?;
    build(&mut desc)?;
    let (expr, _) = aggregate_expr(&mut desc, &function, &DerivedOption::new())?;
    desc.finalize()?;
    let (sql, params) = desc.render_substatement(&expr)?;
    Ok(desc.bound(StatementKind::Select, sql, params))
}

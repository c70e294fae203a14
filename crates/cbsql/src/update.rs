//! Query update, delete and insert.
//!
//! The row set of an update or delete is described by a normal descriptor.
//! Without joins or sub-statements its WHERE is reused as is; otherwise the
//! statement narrows by primary key:
//!
//! ```text
//! UPDATE member SET ... WHERE member_id IN (SELECT t0.member_id FROM member t0 ...)
//! ```
//!
//! Safe defaults: update and delete require a condition unless
//! [`QueryUpdate::all_rows`] / [`QueryDelete::all_rows`] is called, and an
//! update requires at least one SET column.

use crate::config::CbConfig;
use crate::error::{CbError, CbResult};
use crate::meta::MetaRef;
use crate::param::{ParamMap, placeholder};
use crate::purpose::{LockState, Purpose, QueryModes};
use crate::query::{ColumnTicket, Operand, QueryDescriptor, SpecifyQuery};
use crate::relation::NodeId;
use crate::statement::{BoundStatement, StatementKind};
use crate::value::BindValue;
use indexmap::IndexMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
enum SetExpr {
    Value(BindValue),
    /// Self calculation: `col = col + ?`.
    Varying(ColumnTicket),
}

/// How the target rows are addressed.
enum RowFilter {
    /// The descriptor's own WHERE, with the base alias kept.
    Direct { where_body: Option<String> },
    /// `pk IN (SELECT pk FROM ...)`.
    ByKey { condition: String },
}

impl QueryDescriptor {
    /// Start an update of the rows this descriptor selects.
    pub fn query_update(&mut self) -> QueryUpdate<'_> {
        QueryUpdate {
            desc: self,
            sets: IndexMap::new(),
            specified: None,
            all_rows: false,
        }
    }

    /// Start a delete of the rows this descriptor selects.
    pub fn query_delete(&mut self) -> QueryDelete<'_> {
        QueryDelete {
            desc: self,
            all_rows: false,
        }
    }

    fn check_modifiable(&self, statement: &str) -> CbResult<()> {
        if self.purpose != Purpose::NormalUse {
            return Err(CbError::unsupported(format!(
                "{statement} needs a normal-use descriptor, not {:?}",
                self.purpose
            )));
        }
        if self.union_count() > 0 {
            return Err(CbError::unsupported(format!(
                "{statement} cannot be combined with a union"
            )));
        }
        if !self.derived_columns.is_empty() {
            return Err(CbError::unsupported(format!(
                "{statement} cannot select derived referrers"
            )));
        }
        Ok(())
    }

    fn has_subqueries(&self) -> bool {
        self.graph
            .nodes()
            .any(|(_, node)| node.subqueries().next().is_some())
    }

    /// Address the target rows, returning every value bound so far.
    fn row_filter(&mut self, statement: &str, all_rows: bool) -> CbResult<(RowFilter, ParamMap)> {
        self.check_modifiable(statement)?;
        self.finalize()?;
        let (scope, rendered) = self.render_fragments()?;
        let where_body = self.clause.render_where(&scope)?;
        if where_body.is_none() && !self.clause.has_base_inline() && !all_rows {
            return Err(CbError::validation(format!(
                "{statement} requires a query condition or .all_rows() to proceed. \
                 This prevents accidental full-table changes."
            )));
        }

        let direct = self.clause.joins().is_empty()
            && !self.clause.has_base_inline()
            && !self.has_subqueries();
        if direct {
            return Ok((RowFilter::Direct { where_body }, rendered));
        }

        let table = self.table_info(NodeId::ROOT)?;
        let keys: Vec<String> = table.primary_keys().map(|c| c.sql_name.clone()).collect();
        if keys.is_empty() {
            return Err(CbError::metadata(format!(
                "{statement} through relations needs a primary key on '{}'",
                table.name
            )));
        }
        let alias = self.alias();
        let inner: Vec<String> = keys.iter().map(|k| format!("{alias}.{k}")).collect();
        let (sub_sql, params) = self.render_substatement(&inner.join(", "))?;
        let outer = if keys.len() == 1 {
            keys.join("")
        } else {
            format!("({})", keys.join(", "))
        };
        let condition = format!("{outer} IN ({sub_sql})");
        Ok((RowFilter::ByKey { condition }, params))
    }

    /// Render a varying ticket, optionally qualified with the base alias.
    fn varying_expr(
        &self,
        ticket: &ColumnTicket,
        qualifier: Option<&str>,
        prefix: &str,
        params: &mut ParamMap,
    ) -> CbResult<String> {
        if ticket.table != self.table() || !ticket.path.is_empty() {
            return Err(CbError::unsupported(format!(
                "a varying update can only read columns of '{}' itself",
                self.table()
            )));
        }
        let column = &self.table_info(NodeId::ROOT)?.column(&ticket.column)?.sql_name;
        let mut expr = match qualifier {
            Some(alias) => format!("{alias}.{column}"),
            None => column.clone(),
        };
        let mut additive = false;
        for (i, calc) in ticket.calculations.iter().enumerate() {
            let path = format!("{prefix}.c{i}");
            let operand = match &calc.operand {
                Operand::Value(value) => {
                    params.insert(&path, value.clone());
                    placeholder(&path)
                }
                Operand::Column(other) => {
                    let other_expr = self.varying_expr(other, qualifier, &path, params)?;
                    if other.calculations.is_empty() {
                        other_expr
                    } else {
                        format!("({other_expr})")
                    }
                }
            };
            if calc.op.is_multiplicative() && additive {
                expr = format!("({expr})");
            }
            additive = !calc.op.is_multiplicative();
            expr = format!("{expr} {} {operand}", calc.op.sql());
        }
        Ok(expr)
    }
}

/// `UPDATE ... SET ...` over the rows of a descriptor.
///
/// # Example
/// ```
/// use cbsql::{OperatorKind, QueryDescriptor, SchemaRegistry, TableInfo, ValueType};
///
/// # fn main() -> cbsql::CbResult<()> {
/// let meta = SchemaRegistry::new()
///     .with_table(
///         TableInfo::new("member")
///             .with_primary_key("member_id", ValueType::Integer)
///             .with_column("member_name", ValueType::Text)
///             .with_column("login_count", ValueType::Integer),
///     )?
///     .into_ref();
/// let mut cb = QueryDescriptor::new(meta, "member")?;
/// cb.query().set("member_id", OperatorKind::Equal, 3)?;
/// let statement = cb
///     .query_update()
///     .varying(|mut s| s.column_ticket("login_count")?.plus(1))?
///     .to_statement()?;
/// assert_eq!(
///     statement.sql(),
///     "UPDATE member t0 SET login_count = t0.login_count + #{set.login_count.c0} \
///      WHERE t0.member_id = #{cq.member_id.equal}"
/// );
/// # Ok(())
/// # }
/// ```
#[must_use]
pub struct QueryUpdate<'a> {
    desc: &'a mut QueryDescriptor,
    sets: IndexMap<String, SetExpr>,
    specified: Option<Vec<String>>,
    all_rows: bool,
}

impl QueryUpdate<'_> {
    fn add_set(&mut self, column: &str, expr: SetExpr) -> CbResult<()> {
        let info = self.desc.table_info(NodeId::ROOT)?.column(column)?;
        if info.primary_key {
            return Err(CbError::validation(format!(
                "primary key column '{column}' cannot be changed by a query update"
            )));
        }
        if self.sets.contains_key(column) {
            return Err(CbError::validation(format!("column '{column}' is already set")));
        }
        self.sets.insert(column.to_string(), expr);
        Ok(())
    }

    /// `column = value`
    pub fn set(mut self, column: &str, value: impl Into<BindValue>) -> CbResult<Self> {
        self.add_set(column, SetExpr::Value(value.into()))?;
        Ok(self)
    }

    /// `column = column {calculations}`; the column comes from the ticket.
    pub fn varying<F>(mut self, build: F) -> CbResult<Self>
    where
        F: FnOnce(SpecifyQuery<'_>) -> CbResult<ColumnTicket>,
    {
        let mut detached = self.desc.detached(Purpose::VaryingUpdate)?;
        detached.set_lock(LockState::ExemptDetachedRoot);
        let ticket = build(detached.specify())?;
        if ticket.calculations.is_empty() {
            return Err(CbError::validation(format!(
                "varying update of '{}' has no calculation",
                ticket.column
            )));
        }
        let column = ticket.column.clone();
        self.add_set(&column, SetExpr::Varying(ticket))?;
        Ok(self)
    }

    /// Restrict the update to the columns specified by `build`.
    ///
    /// Set columns outside the specification are left out; a specified
    /// column without a value is an error.
    pub fn specify_columns<F>(mut self, build: F) -> CbResult<Self>
    where
        F: FnOnce(&mut SpecifyQuery<'_>) -> CbResult<()>,
    {
        let mut detached = self.desc.detached(Purpose::SpecifiedUpdate)?;
        detached.set_lock(LockState::ExemptDetachedRoot);
        build(&mut detached.specify())?;
        let columns = detached
            .specified
            .get(&NodeId::ROOT)
            .cloned()
            .unwrap_or_default();
        if columns.is_empty() {
            return Err(CbError::validation("specified update names no column"));
        }
        self.specified = Some(columns);
        Ok(self)
    }

    /// Allow updating every row when the descriptor has no condition.
    pub fn all_rows(mut self) -> Self {
        self.all_rows = true;
        self
    }

    fn effective_sets(&self) -> CbResult<Vec<(&String, &SetExpr)>> {
        let Some(specified) = &self.specified else {
            return Ok(self.sets.iter().collect());
        };
        for column in specified {
            if !self.sets.contains_key(column) {
                return Err(CbError::validation(format!(
                    "specified column '{column}' has no update value"
                )));
            }
        }
        let mut kept = Vec::new();
        for (column, expr) in &self.sets {
            if specified.contains(column) {
                kept.push((column, expr));
            } else {
                tracing::debug!(
                    target: crate::log::TARGET,
                    column = %column,
                    "set column left out of specified update"
                );
            }
        }
        Ok(kept)
    }

    /// Render the update statement.
    pub fn to_statement(self) -> CbResult<BoundStatement> {
        if self.sets.is_empty() {
            return Err(CbError::validation(
                "query update requires at least one SET column",
            ));
        }
        let sets: Vec<(String, SetExpr)> = self
            .effective_sets()?
            .into_iter()
            .map(|(c, e)| (c.clone(), e.clone()))
            .collect();

        let desc = self.desc;
        let (filter, mut params) = desc.row_filter("query update", self.all_rows)?;
        let qualifier = match &filter {
            RowFilter::Direct { .. } => Some(desc.alias().to_string()),
            RowFilter::ByKey { .. } => None,
        };

        let table = desc.table_info(NodeId::ROOT)?;
        let mut assignments = Vec::with_capacity(sets.len());
        for (column, expr) in &sets {
            let sql_name = &table.column(column)?.sql_name;
            let path = format!("set.{column}");
            let value = match expr {
                SetExpr::Value(value) => {
                    params.insert(&path, value.clone());
                    placeholder(&path)
                }
                SetExpr::Varying(ticket) => {
                    desc.varying_expr(ticket, qualifier.as_deref(), &path, &mut params)?
                }
            };
            assignments.push(format!("{sql_name} = {value}"));
        }

        let sql = match filter {
            RowFilter::Direct { where_body } => {
                let mut sql = format!(
                    "UPDATE {} {} SET {}",
                    table.sql_name,
                    desc.alias(),
                    assignments.join(", ")
                );
                if let Some(body) = where_body {
                    sql.push_str(" WHERE ");
                    sql.push_str(&body);
                }
                sql
            }
            RowFilter::ByKey { condition } => format!(
                "UPDATE {} SET {} WHERE {condition}",
                table.sql_name,
                assignments.join(", ")
            ),
        };
        Ok(desc.bound(StatementKind::Update, sql, params))
    }
}

/// `DELETE FROM ...` over the rows of a descriptor.
#[must_use]
pub struct QueryDelete<'a> {
    desc: &'a mut QueryDescriptor,
    all_rows: bool,
}

impl QueryDelete<'_> {
    /// Allow deleting every row when the descriptor has no condition.
    pub fn all_rows(mut self) -> Self {
        self.all_rows = true;
        self
    }

    /// Render the delete statement.
    pub fn to_statement(self) -> CbResult<BoundStatement> {
        let desc = self.desc;
        let (filter, params) = desc.row_filter("query delete", self.all_rows)?;
        let table = desc.table_info(NodeId::ROOT)?;
        let sql = match filter {
            RowFilter::Direct { where_body } => {
                let mut sql = format!("DELETE FROM {} {}", table.sql_name, desc.alias());
                if let Some(body) = where_body {
                    sql.push_str(" WHERE ");
                    sql.push_str(&body);
                }
                sql
            }
            RowFilter::ByKey { condition } => {
                format!("DELETE FROM {} WHERE {condition}", table.sql_name)
            }
        };
        Ok(desc.bound(StatementKind::Delete, sql, params))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum InsertSource {
    Column { node: NodeId, column: String },
    Value(BindValue),
}

/// `INSERT INTO target (...) SELECT ... FROM source ...`
///
/// Each target column is fed either by a source column (possibly through
/// foreign relations) or by a fixed value.
#[derive(Debug)]
pub struct QueryInsert {
    target: String,
    source: QueryDescriptor,
    mappings: IndexMap<String, InsertSource>,
}

impl QueryInsert {
    pub fn new(
        meta: MetaRef,
        config: impl Into<Arc<CbConfig>>,
        target: &str,
        source_table: &str,
    ) -> CbResult<Self> {
        let config = config.into();
        config.validate()?;
        meta.require_table(target)?;
        let modes = QueryModes::from_config(&config);
        let source = QueryDescriptor::create(meta, config, source_table, Purpose::QueryInsert, 0, modes)?;
        Ok(Self {
            target: target.to_string(),
            source,
            mappings: IndexMap::new(),
        })
    }

    /// Descriptor of the source rows, for predicates.
    pub fn source(&mut self) -> &mut QueryDescriptor {
        &mut self.source
    }

    fn check_target(&self, column: &str) -> CbResult<()> {
        self.source.meta.require_table(&self.target)?.column(column)?;
        if self.mappings.contains_key(column) {
            return Err(CbError::validation(format!(
                "target column '{column}' is already mapped"
            )));
        }
        Ok(())
    }

    /// Feed `target_column` from the source column at `source_path`
    /// (`member_status.display_order`).
    pub fn map_column(&mut self, target_column: &str, source_path: &str) -> CbResult<&mut Self> {
        self.check_target(target_column)?;
        let segments: Vec<&str> = source_path.split('.').collect();
        let Some((column, relations)) = segments.split_last() else {
            return Err(CbError::validation("empty source path"));
        };
        let mut spec = self.source.specify();
        for relation in relations {
            spec = spec.relation(relation)?;
        }
        let node = spec.node;
        spec.column(column)?;
        self.mappings.insert(
            target_column.to_string(),
            InsertSource::Column {
                node,
                column: column.to_string(),
            },
        );
        Ok(self)
    }

    /// Feed `target_column` with a fixed value.
    pub fn set_value(&mut self, target_column: &str, value: impl Into<BindValue>) -> CbResult<&mut Self> {
        self.check_target(target_column)?;
        self.mappings
            .insert(target_column.to_string(), InsertSource::Value(value.into()));
        Ok(self)
    }

    /// Render the insert statement.
    pub fn to_statement(&mut self) -> CbResult<BoundStatement> {
        if self.mappings.is_empty() {
            return Err(CbError::validation("query insert maps no column"));
        }
        let meta = self.source.meta.clone();
        let target = meta.require_table(&self.target)?;
        self.source.finalize()?;
        let (scope, mut params) = self.source.render_fragments()?;

        let mut columns = Vec::with_capacity(self.mappings.len());
        let mut exprs = Vec::with_capacity(self.mappings.len());
        for (target_column, source) in &self.mappings {
            columns.push(target.column(target_column)?.sql_name.clone());
            match source {
                InsertSource::Column { node, column } => {
                    let alias = &self.source.graph.node(*node).alias;
                    let sql_name = &self.source.table_info(*node)?.column(column)?.sql_name;
                    exprs.push(format!("{alias}.{sql_name}"));
                }
                InsertSource::Value(value) => {
                    let path = format!("insert.{target_column}");
                    params.insert(&path, value.clone());
                    exprs.push(placeholder(&path));
                }
            }
        }
        let sql = format!(
            "INSERT INTO {} ({}) SELECT {}{}",
            target.sql_name,
            columns.join(", "),
            exprs.join(", "),
            self.source.render_body(&scope)?
        );
        Ok(self.source.bound(StatementKind::Insert, sql, params))
    }
}

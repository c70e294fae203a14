//! Query descriptors: the root aggregate of one statement being built.
//!
//! A [`QueryDescriptor`] owns the relation graph, the clause accumulator and
//! the parameter map of one query. Callers mutate it through short-lived
//! handles ([`ConditionQuery`], [`SpecifyQuery`], [`OrderByQuery`]); every
//! handle operation passes the purpose/lock guard before touching state.

mod column_query;
mod condition;
mod order;
mod register;
mod specify;


pub use column_query::{CalcOp, Calculation, ColumnTicket, Operand};
pub use condition::ConditionQuery;
pub use order::OrderByQuery;
pub use specify::SpecifyQuery;

use crate::clause::{ClauseAccumulator, FetchWindow, JoinDescriptor, Placement, RenderScope, WherePredicate};
use crate::config::{CbConfig, Dialect, PagingConfig};
use crate::error::{CbError, CbResult, InvalidQueryEntry};
use crate::meta::{ColumnInfo, MetaRef, TableInfo};
use crate::param::ParamMap;
use crate::purpose::{self, LockState, Operation, Purpose, QueryModes};
use crate::relation::{NodeId, RelationGraph, build_join};
use crate::statement::{BoundStatement, StatementKind};
use crate::union::UnionBranch;
use crate::value::ValueType;
use indexmap::IndexMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// A select-shaping declaration, replayed onto union branches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SelectDeclaration {
    SetupSelect(Vec<String>),
    Specify { path: Vec<String>, column: String },
}

/// A derived-referrer value selected as an extra column.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedColumn {
    pub alias: String,
    pub identity: String,
    /// Type the selected value maps to.
    pub value_type: ValueType,
}

/// Root aggregate of one query under construction.
#[derive(Debug)]
pub struct QueryDescriptor {
    pub(crate) meta: MetaRef,
    pub(crate) config: Arc<CbConfig>,
    pub(crate) purpose: Purpose,
    pub(crate) lock: LockState,
    pub(crate) modes: QueryModes,
    pub(crate) graph: RelationGraph,
    pub(crate) clause: ClauseAccumulator,
    pub(crate) params: ParamMap,
    pub(crate) setup_select: Vec<NodeId>,
    pub(crate) specified: IndexMap<NodeId, Vec<String>>,
    pub(crate) derived_columns: Vec<DerivedColumn>,
    pub(crate) declarations: Vec<SelectDeclaration>,
    pub(crate) unions: Vec<UnionBranch>,
    pub(crate) skipped: Vec<InvalidQueryEntry>,
    identities: IndexMap<String, usize>,
    sequence: usize,
    for_update: bool,
    pub(crate) paging: PagingConfig,
    dream_cruise: Option<Box<QueryDescriptor>>,
}

impl QueryDescriptor {
    /// Create a descriptor for `table` with the default configuration.
    pub fn new(meta: MetaRef, table: &str) -> CbResult<Self> {
        Self::with_config(meta, CbConfig::default(), table)
    }

    /// Create a descriptor for `table`.
    pub fn with_config(meta: MetaRef, config: impl Into<Arc<CbConfig>>, table: &str) -> CbResult<Self> {
        let config = config.into();
        config.validate()?;
        let modes = QueryModes::from_config(&config);
        Self::create(meta, config, table, Purpose::NormalUse, 0, modes)
    }

    pub(crate) fn create(
        meta: MetaRef,
        config: Arc<CbConfig>,
        table: &str,
        purpose: Purpose,
        level: usize,
        modes: QueryModes,
    ) -> CbResult<Self> {
        meta.require_table(table)?;
        let paging = config.paging.clone();
        Ok(Self {
            meta,
            config,
            purpose,
            lock: LockState::Unlocked,
            modes,
            graph: RelationGraph::new(table, level),
            clause: ClauseAccumulator::new(),
            params: ParamMap::new(),
            setup_select: Vec::new(),
            specified: IndexMap::new(),
            derived_columns: Vec::new(),
            declarations: Vec::new(),
            unions: Vec::new(),
            skipped: Vec::new(),
            identities: IndexMap::new(),
            sequence: 0,
            for_update: false,
            paging,
            dream_cruise: None,
        })
    }

    /// Spawn the descriptor of a nested statement.
    ///
    /// Branch purposes (union, dream cruise) keep this level; everything else
    /// goes one level deeper. Mode flags are copied now and never re-read.
    pub(crate) fn spawn_child(&self, purpose: Purpose, table: &str) -> CbResult<Self> {
        let level = if purpose.is_branch() {
            self.level()
        } else {
            self.level() + 1
        };
        Self::create(
            self.meta.clone(),
            self.config.clone(),
            table,
            purpose,
            level,
            self.modes,
        )
    }

    /// Descriptor on the same table and level, used for column specification only.
    pub(crate) fn detached(&self, purpose: Purpose) -> CbResult<Self> {
        Self::create(
            self.meta.clone(),
            self.config.clone(),
            self.table(),
            purpose,
            self.level(),
            self.modes,
        )
    }

    // accessors

    pub fn purpose(&self) -> Purpose {
        self.purpose
    }

    pub fn lock_state(&self) -> LockState {
        self.lock
    }

    pub(crate) fn set_lock(&mut self, lock: LockState) {
        self.lock = lock;
    }

    pub fn level(&self) -> usize {
        self.graph.level()
    }

    /// Root table name.
    pub fn table(&self) -> &str {
        &self.graph.root().table
    }

    pub fn alias(&self) -> &str {
        &self.graph.root().alias
    }

    pub fn graph(&self) -> &RelationGraph {
        &self.graph
    }

    pub fn clause(&self) -> &ClauseAccumulator {
        &self.clause
    }

    pub fn params(&self) -> &ParamMap {
        &self.params
    }

    pub fn modes(&self) -> &QueryModes {
        &self.modes
    }

    pub fn config(&self) -> &CbConfig {
        &self.config
    }

    pub fn dialect(&self) -> Dialect {
        self.config.dialect
    }

    pub fn meta(&self) -> &MetaRef {
        &self.meta
    }

    /// Predicates dropped because their operand was null or empty.
    pub fn skipped_predicates(&self) -> &[InvalidQueryEntry] {
        &self.skipped
    }

    pub fn derived_columns(&self) -> &[DerivedColumn] {
        &self.derived_columns
    }

    pub fn union_count(&self) -> usize {
        self.unions.len()
    }

    pub fn paging_config(&self) -> &PagingConfig {
        &self.paging
    }

    pub fn fetch_window(&self) -> &FetchWindow {
        self.clause.fetch()
    }

    pub(crate) fn table_info(&self, node: NodeId) -> CbResult<&TableInfo> {
        self.meta.require_table(&self.graph.node(node).table)
    }

    pub(crate) fn guard(&self, operation: Operation) -> CbResult<()> {
        purpose::guard(self.purpose, self.lock, &self.modes, operation, self.table())
    }

    pub(crate) fn next_sequence(&mut self) -> usize {
        let n = self.sequence;
        self.sequence += 1;
        n
    }

    /// Identity of a new sub-statement, unique within this descriptor.
    pub(crate) fn next_identity(&mut self, kind_key: &str, property: &str, level: usize) -> String {
        let base = format!("{kind_key}_{property}{level}");
        let count = self.identities.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base
        } else {
            format!("{base}_{count}")
        }
    }

    // handles

    /// Predicate handle on the root table.
    pub fn query(&mut self) -> ConditionQuery<'_> {
        ConditionQuery::new(self, NodeId::ROOT)
    }

    /// Column specification handle on the root table.
    pub fn specify(&mut self) -> SpecifyQuery<'_> {
        SpecifyQuery::new(self, NodeId::ROOT)
    }

    /// Ordering handle on the root table.
    pub fn order_by(&mut self) -> OrderByQuery<'_> {
        OrderByQuery::new(self, NodeId::ROOT)
    }

    pub fn clear_order_by(&mut self) {
        self.clause.clear_orders();
    }

    // relations

    /// Return the node reached from `parent` through `property`, joining it
    /// on first use.
    pub(crate) fn ensure_relation(&mut self, parent: NodeId, property: &str) -> CbResult<NodeId> {
        if let Some(existing) = self.graph.node(parent).child(property) {
            return Ok(existing);
        }
        let meta = self.meta.clone();
        let local = meta.require_table(&self.graph.node(parent).table)?;
        let foreign = local.foreign(property)?;
        let foreign_table = meta.require_table(&foreign.foreign_table)?;
        let (id, _) = self
            .graph
            .attach_child(parent, property, &foreign_table.name);
        let join = build_join(&self.graph, id, local, foreign, foreign_table)?;
        for path in &join.fixed_params {
            let path = path.clone();
            let relation = property.to_string();
            self.clause.register_deferred(
                format!("fixed condition parameter {path}"),
                move |params: &ParamMap| {
                    if params.contains(&path) {
                        Ok(())
                    } else {
                        Err(CbError::configuration(format!(
                            "fixed condition of relation '{relation}' needs parameter '{path}'"
                        )))
                    }
                },
            );
        }
        self.clause.add_join(join);
        Ok(id)
    }

    pub(crate) fn ensure_path<S: AsRef<str>>(&mut self, properties: &[S]) -> CbResult<NodeId> {
        let mut node = NodeId::ROOT;
        for property in properties {
            node = self.ensure_relation(node, property.as_ref())?;
        }
        Ok(node)
    }

    fn path_of(&self, node: NodeId) -> Vec<String> {
        self.graph
            .property_path(node)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Select every column of the relation at dotted `path` (`member_status`,
    /// `member_service.service_rank`).
    pub fn setup_select(&mut self, path: &str) -> CbResult<&mut Self> {
        self.guard(Operation::SetupSelect)?;
        let properties: Vec<&str> = path.split('.').collect();
        self.apply_setup_select(&properties)?;
        self.declarations
            .push(SelectDeclaration::SetupSelect(properties.iter().map(|p| p.to_string()).collect()));
        Ok(self)
    }

    pub(crate) fn apply_setup_select<S: AsRef<str>>(&mut self, properties: &[S]) -> CbResult<NodeId> {
        if properties.is_empty() {
            return Err(CbError::validation("setup-select needs a relation path"));
        }
        let node = self.ensure_path(properties)?;
        if !self.setup_select.contains(&node) {
            self.setup_select.push(node);
        }
        Ok(node)
    }

    pub(crate) fn apply_specify(&mut self, node: NodeId, column: &str) -> CbResult<()> {
        self.table_info(node)?.column(column)?;
        let columns = self.specified.entry(node).or_default();
        if !columns.iter().any(|c| c == column) {
            columns.push(column.to_string());
        }
        Ok(())
    }

    pub(crate) fn record_specify(&mut self, node: NodeId, column: &str) {
        let path = self.path_of(node);
        self.declarations.push(SelectDeclaration::Specify {
            path,
            column: column.to_string(),
        });
    }

    pub(crate) fn specified_count(&self) -> usize {
        self.specified.values().map(Vec::len).sum()
    }

    /// The single column specified on the root (derived and scalar sub-statements).
    pub(crate) fn single_specified(&self) -> Option<&str> {
        self.specified
            .get(&NodeId::ROOT)
            .and_then(|cols| cols.first())
            .map(String::as_str)
    }

    // or-scope

    /// Group the predicates registered by `build` as OR alternatives.
    ///
    /// Nested calls flatten into the outermost scope.
    pub fn or_scope_query<F>(&mut self, build: F) -> CbResult<()>
    where
        F: FnOnce(&mut QueryDescriptor) -> CbResult<()>,
    {
        self.guard(Operation::Predicate)?;
        self.clause.begin_or_scope()?;
        let previous = self.purpose;
        self.purpose = Purpose::OrScopeQuery;
        let result = build(self);
        self.purpose = previous;
        self.clause.end_or_scope(result.is_ok());
        result
    }

    /// Inside an or-scope, AND the predicates registered by `build` into one alternative.
    pub fn or_scope_and_part<F>(&mut self, build: F) -> CbResult<()>
    where
        F: FnOnce(&mut QueryDescriptor) -> CbResult<()>,
    {
        self.guard(Operation::Predicate)?;
        self.clause.begin_and_part()?;
        let result = build(self);
        self.clause.end_and_part(result.is_ok());
        result
    }

    // sub-statements

    /// Build a nested descriptor with this one locked for the duration.
    pub(crate) fn build_substatement<F>(
        &mut self,
        purpose: Purpose,
        table: &str,
        prepare: impl FnOnce(&mut QueryDescriptor) -> CbResult<()>,
        build: F,
    ) -> CbResult<QueryDescriptor>
    where
        F: FnOnce(&mut QueryDescriptor) -> CbResult<()>,
    {
        let mut child = self.spawn_child(purpose, table)?;
        prepare(&mut child)?;
        let previous = self.lock;
        if previous != LockState::ExemptDetachedRoot {
            self.lock = LockState::LockedBySubstatement;
        }
        let result = build(&mut child);
        self.lock = previous;
        result?;
        Ok(child)
    }

    /// Add a fixed WHERE predicate on the root (correlation conditions).
    pub(crate) fn add_root_predicate(&mut self, text: String) -> CbResult<()> {
        let alias = self.alias().to_string();
        self.clause
            .add_predicate(Placement::Where, &alias, true, WherePredicate::fixed(text, &alias))
    }

    /// Detached specification descriptor shared by column comparisons.
    ///
    /// Created on first use; it is exempt from the sub-statement lock.
    pub fn dream_cruise(&mut self) -> CbResult<&mut QueryDescriptor> {
        if self.dream_cruise.is_none() {
            let mut detached = self.detached(Purpose::DreamCruise)?;
            detached.lock = LockState::ExemptDetachedRoot;
            self.dream_cruise = Some(Box::new(detached));
        }
        self.dream_cruise
            .as_deref_mut()
            .ok_or_else(|| CbError::validation("dream cruise descriptor is missing"))
    }

    // paging and locking

    /// Set the fetch window: `size` rows of 1-based `page_number`.
    pub fn paging(&mut self, size: u64, page_number: u64) -> CbResult<&mut Self> {
        self.guard(Operation::OrderBy)?;
        self.clause.fetch_mut().set(size, page_number)?;
        Ok(self)
    }

    /// Fetch only the first `size` rows.
    pub fn fetch_first(&mut self, size: u64) -> CbResult<&mut Self> {
        self.paging(size, 1)
    }

    pub fn clear_paging(&mut self) {
        self.clause.fetch_mut().clear();
    }

    pub(crate) fn set_page_number(&mut self, page_number: u64) {
        self.clause.fetch_mut().set_page_number(page_number);
    }

    /// Fetch first and derive the total from the last page when possible.
    pub fn enable_paging_count_later(&mut self) -> &mut Self {
        self.paging.count_later = true;
        self
    }

    pub fn disable_paging_reselect(&mut self) -> &mut Self {
        self.paging.reselect = false;
        self
    }

    pub fn safety_max_result_size(&mut self, max: u64) -> &mut Self {
        self.paging.safety_max_result_size = Some(max);
        self
    }

    pub fn lock_for_update(&mut self) -> &mut Self {
        self.for_update = true;
        self
    }

    // rendering

    /// Run deferred checks, sync union branches and finalize sub-statements.
    pub(crate) fn finalize(&mut self) -> CbResult<()> {
        self.clause.drain_deferred(&self.params)?;
        let ids: Vec<NodeId> = self.graph.nodes().map(|(id, _)| id).collect();
        for id in ids {
            for sub in self.graph.node_mut(id).subqueries.values_mut() {
                sub.descriptor.finalize()?;
            }
        }
        self.sync_unions()?;
        for branch in &mut self.unions {
            branch.descriptor.finalize()?;
        }
        Ok(())
    }

    /// Render every sub-statement fragment, namespacing its parameters.
    pub(crate) fn render_fragments(&self) -> CbResult<(RenderScope, ParamMap)> {
        let mut params = self.params.clone();
        let mut fragments = IndexMap::new();
        for (_, node) in self.graph.nodes() {
            for sub in node.subqueries() {
                let (text, sub_params) = sub.render_fragment()?;
                params.insert_map(&sub.param_prefix(), sub_params);
                fragments.insert(sub.identity.clone(), text);
            }
        }
        Ok((RenderScope::new(fragments), params))
    }

    /// Columns selected from `node`: all of them, or its primary key plus
    /// the specified ones.
    fn selected_columns(&self, node: NodeId) -> CbResult<Vec<&ColumnInfo>> {
        let table = self.table_info(node)?;
        match self.specified.get(&node) {
            Some(names) if !names.is_empty() => {
                let mut cols: Vec<&ColumnInfo> = table.primary_keys().collect();
                for name in names {
                    let col = table.column(name)?;
                    if !col.primary_key {
                        cols.push(col);
                    }
                }
                Ok(cols)
            }
            _ => Ok(table.columns().collect()),
        }
    }

    fn select_nodes(&self) -> Vec<NodeId> {
        let mut nodes = self.setup_select.clone();
        for node in self.specified.keys() {
            if *node != NodeId::ROOT && !nodes.contains(node) {
                nodes.push(*node);
            }
        }
        nodes
    }

    fn select_list(&self, scope: &RenderScope) -> CbResult<Vec<String>> {
        let root = self.graph.root();
        let mut list: Vec<String> = self
            .selected_columns(NodeId::ROOT)?
            .into_iter()
            .map(|c| format!("{}.{}", root.alias, c.sql_name))
            .collect();
        for id in self.select_nodes() {
            let node = self.graph.node(id);
            for col in self.selected_columns(id)? {
                list.push(format!(
                    "{}.{} AS {}{}",
                    node.alias, col.sql_name, col.name, node.relation_path
                ));
            }
        }
        for derived in &self.derived_columns {
            list.push(format!(
                "({}) AS {}",
                scope.fragment(&derived.identity)?,
                derived.alias
            ));
        }
        Ok(list)
    }

    /// ` FROM ... [WHERE ...]`
    pub(crate) fn render_body(&self, scope: &RenderScope) -> CbResult<String> {
        let root = self.graph.root();
        let table = self.meta.require_table(&root.table)?;
        let mut out = self
            .clause
            .render_from(&table.sql_name, &root.alias, &self.modes, scope)?;
        if let Some(where_body) = self.clause.render_where(scope)? {
            out.push_str(" WHERE ");
            out.push_str(&where_body);
        }
        Ok(out)
    }

    /// `SELECT {select_expr} FROM ... WHERE ...` of a sub-statement.
    pub(crate) fn render_substatement(&self, select_expr: &str) -> CbResult<(String, ParamMap)> {
        let (scope, params) = self.render_fragments()?;
        let sql = format!("SELECT {select_expr}{}", self.render_body(&scope)?);
        Ok((sql, params))
    }

    /// Select statement without ORDER BY or fetch window (union operands).
    pub(crate) fn render_plain_select(&self) -> CbResult<(String, ParamMap)> {
        let (scope, params) = self.render_fragments()?;
        let sql = format!(
            "SELECT {}{}",
            self.select_list(&scope)?.join(", "),
            self.render_body(&scope)?
        );
        Ok((sql, params))
    }

    fn render_query(&self, kind: StatementKind) -> CbResult<(String, ParamMap)> {
        let dialect = self.dialect();
        if self.unions.is_empty() {
            let (scope, params) = self.render_fragments()?;
            let mut sql = match kind {
                StatementKind::Count => String::from("SELECT COUNT(*)"),
                _ => format!("SELECT {}", self.select_list(&scope)?.join(", ")),
            };
            sql.push_str(&self.render_body(&scope)?);
            self.push_tail(&mut sql, dialect, false)?;
            if kind == StatementKind::Select && self.for_update {
                if let Some(clause) = dialect.for_update_clause() {
                    sql.push(' ');
                    sql.push_str(clause);
                }
            }
            return Ok((sql, params));
        }

        if !self.derived_columns.is_empty() {
            return Err(CbError::unsupported(
                "specified derived referrers cannot be combined with a union",
            ));
        }
        if self.for_update && kind == StatementKind::Select {
            return Err(CbError::unsupported("FOR UPDATE cannot be combined with a union"));
        }
        let (mut combined, mut params) = self.render_plain_select()?;
        for (i, branch) in self.unions.iter().enumerate() {
            let prefix = format!("union{i}");
            let (branch_sql, branch_params) = branch.descriptor.render_plain_select()?;
            combined.push_str(if branch.all { " UNION ALL " } else { " UNION " });
            combined.push_str(&crate::param::rewrite_placeholders(&branch_sql, &prefix));
            params.insert_map(&prefix, branch_params);
        }
        let mut sql = match kind {
            StatementKind::Count => format!("SELECT COUNT(*) FROM ({combined}) t_union"),
            _ if self.clause.orders().is_empty() && !self.clause.fetch().is_set() => combined,
            _ => format!("SELECT * FROM ({combined}) t_union"),
        };
        self.push_tail(&mut sql, dialect, true)?;
        Ok((sql, params))
    }

    fn push_tail(&self, sql: &mut String, dialect: Dialect, over_union: bool) -> CbResult<()> {
        if let Some(order) = self.clause.render_order_by(dialect, over_union)? {
            sql.push(' ');
            sql.push_str(&order);
        }
        if let Some(fetch) = self.clause.render_fetch(dialect) {
            sql.push(' ');
            sql.push_str(&fetch);
        }
        Ok(())
    }

    pub(crate) fn bound(&self, kind: StatementKind, sql: String, params: ParamMap) -> BoundStatement {
        let statement = BoundStatement::new(kind, sql, params, self.dialect());
        crate::log::log_statement(&statement, self.config.log_sql_max_length);
        statement
    }

    /// Render the select statement.
    pub fn to_statement(&mut self) -> CbResult<BoundStatement> {
        self.finalize()?;
        let (sql, params) = self.render_query(StatementKind::Select)?;
        Ok(self.bound(StatementKind::Select, sql, params))
    }

    /// Render the count statement; ORDER BY and the fetch window are suppressed.
    pub fn to_count_statement(&mut self) -> CbResult<BoundStatement> {
        self.finalize()?;
        let scope = CountScope::new(self);
        let (sql, params) = scope.render_query(StatementKind::Count)?;
        Ok(scope.bound(StatementKind::Count, sql, params))
    }

    /// Select statement with literals embedded, for logs and debugging.
    pub fn to_display_sql(&mut self) -> CbResult<String> {
        Ok(self.to_statement()?.display_sql())
    }
}

/// Suppresses ORDER BY and the fetch window while a count is rendered.
///
/// Dropping the scope revives them.
pub(crate) struct CountScope<'a>(&'a mut QueryDescriptor);

impl<'a> CountScope<'a> {
    pub(crate) fn new(descriptor: &'a mut QueryDescriptor) -> Self {
        descriptor.clause.suppress();
        Self(descriptor)
    }
}

impl Deref for CountScope<'_> {
    type Target = QueryDescriptor;

    fn deref(&self) -> &QueryDescriptor {
        self.0
    }
}

impl DerefMut for CountScope<'_> {
    fn deref_mut(&mut self) -> &mut QueryDescriptor {
        self.0
    }
}

impl Drop for CountScope<'_> {
    fn drop(&mut self) {
        self.0.clause.revive();
    }
}

/// Qualified reference to `column` of a node for a placement.
pub(crate) fn column_ref(alias: &str, placement: Placement, sql_name: &str) -> String {
    match placement {
        Placement::InlineView => format!("{}.{sql_name}", JoinDescriptor::inline_alias(alias)),
        _ => format!("{alias}.{sql_name}"),
    }
}

//! Correlated sub-statements.
//!
//! Each builder spawns a nested [`QueryDescriptor`] one level deeper than
//! its caller, lets the caller fill it in, and stores it on the calling
//! [`PredicateNode`](crate::relation::PredicateNode) under an identity that
//! is unique within the parent descriptor. At render time the nested
//! statement is rendered first and its placeholders are moved under
//! `sub{level}.{identity}`; the parent's predicate (or select item) embeds
//! the fragment through the [`RenderScope`](crate::clause::RenderScope).

mod derived;
mod exists;
mod in_scope;
mod scalar;

pub use derived::{AggregateFn, DerivedOption};
pub use scalar::scalar_select;

use crate::error::{CbError, CbResult};
use crate::meta::{FixedCondition, ForeignInfo, MetadataProvider, ReferrerInfo, TableInfo};
use crate::param::{ParamMap, rewrite_placeholders};
use crate::query::QueryDescriptor;
use crate::relation::NodeId;
use crate::value::ValueType;

/// What a sub-statement renders as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubqueryKind {
    Exists,
    NotExists,
    InScope,
    NotInScope,
    /// Derived referrer selected as a column.
    SpecifyDerived,
    /// Derived referrer compared in WHERE.
    QueryDerived,
    ScalarCondition,
}

impl SubqueryKind {
    /// Identity prefix of sub-statements of this kind.
    pub fn key(self) -> &'static str {
        match self {
            SubqueryKind::Exists => "exists",
            SubqueryKind::NotExists => "not_exists",
            SubqueryKind::InScope => "in_scope",
            SubqueryKind::NotInScope => "not_in_scope",
            SubqueryKind::SpecifyDerived => "specify_derived",
            SubqueryKind::QueryDerived => "query_derived",
            SubqueryKind::ScalarCondition => "scalar",
        }
    }
}

/// One correlated sub-statement owned by a predicate node.
#[derive(Debug)]
pub struct SubqueryDescriptor {
    pub identity: String,
    /// Nesting level of the nested descriptor (caller level + 1).
    pub level: usize,
    pub kind: SubqueryKind,
    /// Relation property (or column, for scalar conditions) it was declared through.
    pub property: String,
    /// Type of the value a derived sub-statement produces.
    pub value_type: Option<ValueType>,
    pub(crate) descriptor: Box<QueryDescriptor>,
    pub(crate) select_expr: String,
}

impl SubqueryDescriptor {
    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.descriptor
    }

    /// Namespace of this sub-statement's parameters in the parent.
    pub fn param_prefix(&self) -> String {
        format!("sub{}.{}", self.level, self.identity)
    }

    /// Rendered text with placeholders already moved under [`Self::param_prefix`].
    pub(crate) fn render_fragment(&self) -> CbResult<(String, ParamMap)> {
        let (sql, params) = self.descriptor.render_substatement(&self.select_expr)?;
        Ok((rewrite_placeholders(&sql, &self.param_prefix()), params))
    }
}

/// Column pairs linking an outer node to the root of a nested statement.
#[derive(Debug, Clone)]
pub(crate) struct Correlation {
    /// Table the nested statement selects from.
    pub table: String,
    /// (outer column sql name, inner column sql name)
    pub pairs: Vec<(String, String)>,
    /// Fixed condition of the relation, rendered inside the nested statement.
    pub fixed: Option<FixedCondition>,
    /// The nested table plays `{local}` in the fixed condition (reverse of a referrer).
    pub inner_is_local: bool,
}

impl Correlation {
    pub(crate) fn referrer(
        meta: &dyn MetadataProvider,
        local: &TableInfo,
        referrer: &ReferrerInfo,
    ) -> CbResult<Self> {
        let target = meta.require_table(&referrer.referrer_table)?;
        let mut pairs = Vec::with_capacity(referrer.column_pairs.len());
        for (local_col, referrer_col) in &referrer.column_pairs {
            pairs.push((
                local.column(local_col)?.sql_name.clone(),
                target.column(referrer_col)?.sql_name.clone(),
            ));
        }
        let fixed = match &referrer.reverse_foreign {
            Some(reverse) => target.foreign(reverse)?.fixed.clone(),
            None => None,
        };
        Ok(Self {
            table: target.name.clone(),
            pairs,
            fixed,
            inner_is_local: true,
        })
    }

    pub(crate) fn foreign(
        meta: &dyn MetadataProvider,
        local: &TableInfo,
        foreign: &ForeignInfo,
    ) -> CbResult<Self> {
        let target = meta.require_table(&foreign.foreign_table)?;
        let mut pairs = Vec::with_capacity(foreign.column_pairs.len());
        for (local_col, foreign_col) in &foreign.column_pairs {
            pairs.push((
                local.column(local_col)?.sql_name.clone(),
                target.column(foreign_col)?.sql_name.clone(),
            ));
        }
        Ok(Self {
            table: target.name.clone(),
            pairs,
            fixed: foreign.fixed.clone(),
            inner_is_local: false,
        })
    }

    /// Add `inner = outer` predicates and the fixed condition to `child`.
    pub(crate) fn apply(&self, outer_alias: &str, child: &mut QueryDescriptor) -> CbResult<()> {
        let inner_alias = child.alias().to_string();
        for (outer, inner) in &self.pairs {
            child.add_root_predicate(format!("{inner_alias}.{inner} = {outer_alias}.{outer}"))?;
        }
        self.apply_fixed(outer_alias, child)
    }

    /// Add only the relation's fixed condition to `child`.
    pub(crate) fn apply_fixed(&self, outer_alias: &str, child: &mut QueryDescriptor) -> CbResult<()> {
        let Some(fixed) = &self.fixed else {
            return Ok(());
        };
        if !fixed.dynamic_params().is_empty() {
            return Err(CbError::configuration(format!(
                "fixed condition '{}' needs parameters and cannot be used in a sub-statement",
                fixed.template
            )));
        }
        let inner_alias = child.alias().to_string();
        let text = if self.inner_is_local {
            fixed.render(&inner_alias, outer_alias, "")
        } else {
            fixed.render(outer_alias, &inner_alias, "")
        };
        child.add_root_predicate(text)
    }

    /// Inner column list (`t1.member_id`, or `t1.a, t1.b`).
    pub(crate) fn inner_columns(&self, inner_alias: &str) -> String {
        self.pairs
            .iter()
            .map(|(_, inner)| format!("{inner_alias}.{inner}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Outer column reference, tuple-wrapped for compound keys.
    pub(crate) fn outer_columns(&self, outer_alias: &str) -> String {
        let cols: Vec<String> = self
            .pairs
            .iter()
            .map(|(outer, _)| format!("{outer_alias}.{outer}"))
            .collect();
        if cols.len() == 1 {
            cols.join("")
        } else {
            format!("({})", cols.join(", "))
        }
    }
}

impl QueryDescriptor {
    /// Store a built sub-statement on `node` and return its identity.
    pub(crate) fn attach_subquery(
        &mut self,
        node: NodeId,
        kind: SubqueryKind,
        property: &str,
        value_type: Option<ValueType>,
        descriptor: QueryDescriptor,
        select_expr: String,
    ) -> String {
        let level = descriptor.level();
        let identity = self.next_identity(kind.key(), property, level);
        tracing::trace!(
            target: crate::log::TARGET,
            identity = %identity,
            level,
            table = %descriptor.table(),
            "sub-statement attached"
        );
        self.graph.node_mut(node).subqueries.insert(
            identity.clone(),
            SubqueryDescriptor {
                identity: identity.clone(),
                level,
                kind,
                property: property.to_string(),
                value_type,
                descriptor: Box::new(descriptor),
                select_expr,
            },
        );
        identity
    }

    /// Sub-statement on any node by identity.
    pub fn subquery(&self, identity: &str) -> Option<&SubqueryDescriptor> {
        self.graph
            .nodes()
            .find_map(|(_, node)| node.subqueries.get(identity))
    }
}

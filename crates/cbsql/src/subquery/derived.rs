//! Derived referrers: an aggregate over a referrer table, selected as a
//! column or compared in WHERE.

use super::{Correlation, SubqueryKind};
use crate::clause::{RenderScope, WherePredicate};
use crate::config::Dialect;
use crate::error::{CbError, CbResult};
use crate::ident::SqlName;
use crate::operator::OperatorKind;
use crate::param::placeholder;
use crate::purpose::{Operation, Purpose};
use crate::query::{ConditionQuery, DerivedColumn, QueryDescriptor, SpecifyQuery};
use crate::relation::NodeId;
use crate::value::{BindValue, ValueType};
use std::sync::Arc;

/// Aggregate applied to the referrer column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    CountDistinct,
    Max,
    Min,
    Sum,
    Avg,
    /// Any other single-argument aggregate, by SQL function name.
    Custom(String),
}

impl AggregateFn {
    pub(crate) fn wrap(&self, column: &str) -> String {
        match self {
            AggregateFn::Count => format!("COUNT({column})"),
            AggregateFn::CountDistinct => format!("COUNT(DISTINCT {column})"),
            AggregateFn::Max => format!("MAX({column})"),
            AggregateFn::Min => format!("MIN({column})"),
            AggregateFn::Sum => format!("SUM({column})"),
            AggregateFn::Avg => format!("AVG({column})"),
            AggregateFn::Custom(name) => format!("{name}({column})"),
        }
    }

    /// Type of the aggregated value for a column of `column_type`.
    pub fn value_type(&self, column_type: ValueType) -> ValueType {
        match self {
            AggregateFn::Count | AggregateFn::CountDistinct => ValueType::BigInt,
            AggregateFn::Sum | AggregateFn::Avg => ValueType::Decimal,
            AggregateFn::Max | AggregateFn::Min => column_type,
            AggregateFn::Custom(_) => ValueType::Text,
        }
    }

    fn is_count(&self) -> bool {
        matches!(self, AggregateFn::Count | AggregateFn::CountDistinct)
    }

    fn needs_numeric(&self) -> bool {
        matches!(self, AggregateFn::Sum | AggregateFn::Avg)
    }
}

/// Conversions applied to a derived value, innermost first:
/// round or trunc, then coalesce.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedOption {
    pub coalesce: Option<BindValue>,
    pub round: Option<u32>,
    pub trunc: Option<u32>,
    /// Skip the correlation predicates (the caller correlates by hand).
    pub suppress_correlation: bool,
}

impl DerivedOption {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn coalesce(mut self, value: impl Into<BindValue>) -> Self {
        self.coalesce = Some(value.into());
        self
    }

    pub fn round(mut self, digits: u32) -> Self {
        self.round = Some(digits);
        self
    }

    pub fn trunc(mut self, digits: u32) -> Self {
        self.trunc = Some(digits);
        self
    }

    pub fn suppress_correlation(mut self) -> Self {
        self.suppress_correlation = true;
        self
    }

    pub fn has_conversion(&self) -> bool {
        self.coalesce.is_some() || self.round.is_some() || self.trunc.is_some()
    }

    /// Wrap `expr`; the coalesce value must be bound at `coalesce_path`.
    pub(crate) fn apply(&self, expr: String, dialect: Dialect, coalesce_path: &str) -> String {
        let mut expr = expr;
        if let Some(digits) = self.round {
            expr = format!("ROUND({expr}, {digits})");
        }
        if let Some(digits) = self.trunc {
            expr = match dialect {
                Dialect::MySql => format!("TRUNCATE({expr}, {digits})"),
                Dialect::SqlServer => format!("ROUND({expr}, {digits}, 1)"),
                Dialect::Postgres | Dialect::Db2 => format!("TRUNC({expr}, {digits})"),
            };
        }
        if self.coalesce.is_some() {
            expr = format!("COALESCE({expr}, {})", placeholder(coalesce_path));
        }
        expr
    }
}

/// Select expression of an aggregate sub-statement over `child`'s root.
///
/// The aggregated column is the one specified in the sub-statement; a
/// count without one counts the primary key.
pub(crate) fn aggregate_expr(
    child: &mut QueryDescriptor,
    function: &AggregateFn,
    option: &DerivedOption,
) -> CbResult<(String, ValueType)> {
    let table = child.table_info(NodeId::ROOT)?;
    let column = match child.single_specified() {
        Some(name) => table.column(name)?,
        None if function.is_count() => table.primary_keys().next().ok_or_else(|| {
            CbError::metadata(format!("table '{}' has no primary key to count", table.name))
        })?,
        None => {
            return Err(CbError::validation(format!(
                "{function:?} on '{}' needs a specified column",
                table.name
            )));
        }
    };
    if function.needs_numeric() && !column.value_type.is_numeric() && !option.has_conversion() {
        return Err(CbError::type_mismatch(
            &table.name,
            &column.name,
            format!("{function:?} needs a numeric column, found {:?}", column.value_type),
        ));
    }
    let value_type = function.value_type(column.value_type);
    let inner = function.wrap(&format!("{}.{}", child.alias(), column.sql_name));
    let dialect = child.dialect();
    let expr = option.apply(inner, dialect, "derived.coalesce");
    if let Some(value) = &option.coalesce {
        child.params.insert("derived.coalesce", value.clone());
    }
    Ok((expr, value_type))
}

impl QueryDescriptor {
    /// Build a correlated aggregate over the referrer `property` of `node`.
    fn build_derived<F>(
        &mut self,
        node: NodeId,
        property: &str,
        function: &AggregateFn,
        option: &DerivedOption,
        build: F,
    ) -> CbResult<(QueryDescriptor, String, ValueType)>
    where
        F: FnOnce(&mut QueryDescriptor) -> CbResult<()>,
    {
        let meta = self.meta.clone();
        let local = self.table_info(node)?.clone();
        let correlation = Correlation::referrer(meta.as_ref(), &local, local.referrer(property)?)?;
        if correlation.pairs.is_empty() && !option.suppress_correlation {
            return Err(CbError::GuaranteedSelectAll {
                table: correlation.table.clone(),
                message: format!("derived referrer '{property}' has no correlation columns"),
            });
        }
        let outer_alias = self.graph.node(node).alias.clone();
        let mut child = self.build_substatement(
            Purpose::DerivedReferrer,
            &correlation.table,
            |child| {
                if option.suppress_correlation {
                    correlation.apply_fixed(&outer_alias, child)
                } else {
                    correlation.apply(&outer_alias, child)
                }
            },
            build,
        )?;
        let (expr, value_type) = aggregate_expr(&mut child, function, option)?;
        Ok((child, expr, value_type))
    }
}

impl SpecifyQuery<'_> {
    /// Select `function` over the referrer `property` as column `alias`.
    pub fn derived_referrer<F>(
        &mut self,
        property: &str,
        function: AggregateFn,
        alias: &str,
        build: F,
    ) -> CbResult<&mut Self>
    where
        F: FnOnce(&mut QueryDescriptor) -> CbResult<()>,
    {
        self.derived_referrer_with(property, function, alias, DerivedOption::new(), build)
    }

    pub fn derived_referrer_with<F>(
        &mut self,
        property: &str,
        function: AggregateFn,
        alias: &str,
        option: DerivedOption,
        build: F,
    ) -> CbResult<&mut Self>
    where
        F: FnOnce(&mut QueryDescriptor) -> CbResult<()>,
    {
        self.desc.guard(Operation::SpecifyDerived)?;
        SqlName::parse_simple(alias)?;
        if self.desc.derived_columns.iter().any(|d| d.alias == alias) {
            return Err(CbError::validation(format!(
                "derived alias '{alias}' is already specified"
            )));
        }
        let (child, expr, value_type) =
            self.desc
                .build_derived(self.node, property, &function, &option, build)?;
        let identity = self.desc.attach_subquery(
            self.node,
            SubqueryKind::SpecifyDerived,
            property,
            Some(value_type),
            child,
            expr,
        );
        self.desc.derived_columns.push(DerivedColumn {
            alias: alias.to_string(),
            identity,
            value_type,
        });
        Ok(self)
    }
}

impl ConditionQuery<'_> {
    /// `(SELECT function(...) FROM referrer WHERE ...) {operator} value`
    pub fn derived_referrer<F>(
        &mut self,
        property: &str,
        function: AggregateFn,
        operator: OperatorKind,
        value: impl Into<BindValue>,
        build: F,
    ) -> CbResult<&mut Self>
    where
        F: FnOnce(&mut QueryDescriptor) -> CbResult<()>,
    {
        self.derived_referrer_with(property, function, operator, value, DerivedOption::new(), build)
    }

    pub fn derived_referrer_with<F>(
        &mut self,
        property: &str,
        function: AggregateFn,
        operator: OperatorKind,
        value: impl Into<BindValue>,
        option: DerivedOption,
        build: F,
    ) -> CbResult<&mut Self>
    where
        F: FnOnce(&mut QueryDescriptor) -> CbResult<()>,
    {
        self.desc.guard(Operation::Predicate)?;
        self.require_where("a derived-referrer condition")?;
        let sql_op = comparison_sql(operator)?;
        let value = value.into();
        if value.is_absent(self.desc.modes.empty_string_allowed) {
            let entry = crate::error::InvalidQueryEntry {
                table: self.desc.graph.node(self.node).table.clone(),
                column: property.to_string(),
                operator,
                value: value.to_string(),
            };
            self.desc.reject_invalid(vec![entry])?;
            return Ok(self);
        }
        let (child, expr, value_type) =
            self.desc
                .build_derived(self.node, property, &function, &option, build)?;
        let identity = self.desc.attach_subquery(
            self.node,
            SubqueryKind::QueryDerived,
            property,
            Some(value_type),
            child,
            expr,
        );
        let path = format!("derived.{identity}");
        self.desc.params.insert(&path, value);
        let operand = placeholder(&path);
        let text = Arc::new(move |scope: &RenderScope| -> CbResult<String> {
            Ok(format!("({}) {sql_op} {operand}", scope.fragment(&identity)?))
        });
        let alias = self.alias().to_string();
        let is_root = self.desc.graph.node(self.node).is_root();
        let predicate = WherePredicate::deferred(text, &alias).ineligible(option.coalesce.is_some());
        self.desc
            .clause
            .add_predicate(self.placement, &alias, is_root, predicate)?;
        Ok(self)
    }
}

/// SQL text of a comparison operator; other operators are rejected.
pub(crate) fn comparison_sql(operator: OperatorKind) -> CbResult<&'static str> {
    match operator {
        OperatorKind::Equal
        | OperatorKind::NotEqual
        | OperatorKind::GreaterThan
        | OperatorKind::LessThan
        | OperatorKind::GreaterEqual
        | OperatorKind::LessEqual => operator
            .sql_operator()
            .ok_or_else(|| CbError::validation(format!("{operator} has no SQL operator"))),
        other => Err(CbError::validation(format!(
            "a sub-statement can only be compared with a comparison operator, not {other}"
        ))),
    }
}

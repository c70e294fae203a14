use super::QueryDescriptor;
use crate::clause::Placement;
use crate::error::{CbError, CbResult};
use crate::operator::{Arity, OperatorKind};
use crate::option::{FromToOption, LikeSearchOption, RangeOfOption};
use crate::param::placeholder;
use crate::purpose::Operation;
use crate::relation::NodeId;
use crate::value::BindValue;

/// Predicate handle on one node of a descriptor's relation graph.
///
/// ```
/// use cbsql::{QueryDescriptor, SchemaRegistry, TableInfo, ValueType};
///
/// # fn main() -> cbsql::CbResult<()> {
/// let meta = SchemaRegistry::new()
///     .with_table(
///         TableInfo::new("member")
///             .with_primary_key("member_id", ValueType::Integer)
///             .with_column("member_name", ValueType::Text),
///     )?
///     .into_ref();
/// let mut cb = QueryDescriptor::new(meta, "member")?;
/// cb.query().equal("member_name", "Stojkovic")?;
/// assert_eq!(
///     cb.to_statement()?.sql(),
///     "SELECT t0.member_id, t0.member_name FROM member t0 WHERE t0.member_name = #{cq.member_name.equal}"
/// );
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConditionQuery<'a> {
    pub(crate) desc: &'a mut QueryDescriptor,
    pub(crate) node: NodeId,
    pub(crate) placement: Placement,
}

impl<'a> ConditionQuery<'a> {
    pub(crate) fn new(desc: &'a mut QueryDescriptor, node: NodeId) -> Self {
        Self {
            desc,
            node,
            placement: Placement::Where,
        }
    }

    /// Move to the foreign relation `property`, joining it on first use.
    pub fn relation(self, property: &str) -> CbResult<ConditionQuery<'a>> {
        self.desc.guard(Operation::Predicate)?;
        let node = self.desc.ensure_relation(self.node, property)?;
        Ok(ConditionQuery {
            desc: self.desc,
            node,
            placement: Placement::Where,
        })
    }

    /// Alias of the node this handle targets.
    pub fn alias(&self) -> &str {
        &self.desc.graph.node(self.node).alias
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    /// Place following predicates in the ON clause of this relation's join.
    pub fn on_clause(mut self) -> Self {
        self.placement = Placement::OnClause;
        self
    }

    /// Place following predicates in an inline view of this relation (or the base table).
    pub fn inline_view(mut self) -> Self {
        self.placement = Placement::InlineView;
        self
    }

    /// Render this relation's join as INNER JOIN, together with its ancestors.
    pub fn inner_join(&mut self) -> CbResult<&mut Self> {
        self.desc.guard(Operation::Predicate)?;
        if self.node == NodeId::ROOT {
            return Err(CbError::validation("the base table has no join to make inner"));
        }
        let alias = self.alias().to_string();
        self.desc.clause.force_inner(&alias)?;
        Ok(self)
    }

    /// Supply a dynamic parameter of this relation's fixed condition.
    pub fn fixed_param(&mut self, name: &str, value: impl Into<BindValue>) -> CbResult<&mut Self> {
        let alias = self.alias().to_string();
        let path = format!("fixed.{alias}.{name}");
        let declared = self
            .desc
            .clause
            .join(&alias)
            .is_some_and(|join| join.fixed_params.contains(&path));
        if !declared {
            return Err(CbError::metadata(format!(
                "relation '{alias}' has no fixed condition parameter '{name}'"
            )));
        }
        self.desc.params.insert(&path, value.into());
        Ok(self)
    }

    /// Placeholder text of a fixed-condition parameter (for custom predicates).
    pub fn fixed_param_placeholder(&self, name: &str) -> String {
        placeholder(&format!("fixed.{}.{name}", self.alias()))
    }

    // generic entry point

    /// Register `column {operator} value`, routing by operator arity.
    ///
    /// Two-operand operators take a two-element list.
    pub fn set(
        &mut self,
        column: &str,
        operator: OperatorKind,
        value: impl Into<BindValue>,
    ) -> CbResult<&mut Self> {
        let value = value.into();
        match operator.arity() {
            Arity::None => self.register(column, operator, None)?,
            Arity::Single if operator.is_like() => {
                let option = self.default_like_option(operator);
                self.desc
                    .register_like(self.node, self.placement, column, operator, value, &option)?
            }
            Arity::Single => self.register(column, operator, Some(value))?,
            Arity::List => {
                let list = match value {
                    BindValue::List(items) => BindValue::List(items),
                    single => BindValue::List(vec![single]),
                };
                self.register(column, operator, Some(list))?
            }
            Arity::Pair => {
                let (lower, upper) = match value {
                    BindValue::List(mut items) if items.len() == 2 => {
                        let upper = items.pop().unwrap_or(BindValue::Null);
                        let lower = items.pop().unwrap_or(BindValue::Null);
                        (lower, upper)
                    }
                    other => {
                        return Err(CbError::validation(format!(
                            "{operator} needs a two-element list, got {other}"
                        )));
                    }
                };
                match operator {
                    OperatorKind::FromTo => {
                        self.from_to(column, lower, upper, FromToOption::new())?;
                    }
                    _ => {
                        self.range_of(column, lower, upper, RangeOfOption::new())?;
                    }
                }
            }
        }
        Ok(self)
    }

    fn register(
        &mut self,
        column: &str,
        operator: OperatorKind,
        value: Option<BindValue>,
    ) -> CbResult<()> {
        self.desc
            .register_predicate(self.node, self.placement, column, operator, value)
    }

    fn default_like_option(&self, operator: OperatorKind) -> LikeSearchOption {
        let option = LikeSearchOption::new().escape_by(self.desc.config.like_escape);
        match operator {
            OperatorKind::PrefixSearch => option.like_prefix(),
            _ => option,
        }
    }

    // comparisons

    pub fn equal(&mut self, column: &str, value: impl Into<BindValue>) -> CbResult<&mut Self> {
        self.register(column, OperatorKind::Equal, Some(value.into()))?;
        Ok(self)
    }

    pub fn not_equal(&mut self, column: &str, value: impl Into<BindValue>) -> CbResult<&mut Self> {
        self.register(column, OperatorKind::NotEqual, Some(value.into()))?;
        Ok(self)
    }

    pub fn greater_than(&mut self, column: &str, value: impl Into<BindValue>) -> CbResult<&mut Self> {
        self.register(column, OperatorKind::GreaterThan, Some(value.into()))?;
        Ok(self)
    }

    pub fn less_than(&mut self, column: &str, value: impl Into<BindValue>) -> CbResult<&mut Self> {
        self.register(column, OperatorKind::LessThan, Some(value.into()))?;
        Ok(self)
    }

    pub fn greater_equal(&mut self, column: &str, value: impl Into<BindValue>) -> CbResult<&mut Self> {
        self.register(column, OperatorKind::GreaterEqual, Some(value.into()))?;
        Ok(self)
    }

    pub fn less_equal(&mut self, column: &str, value: impl Into<BindValue>) -> CbResult<&mut Self> {
        self.register(column, OperatorKind::LessEqual, Some(value.into()))?;
        Ok(self)
    }

    // lists

    pub fn in_scope<I, V>(&mut self, column: &str, values: I) -> CbResult<&mut Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<BindValue>,
    {
        let list = BindValue::List(values.into_iter().map(Into::into).collect());
        self.register(column, OperatorKind::InScope, Some(list))?;
        Ok(self)
    }

    pub fn not_in_scope<I, V>(&mut self, column: &str, values: I) -> CbResult<&mut Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<BindValue>,
    {
        let list = BindValue::List(values.into_iter().map(Into::into).collect());
        self.register(column, OperatorKind::NotInScope, Some(list))?;
        Ok(self)
    }

    // null checks

    pub fn is_null(&mut self, column: &str) -> CbResult<&mut Self> {
        self.register(column, OperatorKind::IsNull, None)?;
        Ok(self)
    }

    pub fn is_null_or_empty(&mut self, column: &str) -> CbResult<&mut Self> {
        self.register(column, OperatorKind::IsNullOrEmpty, None)?;
        Ok(self)
    }

    pub fn is_not_null(&mut self, column: &str) -> CbResult<&mut Self> {
        self.register(column, OperatorKind::IsNotNull, None)?;
        Ok(self)
    }

    // pattern matching

    /// `column LIKE 'value%'` with the configured escape character.
    pub fn prefix_search(&mut self, column: &str, value: impl Into<BindValue>) -> CbResult<&mut Self> {
        let option = self.default_like_option(OperatorKind::PrefixSearch);
        self.desc.register_like(
            self.node,
            self.placement,
            column,
            OperatorKind::PrefixSearch,
            value.into(),
            &option,
        )?;
        Ok(self)
    }

    pub fn like_search(
        &mut self,
        column: &str,
        value: impl Into<BindValue>,
        option: LikeSearchOption,
    ) -> CbResult<&mut Self> {
        self.desc.register_like(
            self.node,
            self.placement,
            column,
            OperatorKind::LikeSearch,
            value.into(),
            &option,
        )?;
        Ok(self)
    }

    pub fn not_like_search(
        &mut self,
        column: &str,
        value: impl Into<BindValue>,
        option: LikeSearchOption,
    ) -> CbResult<&mut Self> {
        self.desc.register_like(
            self.node,
            self.placement,
            column,
            OperatorKind::NotLikeSearch,
            value.into(),
            &option,
        )?;
        Ok(self)
    }

    // ranges

    /// `min <= column <= max`; each bound is tested for absence on its own.
    pub fn range_of(
        &mut self,
        column: &str,
        min: impl Into<BindValue>,
        max: impl Into<BindValue>,
        option: RangeOfOption,
    ) -> CbResult<&mut Self> {
        let lower_op = if option.greater_than {
            OperatorKind::GreaterThan
        } else {
            OperatorKind::GreaterEqual
        };
        let upper_op = if option.less_than {
            OperatorKind::LessThan
        } else {
            OperatorKind::LessEqual
        };
        self.desc.register_range(
            self.node,
            self.placement,
            column,
            OperatorKind::RangeOf,
            (lower_op, min.into()),
            (upper_op, max.into()),
            option.allow_one_side,
        )?;
        Ok(self)
    }

    /// `from <= column <= to`, or `< next day` under compare-as-date.
    pub fn from_to(
        &mut self,
        column: &str,
        from: impl Into<BindValue>,
        to: impl Into<BindValue>,
        option: FromToOption,
    ) -> CbResult<&mut Self> {
        let upper_op = if option.compare_as_date {
            OperatorKind::LessThan
        } else {
            OperatorKind::LessEqual
        };
        self.desc.register_range(
            self.node,
            self.placement,
            column,
            OperatorKind::FromTo,
            (OperatorKind::GreaterEqual, option.filter_from(from.into())),
            (upper_op, option.filter_to(to.into())),
            option.allow_one_side,
        )?;
        Ok(self)
    }

    pub(crate) fn require_where(&self, what: &str) -> CbResult<()> {
        if self.placement != Placement::Where {
            return Err(CbError::unsupported(format!(
                "{what} can only be placed in WHERE"
            )));
        }
        Ok(())
    }
}

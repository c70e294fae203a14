//! Manual ordering with CASE expressions.
//!
//! A [`ManualOrder`] is a list of when-elements. Without `then` values the
//! elements are priorities (`CASE WHEN .. THEN 0 WHEN .. THEN 1 ELSE 2 END`);
//! with `then` values on every element plus an `else` it is a switch that
//! maps each row to an ordering value.
//!
//! ```
//! use cbsql::{ManualOrder, OperatorKind};
//!
//! # fn main() -> cbsql::CbResult<()> {
//! let mut order = ManualOrder::new();
//! order.when_equal("FML")?;
//! order.when(OperatorKind::GreaterEqual, 10)?.and(OperatorKind::LessThan, 20)?;
//! order.validate()?;
//! # Ok(())
//! # }
//! ```

use crate::clause::Connector;
use crate::config::Dialect;
use crate::error::{CbError, CbResult};
use crate::operator::{Arity, OperatorKind};
use crate::param::{ParamMap, placeholder};
use crate::value::BindValue;

#[derive(Debug, Clone, PartialEq)]
struct Condition {
    operator: OperatorKind,
    value: Option<BindValue>,
}

#[derive(Debug, Clone, PartialEq)]
struct WhenElement {
    conditions: Vec<Condition>,
    connector: Option<Connector>,
    then: Option<BindValue>,
}

/// Builder of a CASE-based ordering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManualOrder {
    elements: Vec<WhenElement>,
    else_value: Option<BindValue>,
}

fn check_operator(operator: OperatorKind) -> CbResult<()> {
    match operator {
        OperatorKind::Equal
        | OperatorKind::NotEqual
        | OperatorKind::GreaterThan
        | OperatorKind::LessThan
        | OperatorKind::GreaterEqual
        | OperatorKind::LessEqual
        | OperatorKind::InScope
        | OperatorKind::NotInScope
        | OperatorKind::IsNull
        | OperatorKind::IsNotNull => Ok(()),
        other => Err(CbError::unsupported(format!(
            "operator {other} cannot be used in a manual order"
        ))),
    }
}

fn condition(operator: OperatorKind, value: Option<BindValue>) -> CbResult<Condition> {
    check_operator(operator)?;
    let needs_value = operator.arity() != Arity::None;
    match (&value, needs_value) {
        (None, true) | (Some(BindValue::Null), true) => Err(CbError::validation(format!(
            "manual order {operator} needs a value"
        ))),
        (Some(BindValue::List(items)), true) if items.is_empty() => Err(CbError::validation(
            format!("manual order {operator} needs at least one value"),
        )),
        _ => Ok(Condition {
            operator,
            value: if needs_value { value } else { None },
        }),
    }
}

impl ManualOrder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a when-element.
    pub fn when(&mut self, operator: OperatorKind, value: impl Into<BindValue>) -> CbResult<&mut Self> {
        let cond = condition(operator, Some(value.into()))?;
        self.elements.push(WhenElement {
            conditions: vec![cond],
            connector: None,
            then: None,
        });
        Ok(self)
    }

    pub fn when_equal(&mut self, value: impl Into<BindValue>) -> CbResult<&mut Self> {
        self.when(OperatorKind::Equal, value)
    }

    pub fn when_is_null(&mut self) -> CbResult<&mut Self> {
        let cond = condition(OperatorKind::IsNull, None)?;
        self.elements.push(WhenElement {
            conditions: vec![cond],
            connector: None,
            then: None,
        });
        Ok(self)
    }

    fn connect(
        &mut self,
        connector: Connector,
        operator: OperatorKind,
        value: BindValue,
    ) -> CbResult<&mut Self> {
        let cond = condition(operator, Some(value))?;
        let last = self
            .elements
            .last_mut()
            .ok_or_else(|| CbError::validation("manual order has no when-element to connect to"))?;
        match last.connector {
            Some(existing) if existing != connector => {
                return Err(CbError::unsupported(
                    "AND and OR connectors cannot be mixed in one manual order element",
                ));
            }
            _ => last.connector = Some(connector),
        }
        last.conditions.push(cond);
        Ok(self)
    }

    /// Add a condition ANDed with the latest when-element.
    pub fn and(&mut self, operator: OperatorKind, value: impl Into<BindValue>) -> CbResult<&mut Self> {
        self.connect(Connector::And, operator, value.into())
    }

    /// Add a condition ORed with the latest when-element.
    pub fn or(&mut self, operator: OperatorKind, value: impl Into<BindValue>) -> CbResult<&mut Self> {
        self.connect(Connector::Or, operator, value.into())
    }

    /// Set the ordering value of the latest when-element.
    pub fn then(&mut self, value: impl Into<BindValue>) -> CbResult<&mut Self> {
        let last = self
            .elements
            .last_mut()
            .ok_or_else(|| CbError::validation("then() needs a preceding when-element"))?;
        if last.then.is_some() {
            return Err(CbError::validation("the latest when-element already has a then value"));
        }
        last.then = Some(value.into());
        Ok(self)
    }

    /// Set the ordering value of rows matching no element.
    pub fn else_(&mut self, value: impl Into<BindValue>) -> CbResult<&mut Self> {
        if self.elements.is_empty() {
            return Err(CbError::validation("else() needs at least one when-element"));
        }
        if self.else_value.is_some() {
            return Err(CbError::validation("manual order else value is already set"));
        }
        self.else_value = Some(value.into());
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Whether this is a switch-style order (then values present).
    pub fn is_switch(&self) -> bool {
        self.elements.iter().any(|e| e.then.is_some())
    }

    /// Check the then/else shape.
    pub fn validate(&self) -> CbResult<()> {
        if self.elements.is_empty() {
            return Err(CbError::validation("manual order has no when-element"));
        }
        let with_then = self.elements.iter().filter(|e| e.then.is_some()).count();
        if with_then != 0 && with_then != self.elements.len() {
            return Err(CbError::validation(format!(
                "manual order mixes elements with and without then ({with_then} of {} have then)",
                self.elements.len()
            )));
        }
        match (with_then > 0, self.else_value.is_some()) {
            (true, false) => Err(CbError::validation(
                "manual order with then values needs an else value",
            )),
            (false, true) => Err(CbError::validation(
                "manual order without then values cannot have an else value",
            )),
            _ => Ok(()),
        }
    }

    /// Validate, then bind every value under `prefix` (or embed literals when
    /// the dialect cannot bind inside CASE).
    pub(crate) fn bind(
        &self,
        dialect: Dialect,
        prefix: &str,
        params: &mut ParamMap,
    ) -> CbResult<BoundManualOrder> {
        self.validate()?;
        let mut binder = Binder {
            embed: !dialect.binds_in_case(),
            prefix,
            params,
        };
        let mut elements = Vec::with_capacity(self.elements.len());
        for (i, element) in self.elements.iter().enumerate() {
            let mut conditions = Vec::with_capacity(element.conditions.len());
            for (j, cond) in element.conditions.iter().enumerate() {
                let name = if j == 0 { format!("w{i}") } else { format!("w{i}_{j}") };
                let operand = match &cond.value {
                    Some(v) => binder.operand(&name, v)?,
                    None => String::new(),
                };
                conditions.push((cond.operator, operand));
            }
            let then = match &element.then {
                Some(v) => Some(binder.operand(&format!("t{i}"), v)?),
                None => None,
            };
            elements.push(BoundElement {
                conditions,
                connector: element.connector.unwrap_or(Connector::And),
                then,
            });
        }
        let else_text = match &self.else_value {
            Some(v) => Some(binder.operand("else", v)?),
            None => None,
        };
        Ok(BoundManualOrder { elements, else_text })
    }
}

struct Binder<'a> {
    embed: bool,
    prefix: &'a str,
    params: &'a mut ParamMap,
}

impl Binder<'_> {
    fn operand(&mut self, name: &str, value: &BindValue) -> CbResult<String> {
        if self.embed {
            return embed_literal(value);
        }
        let path = format!("{}.{name}", self.prefix);
        self.params.insert(&path, value.clone());
        Ok(placeholder(&path))
    }
}

fn embed_literal(value: &BindValue) -> CbResult<String> {
    match value {
        BindValue::List(items) => items
            .iter()
            .map(embed_literal)
            .collect::<CbResult<Vec<_>>>()
            .map(|parts| parts.join(", ")),
        other => other.embeddable_literal().ok_or_else(|| {
            CbError::unsupported(format!(
                "value {other} cannot be embedded as a literal in a manual order on this dialect"
            ))
        }),
    }
}

#[derive(Debug, Clone, PartialEq)]
struct BoundElement {
    conditions: Vec<(OperatorKind, String)>,
    connector: Connector,
    then: Option<String>,
}

/// A manual order whose values are bound; rendered against a column at render time.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundManualOrder {
    elements: Vec<BoundElement>,
    else_text: Option<String>,
}

impl BoundManualOrder {
    pub fn render(&self, column: &str) -> CbResult<String> {
        let mut out = String::from("CASE");
        for (i, element) in self.elements.iter().enumerate() {
            let conds = element
                .conditions
                .iter()
                .map(|(op, operand)| op.render(column, operand))
                .collect::<CbResult<Vec<_>>>()?;
            out.push_str(" WHEN ");
            out.push_str(&conds.join(element.connector.sql()));
            out.push_str(" THEN ");
            match &element.then {
                Some(then) => out.push_str(then),
                None => out.push_str(&i.to_string()),
            }
        }
        out.push_str(" ELSE ");
        match &self.else_text {
            Some(text) => out.push_str(text),
            None => out.push_str(&self.elements.len().to_string()),
        }
        out.push_str(" END");
        Ok(out)
    }
}

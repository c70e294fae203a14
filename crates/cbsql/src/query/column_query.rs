//! Column-to-column comparison and column calculation tickets.

use super::{QueryDescriptor, SpecifyQuery};
use crate::clause::{Placement, WherePredicate};
use crate::error::{CbError, CbResult};
use crate::operator::OperatorKind;
use crate::param::placeholder;
use crate::purpose::{LockState, Operation, Purpose};
use crate::value::{BindValue, ValueType};

/// Arithmetic applied to a ticket's column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalcOp {
    Plus,
    Minus,
    Multiply,
    Divide,
}

impl CalcOp {
    pub(crate) fn sql(self) -> &'static str {
        match self {
            CalcOp::Plus => "+",
            CalcOp::Minus => "-",
            CalcOp::Multiply => "*",
            CalcOp::Divide => "/",
        }
    }

    pub(crate) fn is_multiplicative(self) -> bool {
        matches!(self, CalcOp::Multiply | CalcOp::Divide)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(BindValue),
    Column(Box<ColumnTicket>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Calculation {
    pub op: CalcOp,
    pub operand: Operand,
}

/// A column named through a specification handle, plus calculations on it.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnTicket {
    /// Relation properties from the base table.
    pub path: Vec<String>,
    /// Base table the path starts from.
    pub table: String,
    pub column: String,
    pub value_type: ValueType,
    pub calculations: Vec<Calculation>,
}

impl ColumnTicket {
    pub(crate) fn new(path: Vec<String>, table: String, column: String, value_type: ValueType) -> Self {
        Self {
            path,
            table,
            column,
            value_type,
            calculations: Vec::new(),
        }
    }

    fn calculate(mut self, op: CalcOp, operand: Operand) -> CbResult<Self> {
        if !self.value_type.is_numeric() {
            return Err(CbError::type_mismatch(
                &self.table,
                &self.column,
                format!("cannot apply '{}' to a {:?} column", op.sql(), self.value_type),
            ));
        }
        if let Operand::Column(other) = &operand {
            if !other.value_type.is_numeric() {
                return Err(CbError::type_mismatch(
                    &other.table,
                    &other.column,
                    format!("cannot use a {:?} column as a calculation operand", other.value_type),
                ));
            }
        }
        self.calculations.push(Calculation { op, operand });
        Ok(self)
    }

    pub fn plus(self, value: impl Into<BindValue>) -> CbResult<Self> {
        self.calculate(CalcOp::Plus, Operand::Value(value.into()))
    }

    pub fn minus(self, value: impl Into<BindValue>) -> CbResult<Self> {
        self.calculate(CalcOp::Minus, Operand::Value(value.into()))
    }

    pub fn multiply(self, value: impl Into<BindValue>) -> CbResult<Self> {
        self.calculate(CalcOp::Multiply, Operand::Value(value.into()))
    }

    pub fn divide(self, value: impl Into<BindValue>) -> CbResult<Self> {
        self.calculate(CalcOp::Divide, Operand::Value(value.into()))
    }

    pub fn plus_column(self, other: ColumnTicket) -> CbResult<Self> {
        self.calculate(CalcOp::Plus, Operand::Column(Box::new(other)))
    }

    pub fn minus_column(self, other: ColumnTicket) -> CbResult<Self> {
        self.calculate(CalcOp::Minus, Operand::Column(Box::new(other)))
    }

    pub fn multiply_column(self, other: ColumnTicket) -> CbResult<Self> {
        self.calculate(CalcOp::Multiply, Operand::Column(Box::new(other)))
    }

    pub fn divide_column(self, other: ColumnTicket) -> CbResult<Self> {
        self.calculate(CalcOp::Divide, Operand::Column(Box::new(other)))
    }
}

impl QueryDescriptor {
    /// Render a ticket against this descriptor, joining its path as needed.
    ///
    /// Returns the expression and every alias it reads. Calculation values
    /// are bound under `prefix`.
    pub(crate) fn resolve_ticket(
        &mut self,
        ticket: &ColumnTicket,
        prefix: &str,
    ) -> CbResult<(String, Vec<String>)> {
        if ticket.table != self.table() {
            return Err(CbError::validation(format!(
                "column '{}' was specified on '{}', not on '{}'",
                ticket.column,
                ticket.table,
                self.table()
            )));
        }
        let node = self.ensure_path(&ticket.path)?;
        let column = self.table_info(node)?.column(&ticket.column)?.sql_name.clone();
        let alias = self.graph.node(node).alias.clone();
        let mut expr = format!("{alias}.{column}");
        let mut aliases = vec![alias];
        let mut additive = false;
        for (i, calc) in ticket.calculations.iter().enumerate() {
            let operand = match &calc.operand {
                Operand::Value(value) => {
                    let path = format!("{prefix}.c{i}");
                    self.params.insert(&path, value.clone());
                    placeholder(&path)
                }
                Operand::Column(other) => {
                    let (other_expr, other_aliases) =
                        self.resolve_ticket(other, &format!("{prefix}.c{i}"))?;
                    for a in other_aliases {
                        if !aliases.contains(&a) {
                            aliases.push(a);
                        }
                    }
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
        Ok((expr, aliases))
    }

    /// Compare two columns (with their calculations) in WHERE.
    pub fn compare_columns(
        &mut self,
        left: &ColumnTicket,
        operator: OperatorKind,
        right: &ColumnTicket,
    ) -> CbResult<()> {
        self.guard(Operation::Predicate)?;
        let sql_op = match operator {
            OperatorKind::Equal
            | OperatorKind::NotEqual
            | OperatorKind::GreaterThan
            | OperatorKind::LessThan
            | OperatorKind::GreaterEqual
            | OperatorKind::LessEqual => operator.sql_operator().unwrap_or("="),
            other => {
                return Err(CbError::validation(format!(
                    "column comparison supports comparison operators only, not {other}"
                )));
            }
        };
        let prefix = format!("column_query.q{}", self.next_sequence());
        let (left_expr, mut aliases) = self.resolve_ticket(left, &format!("{prefix}.left"))?;
        let (right_expr, right_aliases) = self.resolve_ticket(right, &format!("{prefix}.right"))?;
        for a in right_aliases {
            if !aliases.contains(&a) {
                aliases.push(a);
            }
        }
        let root = self.alias().to_string();
        let mut predicate =
            WherePredicate::fixed(format!("{left_expr} {sql_op} {right_expr}"), &root);
        predicate.aliases = aliases;
        self.clause.add_predicate(Placement::Where, &root, true, predicate)
    }

    /// Compare two columns, each named through its own specification handle.
    ///
    /// ```
    /// use cbsql::{OperatorKind, QueryDescriptor, SchemaRegistry, TableInfo, ValueType};
    ///
    /// # fn main() -> cbsql::CbResult<()> {
    /// let meta = SchemaRegistry::new()
    ///     .with_table(
    ///         TableInfo::new("purchase")
    ///             .with_primary_key("purchase_id", ValueType::BigInt)
    ///             .with_column("purchase_price", ValueType::Integer)
    ///             .with_column("purchase_count", ValueType::Integer),
    ///     )?
    ///     .into_ref();
    /// let mut cb = QueryDescriptor::new(meta, "purchase")?;
    /// cb.column_query(
    ///     |mut s| s.column_ticket("purchase_price"),
    ///     OperatorKind::GreaterThan,
    ///     |mut s| s.column_ticket("purchase_count")?.multiply(100),
    /// )?;
    /// assert!(cb.to_statement()?.sql().ends_with(
    ///     "WHERE t0.purchase_price > t0.purchase_count * #{column_query.q0.right.c0}"
    /// ));
    /// # Ok(())
    /// # }
    /// ```
    pub fn column_query<L, R>(&mut self, left: L, operator: OperatorKind, right: R) -> CbResult<()>
    where
        L: FnOnce(SpecifyQuery<'_>) -> CbResult<ColumnTicket>,
        R: FnOnce(SpecifyQuery<'_>) -> CbResult<ColumnTicket>,
    {
        self.guard(Operation::Predicate)?;
        let left = self.ticket_from(left)?;
        let right = self.ticket_from(right)?;
        self.compare_columns(&left, operator, &right)
    }

    fn ticket_from<F>(&mut self, build: F) -> CbResult<ColumnTicket>
    where
        F: FnOnce(SpecifyQuery<'_>) -> CbResult<ColumnTicket>,
    {
        let mut detached = self.detached(Purpose::ColumnQuery)?;
        detached.set_lock(LockState::ExemptDetachedRoot);
        build(detached.specify())
    }
}

use crate::config::Dialect;
use crate::error::CbResult;
use crate::manual_order::BoundManualOrder;

/// Placement of NULLs in an ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

/// One ORDER BY entry.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderEntry {
    /// Qualified column (`t0r_0.display_order`) or derived expression.
    pub column: String,
    /// Name of the column in the select list, used when ordering a union.
    pub output_name: String,
    pub alias: String,
    pub ascending: bool,
    pub nulls: Option<NullsOrder>,
    pub manual: Option<BoundManualOrder>,
}

impl OrderEntry {
    pub fn new(column: String, output_name: String, alias: String, ascending: bool) -> Self {
        Self {
            column,
            output_name,
            alias,
            ascending,
            nulls: None,
            manual: None,
        }
    }

    /// Render against the table column, or against the output name for unions.
    pub(crate) fn render(&self, dialect: Dialect, over_union: bool) -> CbResult<String> {
        let column = if over_union {
            self.output_name.as_str()
        } else {
            self.column.as_str()
        };
        let direction = if self.ascending { "ASC" } else { "DESC" };
        let expr = match &self.manual {
            Some(manual) => manual.render(column)?,
            None => column.to_string(),
        };
        Ok(match self.nulls {
            None => format!("{expr} {direction}"),
            Some(nulls) if dialect.supports_nulls_ordering() => {
                let placement = match nulls {
                    NullsOrder::First => "NULLS FIRST",
                    NullsOrder::Last => "NULLS LAST",
                };
                format!("{expr} {direction} {placement}")
            }
            Some(nulls) => {
                let (null_rank, other_rank) = match nulls {
                    NullsOrder::First => (0, 1),
                    NullsOrder::Last => (1, 0),
                };
                format!(
                    "CASE WHEN {column} IS NULL THEN {null_rank} ELSE {other_rank} END ASC, {expr} {direction}"
                )
            }
        })
    }
}

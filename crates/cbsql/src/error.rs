//! Error types for cbsql

use crate::operator::OperatorKind;
use crate::purpose::Purpose;
use std::fmt;
use thiserror::Error;

/// Result type alias for cbsql operations
pub type CbResult<T> = Result<T, CbError>;

/// Error types raised while building, rendering or paging a query.
#[derive(Debug, Error)]
pub enum CbError {
    /// Operation not legal for the descriptor's current purpose
    #[error("Purpose violation: {operation} is not allowed for purpose {purpose:?} (table {table})")]
    PurposeViolation {
        purpose: Purpose,
        operation: String,
        table: String,
    },

    /// Structural mutation attempted while a sub-statement is reading the tree
    #[error("Lock violation: {operation} on table {table} while the descriptor is locked by a sub-statement")]
    LockViolation { operation: String, table: String },

    /// Null/empty/invalid operand under checked mode
    #[error("Invalid query value: {0}")]
    InvalidQueryValue(InvalidQueryReport),

    /// Combination of options the engine cannot express
    #[error("Unsupported combination: {0}")]
    UnsupportedCombination(String),

    /// Non-numeric column used where arithmetic is required
    #[error("Column type mismatch on {table}.{column}: {message}")]
    ColumnTypeMismatch {
        table: String,
        column: String,
        message: String,
    },

    /// A path-based invocation could not be resolved
    #[error("Dynamic resolution failure at '{segment}' in '{path}': {message}")]
    DynamicResolutionFailure {
        path: String,
        segment: String,
        message: String,
    },

    /// Paging executed without a fetch window
    #[error("Paging state invalid: {0}")]
    PagingStateInvalid(String),

    /// Derived total count exceeds the configured safety maximum
    #[error("Paging over safety limit: {count} rows exceed the safety maximum {max}")]
    PagingOverSafetyLimit { count: u64, max: u64 },

    /// A predicate was registered twice on the same column and operator
    #[error("Query override on {table}.{column} ({operator}): override is not allowed")]
    QueryOverride {
        table: String,
        column: String,
        operator: OperatorKind,
    },

    /// A sub-statement that would scan the whole table with no correlation
    #[error("Guaranteed select-all sub-statement on {table}: {message}")]
    GuaranteedSelectAll { table: String, message: String },

    /// Relation/engine configuration problem (fixed condition parameters, config file)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Unknown table, column or relation
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// Builder validation error (manual order, specify, statement shape)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Error reported by an injected executor
    #[error("Execution error: {0}")]
    Execution(String),
}

impl CbError {
    /// Create a purpose violation error
    pub fn purpose(purpose: Purpose, operation: impl Into<String>, table: impl Into<String>) -> Self {
        Self::PurposeViolation {
            purpose,
            operation: operation.into(),
            table: table.into(),
        }
    }

    /// Create a lock violation error
    pub fn lock(operation: impl Into<String>, table: impl Into<String>) -> Self {
        Self::LockViolation {
            operation: operation.into(),
            table: table.into(),
        }
    }

    /// Create an unsupported combination error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedCombination(message.into())
    }

    /// Create a column type mismatch error
    pub fn type_mismatch(
        table: impl Into<String>,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ColumnTypeMismatch {
            table: table.into(),
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a dynamic resolution failure
    pub fn unresolved(
        path: impl Into<String>,
        segment: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::DynamicResolutionFailure {
            path: path.into(),
            segment: segment.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a metadata error
    pub fn metadata(message: impl Into<String>) -> Self {
        Self::Metadata(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Check if this is a purpose violation
    pub fn is_purpose_violation(&self) -> bool {
        matches!(self, Self::PurposeViolation { .. })
    }

    /// Check if this is a lock violation
    pub fn is_lock_violation(&self) -> bool {
        matches!(self, Self::LockViolation { .. })
    }

    /// Check if this is an invalid query value error
    pub fn is_invalid_query(&self) -> bool {
        matches!(self, Self::InvalidQueryValue(_))
    }

    /// Check if this is an unsupported combination error
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedCombination(_))
    }
}

/// One rejected operand: which column/operator got which value.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidQueryEntry {
    pub table: String,
    pub column: String,
    pub operator: OperatorKind,
    /// Display form of the offending value (`null`, `''`, `[]`, ...)
    pub value: String,
}

impl fmt::Display for InvalidQueryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} {} {}",
            self.table, self.column, self.operator, self.value
        )
    }
}

/// All rejected operands of one registration call.
///
/// Correlated operands (a range's lower and upper bound) are reported together.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidQueryReport {
    pub entries: Vec<InvalidQueryEntry>,
}

impl InvalidQueryReport {
    pub fn single(entry: InvalidQueryEntry) -> Self {
        Self {
            entries: vec![entry],
        }
    }
}

impl fmt::Display for InvalidQueryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl From<toml::de::Error> for CbError {
    fn from(err: toml::de::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}

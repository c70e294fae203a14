//! Construction purposes and the guards that enforce them.
//!
//! Every descriptor carries a [`Purpose`]; its [`Capabilities`] row decides
//! which builder operations are legal. A descriptor that is being read by a
//! sub-statement builder is locked, see [`LockState`].

use crate::config::CbConfig;
use crate::error::{CbError, CbResult};
use std::fmt;

/// Role of a descriptor in the statement being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    NormalUse,
    UnionQuery,
    ExistsReferrer,
    InScopeRelation,
    DerivedReferrer,
    ScalarSelect,
    ScalarCondition,
    ScalarConditionPartitionBy,
    OrScopeQuery,
    ColumnQuery,
    QueryInsert,
    DreamCruise,
    VaryingUpdate,
    SpecifiedUpdate,
}

/// Operations gated by the purpose table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    SetupSelect,
    SpecifyColumn,
    /// Specifying a second (or later) column.
    SpecifyAnotherColumn,
    SpecifyRelation,
    SpecifyDerived,
    Predicate,
    OrderBy,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::SetupSelect => "setup-select",
            Operation::SpecifyColumn => "specify column",
            Operation::SpecifyAnotherColumn => "specify two or more columns",
            Operation::SpecifyRelation => "specify relation",
            Operation::SpecifyDerived => "specify derived referrer",
            Operation::Predicate => "query predicate",
            Operation::OrderBy => "order-by",
        })
    }
}

/// Capability row of a purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub select: bool,
    pub predicate: bool,
    pub order_by: bool,
    pub specify: bool,
    pub specify_two_or_more: bool,
    pub specify_relation: bool,
    pub specify_derived: bool,
}

const fn caps(
    select: bool,
    predicate: bool,
    order_by: bool,
    specify: bool,
    specify_two_or_more: bool,
    specify_relation: bool,
    specify_derived: bool,
) -> Capabilities {
    Capabilities {
        select,
        predicate,
        order_by,
        specify,
        specify_two_or_more,
        specify_relation,
        specify_derived,
    }
}

impl Purpose {
    pub fn capabilities(self) -> Capabilities {
        //                              select pred   order  spec   spec2+ rel    derived
        match self {
            Purpose::NormalUse => caps(true, true, true, true, true, true, true),
            Purpose::UnionQuery => caps(false, true, false, false, false, false, false),
            Purpose::ExistsReferrer => caps(false, true, false, false, false, false, false),
            Purpose::InScopeRelation => caps(false, true, false, false, false, false, false),
            Purpose::DerivedReferrer => caps(false, true, false, true, false, false, false),
            Purpose::ScalarSelect => caps(false, true, false, true, false, false, false),
            Purpose::ScalarCondition => caps(false, true, false, true, false, false, false),
            Purpose::ScalarConditionPartitionBy => {
                caps(false, false, false, true, true, false, false)
            }
            Purpose::OrScopeQuery => caps(false, true, false, false, false, false, false),
            Purpose::ColumnQuery => caps(false, false, false, true, false, true, true),
            Purpose::QueryInsert => caps(false, true, false, true, true, true, false),
            Purpose::DreamCruise => caps(false, false, false, true, false, true, true),
            Purpose::VaryingUpdate => caps(false, false, false, true, false, false, false),
            Purpose::SpecifiedUpdate => caps(false, false, false, true, true, false, false),
        }
    }

    /// Whether `operation` is legal under this purpose.
    pub fn allows(self, operation: Operation) -> bool {
        let c = self.capabilities();
        match operation {
            Operation::SetupSelect => c.select,
            Operation::SpecifyColumn => c.specify,
            Operation::SpecifyAnotherColumn => c.specify && c.specify_two_or_more,
            Operation::SpecifyRelation => c.specify && c.specify_relation,
            Operation::SpecifyDerived => c.specify && c.specify_derived,
            Operation::Predicate => c.predicate,
            Operation::OrderBy => c.order_by,
        }
    }

    /// Whether a descriptor spawned with this purpose keeps its parent's level.
    ///
    /// Union and dream-cruise descriptors are alternate branches of their
    /// parent, not deeper correlations.
    pub fn is_branch(self) -> bool {
        matches!(self, Purpose::UnionQuery | Purpose::DreamCruise)
    }

    /// Whether this purpose renders a correlated sub-statement.
    pub fn is_substatement(self) -> bool {
        matches!(
            self,
            Purpose::ExistsReferrer
                | Purpose::InScopeRelation
                | Purpose::DerivedReferrer
                | Purpose::ScalarCondition
                | Purpose::ScalarConditionPartitionBy
        )
    }
}

/// Three-state lock of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockState {
    #[default]
    Unlocked,
    /// A sub-statement builder is reading this descriptor's tree.
    LockedBySubstatement,
    /// Detached dream-cruise root; mutated from inside nested builder callbacks.
    ExemptDetachedRoot,
}

/// Mode flags copied from parent to child when a sub-statement is spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryModes {
    pub checked_invalid_query: bool,
    pub empty_string_allowed: bool,
    pub override_allowed: bool,
    pub structural_inner_join: bool,
    pub where_used_inner_join: bool,
    pub lock_detection: bool,
}

impl QueryModes {
    pub fn from_config(config: &CbConfig) -> Self {
        Self {
            checked_invalid_query: config.checked_invalid_query,
            empty_string_allowed: config.empty_string_query_allowed,
            override_allowed: config.override_allowed,
            structural_inner_join: config.structural_inner_join,
            where_used_inner_join: config.where_used_inner_join,
            lock_detection: config.lock_detection,
        }
    }
}

/// Reject `operation` unless both the purpose and the lock allow it.
///
/// Runs before any state is touched so a rejected call leaves no trace.
pub fn guard(
    purpose: Purpose,
    lock: LockState,
    modes: &QueryModes,
    operation: Operation,
    table: &str,
) -> CbResult<()> {
    if !purpose.allows(operation) {
        return Err(CbError::purpose(purpose, operation.to_string(), table));
    }
    if lock == LockState::LockedBySubstatement && modes.lock_detection {
        return Err(CbError::lock(operation.to_string(), table));
    }
    Ok(())
}

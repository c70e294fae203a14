//! # cbsql
//!
//! Incremental, metadata-driven SQL assembly for relational databases.
//!
//! ## Features
//!
//! - **Descriptor-first**: a [`QueryDescriptor`] accumulates joins, predicates,
//!   ordering and paging; nothing is rendered until you ask for a statement
//! - **Relations by name**: foreign relations are joined on first use and get
//!   stable aliases (`t0r_0`, `t0r_0_1`)
//! - **Correlated sub-statements**: EXISTS, IN-scope, derived referrers and
//!   scalar conditions are built with nested descriptors
//! - **Named parameters**: every value lives in a [`ParamMap`] behind a
//!   `#{dotted.path}` placeholder; [`BoundStatement::to_positional`] converts
//!   for a driver
//! - **Paging**: [`PageFetchCoordinator`] runs the count/fetch cycle with
//!   count-later and re-select
//! - **Safe defaults**: query update and delete require a condition, updates
//!   require a SET column
//!
//! ## Example
//!
//! ```
//! use cbsql::{ForeignInfo, OperatorKind, QueryDescriptor, SchemaRegistry, TableInfo, ValueType};
//!
//! # fn main() -> cbsql::CbResult<()> {
//! let meta = SchemaRegistry::new()
//!     .with_table(
//!         TableInfo::new("member")
//!             .with_primary_key("member_id", ValueType::Integer)
//!             .with_column("member_name", ValueType::Text)
//!             .with_column("member_status_code", ValueType::Text)
//!             .with_foreign(ForeignInfo::new(
//!                 "member_status",
//!                 "member_status",
//!                 &[("member_status_code", "member_status_code")],
//!             )),
//!     )?
//!     .with_table(
//!         TableInfo::new("member_status")
//!             .with_primary_key("member_status_code", ValueType::Text)
//!             .with_column("display_order", ValueType::Integer),
//!     )?
//!     .into_ref();
//!
//! let mut cb = QueryDescriptor::new(meta, "member")?;
//! cb.query().set("member_name", OperatorKind::PrefixSearch, "S")?;
//! cb.query()
//!     .relation("member_status")?
//!     .set("display_order", OperatorKind::LessEqual, 3)?;
//! cb.order_by().asc("member_id")?;
//! cb.paging(20, 1)?;
//!
//! let statement = cb.to_statement()?;
//! assert!(statement.sql().contains("LEFT JOIN member_status t0r_0"));
//! assert!(statement.sql().ends_with("ORDER BY t0.member_id ASC LIMIT 20"));
//! let positional = statement.to_positional()?;
//! assert_eq!(positional.values.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod clause;
pub mod config;
pub mod error;
pub mod ident;
mod invoke;
mod log;
pub mod manual_order;
pub mod meta;
pub mod operator;
pub mod option;
pub mod paging;
pub mod param;
pub mod purpose;
pub mod query;
pub mod relation;
pub mod statement;
pub mod subquery;
mod union;
pub mod update;
pub mod value;

pub use clause::{NullsOrder, Placement};
pub use config::{CbConfig, Dialect, PagingConfig};
pub use error::{CbError, CbResult, InvalidQueryEntry, InvalidQueryReport};
pub use ident::SqlName;
pub use manual_order::ManualOrder;
pub use meta::{
    ColumnInfo, CompoundColumn, FixedCondition, ForeignInfo, MetaRef, MetadataProvider,
    ReferrerInfo, SchemaRegistry, TableInfo,
};
pub use operator::OperatorKind;
pub use option::{FromToOption, LikeSearchOption, RangeOfOption};
pub use paging::{PageFetchCoordinator, PagingHandler, PagingResult};
pub use param::ParamMap;
pub use purpose::{LockState, Purpose, QueryModes};
pub use query::{
    CalcOp, ColumnTicket, ConditionQuery, DerivedColumn, OrderByQuery, QueryDescriptor,
    SpecifyQuery,
};
pub use statement::{BoundStatement, PositionalStatement, StatementKind};
pub use subquery::{AggregateFn, DerivedOption, scalar_select};
pub use update::{QueryDelete, QueryInsert, QueryUpdate};
pub use value::{BindValue, ClassificationCode, ValueType};

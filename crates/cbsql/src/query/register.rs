//! Predicate registration: applicability, override policy, IN chunking,
//! like-search splitting and range expansion.

use super::{QueryDescriptor, column_ref};
use crate::clause::{Connector, Placement, WherePredicate, group};
use crate::error::{CbError, CbResult, InvalidQueryEntry, InvalidQueryReport};
use crate::meta::{ColumnInfo, CompoundColumn};
use crate::operator::{Arity, OperatorKind};
use crate::option::{LikeMatch, LikeSearchOption, SplitConnector};
use crate::param::placeholder;
use crate::purpose::Operation;
use crate::relation::NodeId;
use crate::value::BindValue;

/// Where a predicate goes and what it reads.
struct Target {
    alias: String,
    is_root: bool,
    placement: Placement,
    table: String,
}

/// Outcome of the override check for a key.
enum Slot {
    /// The same predicate is already registered.
    Unchanged,
    Fresh(String),
    Replace(String),
}

impl QueryDescriptor {
    fn target(&self, node: NodeId, placement: Placement) -> Target {
        let n = self.graph.node(node);
        Target {
            alias: n.alias.clone(),
            is_root: n.is_root(),
            placement,
            table: n.table.clone(),
        }
    }

    /// `cq.{relation properties}.{column}.{operator key}`
    fn predicate_key(&self, node: NodeId, column: &str, op_key: &str) -> String {
        let mut key = String::from("cq");
        for property in self.graph.property_path(node) {
            key.push('.');
            key.push_str(property);
        }
        key.push('.');
        key.push_str(column);
        key.push('.');
        key.push_str(op_key);
        key
    }

    fn resolve_column(&self, node: NodeId, column: &str) -> CbResult<ColumnInfo> {
        Ok(self.table_info(node)?.column(column)?.clone())
    }

    /// Decide the parameter key of a new predicate.
    ///
    /// Inside an or-scope the same column and operator may appear in several
    /// alternatives, so the key gets a numeric suffix. Outside, a second
    /// registration is a no-op for the same value, a replacement in override
    /// mode, and an error otherwise.
    fn claim_slot(
        &mut self,
        base_key: String,
        value: Option<&BindValue>,
        target: &Target,
        column: &str,
        operator: OperatorKind,
    ) -> CbResult<Slot> {
        if self.clause.in_or_scope() {
            let mut key = base_key.clone();
            let mut n = 1;
            while self.params.contains(&key) {
                key = format!("{base_key}{n}");
                n += 1;
            }
            return Ok(Slot::Fresh(key));
        }
        let Some(existing) = self.clause.find_keyed(&base_key) else {
            return Ok(Slot::Fresh(base_key));
        };
        if existing.value.as_ref() == value {
            tracing::trace!(
                target: crate::log::TARGET,
                key = %base_key,
                "same predicate registered twice, ignored"
            );
            return Ok(Slot::Unchanged);
        }
        if !self.modes.override_allowed {
            return Err(CbError::QueryOverride {
                table: target.table.clone(),
                column: column.to_string(),
                operator,
            });
        }
        self.params.remove(&base_key);
        Ok(Slot::Replace(base_key))
    }

    fn store(&mut self, target: &Target, slot: Slot, predicate: WherePredicate) -> CbResult<()> {
        match slot {
            Slot::Unchanged => Ok(()),
            Slot::Replace(key) => {
                let value = predicate.value.clone();
                let predicate = predicate.keyed(key.clone(), value);
                if self.clause.replace_keyed(&key, predicate) {
                    Ok(())
                } else {
                    Err(CbError::validation(format!("no predicate registered under '{key}'")))
                }
            }
            Slot::Fresh(key) => {
                let predicate = if self.clause.in_or_scope() {
                    predicate
                } else {
                    let value = predicate.value.clone();
                    predicate.keyed(key, value)
                };
                self.clause
                    .add_predicate(target.placement, &target.alias, target.is_root, predicate)
            }
        }
    }

    /// Skip (recording) or reject invalid operands, per the checked mode.
    pub(crate) fn reject_invalid(&mut self, entries: Vec<InvalidQueryEntry>) -> CbResult<()> {
        if self.modes.checked_invalid_query {
            return Err(CbError::InvalidQueryValue(InvalidQueryReport { entries }));
        }
        for entry in entries {
            tracing::debug!(
                target: crate::log::TARGET,
                table = %entry.table,
                column = %entry.column,
                operator = %entry.operator,
                value = %entry.value,
                "invalid query value, predicate skipped"
            );
            self.skipped.push(entry);
        }
        Ok(())
    }

    fn invalid_entry(target: &Target, column: &str, operator: OperatorKind, value: &BindValue) -> InvalidQueryEntry {
        InvalidQueryEntry {
            table: target.table.clone(),
            column: column.to_string(),
            operator,
            value: value.to_string(),
        }
    }

    /// Register a comparison, list or null-check predicate.
    pub(crate) fn register_predicate(
        &mut self,
        node: NodeId,
        placement: Placement,
        column: &str,
        operator: OperatorKind,
        value: Option<BindValue>,
    ) -> CbResult<()> {
        self.guard(Operation::Predicate)?;
        let target = self.target(node, placement);
        let col = self.resolve_column(node, column)?;
        let column_sql = column_ref(&target.alias, placement, &col.sql_name);
        let esa = self.modes.empty_string_allowed;

        let value = match (operator.arity(), value) {
            (Arity::None, _) => None,
            (Arity::Pair, _) => {
                return Err(CbError::validation(format!(
                    "{operator} takes two bounds; use range_of or from_to"
                )));
            }
            (_, None) => {
                let entry = Self::invalid_entry(&target, column, operator, &BindValue::Null);
                return self.reject_invalid(vec![entry]);
            }
            (Arity::List, Some(BindValue::List(items))) => {
                let present: Vec<BindValue> =
                    items.into_iter().filter(|v| !v.is_absent(esa)).collect();
                if present.is_empty() {
                    let entry =
                        Self::invalid_entry(&target, column, operator, &BindValue::List(present));
                    return self.reject_invalid(vec![entry]);
                }
                Some(BindValue::List(present))
            }
            (_, Some(v)) if v.is_absent(esa) => {
                let entry = Self::invalid_entry(&target, column, operator, &v);
                return self.reject_invalid(vec![entry]);
            }
            (Arity::List, Some(v)) => Some(BindValue::List(vec![v])),
            (_, Some(v)) => Some(v),
        };

        let base_key = self.predicate_key(node, column, operator.key());
        let slot = self.claim_slot(base_key, value.as_ref(), &target, column, operator)?;
        let key = match &slot {
            Slot::Unchanged => return Ok(()),
            Slot::Fresh(key) | Slot::Replace(key) => key.clone(),
        };

        let mut predicate = match (&value, operator.arity()) {
            (Some(BindValue::List(items)), Arity::List) => {
                self.list_predicate(&target, &column_sql, operator, &key, items.clone())?
            }
            (Some(v), _) => {
                self.params.insert(&key, v.clone());
                WherePredicate::fixed(operator.render(&column_sql, &placeholder(&key))?, &target.alias)
            }
            (None, _) => WherePredicate::fixed(operator.render(&column_sql, "")?, &target.alias),
        };
        predicate.value = value;
        let predicate = predicate.ineligible(!operator.allows_inner_join());
        self.store(&target, slot, predicate)
    }

    /// IN / NOT IN, chunked at the configured size: IN chunks are OR'd and
    /// NOT IN chunks AND'd, all wrapped as one predicate.
    fn list_predicate(
        &mut self,
        target: &Target,
        column_sql: &str,
        operator: OperatorKind,
        key: &str,
        items: Vec<BindValue>,
    ) -> CbResult<WherePredicate> {
        let chunk_size = self.config.in_chunk_size.max(1);
        if items.len() <= chunk_size {
            self.params.insert(key, BindValue::List(items));
            return Ok(WherePredicate::fixed(
                operator.render(column_sql, &placeholder(key))?,
                &target.alias,
            ));
        }
        let connector = if operator == OperatorKind::InScope {
            Connector::Or
        } else {
            Connector::And
        };
        let mut parts = Vec::new();
        for (i, chunk) in items.chunks(chunk_size).enumerate() {
            let path = format!("{key}.c{i}");
            self.params.insert(&path, BindValue::List(chunk.to_vec()));
            parts.push(WherePredicate::fixed(
                operator.render(column_sql, &placeholder(&path))?,
                &target.alias,
            ));
        }
        group(connector, parts)
            .ok_or_else(|| CbError::validation("IN list produced no chunk"))
    }

    /// Register a like-search (plain, split or compound-optimized).
    pub(crate) fn register_like(
        &mut self,
        node: NodeId,
        placement: Placement,
        column: &str,
        operator: OperatorKind,
        value: BindValue,
        option: &LikeSearchOption,
    ) -> CbResult<()> {
        self.guard(Operation::Predicate)?;
        if !operator.is_like() {
            return Err(CbError::validation(format!("{operator} is not a like-search operator")));
        }
        if option.split == Some(SplitConnector::Or) && self.clause.in_and_part() {
            return Err(CbError::unsupported(
                "an OR-split like-search cannot be used inside an and-part",
            ));
        }
        let target = self.target(node, placement);
        let compound = self.table_info(node)?.compound(column).cloned();
        if let Some(compound) = compound {
            if !(option.compound_optimization && option.matching == LikeMatch::Prefix) {
                return Err(CbError::metadata(format!(
                    "compound column '{column}' can only be prefix-searched with compound optimization"
                )));
            }
            return self.register_compound_prefix(node, &target, &compound, operator, value);
        }
        let col = self.resolve_column(node, column)?;
        let column_sql = column_ref(&target.alias, placement, &col.sql_name);

        let text = match value.as_text() {
            Some(t) if !value.is_absent(self.modes.empty_string_allowed) => t.to_string(),
            _ => {
                let entry = Self::invalid_entry(&target, column, operator, &value);
                return self.reject_invalid(vec![entry]);
            }
        };

        let base_key = self.predicate_key(node, column, operator.key());
        let slot = self.claim_slot(base_key, Some(&value), &target, column, operator)?;
        let key = match &slot {
            Slot::Unchanged => return Ok(()),
            Slot::Fresh(key) | Slot::Replace(key) => key.clone(),
        };

        let mut predicate = match option.split {
            None => {
                let pattern = like_pattern(option, &text);
                self.params.insert(&key, BindValue::Text(pattern));
                WherePredicate::fixed(like_text(&column_sql, operator, &key, option), &target.alias)
            }
            Some(split) => {
                let parts = option.split_value(&text);
                if parts.is_empty() {
                    let entry = Self::invalid_entry(&target, column, operator, &value);
                    return self.reject_invalid(vec![entry]);
                }
                let mut preds = Vec::with_capacity(parts.len());
                for (i, part) in parts.iter().enumerate() {
                    let path = format!("{key}.s{i}");
                    self.params.insert(&path, BindValue::Text(like_pattern(option, part)));
                    preds.push(WherePredicate::fixed(
                        like_text(&column_sql, operator, &path, option),
                        &target.alias,
                    ));
                }
                let connector = match split {
                    SplitConnector::And => Connector::And,
                    SplitConnector::Or => Connector::Or,
                };
                group(connector, preds)
                    .ok_or_else(|| CbError::validation("like-search split produced no part"))?
            }
        };
        predicate.value = Some(value);
        self.store(&target, slot, predicate)
    }

    /// Prefix search on a compound column: full-width leading segments become
    /// equality on their physical columns, the remainder a prefix LIKE on the
    /// next one.
    fn register_compound_prefix(
        &mut self,
        node: NodeId,
        target: &Target,
        compound: &CompoundColumn,
        operator: OperatorKind,
        value: BindValue,
    ) -> CbResult<()> {
        let text = match value.as_text() {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => {
                let entry = Self::invalid_entry(target, &compound.name, operator, &value);
                return self.reject_invalid(vec![entry]);
            }
        };
        let base_key = self.predicate_key(node, &compound.name, operator.key());
        let slot = self.claim_slot(base_key, Some(&value), target, &compound.name, operator)?;
        let key = match &slot {
            Slot::Unchanged => return Ok(()),
            Slot::Fresh(key) | Slot::Replace(key) => key.clone(),
        };

        let table = self.table_info(node)?.clone();
        let mut rest: &str = &text;
        let mut preds = Vec::new();
        for (i, (part, width)) in compound.parts.iter().enumerate() {
            if rest.is_empty() {
                break;
            }
            let col = table.column(part)?;
            let column_sql = column_ref(&target.alias, target.placement, &col.sql_name);
            let split_at = rest
                .char_indices()
                .nth(*width)
                .map_or(rest.len(), |(idx, _)| idx);
            let is_last = i + 1 == compound.parts.len();
            if rest[..split_at].chars().count() == *width && !is_last {
                let path = format!("{key}.p{i}");
                self.params.insert(&path, BindValue::Text(rest[..split_at].to_string()));
                preds.push(WherePredicate::fixed(
                    format!("{column_sql} = {}", placeholder(&path)),
                    &target.alias,
                ));
                rest = &rest[split_at..];
            } else {
                let option = LikeSearchOption::new()
                    .like_prefix()
                    .escape_by(self.config.like_escape);
                let path = format!("{key}.rest");
                self.params
                    .insert(&path, BindValue::Text(option.build_pattern(rest)));
                preds.push(WherePredicate::fixed(
                    like_text(&column_sql, OperatorKind::PrefixSearch, &path, &option),
                    &target.alias,
                ));
                rest = "";
            }
        }
        let mut predicate = group(Connector::And, preds)
            .ok_or_else(|| CbError::validation("compound prefix search produced no predicate"))?;
        predicate.value = Some(value);
        self.store(target, slot, predicate)
    }

    /// Register a two-bound predicate (range-of, from-to).
    ///
    /// Each bound is tested for absence on its own. Both absent is invalid;
    /// one absent is invalid unless `allow_one_side`. Under checked mode the
    /// invalid bounds are reported together.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn register_range(
        &mut self,
        node: NodeId,
        placement: Placement,
        column: &str,
        operator: OperatorKind,
        lower: (OperatorKind, BindValue),
        upper: (OperatorKind, BindValue),
        allow_one_side: bool,
    ) -> CbResult<()> {
        self.guard(Operation::Predicate)?;
        let target = self.target(node, placement);
        let col = self.resolve_column(node, column)?;
        let column_sql = column_ref(&target.alias, placement, &col.sql_name);
        let esa = self.modes.empty_string_allowed;
        let (lower_op, lower_value) = lower;
        let (upper_op, upper_value) = upper;
        let (lower_name, upper_name) = match operator {
            OperatorKind::FromTo => ("from", "to"),
            _ => ("min", "max"),
        };

        let lower_absent = lower_value.is_absent(esa);
        let upper_absent = upper_value.is_absent(esa);
        let mut invalid = Vec::new();
        if lower_absent && (upper_absent || !allow_one_side) {
            invalid.push(Self::invalid_entry(&target, column, lower_op, &lower_value));
        }
        if upper_absent && (lower_absent || !allow_one_side) {
            invalid.push(Self::invalid_entry(&target, column, upper_op, &upper_value));
        }
        if !invalid.is_empty() {
            let both_absent = lower_absent && upper_absent;
            if self.modes.checked_invalid_query || both_absent {
                return self.reject_invalid(invalid);
            }
            // unchecked: drop the absent half, keep the present one
            self.reject_invalid(invalid)?;
        }

        let combined = BindValue::List(vec![lower_value.clone(), upper_value.clone()]);
        let base_key = self.predicate_key(node, column, operator.key());
        let slot = self.claim_slot(base_key, Some(&combined), &target, column, operator)?;
        let key = match &slot {
            Slot::Unchanged => return Ok(()),
            Slot::Fresh(key) | Slot::Replace(key) => key.clone(),
        };

        let mut preds = Vec::with_capacity(2);
        for (op, value, name, absent) in [
            (lower_op, lower_value, lower_name, lower_absent),
            (upper_op, upper_value, upper_name, upper_absent),
        ] {
            if absent {
                continue;
            }
            let path = format!("{key}.{name}");
            self.params.insert(&path, value);
            preds.push(WherePredicate::fixed(
                op.render(&column_sql, &placeholder(&path))?,
                &target.alias,
            ));
        }
        let mut predicate = group(Connector::And, preds)
            .ok_or_else(|| CbError::validation("range produced no bound"))?;
        predicate.value = Some(combined);
        self.store(&target, slot, predicate)
    }
}

fn like_pattern(option: &LikeSearchOption, text: &str) -> String {
    let pattern = option.build_pattern(text);
    if option.case_insensitive {
        pattern.to_lowercase()
    } else {
        pattern
    }
}

fn like_text(column_sql: &str, operator: OperatorKind, path: &str, option: &LikeSearchOption) -> String {
    let sql_op = if operator == OperatorKind::NotLikeSearch {
        "NOT LIKE"
    } else {
        "LIKE"
    };
    let column = if option.case_insensitive {
        format!("LOWER({column_sql})")
    } else {
        column_sql.to_string()
    };
    format!(
        "{column} {sql_op} {}{}",
        placeholder(path),
        option.escape_clause()
    )
}

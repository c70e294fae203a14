//! Clause accumulation: joins, predicates, ordering and the fetch window of
//! one descriptor, plus the render-time state around them.

mod fetch;
mod join;
mod order;
mod predicate;

pub use fetch::FetchWindow;
pub use join::JoinDescriptor;
pub use order::{NullsOrder, OrderEntry};
pub use predicate::{Connector, DeferredText, PredicateText, RenderScope, WherePredicate};

pub(crate) use join::resolve_inner_joins;

use crate::config::Dialect;
use crate::error::{CbError, CbResult};
use crate::param::ParamMap;
use crate::purpose::QueryModes;
pub(crate) use predicate::group;
use predicate::{OrScope, merge};

/// Where a predicate is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    #[default]
    Where,
    /// ON clause of the relation's join.
    OnClause,
    /// Inline view of the relation (or of the base table).
    InlineView,
}

type CheckFn = Box<dyn Fn(&ParamMap) -> CbResult<()> + Send + Sync>;

/// A check registered while building and run at render until it passes.
pub struct DeferredCheck {
    description: String,
    check: CheckFn,
}

impl std::fmt::Debug for DeferredCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredCheck")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Per-descriptor store of clause state.
#[derive(Debug, Default)]
pub struct ClauseAccumulator {
    joins: Vec<JoinDescriptor>,
    predicates: Vec<WherePredicate>,
    base_inline: Vec<WherePredicate>,
    orders: Vec<OrderEntry>,
    fetch: FetchWindow,
    suppressed: bool,
    deferred: Vec<DeferredCheck>,
    or_scope: Option<OrScope>,
}

impl ClauseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    // joins

    pub(crate) fn add_join(&mut self, join: JoinDescriptor) {
        tracing::trace!(
            target: crate::log::TARGET,
            local = %join.local_alias,
            foreign = %join.foreign_alias,
            table = %join.foreign_table,
            "outer join registered"
        );
        self.joins.push(join);
    }

    pub fn joins(&self) -> &[JoinDescriptor] {
        &self.joins
    }

    pub fn join(&self, alias: &str) -> Option<&JoinDescriptor> {
        self.joins.iter().find(|j| j.foreign_alias == alias)
    }

    fn join_mut(&mut self, alias: &str) -> CbResult<&mut JoinDescriptor> {
        self.joins
            .iter_mut()
            .find(|j| j.foreign_alias == alias)
            .ok_or_else(|| CbError::validation(format!("no join registered for alias '{alias}'")))
    }

    pub(crate) fn force_inner(&mut self, alias: &str) -> CbResult<()> {
        self.join_mut(alias)?.forced_inner = true;
        Ok(())
    }

    // predicates

    pub fn predicates(&self) -> &[WherePredicate] {
        &self.predicates
    }

    /// Whether predicates were placed in the base table's inline view.
    pub fn has_base_inline(&self) -> bool {
        !self.base_inline.is_empty()
    }

    pub fn in_or_scope(&self) -> bool {
        self.or_scope.is_some()
    }

    pub fn in_and_part(&self) -> bool {
        self.or_scope
            .as_ref()
            .is_some_and(|scope| scope.and_part.is_some())
    }

    /// Add a predicate at `placement`. `alias` names the relation for ON and
    /// inline placement; the root alias means the base table.
    pub(crate) fn add_predicate(
        &mut self,
        placement: Placement,
        alias: &str,
        is_root: bool,
        predicate: WherePredicate,
    ) -> CbResult<()> {
        if placement != Placement::Where && self.in_or_scope() {
            return Err(CbError::unsupported(
                "or-scope predicates can only be placed in WHERE",
            ));
        }
        match placement {
            Placement::Where => match &mut self.or_scope {
                Some(scope) => match &mut scope.and_part {
                    Some(part) => part.push(predicate),
                    None => scope.alternatives.push(predicate.ineligible(true)),
                },
                None => self.predicates.push(predicate),
            },
            Placement::OnClause if is_root => {
                return Err(CbError::validation(
                    "ON-clause placement needs a relation, not the base table",
                ));
            }
            Placement::OnClause => self.join_mut(alias)?.on_predicates.push(predicate),
            Placement::InlineView if is_root => self.base_inline.push(predicate),
            Placement::InlineView => self.join_mut(alias)?.inline_predicates.push(predicate),
        }
        Ok(())
    }

    fn keyed_lists(&self) -> impl Iterator<Item = &WherePredicate> {
        self.predicates
            .iter()
            .chain(self.base_inline.iter())
            .chain(
                self.joins
                    .iter()
                    .flat_map(|j| j.on_predicates.iter().chain(j.inline_predicates.iter())),
            )
    }

    /// A predicate registered earlier under `key`, outside any or-scope.
    pub fn find_keyed(&self, key: &str) -> Option<&WherePredicate> {
        self.keyed_lists().find(|p| p.key.as_deref() == Some(key))
    }

    /// Replace the predicate registered under `key`, keeping its position.
    pub(crate) fn replace_keyed(&mut self, key: &str, replacement: WherePredicate) -> bool {
        let slot = self
            .predicates
            .iter_mut()
            .chain(self.base_inline.iter_mut())
            .chain(
                self.joins
                    .iter_mut()
                    .flat_map(|j| j.on_predicates.iter_mut().chain(j.inline_predicates.iter_mut())),
            )
            .find(|p| p.key.as_deref() == Some(key));
        match slot {
            Some(slot) => {
                *slot = replacement;
                true
            }
            None => false,
        }
    }

    // or-scope

    pub(crate) fn begin_or_scope(&mut self) -> CbResult<()> {
        match &mut self.or_scope {
            Some(scope) if scope.and_part.is_some() => Err(CbError::unsupported(
                "an or-scope cannot be nested inside an and-part",
            )),
            Some(scope) => {
                scope.depth += 1;
                Ok(())
            }
            None => {
                self.or_scope = Some(OrScope::default());
                Ok(())
            }
        }
    }

    /// Close the innermost or-scope; the outermost close folds the
    /// alternatives into one WHERE predicate (discarded when `commit` is false).
    pub(crate) fn end_or_scope(&mut self, commit: bool) {
        let Some(scope) = &mut self.or_scope else {
            return;
        };
        if scope.depth > 0 {
            scope.depth -= 1;
            return;
        }
        let Some(scope) = self.or_scope.take() else {
            return;
        };
        if commit {
            if let Some(merged) = merge(Connector::Or, scope.alternatives) {
                self.predicates.push(merged);
            }
        }
    }

    pub(crate) fn begin_and_part(&mut self) -> CbResult<()> {
        let scope = self
            .or_scope
            .as_mut()
            .ok_or_else(|| CbError::validation("an and-part needs an enclosing or-scope"))?;
        if scope.and_part.is_some() {
            return Err(CbError::unsupported("an and-part cannot be nested inside an and-part"));
        }
        scope.and_part = Some(Vec::new());
        Ok(())
    }

    pub(crate) fn end_and_part(&mut self, commit: bool) {
        if let Some(scope) = &mut self.or_scope {
            if let Some(items) = scope.and_part.take() {
                if commit {
                    if let Some(merged) = merge(Connector::And, items) {
                        scope.alternatives.push(merged.ineligible(true));
                    }
                }
            }
        }
    }

    // order-by and fetch window

    pub(crate) fn add_order(&mut self, entry: OrderEntry) -> usize {
        self.orders.push(entry);
        self.orders.len() - 1
    }

    pub fn orders(&self) -> &[OrderEntry] {
        &self.orders
    }

    pub(crate) fn order_mut(&mut self, index: usize) -> Option<&mut OrderEntry> {
        self.orders.get_mut(index)
    }

    pub(crate) fn clear_orders(&mut self) {
        self.orders.clear();
    }

    pub fn fetch(&self) -> &FetchWindow {
        &self.fetch
    }

    pub(crate) fn fetch_mut(&mut self) -> &mut FetchWindow {
        &mut self.fetch
    }

    // count-render suppression

    pub(crate) fn suppress(&mut self) {
        self.suppressed = true;
    }

    pub(crate) fn revive(&mut self) {
        self.suppressed = false;
    }

    /// Whether ORDER BY and the fetch window are suppressed (count rendering).
    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    // deferred checks

    pub(crate) fn register_deferred(
        &mut self,
        description: impl Into<String>,
        check: impl Fn(&ParamMap) -> CbResult<()> + Send + Sync + 'static,
    ) {
        self.deferred.push(DeferredCheck {
            description: description.into(),
            check: Box::new(check),
        });
    }

    pub fn pending_checks(&self) -> usize {
        self.deferred.len()
    }

    /// Run every pending check. Passing checks are dropped; failing ones stay
    /// pending so the next render reports them again.
    pub(crate) fn drain_deferred(&mut self, params: &ParamMap) -> CbResult<()> {
        let mut first_error = None;
        self.deferred.retain(|deferred| {
            tracing::trace!(target: crate::log::TARGET, check = %deferred.description, "deferred check");
            match (deferred.check)(params) {
                Ok(()) => false,
                Err(err) => {
                    first_error.get_or_insert(err);
                    true
                }
            }
        });
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // rendering

    /// `FROM` clause: base table (or its inline view) and every join.
    pub(crate) fn render_from(
        &self,
        base_table: &str,
        base_alias: &str,
        modes: &QueryModes,
        scope: &RenderScope,
    ) -> CbResult<String> {
        let mut out = String::from(" FROM ");
        if self.base_inline.is_empty() {
            out.push_str(base_table);
        } else {
            let inline_alias = JoinDescriptor::inline_alias(base_alias);
            let conditions = self
                .base_inline
                .iter()
                .map(|p| p.render(scope))
                .collect::<CbResult<Vec<_>>>()?;
            out.push_str(&format!(
                "(SELECT * FROM {base_table} {inline_alias} WHERE {})",
                conditions.join(" AND ")
            ));
        }
        out.push(' ');
        out.push_str(base_alias);
        let inner = resolve_inner_joins(&self.joins, &self.predicates, modes);
        for (join, inner) in self.joins.iter().zip(inner) {
            join.render(inner, scope, &mut out)?;
        }
        Ok(out)
    }

    /// WHERE body (without the keyword), `None` when there are no predicates.
    pub(crate) fn render_where(&self, scope: &RenderScope) -> CbResult<Option<String>> {
        if self.predicates.is_empty() {
            return Ok(None);
        }
        let parts = self
            .predicates
            .iter()
            .map(|p| p.render(scope))
            .collect::<CbResult<Vec<_>>>()?;
        Ok(Some(parts.join(" AND ")))
    }

    pub(crate) fn render_order_by(&self, dialect: Dialect, over_union: bool) -> CbResult<Option<String>> {
        if self.suppressed || self.orders.is_empty() {
            return Ok(None);
        }
        let parts = self
            .orders
            .iter()
            .map(|o| o.render(dialect, over_union))
            .collect::<CbResult<Vec<_>>>()?;
        Ok(Some(format!("ORDER BY {}", parts.join(", "))))
    }

    pub(crate) fn render_fetch(&self, dialect: Dialect) -> Option<String> {
        if self.suppressed {
            return None;
        }
        self.fetch.render(dialect)
    }
}

#[cfg(test)]
mod tests;

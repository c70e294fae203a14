use super::{Correlation, SubqueryKind};
use crate::clause::{RenderScope, WherePredicate};
use crate::error::{CbError, CbResult};
use crate::purpose::{Operation, Purpose};
use crate::query::{ConditionQuery, QueryDescriptor};
use std::sync::Arc;

impl ConditionQuery<'_> {
    /// `outer.key IN (SELECT related.key FROM related WHERE ...)` through a
    /// referrer or foreign relation.
    pub fn in_scope_relation<F>(&mut self, property: &str, build: F) -> CbResult<&mut Self>
    where
        F: FnOnce(&mut QueryDescriptor) -> CbResult<()>,
    {
        self.in_scope_sub(property, false, build)
    }

    pub fn not_in_scope_relation<F>(&mut self, property: &str, build: F) -> CbResult<&mut Self>
    where
        F: FnOnce(&mut QueryDescriptor) -> CbResult<()>,
    {
        self.in_scope_sub(property, true, build)
    }

    fn in_scope_sub<F>(&mut self, property: &str, negated: bool, build: F) -> CbResult<&mut Self>
    where
        F: FnOnce(&mut QueryDescriptor) -> CbResult<()>,
    {
        self.desc.guard(Operation::Predicate)?;
        self.require_where("an IN-scope sub-statement")?;
        let meta = self.desc.meta.clone();
        let local = self.desc.table_info(self.node)?.clone();
        let correlation = if let Some(referrer) = local.find_referrer(property) {
            Correlation::referrer(meta.as_ref(), &local, referrer)?
        } else if let Some(foreign) = local.find_foreign(property) {
            Correlation::foreign(meta.as_ref(), &local, foreign)?
        } else {
            return Err(CbError::metadata(format!(
                "table '{}' has no relation '{property}'",
                local.name
            )));
        };
        let outer_alias = self.alias().to_string();

        let child = self.desc.build_substatement(
            Purpose::InScopeRelation,
            &correlation.table,
            |child| correlation.apply_fixed(&outer_alias, child),
            build,
        )?;
        let select_expr = correlation.inner_columns(child.alias());
        let outer = correlation.outer_columns(&outer_alias);
        let kind = if negated {
            SubqueryKind::NotInScope
        } else {
            SubqueryKind::InScope
        };
        let identity =
            self.desc
                .attach_subquery(self.node, kind, property, None, child, select_expr);

        let keyword = if negated { "NOT IN" } else { "IN" };
        let text = Arc::new(move |scope: &RenderScope| -> CbResult<String> {
            Ok(format!("{outer} {keyword} ({})", scope.fragment(&identity)?))
        });
        let predicate = WherePredicate::deferred(text, &outer_alias).ineligible(negated);
        let is_root = self.desc.graph.node(self.node).is_root();
        self.desc
            .clause
            .add_predicate(self.placement, &outer_alias, is_root, predicate)?;
        Ok(self)
    }
}

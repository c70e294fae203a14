use super::{Correlation, SubqueryKind};
use crate::clause::{RenderScope, WherePredicate};
use crate::error::CbResult;
use crate::purpose::{Operation, Purpose};
use crate::query::{ConditionQuery, QueryDescriptor};
use std::sync::Arc;

impl ConditionQuery<'_> {
    /// `EXISTS (SELECT ... FROM referrer WHERE referrer.fk = outer.pk AND ...)`
    pub fn exists<F>(&mut self, property: &str, build: F) -> CbResult<&mut Self>
    where
        F: FnOnce(&mut QueryDescriptor) -> CbResult<()>,
    {
        self.exists_referrer(property, false, build)
    }

    pub fn not_exists<F>(&mut self, property: &str, build: F) -> CbResult<&mut Self>
    where
        F: FnOnce(&mut QueryDescriptor) -> CbResult<()>,
    {
        self.exists_referrer(property, true, build)
    }

    fn exists_referrer<F>(&mut self, property: &str, negated: bool, build: F) -> CbResult<&mut Self>
    where
        F: FnOnce(&mut QueryDescriptor) -> CbResult<()>,
    {
        self.desc.guard(Operation::Predicate)?;
        self.require_where("an EXISTS sub-statement")?;
        let meta = self.desc.meta.clone();
        let local = self.desc.table_info(self.node)?.clone();
        let correlation = Correlation::referrer(meta.as_ref(), &local, local.referrer(property)?)?;
        let outer_alias = self.alias().to_string();

        let child = self.desc.build_substatement(
            Purpose::ExistsReferrer,
            &correlation.table,
            |child| correlation.apply(&outer_alias, child),
            build,
        )?;
        let select_expr = correlation.inner_columns(child.alias());
        let kind = if negated {
            SubqueryKind::NotExists
        } else {
            SubqueryKind::Exists
        };
        let identity =
            self.desc
                .attach_subquery(self.node, kind, property, None, child, select_expr);

        let keyword = if negated { "NOT EXISTS" } else { "EXISTS" };
        let text = Arc::new(move |scope: &RenderScope| -> CbResult<String> {
            Ok(format!("{keyword} ({})", scope.fragment(&identity)?))
        });
        let predicate = WherePredicate::deferred(text, &outer_alias).ineligible(negated);
        let is_root = self.desc.graph.node(self.node).is_root();
        self.desc
            .clause
            .add_predicate(self.placement, &outer_alias, is_root, predicate)?;
        Ok(self)
    }
}

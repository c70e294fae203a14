use super::predicate::{RenderScope, WherePredicate};
use crate::error::CbResult;
use crate::purpose::QueryModes;

/// One joined relation.
#[derive(Debug, Clone)]
pub struct JoinDescriptor {
    pub local_alias: String,
    pub foreign_alias: String,
    pub foreign_table: String,
    /// Qualified (local, foreign) column references.
    pub on_pairs: Vec<(String, String)>,
    /// Rendered fixed condition, if the relation declares one.
    pub fixed: Option<String>,
    /// Parameter paths the fixed condition needs.
    pub fixed_params: Vec<String>,
    /// Render the foreign table as an inline view holding the fixed condition.
    pub inline: bool,
    /// Structural detection must keep this join outer (nullable FK or fixed condition).
    pub inner_ineligible: bool,
    /// Alias of the join this one hangs off; `None` when it hangs off the root.
    pub parent_alias: Option<String>,
    pub forced_inner: bool,
    pub on_predicates: Vec<WherePredicate>,
    pub inline_predicates: Vec<WherePredicate>,
}

impl JoinDescriptor {
    /// Alias used inside the inline view of `alias`.
    pub fn inline_alias(alias: &str) -> String {
        format!("{alias}_i")
    }

    fn has_inline_view(&self) -> bool {
        (self.inline && self.fixed.is_some()) || !self.inline_predicates.is_empty()
    }

    pub(crate) fn render(&self, inner: bool, scope: &RenderScope, out: &mut String) -> CbResult<()> {
        out.push_str(if inner { " INNER JOIN " } else { " LEFT JOIN " });
        if self.has_inline_view() {
            let inline_alias = Self::inline_alias(&self.foreign_alias);
            out.push_str("(SELECT * FROM ");
            out.push_str(&self.foreign_table);
            out.push(' ');
            out.push_str(&inline_alias);
            let mut conditions = Vec::new();
            if self.inline {
                if let Some(fixed) = &self.fixed {
                    conditions.push(fixed.clone());
                }
            }
            for pred in &self.inline_predicates {
                conditions.push(pred.render(scope)?);
            }
            if !conditions.is_empty() {
                out.push_str(" WHERE ");
                out.push_str(&conditions.join(" AND "));
            }
            out.push(')');
        } else {
            out.push_str(&self.foreign_table);
        }
        out.push(' ');
        out.push_str(&self.foreign_alias);
        out.push_str(" ON ");
        let mut on = Vec::with_capacity(self.on_pairs.len() + 1);
        for (local, foreign) in &self.on_pairs {
            on.push(format!("{local} = {foreign}"));
        }
        if !self.inline {
            if let Some(fixed) = &self.fixed {
                on.push(fixed.clone());
            }
        }
        for pred in &self.on_predicates {
            on.push(pred.render(scope)?);
        }
        out.push_str(&on.join(" AND "));
        Ok(())
    }
}

/// Decide which joins render as INNER JOIN.
///
/// Joins are in registration order, so a parent join always precedes its
/// children. Forced and where-used joins pull their ancestors inner too;
/// structural detection needs the whole ancestor chain to qualify.
pub(crate) fn resolve_inner_joins(
    joins: &[JoinDescriptor],
    predicates: &[WherePredicate],
    modes: &QueryModes,
) -> Vec<bool> {
    let mut inner = vec![false; joins.len()];
    let index_of = |alias: &str| joins.iter().position(|j| j.foreign_alias == alias);

    fn mark_with_ancestors(
        joins: &[JoinDescriptor],
        inner: &mut [bool],
        mut idx: usize,
        index_of: &dyn Fn(&str) -> Option<usize>,
    ) {
        loop {
            inner[idx] = true;
            match joins[idx].parent_alias.as_deref().and_then(index_of) {
                Some(parent) => idx = parent,
                None => break,
            }
        }
    }

    for (i, join) in joins.iter().enumerate() {
        if join.forced_inner {
            mark_with_ancestors(joins, &mut inner, i, &index_of);
        }
    }

    if modes.structural_inner_join {
        for (i, join) in joins.iter().enumerate() {
            if join.inner_ineligible {
                continue;
            }
            let parent_ok = match join.parent_alias.as_deref().and_then(index_of) {
                Some(parent) => inner[parent],
                None => true,
            };
            if parent_ok {
                inner[i] = true;
            }
        }
    }

    if modes.where_used_inner_join {
        for pred in predicates.iter().filter(|p| !p.inner_ineligible) {
            for alias in &pred.aliases {
                if let Some(i) = index_of(alias) {
                    mark_with_ancestors(joins, &mut inner, i, &index_of);
                }
            }
        }
    }

    inner
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CbConfig;

    fn join(alias: &str, parent: Option<&str>, ineligible: bool) -> JoinDescriptor {
        JoinDescriptor {
            local_alias: parent.unwrap_or("t0").to_string(),
            foreign_alias: alias.to_string(),
            foreign_table: "member_status".to_string(),
            on_pairs: vec![(
                format!("{}.member_status_code", parent.unwrap_or("t0")),
                format!("{alias}.member_status_code"),
            )],
            fixed: None,
            fixed_params: Vec::new(),
            inline: false,
            inner_ineligible: ineligible,
            parent_alias: parent.map(str::to_string),
            forced_inner: false,
            on_predicates: Vec::new(),
            inline_predicates: Vec::new(),
        }
    }

    #[test]
    fn render_left_join_with_fixed_condition() {
        let mut j = join("t0r_0", None, false);
        j.fixed = Some("t0r_0.valid = true".to_string());
        let mut out = String::new();
        j.render(false, &RenderScope::default(), &mut out).unwrap();
        assert_eq!(
            out,
            " LEFT JOIN member_status t0r_0 ON t0.member_status_code = t0r_0.member_status_code AND t0r_0.valid = true"
        );
    }

    #[test]
    fn render_inline_view() {
        let mut j = join("t0r_1", None, false);
        j.inline = true;
        j.fixed = Some("t0r_1_i.valid = true".to_string());
        let mut out = String::new();
        j.render(true, &RenderScope::default(), &mut out).unwrap();
        assert_eq!(
            out,
            " INNER JOIN (SELECT * FROM member_status t0r_1_i WHERE t0r_1_i.valid = true) t0r_1 ON t0.member_status_code = t0r_1.member_status_code"
        );
    }

    #[test]
    fn where_used_marks_ancestors() {
        let joins = vec![join("t0r_0", None, true), join("t0r_0_0", Some("t0r_0"), true)];
        let preds = vec![WherePredicate::fixed("t0r_0_0.x = 1", "t0r_0_0")];
        let modes = QueryModes::from_config(&CbConfig::default().where_used_inner_join());
        assert_eq!(resolve_inner_joins(&joins, &preds, &modes), vec![true, true]);
    }

    #[test]
    fn ineligible_predicates_do_not_demote() {
        let joins = vec![join("t0r_0", None, false)];
        let preds = vec![WherePredicate::fixed("t0r_0.x IS NULL", "t0r_0").ineligible(true)];
        let modes = QueryModes::from_config(&CbConfig::default().where_used_inner_join());
        assert_eq!(resolve_inner_joins(&joins, &preds, &modes), vec![false]);
    }

    #[test]
    fn structural_needs_whole_chain() {
        let joins = vec![
            join("t0r_0", None, true),
            join("t0r_0_0", Some("t0r_0"), false),
            join("t0r_1", None, false),
        ];
        let modes = QueryModes::from_config(&CbConfig::default().structural_inner_join());
        assert_eq!(resolve_inner_joins(&joins, &[], &modes), vec![false, false, true]);
    }
}

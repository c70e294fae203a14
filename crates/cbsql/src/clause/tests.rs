use super::*;
use crate::config::CbConfig;

fn status_join(alias: &str) -> JoinDescriptor {
    JoinDescriptor {
        local_alias: "t0".to_string(),
        foreign_alias: alias.to_string(),
        foreign_table: "member_status".to_string(),
        on_pairs: vec![(
            "t0.member_status_code".to_string(),
            format!("{alias}.member_status_code"),
        )],
        fixed: None,
        fixed_params: Vec::new(),
        inline: false,
        inner_ineligible: false,
        parent_alias: None,
        forced_inner: false,
        on_predicates: Vec::new(),
        inline_predicates: Vec::new(),
    }
}

fn modes() -> QueryModes {
    QueryModes::from_config(&CbConfig::default())
}

#[test]
fn where_predicates_join_with_and() {
    let mut acc = ClauseAccumulator::new();
    acc.add_predicate(Placement::Where, "t0", true, WherePredicate::fixed("t0.a = 1", "t0"))
        .unwrap();
    acc.add_predicate(Placement::Where, "t0", true, WherePredicate::fixed("t0.b = 2", "t0"))
        .unwrap();
    let scope = RenderScope::default();
    assert_eq!(
        acc.render_where(&scope).unwrap().as_deref(),
        Some("t0.a = 1 AND t0.b = 2")
    );
}

#[test]
fn empty_where_is_none() {
    let acc = ClauseAccumulator::new();
    assert!(acc.render_where(&RenderScope::default()).unwrap().is_none());
}

#[test]
fn or_scope_folds_alternatives() {
    let mut acc = ClauseAccumulator::new();
    acc.begin_or_scope().unwrap();
    acc.add_predicate(Placement::Where, "t0", true, WherePredicate::fixed("t0.a = 1", "t0"))
        .unwrap();
    acc.begin_and_part().unwrap();
    acc.add_predicate(Placement::Where, "t0", true, WherePredicate::fixed("t0.b = 2", "t0"))
        .unwrap();
    acc.add_predicate(Placement::Where, "t0", true, WherePredicate::fixed("t0.c = 3", "t0"))
        .unwrap();
    acc.end_and_part(true);
    acc.end_or_scope(true);

    assert!(!acc.in_or_scope());
    assert_eq!(acc.predicates().len(), 1);
    assert!(acc.predicates()[0].inner_ineligible);
    assert_eq!(
        acc.render_where(&RenderScope::default()).unwrap().as_deref(),
        Some("(t0.a = 1 OR (t0.b = 2 AND t0.c = 3))")
    );
}

#[test]
fn nested_or_scope_flattens() {
    let mut acc = ClauseAccumulator::new();
    acc.begin_or_scope().unwrap();
    acc.add_predicate(Placement::Where, "t0", true, WherePredicate::fixed("t0.a = 1", "t0"))
        .unwrap();
    acc.begin_or_scope().unwrap();
    acc.add_predicate(Placement::Where, "t0", true, WherePredicate::fixed("t0.b = 2", "t0"))
        .unwrap();
    acc.end_or_scope(true);
    assert!(acc.in_or_scope());
    acc.end_or_scope(true);
    assert_eq!(
        acc.render_where(&RenderScope::default()).unwrap().as_deref(),
        Some("(t0.a = 1 OR t0.b = 2)")
    );
}

#[test]
fn or_scope_inside_and_part_is_unsupported() {
    let mut acc = ClauseAccumulator::new();
    acc.begin_or_scope().unwrap();
    acc.begin_and_part().unwrap();
    let err = acc.begin_or_scope().unwrap_err();
    assert!(matches!(err, CbError::UnsupportedCombination(_)));
}

#[test]
fn and_part_without_or_scope_fails() {
    let mut acc = ClauseAccumulator::new();
    assert!(acc.begin_and_part().is_err());
}

#[test]
fn aborted_or_scope_discards_alternatives() {
    let mut acc = ClauseAccumulator::new();
    acc.begin_or_scope().unwrap();
    acc.add_predicate(Placement::Where, "t0", true, WherePredicate::fixed("t0.a = 1", "t0"))
        .unwrap();
    acc.end_or_scope(false);
    assert!(acc.predicates().is_empty());
}

#[test]
fn on_clause_and_inline_placement() {
    let mut acc = ClauseAccumulator::new();
    acc.add_join(status_join("t0r_0"));
    acc.add_predicate(
        Placement::OnClause,
        "t0r_0",
        false,
        WherePredicate::fixed("t0r_0.display_order > 1", "t0r_0"),
    )
    .unwrap();
    acc.add_predicate(
        Placement::InlineView,
        "t0",
        true,
        WherePredicate::fixed("t0_i.member_name = 'x'", "t0"),
    )
    .unwrap();
    let from = acc
        .render_from("member", "t0", &modes(), &RenderScope::default())
        .unwrap();
    assert_eq!(
        from,
        " FROM (SELECT * FROM member t0_i WHERE t0_i.member_name = 'x') t0 \
LEFT JOIN member_status t0r_0 ON t0.member_status_code = t0r_0.member_status_code AND t0r_0.display_order > 1"
    );
}

#[test]
fn on_clause_on_root_is_rejected() {
    let mut acc = ClauseAccumulator::new();
    let err = acc
        .add_predicate(Placement::OnClause, "t0", true, WherePredicate::fixed("x", "t0"))
        .unwrap_err();
    assert!(matches!(err, CbError::Validation(_)));
}

#[test]
fn keyed_predicates_can_be_replaced() {
    let mut acc = ClauseAccumulator::new();
    let pred = WherePredicate::fixed("t0.a = #{cq.a.equal}", "t0").keyed("cq.a.equal", None);
    acc.add_predicate(Placement::Where, "t0", true, pred).unwrap();
    assert!(acc.find_keyed("cq.a.equal").is_some());
    let replaced = acc.replace_keyed(
        "cq.a.equal",
        WherePredicate::fixed("t0.a = 9", "t0").keyed("cq.a.equal", None),
    );
    assert!(replaced);
    assert_eq!(
        acc.render_where(&RenderScope::default()).unwrap().as_deref(),
        Some("t0.a = 9")
    );
    assert!(!acc.replace_keyed("cq.b.equal", WherePredicate::fixed("x", "t0")));
}

#[test]
fn suppression_hides_order_and_fetch() {
    let mut acc = ClauseAccumulator::new();
    acc.add_order(OrderEntry::new(
        "t0.member_id".to_string(),
        "member_id".to_string(),
        "t0".to_string(),
        true,
    ));
    acc.fetch_mut().set(10, 2).unwrap();
    acc.suppress();
    assert!(acc.render_order_by(Dialect::Postgres, false).unwrap().is_none());
    assert!(acc.render_fetch(Dialect::Postgres).is_none());
    acc.revive();
    assert_eq!(
        acc.render_order_by(Dialect::Postgres, false).unwrap().as_deref(),
        Some("ORDER BY t0.member_id ASC")
    );
    assert_eq!(
        acc.render_fetch(Dialect::Postgres).as_deref(),
        Some("LIMIT 10 OFFSET 10")
    );
}

#[test]
fn deferred_checks_stay_pending_until_they_pass() {
    let mut acc = ClauseAccumulator::new();
    acc.register_deferred("needs x", |params: &ParamMap| {
        if params.contains("fixed.x") {
            Ok(())
        } else {
            Err(CbError::configuration("missing fixed.x"))
        }
    });
    assert_eq!(acc.pending_checks(), 1);
    let err = acc.drain_deferred(&ParamMap::new()).unwrap_err();
    assert!(matches!(err, CbError::Configuration(_)));
    assert_eq!(acc.pending_checks(), 1);
    assert!(acc.drain_deferred(&ParamMap::new()).is_err());

    let mut params = ParamMap::new();
    params.insert("fixed.x", 1.into());
    acc.drain_deferred(&params).unwrap();
    assert_eq!(acc.pending_checks(), 0);
    acc.drain_deferred(&ParamMap::new()).unwrap();
}

mod common;

use cbsql::{BindValue, CbConfig, CbError, QueryDescriptor, QueryInsert, StatementKind};
use common::schema;

#[test]
fn update_members_with_expensive_purchases() {
    let mut cb = QueryDescriptor::new(schema(), "member").unwrap();
    cb.query()
        .exists("purchase_list", |sub| {
            sub.query().greater_equal("purchase_price", 10_000)?;
            Ok(())
        })
        .unwrap();
    let statement = cb
        .query_update()
        .set("member_status_code", "VIP")
        .unwrap()
        .to_statement()
        .unwrap();
    assert_eq!(statement.kind(), StatementKind::Update);
    assert_eq!(
        statement.sql(),
        "UPDATE member SET member_status_code = #{set.member_status_code} \
         WHERE member_id IN (SELECT t0.member_id FROM member t0 \
         WHERE EXISTS (SELECT t1.member_id FROM purchase t1 \
         WHERE t1.member_id = t0.member_id \
         AND t1.purchase_price >= #{sub1.exists_purchase_list1.cq.purchase_price.greater_equal}))"
    );
    let positional = statement.to_positional().unwrap();
    assert_eq!(
        positional.values,
        vec![BindValue::from("VIP"), BindValue::from(10_000)]
    );
}

#[test]
fn delete_requires_condition_or_all_rows() {
    let mut cb = QueryDescriptor::new(schema(), "purchase").unwrap();
    let err = cb.query_delete().to_statement().unwrap_err();
    assert!(matches!(err, CbError::Validation(_)));

    let statement = cb.query_delete().all_rows().to_statement().unwrap();
    assert_eq!(statement.sql(), "DELETE FROM purchase t0");
    assert_eq!(statement.kind(), StatementKind::Delete);

    cb.query().less_than("purchase_count", 1).unwrap();
    let statement = cb.query_delete().to_statement().unwrap();
    assert_eq!(
        statement.sql(),
        "DELETE FROM purchase t0 WHERE t0.purchase_count < #{cq.purchase_count.less_than}"
    );
}

#[test]
fn archive_withdrawn_members() {
    let mut insert =
        QueryInsert::new(schema(), CbConfig::default(), "member_archive", "member").unwrap();
    insert
        .map_column("member_id", "member_id")
        .unwrap()
        .map_column("member_name", "member_name")
        .unwrap()
        .set_value("archived_by", "nightly")
        .unwrap();
    insert
        .source()
        .query()
        .relation("member_status")
        .unwrap()
        .equal("status_name", "Withdrawn")
        .unwrap();
    let statement = insert.to_statement().unwrap();
    assert_eq!(statement.kind(), StatementKind::Insert);
    assert!(statement.sql().starts_with(
        "INSERT INTO member_archive (member_id, member_name, archived_by) \
         SELECT t0.member_id, t0.member_name, #{insert.archived_by} FROM member t0"
    ));
    assert_eq!(statement.to_positional().unwrap().values.len(), 2);
}

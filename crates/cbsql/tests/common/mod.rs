#![allow(dead_code)]

use cbsql::{
    BoundStatement, CbResult, FixedCondition, ForeignInfo, MetaRef, PagingHandler, ReferrerInfo,
    SchemaRegistry, StatementKind, TableInfo, ValueType,
};

/// Member/purchase schema shared by the integration tests.
pub fn schema() -> MetaRef {
    let registry = SchemaRegistry::new()
        .with_table(
            TableInfo::new("member")
                .with_primary_key("member_id", ValueType::Integer)
                .with_column("member_name", ValueType::Text)
                .with_column("member_account", ValueType::Text)
                .with_not_null_column("member_status_code", ValueType::Text)
                .with_column("birthdate", ValueType::Date)
                .with_column("login_count", ValueType::Integer)
                .with_column("branch_code", ValueType::Text)
                .with_column("member_no", ValueType::Text)
                .with_compound("member_code", &[("branch_code", 3), ("member_no", 5)])
                .with_foreign(ForeignInfo::new(
                    "member_status",
                    "member_status",
                    &[("member_status_code", "member_status_code")],
                ))
                .with_foreign(
                    ForeignInfo::new(
                        "member_address_as_valid",
                        "member_address",
                        &[("member_id", "member_id")],
                    )
                    .one_to_one()
                    .with_fixed(FixedCondition::new(
                        "{foreign}.valid_begin_date <= {:target_date} AND {foreign}.valid_end_date >= {:target_date}",
                    )),
                )
                .with_referrer(
                    ReferrerInfo::new("purchase_list", "purchase", &[("member_id", "member_id")])
                        .with_reverse("member"),
                ),
        )
        .and_then(|r| {
            r.with_table(
                TableInfo::new("member_status")
                    .with_primary_key("member_status_code", ValueType::Text)
                    .with_column("status_name", ValueType::Text)
                    .with_column("display_order", ValueType::Integer),
            )
        })
        .and_then(|r| {
            r.with_table(
                TableInfo::new("member_address")
                    .with_primary_key("member_address_id", ValueType::Integer)
                    .with_column("member_id", ValueType::Integer)
                    .with_column("address", ValueType::Text)
                    .with_column("valid_begin_date", ValueType::Date)
                    .with_column("valid_end_date", ValueType::Date),
            )
        })
        .and_then(|r| {
            r.with_table(
                TableInfo::new("purchase")
                    .with_primary_key("purchase_id", ValueType::BigInt)
                    .with_not_null_column("member_id", ValueType::Integer)
                    .with_not_null_column("product_id", ValueType::Integer)
                    .with_column("purchase_price", ValueType::Integer)
                    .with_column("purchase_count", ValueType::Integer)
                    .with_foreign(ForeignInfo::new("member", "member", &[("member_id", "member_id")]))
                    .with_foreign(ForeignInfo::new(
                        "product",
                        "product",
                        &[("product_id", "product_id")],
                    )),
            )
        })
        .and_then(|r| {
            r.with_table(
                TableInfo::new("product")
                    .with_primary_key("product_id", ValueType::Integer)
                    .with_column("product_name", ValueType::Text)
                    .with_column("regular_price", ValueType::Integer),
            )
        })
        .and_then(|r| {
            r.with_table(
                TableInfo::new("member_archive")
                    .with_primary_key("archive_id", ValueType::BigInt)
                    .with_column("member_id", ValueType::Integer)
                    .with_column("member_name", ValueType::Text)
                    .with_column("archived_by", ValueType::Text),
            )
        })
        .expect("fixture schema is valid");
    registry.verify_relations().expect("fixture relations resolve");
    registry.into_ref()
}

/// Serves `total` numbered rows and records the statements it was given.
pub struct MemoryHandler {
    pub total: u64,
    pub statements: Vec<(StatementKind, String)>,
}

impl MemoryHandler {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            statements: Vec::new(),
        }
    }

    pub fn count_calls(&self) -> usize {
        self.statements
            .iter()
            .filter(|(kind, _)| *kind == StatementKind::Count)
            .count()
    }
}

fn number_after(sql: &str, keyword: &str) -> Option<u64> {
    sql.split(keyword)
        .nth(1)
        .and_then(|s| s.split(' ').next())
        .and_then(|s| s.parse().ok())
}

impl PagingHandler for MemoryHandler {
    type Row = u64;

    fn count(&mut self, statement: &BoundStatement) -> CbResult<u64> {
        self.statements
            .push((statement.kind(), statement.sql().to_string()));
        Ok(self.total)
    }

    fn fetch(&mut self, statement: &BoundStatement) -> CbResult<Vec<u64>> {
        self.statements
            .push((statement.kind(), statement.sql().to_string()));
        let sql = statement.sql();
        let limit = number_after(sql, "LIMIT ").unwrap_or(self.total);
        let offset = number_after(sql, "OFFSET ").unwrap_or(0);
        Ok((offset..self.total.min(offset + limit)).collect())
    }
}

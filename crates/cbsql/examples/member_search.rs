//! Member search example for cbsql
//!
//! Run with: cargo run --example member_search -p cbsql
//!
//! Set RUST_LOG=cbsql=debug to see the rendered statements logged.

use cbsql::{
    AggregateFn, CbError, CbResult, ForeignInfo, ManualOrder, PagingHandler, QueryDescriptor,
    ReferrerInfo, SchemaRegistry, TableInfo, ValueType,
};
use cbsql::{BoundStatement, MetaRef};
use tracing_subscriber::EnvFilter;

fn schema() -> CbResult<MetaRef> {
    Ok(SchemaRegistry::new()
        .with_table(
            TableInfo::new("member")
                .with_primary_key("member_id", ValueType::Integer)
                .with_column("member_name", ValueType::Text)
                .with_not_null_column("member_status_code", ValueType::Text)
                .with_foreign(ForeignInfo::new(
                    "member_status",
                    "member_status",
                    &[("member_status_code", "member_status_code")],
                ))
                .with_referrer(ReferrerInfo::new(
                    "purchase_list",
                    "purchase",
                    &[("member_id", "member_id")],
                )),
        )?
        .with_table(
            TableInfo::new("member_status")
                .with_primary_key("member_status_code", ValueType::Text)
                .with_column("status_name", ValueType::Text),
        )?
        .with_table(
            TableInfo::new("purchase")
                .with_primary_key("purchase_id", ValueType::BigInt)
                .with_not_null_column("member_id", ValueType::Integer)
                .with_column("purchase_price", ValueType::Integer),
        )?
        .into_ref())
}

/// Pretends to be a database holding 42 matching members.
struct PrintingHandler;

impl PagingHandler for PrintingHandler {
    type Row = u64;

    fn count(&mut self, statement: &BoundStatement) -> CbResult<u64> {
        println!("count: {}", statement.display_sql());
        Ok(42)
    }

    fn fetch(&mut self, statement: &BoundStatement) -> CbResult<Vec<u64>> {
        let positional = statement.to_positional()?;
        println!("fetch: {}", positional.sql);
        println!("  with {} values", positional.values.len());
        Ok((20..40).collect())
    }
}

fn main() -> Result<(), CbError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let meta = schema()?;
    let mut cb = QueryDescriptor::new(meta.clone(), "member")?;
    cb.setup_select("member_status")?;
    cb.query().prefix_search("member_name", "S")?;
    cb.query().exists("purchase_list", |sub| {
        sub.query().greater_equal("purchase_price", 1000)?;
        Ok(())
    })?;
    cb.specify()
        .derived_referrer("purchase_list", AggregateFn::Count, "purchase_count", |_| Ok(()))?;

    let mut formal_first = ManualOrder::new();
    formal_first.when_equal("FML")?;
    cb.order_by()
        .asc("member_status_code")?
        .manual_order(&formal_first)?;
    cb.order_by().asc("member_id")?;
    cb.paging(20, 2)?;

    let page = cb.select_page(&mut PrintingHandler)?;
    println!(
        "page {}/{}: rows {}-{} of {}",
        page.page_number,
        page.page_count(),
        page.start_record_number(),
        page.end_record_number(),
        page.total
    );

    // an update descriptor cannot carry derived columns
    let mut vip = QueryDescriptor::new(meta, "member")?;
    vip.query().exists("purchase_list", |sub| {
        sub.query().greater_equal("purchase_price", 1000)?;
        Ok(())
    })?;
    let update = vip
        .query_update()
        .set("member_status_code", "VIP")?
        .to_statement()?;
    println!("update: {}", update.sql());
    Ok(())
}

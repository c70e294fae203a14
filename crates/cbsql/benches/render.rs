use cbsql::{
    AggregateFn, BoundStatement, ForeignInfo, MetaRef, QueryDescriptor, ReferrerInfo,
    SchemaRegistry, TableInfo, ValueType,
};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

fn meta() -> MetaRef {
    SchemaRegistry::new()
        .with_table(
            TableInfo::new("member")
                .with_primary_key("member_id", ValueType::Integer)
                .with_column("member_name", ValueType::Text)
                .with_column("member_status_code", ValueType::Text)
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
        )
        .and_then(|r| {
            r.with_table(
                TableInfo::new("member_status")
                    .with_primary_key("member_status_code", ValueType::Text)
                    .with_column("display_order", ValueType::Integer),
            )
        })
        .and_then(|r| {
            r.with_table(
                TableInfo::new("purchase")
                    .with_primary_key("purchase_id", ValueType::BigInt)
                    .with_column("member_id", ValueType::Integer)
                    .with_column("purchase_price", ValueType::Integer),
            )
        })
        .expect("bench schema is valid")
        .into_ref()
}

/// Member query with `n` IN values, a relation, an EXISTS and a derived column.
fn build_member_query(meta: &MetaRef, n: usize) -> BoundStatement {
    let mut cb = QueryDescriptor::new(meta.clone(), "member").expect("descriptor");
    cb.setup_select("member_status").expect("setup select");
    cb.query()
        .in_scope("member_id", (0..n as i64).collect::<Vec<_>>())
        .expect("in scope");
    cb.query()
        .relation("member_status")
        .and_then(|mut q| q.less_equal("display_order", 5).map(|_| ()))
        .expect("relation predicate");
    cb.query()
        .exists("purchase_list", |sub| {
            sub.query().greater_than("purchase_price", 100)?;
            Ok(())
        })
        .expect("exists");
    cb.specify()
        .derived_referrer("purchase_list", AggregateFn::Max, "max_price", |sub| {
            sub.specify().column("purchase_price")?;
            Ok(())
        })
        .expect("derived");
    cb.order_by().asc("member_id").expect("order");
    cb.paging(20, 2).expect("paging");
    cb.to_statement().expect("render")
}

fn bench_build_and_render(c: &mut Criterion) {
    let meta = meta();
    let mut group = c.benchmark_group("render/build_and_render");

    for n in [1, 10, 100, 1000, 5000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| black_box(build_member_query(&meta, n)));
        });
    }

    group.finish();
}

fn bench_to_positional(c: &mut Criterion) {
    let meta = meta();
    let mut group = c.benchmark_group("render/to_positional");

    for n in [1, 10, 100, 1000, 5000] {
        let statement = build_member_query(&meta, n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &statement, |b, statement| {
            b.iter(|| black_box(statement.to_positional()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_build_and_render, bench_to_positional);
criterion_main!(benches);

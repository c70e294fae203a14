mod common;

use cbsql::{CbConfig, CbError, Dialect, QueryDescriptor};
use common::schema;
use std::io::Write;
use tracing_subscriber::EnvFilter;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn load_config_file() {
    let file = write_config(
        r#"
dialect = "sqlserver"
in_chunk_size = 2
like_escape = "!"
log_sql_max_length = 40

[paging]
count_later = true
safety_max_result_size = 500
"#,
    );
    let config = CbConfig::load(file.path()).unwrap();
    assert_eq!(config.dialect, Dialect::SqlServer);
    assert_eq!(config.in_chunk_size, 2);
    assert_eq!(config.like_escape, '!');
    assert_eq!(config.log_sql_max_length, Some(40));
    assert!(config.paging.count_later);
    assert!(config.paging.reselect);
    assert_eq!(config.paging.safety_max_result_size, Some(500));
    // untouched keys keep their defaults
    assert!(config.lock_detection);
    assert!(!config.checked_invalid_query);
}

#[test]
fn loaded_config_drives_rendering() {
    let file = write_config("dialect = \"sqlserver\"\nin_chunk_size = 2\nlike_escape = \"!\"\n");
    let config = CbConfig::load(file.path()).unwrap();
    let mut cb = QueryDescriptor::with_config(schema(), config, "member").unwrap();
    cb.query().in_scope("member_id", [1, 2, 3]).unwrap();
    cb.query().prefix_search("member_name", "10%").unwrap();
    cb.order_by().asc("member_id").unwrap();
    cb.paging(10, 2).unwrap();

    let statement = cb.to_statement().unwrap();
    assert_eq!(
        statement.params().get("cq.member_name.prefix_search"),
        Some(&cbsql::BindValue::from("10!%%"))
    );
    let positional = statement.to_positional().unwrap();
    assert!(positional.sql.contains(
        "WHERE (t0.member_id IN (?, ?) OR t0.member_id IN (?)) AND t0.member_name LIKE ? ESCAPE '!'"
    ));
    assert!(positional.sql.ends_with(
        "ORDER BY t0.member_id ASC OFFSET 10 ROWS FETCH NEXT 10 ROWS ONLY"
    ));
    assert_eq!(positional.values.len(), 4);
}

#[test]
fn invalid_config_files() {
    let zero_chunk = write_config("in_chunk_size = 0\n");
    assert!(matches!(
        CbConfig::load(zero_chunk.path()),
        Err(CbError::Configuration(ref m)) if m.contains("in_chunk_size")
    ));

    let bad_dialect = write_config("dialect = \"oracle\"\n");
    assert!(matches!(
        CbConfig::load(bad_dialect.path()),
        Err(CbError::Configuration(_))
    ));

    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("cbsql.toml");
    assert!(matches!(
        CbConfig::load(&missing),
        Err(CbError::Configuration(ref m)) if m.contains("failed to read")
    ));
}

#[test]
fn rendering_under_a_subscriber() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("cbsql=trace"))
        .with_test_writer()
        .finish();
    tracing::subscriber::with_default(subscriber, || {
        let config = CbConfig::default().log_sql_max_length(16);
        let mut cb = QueryDescriptor::with_config(schema(), config, "member").unwrap();
        cb.query().equal("member_name", cbsql::BindValue::Null).unwrap();
        cb.query()
            .exists("purchase_list", |sub| {
                sub.query().greater_than("purchase_price", 100)?;
                Ok(())
            })
            .unwrap();
        assert_eq!(cb.skipped_predicates().len(), 1);
        let statement = cb.to_statement().unwrap();
        assert!(statement.sql().contains("EXISTS (SELECT t1.member_id FROM purchase t1"));
    });
}

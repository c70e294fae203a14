//! Paging execution: count and fetch against an injected executor.
//!
//! Two strategies:
//!
//! - count-first: count, skip the fetch when the count is zero, then fetch.
//! - count-later: fetch first; when the fetch is provably the last page the
//!   total is derived as `(page - 1) * size + rows` and no count is issued.
//!   A non-empty fetch of fewer rows than the page size is the last page.
//!   An empty fetch proves nothing about the total and is always counted.
//!
//! If the total is positive but the page came back empty (the requested
//! page is past the end) and re-select is enabled, the cycle is run once
//! more on the last page. The safety maximum is checked as soon as the total
//! is known, before any re-fetch.

use crate::error::{CbError, CbResult};
use crate::query::QueryDescriptor;
use crate::statement::BoundStatement;

/// Execution callback used by the coordinator.
pub trait PagingHandler {
    type Row;

    /// Run a count statement and return its single value.
    fn count(&mut self, statement: &BoundStatement) -> CbResult<u64>;

    /// Run a select statement and return its rows.
    fn fetch(&mut self, statement: &BoundStatement) -> CbResult<Vec<Self::Row>>;
}

/// One page of rows plus the total it was cut from.
#[derive(Debug, Clone, PartialEq)]
pub struct PagingResult<R> {
    pub rows: Vec<R>,
    pub total: u64,
    pub page_size: u64,
    pub page_number: u64,
}

impl<R> PagingResult<R> {
    /// Number of pages; an empty result still has one (empty) page.
    pub fn page_count(&self) -> u64 {
        self.total.div_ceil(self.page_size).max(1)
    }

    pub fn exists_prev_page(&self) -> bool {
        self.page_number > 1
    }

    pub fn exists_next_page(&self) -> bool {
        self.page_number < self.page_count()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 1-based number of the first row on this page (0 when empty).
    pub fn start_record_number(&self) -> u64 {
        if self.rows.is_empty() {
            0
        } else {
            self.rows_before().saturating_add(1)
        }
    }

    /// 1-based number of the last row on this page (0 when empty).
    pub fn end_record_number(&self) -> u64 {
        if self.rows.is_empty() {
            0
        } else {
            self.rows_before().saturating_add(self.rows.len() as u64)
        }
    }

    fn rows_before(&self) -> u64 {
        self.page_number.saturating_sub(1).saturating_mul(self.page_size)
    }

    /// Page numbers within `range` pages of the current one.
    pub fn page_range(&self, range: u64) -> Vec<u64> {
        let start = self.page_number.saturating_sub(range).max(1);
        let end = self.page_number.saturating_add(range).min(self.page_count());
        (start..=end).collect()
    }

    /// Page numbers of the fixed-size group containing the current page.
    pub fn page_group(&self, group_size: u64) -> Vec<u64> {
        let group_size = group_size.max(1);
        let start = self.page_number.saturating_sub(1) / group_size * group_size + 1;
        let end = start.saturating_add(group_size - 1).min(self.page_count());
        (start..=end).collect()
    }

    pub fn into_rows(self) -> Vec<R> {
        self.rows
    }
}

/// Runs the count/fetch cycle of one descriptor.
#[derive(Debug)]
pub struct PageFetchCoordinator<'a> {
    desc: &'a mut QueryDescriptor,
}

impl<'a> PageFetchCoordinator<'a> {
    pub fn new(desc: &'a mut QueryDescriptor) -> Self {
        Self { desc }
    }

    pub fn execute<H: PagingHandler>(&mut self, handler: &mut H) -> CbResult<PagingResult<H::Row>> {
        self.cycle(handler, true)
    }

    fn window(&self) -> CbResult<(u64, u64)> {
        let window = self.desc.fetch_window();
        match window.size() {
            Some(size) => Ok((size, window.page_number())),
            None => Err(CbError::PagingStateInvalid(format!(
                "paging on '{}' without a fetch window",
                self.desc.table()
            ))),
        }
    }

    fn check_safety(&self, total: u64) -> CbResult<()> {
        match self.desc.paging_config().safety_max_result_size {
            Some(max) if total > max => Err(CbError::PagingOverSafetyLimit { count: total, max }),
            _ => Ok(()),
        }
    }

    fn cycle<H: PagingHandler>(&mut self, handler: &mut H, first: bool) -> CbResult<PagingResult<H::Row>> {
        let (size, page) = self.window()?;
        let (rows, total) = if self.desc.paging_config().count_later {
            let rows = handler.fetch(&self.desc.to_statement()?)?;
            let fetched = rows.len() as u64;
            let total = if is_last_page(fetched, size) {
                let derived = page.saturating_sub(1).saturating_mul(size).saturating_add(fetched);
                tracing::debug!(
                    target: crate::log::TARGET,
                    page,
                    fetched,
                    total = derived,
                    "last page fetched, count skipped"
                );
                derived
            } else {
                handler.count(&self.desc.to_count_statement()?)?
            };
            self.check_safety(total)?;
            (rows, total)
        } else {
            let total = handler.count(&self.desc.to_count_statement()?)?;
            self.check_safety(total)?;
            if total == 0 {
                tracing::debug!(target: crate::log::TARGET, "count is zero, fetch skipped");
                return Ok(PagingResult {
                    rows: Vec::new(),
                    total,
                    page_size: size,
                    page_number: page,
                });
            }
            (handler.fetch(&self.desc.to_statement()?)?, total)
        };

        if first && total > 0 && rows.is_empty() && self.desc.paging_config().reselect {
            let last_page = total.div_ceil(size);
            tracing::debug!(
                target: crate::log::TARGET,
                requested = page,
                last_page,
                "requested page is past the end, re-selecting the last page"
            );
            self.desc.set_page_number(last_page);
            return self.cycle(handler, false);
        }
        Ok(PagingResult {
            rows,
            total,
            page_size: size,
            page_number: page,
        })
    }
}

/// Some rows but fewer than the page size. An empty page may lie past the end.
fn is_last_page(fetched: u64, size: u64) -> bool {
    fetched > 0 && fetched < size
}

impl QueryDescriptor {
    /// Run the paging cycle for this descriptor's fetch window.
    pub fn select_page<H: PagingHandler>(&mut self, handler: &mut H) -> CbResult<PagingResult<H::Row>> {
        PageFetchCoordinator::new(self).execute(handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{SchemaRegistry, TableInfo};
    use crate::statement::StatementKind;
    use crate::value::ValueType;

    /// Serves a fixed number of rows and records every call.
    struct FakeHandler {
        total: u64,
        calls: Vec<String>,
    }

    impl FakeHandler {
        fn new(total: u64) -> Self {
            Self {
                total,
                calls: Vec::new(),
            }
        }

        fn counts(&self) -> usize {
            self.calls.iter().filter(|c| c.as_str() == "count").count()
        }
    }

    impl PagingHandler for FakeHandler {
        type Row = u64;

        fn count(&mut self, statement: &BoundStatement) -> CbResult<u64> {
            assert_eq!(statement.kind(), StatementKind::Count);
            self.calls.push("count".to_string());
            Ok(self.total)
        }

        fn fetch(&mut self, statement: &BoundStatement) -> CbResult<Vec<u64>> {
            self.calls.push(format!("fetch {}", statement.sql()));
            // LIMIT n [OFFSET m]
            let sql = statement.sql();
            let limit: u64 = sql
                .split("LIMIT ")
                .nth(1)
                .and_then(|s| s.split(' ').next())
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            let offset: u64 = sql
                .split("OFFSET ")
                .nth(1)
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            Ok((offset..self.total.min(offset + limit)).collect())
        }
    }

    fn member() -> QueryDescriptor {
        let meta = SchemaRegistry::new()
            .with_table(
                TableInfo::new("member")
                    .with_primary_key("member_id", ValueType::Integer)
                    .with_column("member_name", ValueType::Text),
            )
            .unwrap()
            .into_ref();
        QueryDescriptor::new(meta, "member").unwrap()
    }

    #[test]
    fn last_page_total_is_derived() {
        let mut cb = member();
        cb.enable_paging_count_later();
        cb.paging(20, 3).unwrap();
        let mut handler = FakeHandler::new(45);
        let page = cb.select_page(&mut handler).unwrap();
        assert_eq!(page.total, 45);
        assert_eq!(page.rows.len(), 5);
        assert_eq!(handler.counts(), 0);
        assert_eq!(page.page_count(), 3);
        assert!(!page.exists_next_page());
        assert!(page.exists_prev_page());
    }

    #[test]
    fn empty_first_page_is_counted() {
        let mut cb = member();
        cb.enable_paging_count_later();
        cb.paging(20, 1).unwrap();
        let mut handler = FakeHandler::new(0);
        let page = cb.select_page(&mut handler).unwrap();
        assert_eq!(handler.counts(), 1);
        assert_eq!(page.total, 0);
        assert!(page.is_empty());
    }

    #[test]
    fn full_page_is_counted() {
        let mut cb = member();
        cb.enable_paging_count_later();
        cb.paging(20, 1).unwrap();
        let mut handler = FakeHandler::new(100);
        let page = cb.select_page(&mut handler).unwrap();
        assert_eq!(handler.counts(), 1);
        assert_eq!(page.total, 100);
        assert_eq!(page.page_count(), 5);
    }

    #[test]
    fn count_first_zero_skips_fetch() {
        let mut cb = member();
        cb.paging(20, 1).unwrap();
        let mut handler = FakeHandler::new(0);
        let page = cb.select_page(&mut handler).unwrap();
        assert_eq!(handler.calls, vec!["count".to_string()]);
        assert_eq!(page.total, 0);
        assert!(page.rows.is_empty());
    }

    #[test]
    fn page_past_the_end_is_reselected_once() {
        let mut cb = member();
        cb.paging(20, 10).unwrap();
        let mut handler = FakeHandler::new(45);
        let page = cb.select_page(&mut handler).unwrap();
        assert_eq!(page.page_number, 3);
        assert_eq!(page.rows, (40..45).collect::<Vec<_>>());
        assert_eq!(handler.calls.len(), 4);
        assert_eq!(cb.fetch_window().page_number(), 3);
    }

    #[test]
    fn count_later_past_the_end_counts_then_reselects() {
        let mut cb = member();
        cb.enable_paging_count_later();
        cb.paging(20, 10).unwrap();
        let mut handler = FakeHandler::new(45);
        let page = cb.select_page(&mut handler).unwrap();
        assert_eq!(page.page_number, 3);
        assert_eq!(page.rows, (40..45).collect::<Vec<_>>());
        assert_eq!(page.total, 45);
        // empty fetch, count, then a short last page whose total is derived
        assert_eq!(handler.counts(), 1);
        assert_eq!(handler.calls.len(), 3);
    }

    #[test]
    fn reselect_can_be_disabled() {
        let mut cb = member();
        cb.disable_paging_reselect();
        cb.paging(20, 10).unwrap();
        let mut handler = FakeHandler::new(45);
        let page = cb.select_page(&mut handler).unwrap();
        assert!(page.rows.is_empty());
        assert_eq!(page.total, 45);
        assert_eq!(handler.calls.len(), 2);
    }

    #[test]
    fn safety_limit_is_checked_before_fetch() {
        let mut cb = member();
        cb.safety_max_result_size(10);
        cb.paging(20, 1).unwrap();
        let mut handler = FakeHandler::new(45);
        let err = cb.select_page(&mut handler).unwrap_err();
        assert!(matches!(err, CbError::PagingOverSafetyLimit { count: 45, max: 10 }));
        assert_eq!(handler.calls, vec!["count".to_string()]);
    }

    #[test]
    fn paging_without_window_is_invalid() {
        let mut cb = member();
        let mut handler = FakeHandler::new(3);
        let err = cb.select_page(&mut handler).unwrap_err();
        assert!(matches!(err, CbError::PagingStateInvalid(_)));
        assert!(handler.calls.is_empty());
    }

    #[test]
    fn count_statement_has_no_order_or_window() {
        let mut cb = member();
        cb.order_by().asc("member_name").unwrap();
        cb.paging(20, 2).unwrap();
        let count = cb.to_count_statement().unwrap();
        assert_eq!(count.sql(), "SELECT COUNT(*) FROM member t0");
        let select = cb.to_statement().unwrap();
        assert!(select.sql().ends_with("ORDER BY t0.member_name ASC LIMIT 20 OFFSET 20"));
    }

    #[test]
    fn navigation_windows() {
        let page = PagingResult {
            rows: vec![1u64; 10],
            total: 95,
            page_size: 10,
            page_number: 5,
        };
        assert_eq!(page.page_count(), 10);
        assert_eq!(page.page_range(2), vec![3, 4, 5, 6, 7]);
        assert_eq!(page.page_group(3), vec![4, 5, 6]);
        assert_eq!(page.start_record_number(), 41);
        assert_eq!(page.end_record_number(), 50);
    }

    #[test]
    fn navigation_saturates_on_huge_page_numbers() {
        let page = PagingResult {
            rows: vec![1u64; 3],
            total: u64::MAX,
            page_size: 1000,
            page_number: u64::MAX,
        };
        assert_eq!(page.start_record_number(), u64::MAX);
        assert_eq!(page.end_record_number(), u64::MAX);
        assert!(!page.exists_next_page());
    }
}

use crate::config::Dialect;
use crate::error::{CbError, CbResult};

/// Paging window: page size and 1-based page number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchWindow {
    size: Option<u64>,
    page_number: u64,
}

impl FetchWindow {
    pub fn set(&mut self, size: u64, page_number: u64) -> CbResult<()> {
        if size == 0 {
            return Err(CbError::validation("page size must be greater than zero"));
        }
        self.size = Some(size);
        self.page_number = page_number.max(1);
        Ok(())
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_set(&self) -> bool {
        self.size.is_some()
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn page_number(&self) -> u64 {
        self.page_number.max(1)
    }

    pub(crate) fn set_page_number(&mut self, page_number: u64) {
        self.page_number = page_number.max(1);
    }

    /// Zero-based index of the first row of the window.
    pub fn start_index(&self) -> u64 {
        match self.size {
            Some(size) => (self.page_number() - 1).saturating_mul(size),
            None => 0,
        }
    }

    pub(crate) fn render(&self, dialect: Dialect) -> Option<String> {
        self.size
            .map(|size| dialect.paging_clause(self.start_index(), size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_index_and_render() {
        let mut w = FetchWindow::default();
        assert!(w.render(Dialect::Postgres).is_none());
        w.set(20, 3).unwrap();
        assert_eq!(w.start_index(), 40);
        assert_eq!(w.render(Dialect::Postgres).as_deref(), Some("LIMIT 20 OFFSET 40"));
        assert!(w.set(0, 1).is_err());
    }

    #[test]
    fn page_number_is_at_least_one() {
        let mut w = FetchWindow::default();
        w.set(10, 0).unwrap();
        assert_eq!(w.page_number(), 1);
        assert_eq!(w.start_index(), 0);
    }
}

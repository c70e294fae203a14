//! Options for like-search, range-of and from-to predicates.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::value::BindValue;

/// Where the wildcard goes around a like-search value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LikeMatch {
    /// The value is used as-is (caller supplies wildcards).
    #[default]
    Plain,
    Prefix,
    Suffix,
    Contain,
}

/// Connector joining the parts of a split like-search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitConnector {
    And,
    Or,
}

/// Options of a like-search predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct LikeSearchOption {
    pub matching: LikeMatch,
    /// Escape character; `None` leaves the value unescaped.
    pub escape: Option<char>,
    /// Split the value on blanks and join the parts with the connector.
    pub split: Option<SplitConnector>,
    /// Upper bound on the number of split parts (extra parts are dropped).
    pub split_limit: Option<usize>,
    /// Turn a prefix search on a compound column into equality on full segments.
    pub compound_optimization: bool,
    pub case_insensitive: bool,
}

impl Default for LikeSearchOption {
    fn default() -> Self {
        Self {
            matching: LikeMatch::Plain,
            escape: Some('|'),
            split: None,
            split_limit: None,
            compound_optimization: false,
            case_insensitive: false,
        }
    }
}

impl LikeSearchOption {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn like_prefix(mut self) -> Self {
        self.matching = LikeMatch::Prefix;
        self
    }

    pub fn like_suffix(mut self) -> Self {
        self.matching = LikeMatch::Suffix;
        self
    }

    pub fn like_contain(mut self) -> Self {
        self.matching = LikeMatch::Contain;
        self
    }

    pub fn escape_by(mut self, escape: char) -> Self {
        self.escape = Some(escape);
        self
    }

    pub fn not_escape(mut self) -> Self {
        self.escape = None;
        self
    }

    pub fn split_by_blank(mut self) -> Self {
        self.split = Some(SplitConnector::And);
        self
    }

    pub fn split_by_blank_or(mut self) -> Self {
        self.split = Some(SplitConnector::Or);
        self
    }

    pub fn split_limit(mut self, limit: usize) -> Self {
        self.split_limit = Some(limit);
        self
    }

    pub fn compound_optimized(mut self) -> Self {
        self.compound_optimization = true;
        self
    }

    pub fn ignore_case(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    /// Split `value` into parts on ASCII and full-width blanks.
    pub fn split_value(&self, value: &str) -> Vec<String> {
        let mut parts: Vec<String> = value
            .split(|c: char| c.is_whitespace() || c == '\u{3000}')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        if let Some(limit) = self.split_limit {
            parts.truncate(limit);
        }
        parts
    }

    /// Escape wildcard characters and wrap the value per [`LikeMatch`].
    pub fn build_pattern(&self, value: &str) -> String {
        let escaped = match self.escape {
            Some(esc) => {
                let mut out = String::with_capacity(value.len() + 4);
                for c in value.chars() {
                    if c == esc || c == '%' || c == '_' {
                        out.push(esc);
                    }
                    out.push(c);
                }
                out
            }
            None => value.to_string(),
        };
        match self.matching {
            LikeMatch::Plain => escaped,
            LikeMatch::Prefix => format!("{escaped}%"),
            LikeMatch::Suffix => format!("%{escaped}"),
            LikeMatch::Contain => format!("%{escaped}%"),
        }
    }

    /// Trailing `ESCAPE '...'` clause, if escaping is on.
    pub fn escape_clause(&self) -> String {
        match self.escape {
            Some('\'') => " ESCAPE ''''".to_string(),
            Some(esc) => format!(" ESCAPE '{esc}'"),
            None => String::new(),
        }
    }
}

/// Options of a range-of predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RangeOfOption {
    /// Lower bound is exclusive.
    pub greater_than: bool,
    /// Upper bound is exclusive.
    pub less_than: bool,
    /// Allow one bound to be absent without reporting the other as invalid.
    pub allow_one_side: bool,
}

impl RangeOfOption {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn greater_than(mut self) -> Self {
        self.greater_than = true;
        self
    }

    pub fn less_than(mut self) -> Self {
        self.less_than = true;
        self
    }

    pub fn allow_one_side(mut self) -> Self {
        self.allow_one_side = true;
        self
    }
}

/// Options of a from-to (date range) predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FromToOption {
    /// Ignore the time part: `from` is truncated to midnight and the upper
    /// bound becomes `< to + 1 day`.
    pub compare_as_date: bool,
    pub allow_one_side: bool,
}

impl FromToOption {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compare_as_date(mut self) -> Self {
        self.compare_as_date = true;
        self
    }

    pub fn allow_one_side(mut self) -> Self {
        self.allow_one_side = true;
        self
    }

    /// Adjust the lower bound (midnight of its day under compare-as-date).
    pub fn filter_from(&self, from: BindValue) -> BindValue {
        if !self.compare_as_date {
            return from;
        }
        match from {
            BindValue::Timestamp(ts) => BindValue::Timestamp(ts.date().and_time(NaiveTime::MIN)),
            other => other,
        }
    }

    /// Adjust the upper bound (start of the following day under compare-as-date).
    pub fn filter_to(&self, to: BindValue) -> BindValue {
        if !self.compare_as_date {
            return to;
        }
        match to {
            BindValue::Date(d) => BindValue::Date(next_day(d)),
            BindValue::Timestamp(ts) => {
                BindValue::Timestamp(NaiveDateTime::new(next_day(ts.date()), NaiveTime::MIN))
            }
            other => other,
        }
    }
}

fn next_day(d: NaiveDate) -> NaiveDate {
    d.checked_add_signed(Duration::days(1)).unwrap_or(d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_escapes_wildcards() {
        let opt = LikeSearchOption::new().like_contain();
        assert_eq!(opt.build_pattern("100%_off|x"), "%100|%|_off||x%");
        assert_eq!(opt.escape_clause(), " ESCAPE '|'");
    }

    #[test]
    fn pattern_without_escape() {
        let opt = LikeSearchOption::new().like_prefix().not_escape();
        assert_eq!(opt.build_pattern("S%"), "S%%");
        assert_eq!(opt.escape_clause(), "");
    }

    #[test]
    fn split_on_blanks_with_limit() {
        let opt = LikeSearchOption::new().split_by_blank().split_limit(2);
        assert_eq!(opt.split_value(" a  b\u{3000}c "), vec!["a", "b"]);
    }

    #[test]
    fn from_to_compare_as_date() {
        let opt = FromToOption::new().compare_as_date();
        let to = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        assert_eq!(
            opt.filter_to(BindValue::from(to)),
            BindValue::from(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
        );
        let from = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(13, 5, 0)
            .unwrap();
        assert_eq!(
            opt.filter_from(BindValue::from(from)),
            BindValue::from(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap())
        );
    }
}

//! Comparison operators understood by the condition query.
//!
//! [`OperatorKind`] is a closed set: every variant knows how many operands it
//! takes, what an absent operand means and how it renders.

use crate::error::{CbError, CbResult};
use std::fmt;
use std::str::FromStr;

/// Number of operand values an operator consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// `IS NULL`, `IS NOT NULL`
    None,
    Single,
    List,
    /// Lower and upper bound (range-of, from-to).
    Pair,
}

/// What an absent operand (null, empty string, empty list) means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsentPolicy {
    /// The operator takes no operand.
    NotApplicable,
    /// An absent operand makes the predicate invalid (skipped or rejected per mode).
    Invalid,
    /// Each bound is tested on its own; one absent bound drops that half.
    PerBound,
}

/// Operator semantics of a single predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
    InScope,
    NotInScope,
    LikeSearch,
    NotLikeSearch,
    PrefixSearch,
    IsNull,
    IsNullOrEmpty,
    IsNotNull,
    RangeOf,
    FromTo,
}

/// Name table used by [`OperatorKind::from_str`]; the first name of each
/// variant is its canonical key.
const NAMES: &[(&str, OperatorKind)] = &[
    ("equal", OperatorKind::Equal),
    ("eq", OperatorKind::Equal),
    ("not_equal", OperatorKind::NotEqual),
    ("ne", OperatorKind::NotEqual),
    ("greater_than", OperatorKind::GreaterThan),
    ("gt", OperatorKind::GreaterThan),
    ("less_than", OperatorKind::LessThan),
    ("lt", OperatorKind::LessThan),
    ("greater_equal", OperatorKind::GreaterEqual),
    ("ge", OperatorKind::GreaterEqual),
    ("less_equal", OperatorKind::LessEqual),
    ("le", OperatorKind::LessEqual),
    ("in_scope", OperatorKind::InScope),
    ("in", OperatorKind::InScope),
    ("not_in_scope", OperatorKind::NotInScope),
    ("not_in", OperatorKind::NotInScope),
    ("like_search", OperatorKind::LikeSearch),
    ("like", OperatorKind::LikeSearch),
    ("not_like_search", OperatorKind::NotLikeSearch),
    ("not_like", OperatorKind::NotLikeSearch),
    ("prefix_search", OperatorKind::PrefixSearch),
    ("is_null", OperatorKind::IsNull),
    ("is_null_or_empty", OperatorKind::IsNullOrEmpty),
    ("is_not_null", OperatorKind::IsNotNull),
    ("range_of", OperatorKind::RangeOf),
    ("from_to", OperatorKind::FromTo),
];

impl OperatorKind {
    pub const ALL: [OperatorKind; 16] = [
        OperatorKind::Equal,
        OperatorKind::NotEqual,
        OperatorKind::GreaterThan,
        OperatorKind::LessThan,
        OperatorKind::GreaterEqual,
        OperatorKind::LessEqual,
        OperatorKind::InScope,
        OperatorKind::NotInScope,
        OperatorKind::LikeSearch,
        OperatorKind::NotLikeSearch,
        OperatorKind::PrefixSearch,
        OperatorKind::IsNull,
        OperatorKind::IsNullOrEmpty,
        OperatorKind::IsNotNull,
        OperatorKind::RangeOf,
        OperatorKind::FromTo,
    ];

    /// Canonical snake_case key, used in parameter names.
    pub fn key(self) -> &'static str {
        match self {
            OperatorKind::Equal => "equal",
            OperatorKind::NotEqual => "not_equal",
            OperatorKind::GreaterThan => "greater_than",
            OperatorKind::LessThan => "less_than",
            OperatorKind::GreaterEqual => "greater_equal",
            OperatorKind::LessEqual => "less_equal",
            OperatorKind::InScope => "in_scope",
            OperatorKind::NotInScope => "not_in_scope",
            OperatorKind::LikeSearch => "like_search",
            OperatorKind::NotLikeSearch => "not_like_search",
            OperatorKind::PrefixSearch => "prefix_search",
            OperatorKind::IsNull => "is_null",
            OperatorKind::IsNullOrEmpty => "is_null_or_empty",
            OperatorKind::IsNotNull => "is_not_null",
            OperatorKind::RangeOf => "range_of",
            OperatorKind::FromTo => "from_to",
        }
    }

    pub fn arity(self) -> Arity {
        match self {
            OperatorKind::IsNull | OperatorKind::IsNullOrEmpty | OperatorKind::IsNotNull => {
                Arity::None
            }
            OperatorKind::InScope | OperatorKind::NotInScope => Arity::List,
            OperatorKind::RangeOf | OperatorKind::FromTo => Arity::Pair,
            _ => Arity::Single,
        }
    }

    pub fn absent_policy(self) -> AbsentPolicy {
        match self.arity() {
            Arity::None => AbsentPolicy::NotApplicable,
            Arity::Pair => AbsentPolicy::PerBound,
            Arity::Single | Arity::List => AbsentPolicy::Invalid,
        }
    }

    /// SQL operator text for primitive operators; `None` for expanding ones.
    pub fn sql_operator(self) -> Option<&'static str> {
        Some(match self {
            OperatorKind::Equal => "=",
            OperatorKind::NotEqual => "<>",
            OperatorKind::GreaterThan => ">",
            OperatorKind::LessThan => "<",
            OperatorKind::GreaterEqual => ">=",
            OperatorKind::LessEqual => "<=",
            OperatorKind::InScope => "IN",
            OperatorKind::NotInScope => "NOT IN",
            OperatorKind::LikeSearch | OperatorKind::PrefixSearch => "LIKE",
            OperatorKind::NotLikeSearch => "NOT LIKE",
            OperatorKind::IsNull => "IS NULL",
            OperatorKind::IsNotNull => "IS NOT NULL",
            OperatorKind::IsNullOrEmpty | OperatorKind::RangeOf | OperatorKind::FromTo => {
                return None;
            }
        })
    }

    /// Lower/upper primitives of a two-operand operator.
    ///
    /// The upper bound of from-to may be tightened to `LessThan` by the
    /// from-to option (compare-as-date); that decision belongs to the caller.
    pub fn expansion(self) -> Option<(OperatorKind, OperatorKind)> {
        match self {
            OperatorKind::RangeOf | OperatorKind::FromTo => {
                Some((OperatorKind::GreaterEqual, OperatorKind::LessEqual))
            }
            _ => None,
        }
    }

    pub fn is_like(self) -> bool {
        matches!(
            self,
            OperatorKind::LikeSearch | OperatorKind::NotLikeSearch | OperatorKind::PrefixSearch
        )
    }

    /// Whether a predicate with this operator can only be true on a matched row.
    ///
    /// Null checks can be satisfied by the NULL side of an outer join, so
    /// they never allow that join to become inner.
    pub fn allows_inner_join(self) -> bool {
        !matches!(self, OperatorKind::IsNull | OperatorKind::IsNullOrEmpty)
    }

    /// Render a single-operand or zero-operand primitive.
    ///
    /// `operand` is the placeholder (or literal) text; it is ignored for
    /// zero-operand operators.
    pub fn render(self, column: &str, operand: &str) -> CbResult<String> {
        match self {
            OperatorKind::IsNull | OperatorKind::IsNotNull => {
                Ok(format!("{column} {}", self.sql_operator().unwrap_or_default()))
            }
            OperatorKind::IsNullOrEmpty => Ok(format!("({column} IS NULL OR {column} = '')")),
            OperatorKind::InScope | OperatorKind::NotInScope => {
                Ok(format!("{column} {} ({operand})", self.sql_operator().unwrap_or_default()))
            }
            OperatorKind::RangeOf | OperatorKind::FromTo => Err(CbError::validation(format!(
                "{self} expands into two predicates and cannot render as one"
            ))),
            other => Ok(format!(
                "{column} {} {operand}",
                other.sql_operator().unwrap_or_default()
            )),
        }
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

fn normalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.trim().chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else if c == '-' || c == ' ' {
            out.push('_');
        } else {
            out.push(c);
        }
    }
    out
}

impl FromStr for OperatorKind {
    type Err = CbError;

    /// Accepts snake_case keys, lowerCamel names and short aliases (`eq`, `ge`, `in`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        NAMES
            .iter()
            .find(|(name, _)| *name == normalized)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| CbError::unresolved(s, s, "unknown operator name"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_str_accepts_key_camel_and_alias() {
        assert_eq!("greater_equal".parse::<OperatorKind>().unwrap(), OperatorKind::GreaterEqual);
        assert_eq!("greaterEqual".parse::<OperatorKind>().unwrap(), OperatorKind::GreaterEqual);
        assert_eq!("ge".parse::<OperatorKind>().unwrap(), OperatorKind::GreaterEqual);
        assert_eq!("NotInScope".parse::<OperatorKind>().unwrap(), OperatorKind::NotInScope);
    }

    #[test]
    fn from_str_unknown_names_the_segment() {
        let err = "between".parse::<OperatorKind>().unwrap_err();
        match err {
            CbError::DynamicResolutionFailure { segment, .. } => assert_eq!(segment, "between"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn every_key_round_trips() {
        for kind in OperatorKind::ALL {
            assert_eq!(kind.key().parse::<OperatorKind>().unwrap(), kind);
        }
    }

    #[test]
    fn arity_and_policy() {
        assert_eq!(OperatorKind::IsNull.arity(), Arity::None);
        assert_eq!(OperatorKind::InScope.arity(), Arity::List);
        assert_eq!(OperatorKind::RangeOf.absent_policy(), AbsentPolicy::PerBound);
        assert_eq!(OperatorKind::Equal.absent_policy(), AbsentPolicy::Invalid);
    }

    #[test]
    fn render_primitives() {
        assert_eq!(
            OperatorKind::Equal.render("t0.member_name", "#{cq.member_name.equal}").unwrap(),
            "t0.member_name = #{cq.member_name.equal}"
        );
        assert_eq!(OperatorKind::IsNotNull.render("t0.birthdate", "").unwrap(), "t0.birthdate IS NOT NULL");
        assert_eq!(
            OperatorKind::IsNullOrEmpty.render("t0.memo", "").unwrap(),
            "(t0.memo IS NULL OR t0.memo = '')"
        );
        assert!(OperatorKind::RangeOf.render("t0.price", "").is_err());
    }
}

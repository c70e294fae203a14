use crate::error::{CbError, CbResult};
use crate::value::BindValue;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Render-time view handed to deferred predicates.
///
/// Sub-statement fragments are rendered just before the owning statement,
/// already namespaced, and looked up here by identity.
#[derive(Debug, Default)]
pub struct RenderScope {
    fragments: IndexMap<String, String>,
}

impl RenderScope {
    pub(crate) fn new(fragments: IndexMap<String, String>) -> Self {
        Self { fragments }
    }

    pub fn fragment(&self, identity: &str) -> CbResult<&str> {
        self.fragments
            .get(identity)
            .map(String::as_str)
            .ok_or_else(|| CbError::validation(format!("sub-statement '{identity}' was not rendered")))
    }
}

/// Closure producing predicate text at render time.
pub type DeferredText = Arc<dyn Fn(&RenderScope) -> CbResult<String> + Send + Sync>;

/// Connector between grouped predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

impl Connector {
    pub fn sql(self) -> &'static str {
        match self {
            Connector::And => " AND ",
            Connector::Or => " OR ",
        }
    }
}

/// Text of a predicate: fixed, deferred, or a parenthesized group.
#[derive(Clone)]
pub enum PredicateText {
    Fixed(String),
    Deferred(DeferredText),
    Group {
        connector: Connector,
        items: Vec<PredicateText>,
    },
}

impl PredicateText {
    pub fn render(&self, scope: &RenderScope) -> CbResult<String> {
        match self {
            PredicateText::Fixed(text) => Ok(text.clone()),
            PredicateText::Deferred(f) => f(scope),
            PredicateText::Group { connector, items } => {
                if items.len() == 1 {
                    return items[0].render(scope);
                }
                let parts = items
                    .iter()
                    .map(|item| item.render(scope))
                    .collect::<CbResult<Vec<_>>>()?;
                Ok(format!("({})", parts.join(connector.sql())))
            }
        }
    }
}

impl fmt::Debug for PredicateText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredicateText::Fixed(text) => f.debug_tuple("Fixed").field(text).finish(),
            PredicateText::Deferred(_) => f.write_str("Deferred(..)"),
            PredicateText::Group { connector, items } => f
                .debug_struct("Group")
                .field("connector", connector)
                .field("items", items)
                .finish(),
        }
    }
}

/// One predicate contributed to WHERE, an ON clause or an inline view.
#[derive(Debug, Clone)]
pub struct WherePredicate {
    pub text: PredicateText,
    /// Aliases of the table references the predicate reads.
    pub aliases: Vec<String>,
    /// The predicate can be true on the NULL side of an outer join.
    pub inner_ineligible: bool,
    /// Override key (`cq.member_name.equal`); `None` for free-form predicates.
    pub key: Option<String>,
    /// Bound operand, compared when the same key is registered again.
    pub value: Option<BindValue>,
}

impl WherePredicate {
    pub fn fixed(text: impl Into<String>, alias: &str) -> Self {
        Self {
            text: PredicateText::Fixed(text.into()),
            aliases: vec![alias.to_string()],
            inner_ineligible: false,
            key: None,
            value: None,
        }
    }

    pub fn deferred(text: DeferredText, alias: &str) -> Self {
        Self {
            text: PredicateText::Deferred(text),
            aliases: vec![alias.to_string()],
            inner_ineligible: false,
            key: None,
            value: None,
        }
    }

    pub fn keyed(mut self, key: impl Into<String>, value: Option<BindValue>) -> Self {
        self.key = Some(key.into());
        self.value = value;
        self
    }

    pub fn ineligible(mut self, ineligible: bool) -> Self {
        self.inner_ineligible |= ineligible;
        self
    }

    pub fn render(&self, scope: &RenderScope) -> CbResult<String> {
        self.text.render(scope)
    }
}

/// Accumulation state of an open OR scope.
#[derive(Debug, Default)]
pub(crate) struct OrScope {
    pub alternatives: Vec<WherePredicate>,
    pub and_part: Option<Vec<WherePredicate>>,
    /// Nested or-scope calls flatten into this one.
    pub depth: usize,
}

/// Combine predicates into one group predicate carrying every alias.
///
/// OR groups are always inner-join ineligible.
pub(crate) fn merge(connector: Connector, items: Vec<WherePredicate>) -> Option<WherePredicate> {
    group(connector, items).map(|g| g.ineligible(connector == Connector::Or))
}

/// Group predicates that all constrain the same column (IN chunks, like
/// split parts); eligibility is inherited from the parts.
pub(crate) fn group(connector: Connector, items: Vec<WherePredicate>) -> Option<WherePredicate> {
    if items.is_empty() {
        return None;
    }
    let mut aliases: Vec<String> = Vec::new();
    let mut ineligible = false;
    let mut texts = Vec::with_capacity(items.len());
    for item in items {
        for alias in item.aliases {
            if !aliases.contains(&alias) {
                aliases.push(alias);
            }
        }
        ineligible |= item.inner_ineligible;
        texts.push(item.text);
    }
    Some(WherePredicate {
        text: PredicateText::Group {
            connector,
            items: texts,
        },
        aliases,
        inner_ineligible: ineligible,
        key: None,
        value: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_renders_parenthesized() {
        let merged = merge(
            Connector::Or,
            vec![
                WherePredicate::fixed("t0.a = 1", "t0"),
                WherePredicate::fixed("t0r_0.b = 2", "t0r_0"),
            ],
        )
        .unwrap();
        let scope = RenderScope::default();
        assert_eq!(merged.render(&scope).unwrap(), "(t0.a = 1 OR t0r_0.b = 2)");
        assert_eq!(merged.aliases, vec!["t0", "t0r_0"]);
        assert!(merged.inner_ineligible);
    }

    #[test]
    fn single_item_group_has_no_parentheses() {
        let merged = merge(Connector::And, vec![WherePredicate::fixed("t0.a = 1", "t0")]).unwrap();
        assert_eq!(merged.render(&RenderScope::default()).unwrap(), "t0.a = 1");
        assert!(!merged.inner_ineligible);
    }

    #[test]
    fn deferred_reads_scope() {
        let mut fragments = IndexMap::new();
        fragments.insert("exists_purchase_list1".to_string(), "SELECT 1".to_string());
        let scope = RenderScope::new(fragments);
        let pred = WherePredicate::deferred(
            Arc::new(|scope: &RenderScope| -> CbResult<String> {
                Ok(format!("EXISTS ({})", scope.fragment("exists_purchase_list1")?))
            }),
            "t0",
        );
        assert_eq!(pred.render(&scope).unwrap(), "EXISTS (SELECT 1)");
        assert!(
            WherePredicate::deferred(
                Arc::new(|s: &RenderScope| -> CbResult<String> { Ok(s.fragment("x")?.to_string()) }),
                "t0"
            )
            .render(&RenderScope::default())
            .is_err()
        );
    }
}

//! Hierarchical bind-parameter map and placeholder handling.
//!
//! Rendered SQL carries named placeholders of the form `#{cq.member_name.equal}`.
//! Names are dot-separated paths into a [`ParamMap`]; sub-statements and union
//! branches keep their own maps which the embedding statement nests under a
//! namespace (`sub1.exists_purchase_list1`, `union0`), rewriting the
//! placeholders of the embedded text to match.

use crate::value::BindValue;
use indexmap::IndexMap;

const OPEN: &str = "#{";
const CLOSE: char = '}';

/// Entry of a [`ParamMap`]: a bound value or a nested namespace.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamEntry {
    Value(BindValue),
    Nested(ParamMap),
}

/// Insertion-ordered, hierarchical parameter map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamMap {
    entries: IndexMap<String, ParamEntry>,
}

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `value` at a dotted `path`, creating intermediate namespaces.
    ///
    /// An existing value at the same path is replaced.
    pub fn insert(&mut self, path: &str, value: BindValue) {
        self.insert_entry(path, ParamEntry::Value(value));
    }

    /// Nest a whole map under a dotted `path`.
    pub fn insert_map(&mut self, path: &str, map: ParamMap) {
        self.insert_entry(path, ParamEntry::Nested(map));
    }

    fn insert_entry(&mut self, path: &str, entry: ParamEntry) {
        match path.split_once('.') {
            None => {
                self.entries.insert(path.to_string(), entry);
            }
            Some((head, rest)) => {
                let slot = self
                    .entries
                    .entry(head.to_string())
                    .or_insert_with(|| ParamEntry::Nested(ParamMap::new()));
                if let ParamEntry::Value(_) = slot {
                    *slot = ParamEntry::Nested(ParamMap::new());
                }
                if let ParamEntry::Nested(inner) = slot {
                    inner.insert_entry(rest, entry);
                }
            }
        }
    }

    fn entry(&self, path: &str) -> Option<&ParamEntry> {
        match path.split_once('.') {
            None => self.entries.get(path),
            Some((head, rest)) => match self.entries.get(head)? {
                ParamEntry::Nested(inner) => inner.entry(rest),
                ParamEntry::Value(_) => None,
            },
        }
    }

    /// Look up a bound value by dotted path.
    pub fn get(&self, path: &str) -> Option<&BindValue> {
        match self.entry(path)? {
            ParamEntry::Value(v) => Some(v),
            ParamEntry::Nested(_) => None,
        }
    }

    /// Look up a nested namespace by dotted path.
    pub fn get_map(&self, path: &str) -> Option<&ParamMap> {
        match self.entry(path)? {
            ParamEntry::Nested(m) => Some(m),
            ParamEntry::Value(_) => None,
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entry(path).is_some()
    }

    /// Remove the entry at `path`, returning it.
    pub fn remove(&mut self, path: &str) -> Option<ParamEntry> {
        match path.split_once('.') {
            None => self.entries.shift_remove(path),
            Some((head, rest)) => match self.entries.get_mut(head)? {
                ParamEntry::Nested(inner) => inner.remove(rest),
                ParamEntry::Value(_) => None,
            },
        }
    }

    /// Number of bound values, counting nested namespaces recursively.
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .map(|e| match e {
                ParamEntry::Value(_) => 1,
                ParamEntry::Nested(m) => m.len(),
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every bound value with its full dotted path, in insertion order.
    pub fn flatten(&self) -> Vec<(String, &BindValue)> {
        let mut out = Vec::new();
        self.flatten_into("", &mut out);
        out
    }

    fn flatten_into<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a BindValue)>) {
        for (key, entry) in &self.entries {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };
            match entry {
                ParamEntry::Value(v) => out.push((path, v)),
                ParamEntry::Nested(m) => m.flatten_into(&path, out),
            }
        }
    }

    /// JSON view of the map, for logging and debugging.
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        for (key, entry) in &self.entries {
            let v = match entry {
                ParamEntry::Value(v) => v.to_json(),
                ParamEntry::Nested(m) => m.to_json(),
            };
            obj.insert(key.clone(), v);
        }
        serde_json::Value::Object(obj)
    }
}

/// Placeholder text for a parameter path.
pub fn placeholder(path: &str) -> String {
    format!("{OPEN}{path}{CLOSE}")
}

/// A piece of SQL text produced by [`scan_placeholders`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Segment<'a> {
    Literal(&'a str),
    Param(&'a str),
}

/// Walk `text`, reporting literal SQL and placeholder names in order.
pub(crate) fn scan_placeholders<'a>(text: &'a str, mut on_segment: impl FnMut(Segment<'a>)) {
    let mut rest = text;
    while let Some(start) = rest.find(OPEN) {
        let after = &rest[start + OPEN.len()..];
        let Some(end) = after.find(CLOSE) else {
            break;
        };
        on_segment(Segment::Literal(&rest[..start]));
        on_segment(Segment::Param(&after[..end]));
        rest = &after[end + 1..];
    }
    on_segment(Segment::Literal(rest));
}

/// Names of all placeholders in `text`, in order of appearance.
pub fn placeholder_names(text: &str) -> Vec<String> {
    let mut names = Vec::new();
    scan_placeholders(text, |segment| {
        if let Segment::Param(name) = segment {
            names.push(name.to_string());
        }
    });
    names
}

/// Re-home every placeholder of an embedded fragment under `prefix`.
pub fn rewrite_placeholders(text: &str, prefix: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    scan_placeholders(text, |segment| match segment {
        Segment::Literal(lit) => out.push_str(lit),
        Segment::Param(name) => {
            out.push_str(OPEN);
            out.push_str(prefix);
            out.push('.');
            out.push_str(name);
            out.push(CLOSE);
        }
    });
    out
}

//! Table and relation metadata consumed by the engine.
//!
//! The engine never introspects a database; it asks a [`MetadataProvider`]
//! for columns, primary keys and relations. [`SchemaRegistry`] is the
//! in-memory provider most callers use.

use crate::error::{CbError, CbResult};
use crate::ident::SqlName;
use crate::value::ValueType;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Source of table metadata.
pub trait MetadataProvider: Send + Sync + fmt::Debug {
    /// Look up a table by name.
    fn table(&self, name: &str) -> Option<&TableInfo>;

    /// Look up a table, failing with a metadata error when it is unknown.
    fn require_table(&self, name: &str) -> CbResult<&TableInfo> {
        self.table(name)
            .ok_or_else(|| CbError::metadata(format!("unknown table '{name}'")))
    }
}

/// Shared handle to a metadata provider.
pub type MetaRef = Arc<dyn MetadataProvider>;

/// Column metadata.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    /// Column name as used in paths and parameter names.
    pub name: String,
    /// Rendered SQL name (quoted when needed).
    pub sql_name: String,
    pub value_type: ValueType,
    pub primary_key: bool,
    pub not_null: bool,
}

/// Join condition that is always part of a relation (e.g. "current address only").
///
/// The template refers to the relation's aliases with `{local}` and
/// `{foreign}` and to caller-supplied values with `{:name}`.
#[derive(Debug, Clone)]
pub struct FixedCondition {
    pub template: String,
    /// Render as an inline view (`JOIN (SELECT ... WHERE fixed) alias`) instead of in ON.
    pub inline: bool,
    dynamic_params: Vec<String>,
}

impl FixedCondition {
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        let dynamic_params = parse_dynamic_params(&template);
        Self {
            template,
            inline: false,
            dynamic_params,
        }
    }

    /// Mark the condition to be rendered as an inline view.
    pub fn inline(mut self) -> Self {
        self.inline = true;
        self
    }

    /// Names of the `{:name}` parameters the template needs.
    pub fn dynamic_params(&self) -> &[String] {
        &self.dynamic_params
    }

    /// Substitute aliases; dynamic parameters become named placeholders under `param_prefix`.
    pub fn render(&self, local: &str, foreign: &str, param_prefix: &str) -> String {
        let mut out = self
            .template
            .replace("{local}", local)
            .replace("{foreign}", foreign);
        for name in &self.dynamic_params {
            out = out.replace(
                &format!("{{:{name}}}"),
                &crate::param::placeholder(&format!("{param_prefix}.{name}")),
            );
        }
        out
    }
}

fn parse_dynamic_params(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("{:") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else { break };
        let name = after[..end].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
        rest = &after[end + 1..];
    }
    names
}

/// Many-to-one (or one-to-one) relation from a local table to a foreign table.
#[derive(Debug, Clone)]
pub struct ForeignInfo {
    pub property: String,
    pub foreign_table: String,
    /// (local column, foreign column)
    pub column_pairs: Vec<(String, String)>,
    pub fixed: Option<FixedCondition>,
    pub one_to_one: bool,
}

impl ForeignInfo {
    pub fn new(
        property: impl Into<String>,
        foreign_table: impl Into<String>,
        column_pairs: &[(&str, &str)],
    ) -> Self {
        Self {
            property: property.into(),
            foreign_table: foreign_table.into(),
            column_pairs: column_pairs
                .iter()
                .map(|(l, f)| (l.to_string(), f.to_string()))
                .collect(),
            fixed: None,
            one_to_one: false,
        }
    }

    pub fn with_fixed(mut self, fixed: FixedCondition) -> Self {
        self.fixed = Some(fixed);
        self
    }

    pub fn one_to_one(mut self) -> Self {
        self.one_to_one = true;
        self
    }
}

/// One-to-many relation from a local table to the tables referring to it.
#[derive(Debug, Clone)]
pub struct ReferrerInfo {
    pub property: String,
    pub referrer_table: String,
    /// (local column, referrer column)
    pub column_pairs: Vec<(String, String)>,
    /// Foreign property on the referrer table pointing back here.
    pub reverse_foreign: Option<String>,
}

impl ReferrerInfo {
    pub fn new(
        property: impl Into<String>,
        referrer_table: impl Into<String>,
        column_pairs: &[(&str, &str)],
    ) -> Self {
        Self {
            property: property.into(),
            referrer_table: referrer_table.into(),
            column_pairs: column_pairs
                .iter()
                .map(|(l, r)| (l.to_string(), r.to_string()))
                .collect(),
            reverse_foreign: None,
        }
    }

    pub fn with_reverse(mut self, foreign_property: impl Into<String>) -> Self {
        self.reverse_foreign = Some(foreign_property.into());
        self
    }
}

/// Virtual column that concatenates fixed-width physical columns.
#[derive(Debug, Clone)]
pub struct CompoundColumn {
    pub name: String,
    /// (physical column, width in characters)
    pub parts: Vec<(String, usize)>,
}

/// Table metadata.
#[derive(Debug, Clone)]
pub struct TableInfo {
    pub name: String,
    pub sql_name: String,
    columns: IndexMap<String, ColumnInfo>,
    foreigns: IndexMap<String, ForeignInfo>,
    referrers: IndexMap<String, ReferrerInfo>,
    compounds: IndexMap<String, CompoundColumn>,
}

impl TableInfo {
    /// Create a new table description. The name is validated on registration.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            sql_name: name.clone(),
            name,
            columns: IndexMap::new(),
            foreigns: IndexMap::new(),
            referrers: IndexMap::new(),
            compounds: IndexMap::new(),
        }
    }

    fn push_column(&mut self, name: &str, value_type: ValueType, primary_key: bool, not_null: bool) {
        self.columns.insert(
            name.to_string(),
            ColumnInfo {
                name: name.to_string(),
                sql_name: name.to_string(),
                value_type,
                primary_key,
                not_null: not_null || primary_key,
            },
        );
    }

    /// Add a nullable column.
    pub fn with_column(mut self, name: &str, value_type: ValueType) -> Self {
        self.push_column(name, value_type, false, false);
        self
    }

    /// Add a NOT NULL column.
    pub fn with_not_null_column(mut self, name: &str, value_type: ValueType) -> Self {
        self.push_column(name, value_type, false, true);
        self
    }

    /// Add a primary-key column (implies NOT NULL).
    pub fn with_primary_key(mut self, name: &str, value_type: ValueType) -> Self {
        self.push_column(name, value_type, true, true);
        self
    }

    pub fn with_foreign(mut self, foreign: ForeignInfo) -> Self {
        self.foreigns.insert(foreign.property.clone(), foreign);
        self
    }

    pub fn with_referrer(mut self, referrer: ReferrerInfo) -> Self {
        self.referrers.insert(referrer.property.clone(), referrer);
        self
    }

    pub fn with_compound(mut self, name: &str, parts: &[(&str, usize)]) -> Self {
        self.compounds.insert(
            name.to_string(),
            CompoundColumn {
                name: name.to_string(),
                parts: parts.iter().map(|(c, w)| (c.to_string(), *w)).collect(),
            },
        );
        self
    }

    pub fn columns(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns.values()
    }

    pub fn primary_keys(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns.values().filter(|c| c.primary_key)
    }

    pub fn find_column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.get(name)
    }

    pub fn column(&self, name: &str) -> CbResult<&ColumnInfo> {
        self.columns.get(name).ok_or_else(|| {
            CbError::metadata(format!("unknown column '{name}' on table '{}'", self.name))
        })
    }

    pub fn find_foreign(&self, property: &str) -> Option<&ForeignInfo> {
        self.foreigns.get(property)
    }

    pub fn foreign(&self, property: &str) -> CbResult<&ForeignInfo> {
        self.foreigns.get(property).ok_or_else(|| {
            CbError::metadata(format!(
                "unknown foreign relation '{property}' on table '{}'",
                self.name
            ))
        })
    }

    pub fn find_referrer(&self, property: &str) -> Option<&ReferrerInfo> {
        self.referrers.get(property)
    }

    pub fn referrer(&self, property: &str) -> CbResult<&ReferrerInfo> {
        self.referrers.get(property).ok_or_else(|| {
            CbError::metadata(format!(
                "unknown referrer relation '{property}' on table '{}'",
                self.name
            ))
        })
    }

    pub fn compound(&self, name: &str) -> Option<&CompoundColumn> {
        self.compounds.get(name)
    }

    /// Validate names and compute rendered SQL names.
    fn validate(&mut self) -> CbResult<()> {
        self.sql_name = SqlName::parse(&self.name)?.to_sql();
        for col in self.columns.values_mut() {
            col.sql_name = SqlName::parse_simple(&col.name)?.to_sql();
        }
        for foreign in self.foreigns.values() {
            if foreign.column_pairs.is_empty() {
                return Err(CbError::metadata(format!(
                    "foreign relation '{}' on '{}' has no column pairs",
                    foreign.property, self.name
                )));
            }
            for (local, _) in &foreign.column_pairs {
                self.column(local)?;
            }
        }
        for referrer in self.referrers.values() {
            for (local, _) in &referrer.column_pairs {
                self.column(local)?;
            }
        }
        for compound in self.compounds.values() {
            for (part, width) in &compound.parts {
                self.column(part)?;
                if *width == 0 {
                    return Err(CbError::metadata(format!(
                        "compound column '{}' has a zero-width part '{part}'",
                        compound.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// In-memory metadata provider.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    tables: IndexMap<String, TableInfo>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table, validating its names.
    pub fn register(&mut self, mut table: TableInfo) -> CbResult<()> {
        table.validate()?;
        self.tables.insert(table.name.clone(), table);
        Ok(())
    }

    /// Register a table (consuming version).
    pub fn with_table(mut self, table: TableInfo) -> CbResult<Self> {
        self.register(table)?;
        Ok(self)
    }

    /// Check that every relation points at a registered table and column.
    pub fn verify_relations(&self) -> CbResult<()> {
        for table in self.tables.values() {
            for foreign in table.foreigns.values() {
                let target = self.require_table(&foreign.foreign_table)?;
                for (_, col) in &foreign.column_pairs {
                    target.column(col)?;
                }
            }
            for referrer in table.referrers.values() {
                let target = self.require_table(&referrer.referrer_table)?;
                for (_, col) in &referrer.column_pairs {
                    target.column(col)?;
                }
                if let Some(reverse) = &referrer.reverse_foreign {
                    target.foreign(reverse)?;
                }
            }
        }
        Ok(())
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableInfo> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Wrap into a shared handle.
    pub fn into_ref(self) -> MetaRef {
        Arc::new(self)
    }
}

impl MetadataProvider for SchemaRegistry {
    fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_condition_dynamic_params() {
        let fixed = FixedCondition::new(
            "{foreign}.valid_begin_date <= {:target_date} AND {foreign}.valid_end_date >= {:target_date}",
        );
        assert_eq!(fixed.dynamic_params(), ["target_date".to_string()]);
        let rendered = fixed.render("t0", "t0r_1", "fixed.t0r_1");
        assert_eq!(
            rendered,
            "t0r_1.valid_begin_date <= #{fixed.t0r_1.target_date} AND t0r_1.valid_end_date >= #{fixed.t0r_1.target_date}"
        );
    }

    #[test]
    fn register_rejects_bad_names() {
        let mut reg = SchemaRegistry::new();
        let bad = TableInfo::new("member").with_column("member name", ValueType::Text);
        assert!(reg.register(bad).is_err());
    }

    #[test]
    fn register_rejects_foreign_on_unknown_column() {
        let mut reg = SchemaRegistry::new();
        let table = TableInfo::new("member")
            .with_primary_key("member_id", ValueType::Integer)
            .with_foreign(ForeignInfo::new("member_status", "member_status", &[("status", "code")]));
        assert!(reg.register(table).is_err());
    }

    #[test]
    fn primary_key_implies_not_null() {
        let table = TableInfo::new("member").with_primary_key("member_id", ValueType::Integer);
        let col = table.column("member_id").unwrap();
        assert!(col.primary_key && col.not_null);
    }
}

use super::QueryDescriptor;
use crate::clause::{NullsOrder, OrderEntry};
use crate::error::{CbError, CbResult};
use crate::manual_order::ManualOrder;
use crate::purpose::Operation;
use crate::relation::NodeId;

/// Ordering handle on one node.
///
/// `nulls_first`, `nulls_last` and `manual_order` modify the entry added
/// last through this handle.
#[derive(Debug)]
pub struct OrderByQuery<'a> {
    pub(crate) desc: &'a mut QueryDescriptor,
    pub(crate) node: NodeId,
    last: Option<usize>,
}

impl<'a> OrderByQuery<'a> {
    pub(crate) fn new(desc: &'a mut QueryDescriptor, node: NodeId) -> Self {
        Self {
            desc,
            node,
            last: None,
        }
    }

    /// Move to the foreign relation `property`, joining it on first use.
    pub fn relation(self, property: &str) -> CbResult<OrderByQuery<'a>> {
        self.desc.guard(Operation::OrderBy)?;
        let node = self.desc.ensure_relation(self.node, property)?;
        Ok(OrderByQuery {
            desc: self.desc,
            node,
            last: None,
        })
    }

    pub fn asc(&mut self, column: &str) -> CbResult<&mut Self> {
        self.push_column(column, true)
    }

    pub fn desc(&mut self, column: &str) -> CbResult<&mut Self> {
        self.push_column(column, false)
    }

    fn push_column(&mut self, column: &str, ascending: bool) -> CbResult<&mut Self> {
        self.desc.guard(Operation::OrderBy)?;
        let info = self.desc.table_info(self.node)?.column(column)?;
        let node = self.desc.graph.node(self.node);
        let qualified = format!("{}.{}", node.alias, info.sql_name);
        let output_name = if node.is_root() {
            info.sql_name.clone()
        } else {
            format!("{}{}", info.name, node.relation_path)
        };
        let entry = OrderEntry::new(qualified, output_name, node.alias.clone(), ascending);
        self.last = Some(self.desc.clause.add_order(entry));
        Ok(self)
    }

    /// Order by a specified derived referrer, by its select alias.
    pub fn derived_asc(&mut self, alias: &str) -> CbResult<&mut Self> {
        self.push_derived(alias, true)
    }

    pub fn derived_desc(&mut self, alias: &str) -> CbResult<&mut Self> {
        self.push_derived(alias, false)
    }

    fn push_derived(&mut self, alias: &str, ascending: bool) -> CbResult<&mut Self> {
        self.desc.guard(Operation::OrderBy)?;
        if !self.desc.derived_columns.iter().any(|d| d.alias == alias) {
            return Err(CbError::validation(format!(
                "no derived referrer is specified as '{alias}'"
            )));
        }
        let root_alias = self.desc.alias().to_string();
        let entry = OrderEntry::new(alias.to_string(), alias.to_string(), root_alias, ascending);
        self.last = Some(self.desc.clause.add_order(entry));
        Ok(self)
    }

    pub fn nulls_first(&mut self) -> CbResult<&mut Self> {
        self.set_nulls(NullsOrder::First)
    }

    pub fn nulls_last(&mut self) -> CbResult<&mut Self> {
        self.set_nulls(NullsOrder::Last)
    }

    fn set_nulls(&mut self, nulls: NullsOrder) -> CbResult<&mut Self> {
        self.last_entry()?.nulls = Some(nulls);
        Ok(self)
    }

    /// Order the last entry by a CASE expression.
    pub fn manual_order(&mut self, order: &ManualOrder) -> CbResult<&mut Self> {
        let index = self
            .last
            .ok_or_else(|| CbError::validation("manual order needs an order-by column first"))?;
        let dialect = self.desc.dialect();
        let bound = order.bind(dialect, &format!("order.o{index}"), &mut self.desc.params)?;
        self.last_entry()?.manual = Some(bound);
        Ok(self)
    }

    fn last_entry(&mut self) -> CbResult<&mut OrderEntry> {
        self.last
            .and_then(|index| self.desc.clause.order_mut(index))
            .ok_or_else(|| CbError::validation("no order-by column to modify"))
    }
}

use super::QueryDescriptor;
use super::column_query::ColumnTicket;
use crate::error::CbResult;
use crate::purpose::Operation;
use crate::relation::NodeId;

/// Column specification handle on one node.
///
/// Specifying any column of a node narrows its select list to the primary
/// key plus the specified columns.
#[derive(Debug)]
pub struct SpecifyQuery<'a> {
    pub(crate) desc: &'a mut QueryDescriptor,
    pub(crate) node: NodeId,
}

impl<'a> SpecifyQuery<'a> {
    pub(crate) fn new(desc: &'a mut QueryDescriptor, node: NodeId) -> Self {
        Self { desc, node }
    }

    /// Move to the foreign relation `property`, joining it on first use.
    pub fn relation(self, property: &str) -> CbResult<SpecifyQuery<'a>> {
        self.desc.guard(Operation::SpecifyRelation)?;
        let node = self.desc.ensure_relation(self.node, property)?;
        Ok(SpecifyQuery {
            desc: self.desc,
            node,
        })
    }

    /// Add `column` to the select list.
    pub fn column(&mut self, column: &str) -> CbResult<&mut Self> {
        let operation = if self.desc.specified_count() > 0 {
            Operation::SpecifyAnotherColumn
        } else {
            Operation::SpecifyColumn
        };
        self.desc.guard(operation)?;
        self.desc.apply_specify(self.node, column)?;
        self.desc.record_specify(self.node, column);
        Ok(self)
    }

    /// Ticket naming `column` of this node, for column comparisons and
    /// varying updates. Nothing is added to the select list.
    pub fn column_ticket(&mut self, column: &str) -> CbResult<ColumnTicket> {
        self.desc.guard(Operation::SpecifyColumn)?;
        let info = self.desc.table_info(self.node)?.column(column)?.clone();
        Ok(ColumnTicket::new(
            self.desc.graph.property_path(self.node).into_iter().map(str::to_string).collect(),
            self.desc.table().to_string(),
            info.name,
            info.value_type,
        ))
    }

    /// Whether anything has been specified on this descriptor.
    pub fn is_specified(&self) -> bool {
        self.desc.specified_count() > 0
    }
}

//! Union branches and their select synchronisation.
//!
//! A branch is a descriptor on the same table and level as its main query.
//! Its select list must line up with the main one column for column, so
//! every select-shaping declaration of the main query (setup-select and
//! column specification) is replayed onto each branch: the declarations that
//! exist when the branch is attached, and again at render time for those
//! made afterwards.

use crate::error::CbResult;
use crate::purpose::{Operation, Purpose};
use crate::query::{QueryDescriptor, SelectDeclaration};

#[derive(Debug)]
pub(crate) struct UnionBranch {
    pub descriptor: Box<QueryDescriptor>,
    /// `UNION ALL` rather than `UNION`.
    pub all: bool,
    /// Number of main-query declarations already replayed onto this branch.
    pub watermark: usize,
}

/// Replays main-query declarations onto union branches.
pub(crate) struct UnionSynchronizer<'a> {
    declarations: &'a [SelectDeclaration],
}

impl<'a> UnionSynchronizer<'a> {
    pub(crate) fn new(declarations: &'a [SelectDeclaration]) -> Self {
        Self { declarations }
    }

    /// Bring `branch` up to date; returns how many declarations were replayed.
    pub(crate) fn sync(&self, branch: &mut UnionBranch) -> CbResult<usize> {
        let pending = self.declarations.get(branch.watermark..).unwrap_or_default();
        for declaration in pending {
            replay(&mut branch.descriptor, declaration)?;
        }
        branch.watermark = self.declarations.len();
        Ok(pending.len())
    }
}

fn replay(branch: &mut QueryDescriptor, declaration: &SelectDeclaration) -> CbResult<()> {
    match declaration {
        SelectDeclaration::SetupSelect(path) => {
            branch.apply_setup_select(path)?;
        }
        SelectDeclaration::Specify { path, column } => {
            let node = branch.ensure_path(path)?;
            branch.apply_specify(node, column)?;
        }
    }
    Ok(())
}

impl QueryDescriptor {
    /// Add a `UNION` branch built by `build`.
    pub fn union<F>(&mut self, build: F) -> CbResult<&mut Self>
    where
        F: FnOnce(&mut QueryDescriptor) -> CbResult<()>,
    {
        self.add_union(false, build)
    }

    /// Add a `UNION ALL` branch built by `build`.
    pub fn union_all<F>(&mut self, build: F) -> CbResult<&mut Self>
    where
        F: FnOnce(&mut QueryDescriptor) -> CbResult<()>,
    {
        self.add_union(true, build)
    }

    fn add_union<F>(&mut self, all: bool, build: F) -> CbResult<&mut Self>
    where
        F: FnOnce(&mut QueryDescriptor) -> CbResult<()>,
    {
        self.guard(Operation::SetupSelect)?;
        let descriptor = self.spawn_child(Purpose::UnionQuery, self.table())?;
        let mut branch = UnionBranch {
            descriptor: Box::new(descriptor),
            all,
            watermark: 0,
        };
        UnionSynchronizer::new(&self.declarations).sync(&mut branch)?;
        build(&mut *branch.descriptor)?;
        tracing::debug!(
            target: crate::log::TARGET,
            table = %self.table(),
            index = self.unions.len(),
            all,
            "union branch attached"
        );
        self.unions.push(branch);
        Ok(self)
    }

    /// Replay declarations made since each branch was attached.
    pub(crate) fn sync_unions(&mut self) -> CbResult<()> {
        let synchronizer = UnionSynchronizer::new(&self.declarations);
        for branch in &mut self.unions {
            let replayed = synchronizer.sync(branch)?;
            if replayed > 0 {
                tracing::trace!(
                    target: crate::log::TARGET,
                    replayed,
                    "union branch select synchronised"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::CbError;
    use crate::meta::{ForeignInfo, SchemaRegistry, TableInfo};
    use crate::purpose::Purpose;
    use crate::query::QueryDescriptor;
    use crate::value::ValueType;

    fn member() -> QueryDescriptor {
        let meta = SchemaRegistry::new()
            .with_table(
                TableInfo::new("member")
                    .with_primary_key("member_id", ValueType::Integer)
                    .with_column("member_name", ValueType::Text)
                    .with_column("member_status_code", ValueType::Text)
                    .with_foreign(ForeignInfo::new(
                        "member_status",
                        "member_status",
                        &[("member_status_code", "member_status_code")],
                    )),
            )
            .unwrap()
            .with_table(
                TableInfo::new("member_status")
                    .with_primary_key("member_status_code", ValueType::Text)
                    .with_column("status_name", ValueType::Text),
            )
            .unwrap()
            .into_ref();
        QueryDescriptor::new(meta, "member").unwrap()
    }

    #[test]
    fn branch_select_follows_main_query() {
        let mut cb = member();
        cb.specify().column("member_name").unwrap();
        cb.query().equal("member_name", "Pixy").unwrap();
        cb.union(|u| {
            u.query().equal("member_status_code", "FML")?;
            Ok(())
        })
        .unwrap();
        // declared after the branch, replayed at render time
        cb.setup_select("member_status").unwrap();

        let statement = cb.to_statement().unwrap();
        assert_eq!(
            statement.sql(),
            "SELECT t0.member_id, t0.member_name, \
             t0r_0.member_status_code AS member_status_code_0, t0r_0.status_name AS status_name_0 \
             FROM member t0 LEFT JOIN member_status t0r_0 ON t0.member_status_code = t0r_0.member_status_code \
             WHERE t0.member_name = #{cq.member_name.equal} \
             UNION SELECT t0.member_id, t0.member_name, \
             t0r_0.member_status_code AS member_status_code_0, t0r_0.status_name AS status_name_0 \
             FROM member t0 LEFT JOIN member_status t0r_0 ON t0.member_status_code = t0r_0.member_status_code \
             WHERE t0.member_status_code = #{union0.cq.member_status_code.equal}"
        );
        assert_eq!(statement.to_positional().unwrap().values.len(), 2);
    }

    #[test]
    fn ordering_and_paging_wrap_the_union() {
        let mut cb = member();
        cb.union_all(|u| {
            u.query().equal("member_id", 1)?;
            Ok(())
        })
        .unwrap();
        cb.order_by().desc("member_id").unwrap();
        cb.paging(10, 2).unwrap();
        let sql = cb.to_statement().unwrap().sql().to_string();
        assert!(sql.starts_with("SELECT * FROM (SELECT t0.member_id"));
        assert!(sql.contains(" UNION ALL SELECT "));
        assert!(sql.ends_with(") t_union ORDER BY member_id DESC LIMIT 10 OFFSET 10"));

        let count = cb.to_count_statement().unwrap();
        assert!(count.sql().starts_with("SELECT COUNT(*) FROM (SELECT "));
        assert!(count.sql().ends_with(") t_union"));
    }

    #[test]
    fn branch_cannot_order_or_specify() {
        let mut cb = member();
        let err = cb
            .union(|u| {
                u.order_by().asc("member_id")?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(
            err,
            CbError::PurposeViolation { purpose: Purpose::UnionQuery, .. }
        ));
        let err = cb
            .union(|u| {
                u.specify().column("member_name")?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, CbError::PurposeViolation { .. }));
        assert_eq!(cb.union_count(), 0);
    }

    #[test]
    fn for_update_is_refused_over_union() {
        let mut cb = member();
        cb.union(|_| Ok(())).unwrap();
        cb.lock_for_update();
        assert!(matches!(
            cb.to_statement().unwrap_err(),
            CbError::UnsupportedCombination(_)
        ));
    }
}

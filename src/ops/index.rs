//! Index DDL.

use crate::db::{quote_ident, PgName};

use super::{PhysicalOp, Statement};

/// `CREATE [UNIQUE] INDEX`. The index lives in the table's schema; `columns`
/// are rendered expressions (quoted identifiers or compiled fragments).
#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndex {
    pub name: String,
    pub table: PgName,
    pub columns: Vec<String>,
    pub unique: bool,
    pub predicate: Option<String>,
}

impl CreateIndex {
    pub fn qualified_name(&self) -> PgName {
        self.table.with_name(self.name.clone())
    }
}

impl PhysicalOp for CreateIndex {
    fn statements(&self) -> Vec<Statement> {
        let unique = if self.unique { "UNIQUE " } else { "" };
        let mut sql = format!(
            "CREATE {}INDEX {} ON {} ({})",
            unique,
            quote_ident(&self.name),
            self.table,
            self.columns.join(", ")
        );
        if let Some(pred) = &self.predicate {
            sql.push_str(" WHERE ");
            sql.push_str(pred);
        }
        vec![Statement::new(sql)]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropIndex {
    pub name: PgName,
}

impl PhysicalOp for DropIndex {
    fn statements(&self) -> Vec<Statement> {
        vec![Statement::new(format!("DROP INDEX {}", self.name))]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenameIndex {
    pub name: PgName,
    pub new_name: String,
}

impl PhysicalOp for RenameIndex {
    fn statements(&self) -> Vec<Statement> {
        vec![Statement::new(format!(
            "ALTER INDEX {} RENAME TO {}",
            self.name,
            quote_ident(&self.new_name)
        ))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_unique_index() {
        let op = CreateIndex {
            name: "name_link_source_*1_link_mapping_idx".into(),
            table: PgName::new("sdm_app", "name_link"),
            columns: vec!["\"source_id\"".into(), "\"link_type_id\"".into()],
            unique: true,
            predicate: Some("(link_type_id = ANY (ARRAY[4, 9]))".into()),
        };
        assert_eq!(
            op.statements()[0].sql,
            "CREATE UNIQUE INDEX \"name_link_source_*1_link_mapping_idx\" ON \"sdm_app\".\"name_link\" \
             (\"source_id\", \"link_type_id\") WHERE (link_type_id = ANY (ARRAY[4, 9]))"
        );
        assert_eq!(op.qualified_name().schema, "sdm_app");
    }
}

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::ddl::DdlStatement;
use crate::descriptor::{CatalogObjectDescriptor, TableDescriptor};
use crate::error::CatalogError;
use crate::reader::{CatalogReader, SavepointOutcome};

/// In-memory `CatalogReader` for tests, grounded on the teacher's
/// `MemoryCasStore`-style fakes: a `Mutex<HashMap<...>>` standing in for a
/// live connection, plus a log of executed statements so tests can assert on
/// what the planner sent down.
#[derive(Default)]
pub struct InMemoryCatalog {
    objects: Mutex<HashMap<(String, String), CatalogObjectDescriptor>>,
    executed: Mutex<Vec<DdlStatement>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, descriptor: CatalogObjectDescriptor) {
        let key = (descriptor.schema.clone(), descriptor.name.clone());
        self.objects.lock().unwrap().insert(key, descriptor);
    }

    pub fn executed_statements(&self) -> Vec<DdlStatement> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl CatalogReader for InMemoryCatalog {
    async fn list_objects(
        &self,
        schema: &str,
    ) -> Result<Vec<CatalogObjectDescriptor>, CatalogError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .values()
            .filter(|o| o.schema == schema)
            .cloned()
            .collect())
    }

    async fn get_table_descriptor(
        &self,
        schema: &str,
        name: &str,
    ) -> Result<TableDescriptor, CatalogError> {
        let key = (schema.to_string(), name.to_string());
        self.objects
            .lock()
            .unwrap()
            .get(&key)
            .and_then(|o| o.table.clone())
            .ok_or_else(|| CatalogError::ObjectNotFound {
                schema: schema.to_string(),
                name: name.to_string(),
            })
    }

    async fn execute_in_savepoint(
        &self,
        statement: &DdlStatement,
    ) -> Result<SavepointOutcome, CatalogError> {
        self.executed.lock().unwrap().push(statement.clone());
        Ok(SavepointOutcome::Committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_type::ObjectType;
    use std::collections::BTreeSet;

    fn sample_table(schema: &str, name: &str) -> CatalogObjectDescriptor {
        CatalogObjectDescriptor {
            object_type: ObjectType::Table,
            schema: schema.to_string(),
            name: name.to_string(),
            raw_definition: format!("CREATE TABLE {name} (id int)"),
            dependencies: BTreeSet::new(),
            table: Some(TableDescriptor {
                schema: schema.to_string(),
                name: name.to_string(),
                columns: vec![],
                constraints: vec![],
                indexes: vec![],
            }),
        }
    }

    #[tokio::test]
    async fn list_objects_filters_by_schema() {
        let cat = InMemoryCatalog::new();
        cat.seed(sample_table("public", "users"));
        cat.seed(sample_table("reporting", "events"));

        let objs = cat.list_objects("public").await.unwrap();
        assert_eq!(objs.len(), 1);
        assert_eq!(objs[0].name, "users");
    }

    #[tokio::test]
    async fn get_table_descriptor_missing_errors() {
        let cat = InMemoryCatalog::new();
        let err = cat.get_table_descriptor("public", "ghost").await.unwrap_err();
        assert!(matches!(err, CatalogError::ObjectNotFound { .. }));
    }

    #[tokio::test]
    async fn execute_in_savepoint_records_statement() {
        let cat = InMemoryCatalog::new();
        let stmt = DdlStatement::new(
            crate::ddl::DdlKind::Create,
            "public.users",
            "CREATE TABLE users (id int)",
        );
        let outcome = cat.execute_in_savepoint(&stmt).await.unwrap();
        assert_eq!(outcome, SavepointOutcome::Committed);
        assert_eq!(cat.executed_statements(), vec![stmt]);
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::context::ImportContext;
use crate::error::MigrationError;
use crate::row::{Entity, Row};
use crate::schema::CurrentSchema;

/// Builds current-schema entities from one dump row.
///
/// A row may produce no entity (dropped), one, or several.
pub trait RowConstructor: Send + Sync {
    fn construct(&self, row: Row, ctx: &mut ImportContext<'_>)
        -> Result<Vec<Entity>, MigrationError>;
}

/// The loader's default constructor: the row already has its current
/// shape.
pub struct CurrentConstructor {
    schema: Arc<CurrentSchema>,
}

impl CurrentConstructor {
    pub fn new(schema: Arc<CurrentSchema>) -> Self {
        Self { schema }
    }
}

impl RowConstructor for CurrentConstructor {
    fn construct(
        &self,
        row: Row,
        ctx: &mut ImportContext<'_>,
    ) -> Result<Vec<Entity>, MigrationError> {
        Ok(vec![self.schema.instantiate(row, ctx)?])
    }
}

/// Copies the row into an entity of the same name.
struct PassThrough;

impl RowConstructor for PassThrough {
    fn construct(
        &self,
        row: Row,
        _ctx: &mut ImportContext<'_>,
    ) -> Result<Vec<Entity>, MigrationError> {
        Ok(vec![Entity::new(&row.kind, row.fields)])
    }
}

/// Explicit dispatch table from row kind to the active constructor.
///
/// Kinds without an entry are passed through unchanged.
///
/// # Example
///
/// ```
/// use noi_migrate::{ConstructorTable, MigrationEngine, SchemaVersion};
///
/// let engine = MigrationEngine::new(SchemaVersion::from_components(&[1, 0]));
/// let mut table = engine.default_constructors();
/// let overrides = engine.run(&SchemaVersion::from_components(&[1, 0])).unwrap();
/// assert!(overrides.is_empty());
/// table.merge(overrides);
/// ```
#[derive(Clone, Default)]
pub struct ConstructorTable {
    entries: BTreeMap<String, Arc<dyn RowConstructor>>,
}

impl ConstructorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor, returning the one it replaces.
    pub fn insert(
        &mut self,
        kind: &str,
        constructor: Arc<dyn RowConstructor>,
    ) -> Option<Arc<dyn RowConstructor>> {
        self.entries.insert(kind.to_string(), constructor)
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<dyn RowConstructor>> {
        self.entries.get(kind)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.entries.contains_key(kind)
    }

    /// Kinds with a registered constructor, in order.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply `overrides` on top of this table; overrides win.
    pub fn merge(&mut self, overrides: ConstructorTable) {
        self.entries.extend(overrides.entries);
    }

    /// Construct entities for `row` with the constructor registered for its
    /// kind.
    pub fn construct(
        &self,
        row: Row,
        ctx: &mut ImportContext<'_>,
    ) -> Result<Vec<Entity>, MigrationError> {
        match self.entries.get(row.kind.as_str()) {
            Some(constructor) => constructor.construct(row, ctx),
            None => PassThrough.construct(row, ctx),
        }
    }
}

impl core::fmt::Debug for ConstructorTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Lookups, MemoryPartners};
    use crate::row::Value;

    struct Fixed(&'static str);

    impl RowConstructor for Fixed {
        fn construct(
            &self,
            row: Row,
            _ctx: &mut ImportContext<'_>,
        ) -> Result<Vec<Entity>, MigrationError> {
            let mut entity = Entity::new(self.0, row.fields);
            entity.fields.insert("by".into(), Value::from(self.0));
            Ok(vec![entity])
        }
    }

    fn build(table: &ConstructorTable, row: Row) -> Vec<Entity> {
        let lookups = Lookups::default();
        let mut partners = MemoryPartners::new();
        let mut recovered = Vec::new();
        let mut ctx = ImportContext::new(&lookups, &mut partners, &mut recovered);
        table.construct(row, &mut ctx).unwrap()
    }

    #[test]
    fn insert_returns_replaced() {
        let mut table = ConstructorTable::new();
        assert!(table.insert("a.b", Arc::new(Fixed("first"))).is_none());
        assert!(table.insert("a.b", Arc::new(Fixed("second"))).is_some());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn overrides_win_on_merge() {
        let mut defaults = ConstructorTable::new();
        defaults.insert("a.b", Arc::new(Fixed("default")));
        defaults.insert("a.c", Arc::new(Fixed("default")));

        let mut overrides = ConstructorTable::new();
        overrides.insert("a.b", Arc::new(Fixed("override")));
        defaults.merge(overrides);

        let out = build(&defaults, Row::new("a.b").with("id", 1));
        assert_eq!(out[0].get("by"), Some(&Value::from("override")));
        let out = build(&defaults, Row::new("a.c").with("id", 1));
        assert_eq!(out[0].get("by"), Some(&Value::from("default")));
        assert_eq!(defaults.kinds().collect::<Vec<_>>(), vec!["a.b", "a.c"]);
    }

    #[test]
    fn unknown_kind_passes_through() {
        let out = build(&ConstructorTable::new(), Row::new("x.y").with("id", 2));
        assert_eq!(out, vec![Entity::new("x.y", Row::new("x.y").with("id", 2).fields)]);
    }
}

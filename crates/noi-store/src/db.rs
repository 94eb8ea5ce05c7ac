//! The dump loader.
//!
//! `ImportDb` wraps a storage backend with the migration engine of the
//! running schema. Importing a dump plans the migration path for the
//! dump's version, replays every row through the resulting constructor
//! table and stores the entities, all inside one transaction.
//!
//! # Example
//!
//! ```
//! use noi_migrate::{Dump, NoiConfig};
//! use noi_store::{ImportDb, MemoryStore};
//!
//! let dump = Dump::from_json_str(r#"{
//!     "version": "0.0.1",
//!     "rows": [{"kind": "tickets.interest", "fields": {"id": 5, "product_id": 7, "site_id": 3}}]
//! }"#).unwrap();
//!
//! let mut db = ImportDb::from_config(MemoryStore::new(), &NoiConfig::default()).unwrap();
//! let report = db.import(dump).unwrap();
//!
//! assert_eq!(report.written["topics.interest"], 1);
//! assert_eq!(report.recovered.len(), 1);
//! assert!(db.load("contacts.partner", 3).unwrap().is_some());
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use noi_migrate::{
    noi_engine, Dump, EnvelopeError, Entity, ImportContext, Lookups, MigrationEngine,
    MigrationError, NoiConfig, PartnerDirectory, SchemaVersion, UnresolvedReferenceRecovered,
    VersionedEnvelope,
};

use crate::traits::{StateStore, Transactional};

/// Error type for `ImportDb` operations.
#[derive(Debug, thiserror::Error)]
pub enum ImportError<E: fmt::Debug + fmt::Display> {
    /// Error from the underlying storage backend.
    #[error("store error: {0}")]
    Store(E),
    #[error(transparent)]
    Migration(MigrationError),
    #[error("envelope error: {0}")]
    Envelope(EnvelopeError),
    #[error("serialization error: {0}")]
    Serialize(String),
    #[error("deserialization error: {0}")]
    Deserialize(String),
    /// Only entities with an integer `id` can be stored.
    #[error("{model} entity has no integer id")]
    MissingId { model: String },
    #[error("no {model} #{id} is stored")]
    NotFound { model: String, id: i64 },
    /// Faculty parents loop back onto the faculty.
    #[error("faculty #{id} is its own ancestor")]
    FacultyCycle { id: i64 },
    /// A stored entity was written under another schema version.
    #[error("stored {model} #{key} was written under v{found}, running v{current}")]
    StaleEntity {
        model: String,
        key: String,
        found: SchemaVersion,
        current: SchemaVersion,
    },
}

impl<E: fmt::Debug + fmt::Display> From<E> for ImportError<E> {
    fn from(e: E) -> Self {
        Self::Store(e)
    }
}

/// Outcome of one import.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportReport {
    /// Version the dump was written under.
    pub source_version: SchemaVersion,
    /// Version the entities were stored under.
    pub target_version: SchemaVersion,
    /// Migration steps applied, as (from, to) pairs.
    pub steps: Vec<(SchemaVersion, SchemaVersion)>,
    pub rows_read: usize,
    /// Distinct entities stored per model, placeholders included.
    pub written: BTreeMap<String, usize>,
    /// Rows that produced no entity.
    pub dropped: usize,
    /// Placeholders created for missing references.
    pub recovered: Vec<UnresolvedReferenceRecovered>,
}

impl ImportReport {
    pub fn entities_written(&self) -> usize {
        self.written.values().sum()
    }
}

/// Loader with automatic migration of legacy dumps.
///
/// Wraps any transactional [`StateStore`]. Entities are serialized with
/// postcard, wrapped in a [`VersionedEnvelope`] carrying the running
/// schema version, and stored under `(model, id)`.
pub struct ImportDb<S: StateStore> {
    store: S,
    engine: MigrationEngine,
    lookups: Lookups,
}

impl<S: StateStore> ImportDb<S> {
    pub fn new(store: S, engine: MigrationEngine, lookups: Lookups) -> Self {
        Self {
            store,
            engine,
            lookups,
        }
    }

    /// A loader running the Noi chain for the configured site.
    pub fn from_config(store: S, config: &NoiConfig) -> Result<Self, MigrationError> {
        let engine = noi_engine(&config.site)?;
        Ok(Self::new(store, engine, Lookups::from_config(config)))
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn engine(&self) -> &MigrationEngine {
        &self.engine
    }

    pub fn lookups(&self) -> &Lookups {
        &self.lookups
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Store an entity under the running schema version.
    pub fn save(&mut self, entity: &Entity) -> Result<(), ImportError<S::Error>> {
        write_entity(&mut self.store, self.engine.current_version(), entity).map(|_| ())
    }

    /// Load one entity of `model` by id.
    pub fn load(&self, model: &str, id: i64) -> Result<Option<Entity>, ImportError<S::Error>> {
        self.load_key(model, &id.to_string())
    }

    fn load_key(&self, model: &str, key: &str) -> Result<Option<Entity>, ImportError<S::Error>> {
        let Some(bytes) = self.store.get(model, key).map_err(ImportError::Store)? else {
            return Ok(None);
        };
        let envelope = VersionedEnvelope::from_bytes(&bytes).map_err(ImportError::Envelope)?;
        if envelope.version != *self.engine.current_version() {
            return Err(ImportError::StaleEntity {
                model: model.to_string(),
                key: key.to_string(),
                found: envelope.version,
                current: self.engine.current_version().clone(),
            });
        }
        let entity: Entity = postcard::from_bytes(&envelope.payload)
            .map_err(|e| ImportError::Deserialize(e.to_string()))?;
        Ok(Some(entity))
    }

    /// All stored entities of `model`, ordered by id.
    pub fn entities(&self, model: &str) -> Result<Vec<Entity>, ImportError<S::Error>> {
        let mut entities = Vec::new();
        for key in self.store.list_keys(model).map_err(ImportError::Store)? {
            if let Some(entity) = self.load_key(model, &key)? {
                entities.push(entity);
            }
        }
        entities.sort_by_key(|e| e.id());
        Ok(entities)
    }

    /// Models with at least one stored entity.
    pub fn models(&self) -> Result<Vec<String>, ImportError<S::Error>> {
        self.store.list_namespaces().map_err(ImportError::Store)
    }
}

impl<S: Transactional> ImportDb<S> {
    /// Import a dump, migrating it to the running schema.
    ///
    /// Any error aborts the import and rolls back every entity written so
    /// far, placeholders included.
    pub fn import(&mut self, dump: Dump) -> Result<ImportReport, ImportError<S::Error>> {
        let steps = self
            .engine
            .plan(&dump.version)
            .map_err(ImportError::Migration)?
            .into_iter()
            .map(|s| (s.source_version(), s.target_version()))
            .collect();
        let mut table = self.engine.default_constructors();
        table.merge(self.engine.run(&dump.version).map_err(ImportError::Migration)?);

        let version = self.engine.current_version().clone();
        let lookups = &self.lookups;
        let mut report = ImportReport {
            source_version: dump.version,
            target_version: version.clone(),
            steps,
            rows_read: dump.rows.len(),
            written: BTreeMap::new(),
            dropped: 0,
            recovered: Vec::new(),
        };

        let mut stored: BTreeSet<(String, i64)> = BTreeSet::new();
        self.store.transaction(|store| {
            let mut partners = StorePartners::new(store, &lookups.site.partner_model, &version);
            for row in dump.rows {
                let kind = row.kind.clone();
                let entities = {
                    let mut ctx = ImportContext::new(lookups, &mut partners, &mut report.recovered);
                    table.construct(row, &mut ctx).map_err(ImportError::Migration)?
                };
                if entities.is_empty() {
                    tracing::debug!(kind = %kind, "row produced no entity");
                    report.dropped += 1;
                }
                for entity in &entities {
                    let id = write_entity(&mut *partners.store, &version, entity)?;
                    stored.insert((entity.model.clone(), id));
                }
            }
            Ok::<_, ImportError<S::Error>>(())
        })?;

        stored.extend(report.recovered.iter().map(|r| (r.model.clone(), r.id)));
        for (model, _) in stored {
            *report.written.entry(model).or_insert(0) += 1;
        }
        tracing::info!(
            from = %report.source_version,
            to = %report.target_version,
            rows = report.rows_read,
            entities = report.entities_written(),
            dropped = report.dropped,
            recovered = report.recovered.len(),
            "dump imported"
        );
        Ok(report)
    }
}

/// Store `entity` and return its id.
fn write_entity<S: StateStore>(
    store: &mut S,
    version: &SchemaVersion,
    entity: &Entity,
) -> Result<i64, ImportError<S::Error>> {
    let id = entity.id().ok_or_else(|| ImportError::MissingId {
        model: entity.model.clone(),
    })?;
    let bytes = encode(version, entity).map_err(ImportError::Serialize)?;
    store
        .put(&entity.model, &id.to_string(), &bytes)
        .map_err(ImportError::Store)?;
    Ok(id)
}

fn encode(version: &SchemaVersion, entity: &Entity) -> Result<Vec<u8>, String> {
    let payload = postcard::to_allocvec(entity).map_err(|e| e.to_string())?;
    VersionedEnvelope::new(version.clone(), payload)
        .to_bytes()
        .map_err(|e| e.to_string())
}

/// [`PartnerDirectory`] over the store being imported into.
pub struct StorePartners<'s, S: StateStore> {
    store: &'s mut S,
    model: String,
    version: SchemaVersion,
}

impl<'s, S: StateStore> StorePartners<'s, S> {
    pub fn new(store: &'s mut S, model: &str, version: &SchemaVersion) -> Self {
        Self {
            store,
            model: model.to_string(),
            version: version.clone(),
        }
    }
}

impl<S: StateStore> PartnerDirectory for StorePartners<'_, S> {
    fn contains(&self, id: i64) -> Result<bool, MigrationError> {
        self.store
            .exists(&self.model, &id.to_string())
            .map_err(|e| MigrationError::Lookup(e.to_string()))
    }

    fn insert(&mut self, partner: Entity) -> Result<(), MigrationError> {
        let id = partner
            .id()
            .ok_or_else(|| MigrationError::Lookup(format!("{} without id", self.model)))?;
        let bytes = encode(&self.version, &partner).map_err(MigrationError::Lookup)?;
        self.store
            .put(&self.model, &id.to_string(), &bytes)
            .map_err(|e| MigrationError::Lookup(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use noi_migrate::{Fields, Row, Value};

    fn db() -> ImportDb<MemoryStore> {
        ImportDb::from_config(MemoryStore::new(), &NoiConfig::default()).unwrap()
    }

    fn v(s: &str) -> SchemaVersion {
        SchemaVersion::parse(s).unwrap()
    }

    fn interest(id: i64, site_id: i64) -> Row {
        Row::new("tickets.interest")
            .with("id", id)
            .with("product_id", 7)
            .with("site_id", site_id)
    }

    #[test]
    fn save_and_load() {
        let mut db = db();
        let mut fields = Fields::new();
        fields.insert("id".into(), Value::Int(4));
        fields.insert("name".into(), Value::from("welket"));
        fields.insert("remark".into(), Value::from(""));
        let site = Entity::new("tickets.site", fields);

        db.save(&site).unwrap();

        assert_eq!(db.load("tickets.site", 4).unwrap(), Some(site));
        assert_eq!(db.load("tickets.site", 5).unwrap(), None);
    }

    #[test]
    fn entity_without_id_is_rejected() {
        let mut db = db();
        let err = db.save(&Entity::new("tickets.site", Fields::new())).unwrap_err();
        assert!(matches!(err, ImportError::MissingId { model } if model == "tickets.site"));
    }

    #[test]
    fn stored_bytes_carry_running_version() {
        let mut db = db();
        db.import(Dump::new(v("0.0.1"), vec![interest(1, 3)])).unwrap();

        let bytes = db.store().get("topics.interest", "1").unwrap().unwrap();
        assert!(VersionedEnvelope::is_versioned(&bytes));
        assert_eq!(VersionedEnvelope::peek_version(&bytes).unwrap(), v("2016.12.0"));
    }

    #[test]
    fn stale_entity_is_reported() {
        let mut db = db();
        let bytes = VersionedEnvelope::new(v("1.0.2"), Vec::new()).to_bytes().unwrap();
        db.store_mut().put("votes.vote", "1", &bytes).unwrap();

        let err = db.load("votes.vote", 1).unwrap_err();
        assert!(matches!(err, ImportError::StaleEntity { found, .. } if found == v("1.0.2")));
    }

    #[test]
    fn import_reports_counts() {
        let mut db = db();
        let rows = vec![
            interest(1, 3),
            interest(2, 3),
            Row::new("tickets.milestone").with("id", 1).with("label", "1.0"),
        ];

        let report = db.import(Dump::new(v("0.0.1"), rows)).unwrap();

        assert_eq!(report.rows_read, 3);
        assert_eq!(report.steps.len(), 5);
        assert_eq!(report.written["topics.interest"], 2);
        assert_eq!(report.written["contacts.partner"], 1);
        assert_eq!(report.written["deploy.milestone"], 1);
        assert_eq!(report.entities_written(), 4);
        assert_eq!(report.dropped, 0);
        assert_eq!(
            db.entities("topics.interest")
                .unwrap()
                .iter()
                .map(|e| e.id())
                .collect::<Vec<_>>(),
            vec![Some(1), Some(2)]
        );
    }

    #[test]
    fn placeholder_overwritten_by_dump_row_is_counted_once() {
        let mut db = db();
        let rows = vec![
            interest(1, 3),
            Row::new("contacts.partner").with("id", 3).with("name", "Rumma & Ko"),
        ];

        let report = db.import(Dump::new(v("0.0.1"), rows)).unwrap();

        assert_eq!(report.recovered.len(), 1);
        assert_eq!(report.written["contacts.partner"], 1);
        assert_eq!(report.entities_written(), 2);
        assert_eq!(report.entities_written(), db.store().state_count());
        let partner = db.load("contacts.partner", 3).unwrap().unwrap();
        assert_eq!(partner.get("name"), Some(&Value::from("Rumma & Ko")));
    }

    #[test]
    fn partner_without_id_is_not_stored() {
        let mut store = MemoryStore::new();
        let mut partners = StorePartners::new(&mut store, "contacts.partner", &v("2016.12.0"));

        let err = partners
            .insert(Entity::new("contacts.partner", Fields::new()))
            .unwrap_err();

        assert!(matches!(err, MigrationError::Lookup(_)));
        assert_eq!(store.state_count(), 0);
    }

    #[test]
    fn existing_partner_is_not_replaced() {
        let mut db = db();
        let mut fields = Fields::new();
        fields.insert("id".into(), Value::Int(3));
        fields.insert("name".into(), Value::from("Rumma & Ko"));
        db.save(&Entity::new("contacts.partner", fields)).unwrap();

        let report = db.import(Dump::new(v("0.0.1"), vec![interest(1, 3)])).unwrap();

        assert!(report.recovered.is_empty());
        let partner = db.load("contacts.partner", 3).unwrap().unwrap();
        assert_eq!(partner.get("name"), Some(&Value::from("Rumma & Ko")));
    }

    #[test]
    fn failed_import_rolls_back_placeholders() {
        let mut db = db();
        let bad_ticket = Row::new("tickets.ticket").with("id", 1);

        let err = db
            .import(Dump::new(v("0.0.1"), vec![interest(1, 3), bad_ticket]))
            .unwrap_err();

        assert!(matches!(err, ImportError::Migration(MigrationError::FieldShape { .. })));
        assert_eq!(db.store().state_count(), 0);
        assert!(db.load("contacts.partner", 3).unwrap().is_none());
    }

    #[test]
    fn future_dump_is_rejected_before_writing() {
        let mut db = db();
        let err = db
            .import(Dump::new(v("2017.1.0"), vec![interest(1, 3)]))
            .unwrap_err();
        assert!(matches!(
            err,
            ImportError::Migration(MigrationError::FutureVersion { .. })
        ));
        assert_eq!(db.store().state_count(), 0);
    }
}

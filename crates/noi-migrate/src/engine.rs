use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::config::SiteConfig;
use crate::constructor::{ConstructorTable, CurrentConstructor, RowConstructor};
use crate::context::ImportContext;
use crate::error::MigrationError;
use crate::row::{Entity, Row};
use crate::schema::CurrentSchema;
use crate::version::SchemaVersion;

/// Rewrites one row of a step's source version into rows of its target
/// version. Returning no rows drops the row.
pub type MigrateFn = fn(Row, &mut ImportContext<'_>) -> Result<Vec<Row>, MigrationError>;

/// The input shape a row migration accepts.
#[derive(Debug, Clone, Copy)]
pub enum Shape {
    /// Exactly these fields.
    Exact(&'static [&'static str]),
    /// Any fields; used by transitions that only move a row to another kind.
    Any,
}

/// How one step treats rows of one kind.
#[derive(Clone, Copy)]
pub struct RowMigration {
    pub kind: &'static str,
    pub shape: Shape,
    pub apply: MigrateFn,
}

impl RowMigration {
    pub fn exact(kind: &'static str, fields: &'static [&'static str], apply: MigrateFn) -> Self {
        Self {
            kind,
            shape: Shape::Exact(fields),
            apply,
        }
    }

    pub fn any(kind: &'static str, apply: MigrateFn) -> Self {
        Self {
            kind,
            shape: Shape::Any,
            apply,
        }
    }

    /// Check the row's shape and apply the migration.
    pub fn migrate(&self, row: Row, ctx: &mut ImportContext<'_>) -> Result<Vec<Row>, MigrationError> {
        if let Shape::Exact(fields) = self.shape {
            row.check_exact(fields.iter().copied())?;
        }
        (self.apply)(row, ctx)
    }
}

/// A single migration step that transforms rows from one schema version to
/// the next.
///
/// Steps form a linear chain, each declaring the version it upgrades from
/// and the version it upgrades to. Steps are stateless; everything they
/// consult arrives through the [`ImportContext`].
pub trait MigrationStep: Send + Sync {
    /// Source version.
    fn source_version(&self) -> SchemaVersion;
    /// Target version.
    fn target_version(&self) -> SchemaVersion;
    /// One-line description for listings.
    fn summary(&self) -> &str {
        ""
    }
    /// The row migrations this step installs for `site`.
    fn install(&self, site: &SiteConfig) -> Vec<RowMigration>;
}

struct InstalledStep {
    from: SchemaVersion,
    to: SchemaVersion,
    migrations: BTreeMap<&'static str, RowMigration>,
}

/// Runs a legacy row through every step of a migration path and then
/// through the current schema.
struct ChainConstructor {
    path: Arc<[InstalledStep]>,
    schema: Arc<CurrentSchema>,
}

impl RowConstructor for ChainConstructor {
    fn construct(
        &self,
        row: Row,
        ctx: &mut ImportContext<'_>,
    ) -> Result<Vec<Entity>, MigrationError> {
        let mut rows = vec![row];
        for step in self.path.iter() {
            let mut next = Vec::with_capacity(rows.len());
            for row in rows {
                match step.migrations.get(row.kind.as_str()) {
                    Some(migration) => {
                        let kind = row.kind.clone();
                        let out = migration.migrate(row, ctx)?;
                        if out.is_empty() {
                            tracing::debug!(
                                kind = %kind,
                                from = %step.from,
                                to = %step.to,
                                "row dropped by migration"
                            );
                        }
                        next.extend(out);
                    }
                    None => next.push(row),
                }
            }
            rows = next;
        }
        rows.into_iter()
            .map(|row| self.schema.instantiate(row, ctx))
            .collect()
    }
}

/// The migration engine that runs a chain of migration steps.
///
/// Steps are registered in any order and kept sorted by source version.
/// For a dump at version N the engine selects the steps N→…→current and
/// hands back constructors that apply them row by row.
///
/// # Example
///
/// ```
/// use noi_migrate::{
///     ImportContext, Lookups, MemoryPartners, MigrationEngine, MigrationError, MigrationStep,
///     Row, RowMigration, SchemaVersion, SiteConfig,
/// };
///
/// struct RenameColour;
///
/// fn rename(mut row: Row, _ctx: &mut ImportContext<'_>) -> Result<Vec<Row>, MigrationError> {
///     row.rename("colour", "color")?;
///     Ok(vec![row])
/// }
///
/// impl MigrationStep for RenameColour {
///     fn source_version(&self) -> SchemaVersion { SchemaVersion::from_components(&[1]) }
///     fn target_version(&self) -> SchemaVersion { SchemaVersion::from_components(&[2]) }
///     fn install(&self, _site: &SiteConfig) -> Vec<RowMigration> {
///         vec![RowMigration::exact("shop.item", &["id", "colour"], rename)]
///     }
/// }
///
/// let mut engine = MigrationEngine::new(SchemaVersion::from_components(&[2]));
/// engine.register(Box::new(RenameColour));
/// engine.validate_chain().unwrap();
///
/// let overrides = engine.run(&SchemaVersion::from_components(&[1])).unwrap();
/// let lookups = Lookups::default();
/// let mut partners = MemoryPartners::new();
/// let mut recovered = Vec::new();
/// let mut ctx = ImportContext::new(&lookups, &mut partners, &mut recovered);
///
/// let row = Row::new("shop.item").with("id", 1).with("colour", "red");
/// let entities = overrides.construct(row, &mut ctx).unwrap();
/// assert!(entities[0].get("color").is_some());
/// ```
pub struct MigrationEngine {
    current_version: SchemaVersion,
    site: SiteConfig,
    schema: Arc<CurrentSchema>,
    steps: Vec<Box<dyn MigrationStep>>,
}

impl fmt::Debug for MigrationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationEngine")
            .field("current_version", &self.current_version)
            .field("steps", &self.registered_steps())
            .finish_non_exhaustive()
    }
}

impl MigrationEngine {
    /// Create a new engine targeting `current_version`, with an empty
    /// current schema and a default site.
    pub fn new(current_version: SchemaVersion) -> Self {
        Self {
            current_version,
            site: SiteConfig::default(),
            schema: Arc::new(CurrentSchema::new()),
            steps: Vec::new(),
        }
    }

    /// Use `site` when installing row migrations.
    pub fn with_site(mut self, site: SiteConfig) -> Self {
        self.site = site;
        self
    }

    /// Use `schema` to build the final entities.
    pub fn with_schema(mut self, schema: CurrentSchema) -> Self {
        self.schema = Arc::new(schema);
        self
    }

    /// Register a migration step.
    pub fn register(&mut self, step: Box<dyn MigrationStep>) {
        self.steps.push(step);
        self.steps.sort_by_key(|s| s.source_version());
    }

    /// The current (target) schema version.
    pub fn current_version(&self) -> &SchemaVersion {
        &self.current_version
    }

    pub fn site(&self) -> &SiteConfig {
        &self.site
    }

    pub fn schema(&self) -> &CurrentSchema {
        &self.schema
    }

    /// Check if data at `data_version` needs migration.
    pub fn needs_migration(&self, data_version: &SchemaVersion) -> bool {
        *data_version != self.current_version
    }

    /// List all registered migration steps as (from, to) pairs.
    pub fn registered_steps(&self) -> Vec<(SchemaVersion, SchemaVersion)> {
        self.steps
            .iter()
            .map(|s| (s.source_version(), s.target_version()))
            .collect()
    }

    /// Registered steps with their summaries.
    pub fn steps(&self) -> impl Iterator<Item = &dyn MigrationStep> {
        self.steps.iter().map(|s| s.as_ref())
    }

    /// Registered steps that start below the current version. Steps of
    /// later releases are kept but never run.
    pub fn chain(&self) -> impl Iterator<Item = &dyn MigrationStep> {
        self.steps()
            .filter(move |s| s.source_version() < self.current_version)
    }

    /// Validate that the steps below the current version form one
    /// contiguous, strictly increasing chain ending at the current version.
    pub fn validate_chain(&self) -> Result<(), MigrationError> {
        if let Some(w) = self
            .steps
            .windows(2)
            .find(|w| w[0].source_version() == w[1].source_version())
        {
            return Err(MigrationError::DuplicateStep {
                from: w[0].source_version(),
            });
        }
        let sources: BTreeSet<SchemaVersion> = self.chain().map(|s| s.source_version()).collect();
        for step in self.chain() {
            let (from, to) = (step.source_version(), step.target_version());
            if to <= from {
                return Err(MigrationError::NonAdvancingStep { from, to });
            }
            if to > self.current_version {
                return Err(MigrationError::Overshoot {
                    to,
                    current: self.current_version.clone(),
                });
            }
            if to != self.current_version && !sources.contains(&to) {
                return Err(MigrationError::GapInChain { missing: to });
            }
        }
        Ok(())
    }

    /// The ordered steps that upgrade `from` to the current version.
    pub fn plan(&self, from: &SchemaVersion) -> Result<Vec<&dyn MigrationStep>, MigrationError> {
        if *from > self.current_version {
            return Err(MigrationError::FutureVersion {
                found: from.clone(),
                current: self.current_version.clone(),
            });
        }

        let mut path = Vec::new();
        let mut version = from.clone();
        while version < self.current_version {
            let step = self
                .steps
                .iter()
                .find(|s| s.source_version() == version)
                .ok_or_else(|| MigrationError::MigrationGap {
                    from: version.clone(),
                    current: self.current_version.clone(),
                })?;
            let to = step.target_version();
            if to <= version {
                return Err(MigrationError::NonAdvancingStep { from: version, to });
            }
            if to > self.current_version {
                return Err(MigrationError::Overshoot {
                    to,
                    current: self.current_version.clone(),
                });
            }
            path.push(step.as_ref());
            version = to;
        }
        Ok(path)
    }

    /// Constructor overrides for a dump written at `from`.
    ///
    /// Every row kind touched by a step on the path gets a constructor that
    /// runs the row through the whole path and then through the current
    /// schema. A dump that is already current yields no overrides.
    pub fn run(&self, from: &SchemaVersion) -> Result<ConstructorTable, MigrationError> {
        let path = self.plan(from)?;
        let mut table = ConstructorTable::new();
        if path.is_empty() {
            tracing::debug!(version = %from, "dump is current, nothing to migrate");
            return Ok(table);
        }

        let installed: Vec<InstalledStep> = path
            .iter()
            .map(|step| {
                let (from, to) = (step.source_version(), step.target_version());
                tracing::debug!(from = %from, to = %to, summary = step.summary(), "installing migration step");
                InstalledStep {
                    from,
                    to,
                    migrations: step
                        .install(&self.site)
                        .into_iter()
                        .map(|m| (m.kind, m))
                        .collect(),
                }
            })
            .collect();
        let kinds: BTreeSet<&'static str> = installed
            .iter()
            .flat_map(|s| s.migrations.keys().copied())
            .collect();

        let path: Arc<[InstalledStep]> = installed.into();
        for kind in kinds {
            table.insert(
                kind,
                Arc::new(ChainConstructor {
                    path: Arc::clone(&path),
                    schema: Arc::clone(&self.schema),
                }),
            );
        }
        tracing::info!(
            from = %from,
            to = %self.current_version,
            steps = path.len(),
            overrides = table.len(),
            "migration chain installed"
        );
        Ok(table)
    }

    /// The loader's default table: one current-shape constructor per
    /// declared model.
    pub fn default_constructors(&self) -> ConstructorTable {
        let mut table = ConstructorTable::new();
        for model in self.schema.models() {
            table.insert(
                model.model,
                Arc::new(CurrentConstructor::new(Arc::clone(&self.schema))),
            );
        }
        table
    }
}

//! # noi-migrate
//!
//! Versioned data migrations for Lino Noi dumps.
//!
//! A dump records the schema version it was written under. When that
//! version is older than the running schema, the engine selects the chain
//! of migration steps leading to the current version and hands the loader
//! one constructor per affected row kind. Each constructor upgrades a
//! legacy row through every step on the path and builds current-schema
//! entities from the result.
//!
//! ## How It Works
//!
//! 1. The loader reads the dump and its version token.
//! 2. [`MigrationEngine::run`] plans the path and returns a
//!    [`ConstructorTable`] of overrides.
//! 3. The overrides are merged over [`MigrationEngine::default_constructors`].
//! 4. Every row is replayed through the table with an [`ImportContext`]
//!    giving access to the site configuration and injected lookups.
//!
//! ## Key Concepts
//!
//! - **Linear chain**: steps run 0.0.1→0.0.2→…→current, never skipping.
//! - **Exact shapes**: a step rejects rows that do not carry exactly the
//!   fields it knows.
//! - **Recoverable references**: missing partners are created as
//!   placeholders and reported, never silently invented.

mod config;
mod constructor;
mod context;
pub mod dump;
mod engine;
mod envelope;
mod error;
mod row;
mod schema;
pub mod steps;
mod version;

pub use config::{default_choice_lists, ConfigError, NoiConfig, SiteConfig, TICKET_STATES};
pub use constructor::{ConstructorTable, CurrentConstructor, RowConstructor};
pub use context::{
    ChoiceLists, ChoiceResolver, Clock, ContentTypeRemapper, ContentTypeTable, FixedClock,
    ImportContext, Localizer, Lookups, MemoryPartners, PartnerDirectory, SiteLocalizer,
    SystemClock, UnresolvedReferenceRecovered,
};
pub use dump::{Dump, DumpError};
pub use engine::{MigrateFn, MigrationEngine, MigrationStep, RowMigration, Shape};
pub use envelope::{EnvelopeError, VersionedEnvelope, ENVELOPE_PREFIX_SIZE, MAGIC_BYTE};
pub use error::{MigrationError, ShapeProblem};
pub use row::{Choice, Entity, Fields, Row, Value};
pub use schema::{CurrentSchema, FieldDef, FieldKind, ModelSchema};
pub use steps::{noi_engine, noi_steps};
pub use version::SchemaVersion;

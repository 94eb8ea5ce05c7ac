//! # noi-store
//!
//! Entity storage and the dump loader for Lino Noi migrations.
//!
//! Provides a namespaced key-value storage abstraction and [`ImportDb`],
//! which imports legacy dumps through the migration chain of
//! [`noi-migrate`](noi_migrate) and stores the resulting entities.
//! Stored tickets, faculties and competences answer who may be assigned
//! to a ticket ([`ImportDb::assignable_workers`]).
//!
//! ## Quick Start
//!
//! ```
//! use noi_store::{MemoryStore, StateStore};
//!
//! let mut store = MemoryStore::new();
//! store.put("tickets.site", "1", b"hello").unwrap();
//! let data = store.get("tickets.site", "1").unwrap();
//! assert_eq!(data.as_deref(), Some(b"hello".as_slice()));
//! ```

mod db;
mod memory;
mod traits;
mod workers;

pub use db::{ImportDb, ImportError, ImportReport, StorePartners};
pub use memory::{MemoryError, MemoryStore};
pub use traits::*;
pub use workers::{is_workable, AssignableWorker, ACTIVE_STATES, MAX_WEIGHT};

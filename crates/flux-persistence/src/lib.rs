//! Row-level CRUD plus pessimistic locking for every entity the flux
//! workflow engine persists, generalized from
//! `durable::persistence::{store,memory,postgres}`'s single-aggregate
//! event store to the engine's full entity set.

mod entities;
mod error;
mod memory;
mod postgres;
mod store;

pub use entities::*;
pub use error::{EntityKind, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::{RowGuard, Store};

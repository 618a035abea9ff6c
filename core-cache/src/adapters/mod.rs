//! Database adapters implementing [`bridge_traits::database::DatabaseAdapter`].

pub mod sqlite_native;

pub use sqlite_native::SqliteAdapter;

// Postgres-backed signal storage
pub mod postgres;

pub use postgres::PostgresSignalStore;

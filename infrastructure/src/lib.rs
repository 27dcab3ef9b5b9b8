// Module declarations
pub mod connection;
pub mod persistence;

// Re-export the adapter surface
pub use connection::{ConnectionManager, ServiceCredentials, StoreConnection};
pub use persistence::DocumentStore;

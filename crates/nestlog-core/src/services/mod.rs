//! Shared services used by the sync engine and clients

mod store;

pub use store::LocalStore;

pub mod library;
pub mod state;
pub mod store;

pub mod fetchers;
pub mod models;
pub mod parsers;

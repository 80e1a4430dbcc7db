pub mod app;
pub mod config;
pub mod discovery;
pub mod download;
pub mod handlers;
pub mod main_axum;
pub mod models;
pub mod service;
pub mod utils;

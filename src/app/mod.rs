pub mod controller;
pub mod history;
pub mod persisted;
pub mod preload;
pub mod queue;
pub mod session;

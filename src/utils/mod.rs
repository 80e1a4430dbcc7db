pub mod errors;
pub mod log;
pub mod utils;

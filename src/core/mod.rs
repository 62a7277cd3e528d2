pub mod cache;
pub mod coerce;
pub mod constants;
pub mod error;
pub mod format;
pub mod paths;
pub mod record;
pub mod resolver;
pub mod sample;
pub mod store;
pub mod table;

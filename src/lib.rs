pub mod check;
pub mod config;
pub mod dates;
pub mod db;
pub mod lead;
pub mod queue;
pub mod tracking;
pub mod vehicle;

pub use config::Config;

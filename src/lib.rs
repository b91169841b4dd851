pub mod batch;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod loader;
pub mod model;
pub mod orchestrator;
pub mod outcome;
pub mod scanner;
pub mod session;
pub mod status;
pub mod surface;
pub mod util;

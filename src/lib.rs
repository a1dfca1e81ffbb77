pub mod cache;
pub mod cancel;
pub mod config;
pub mod error;
pub mod fixtures;
pub mod odds;
pub mod orchestrator;
pub mod outcome;
pub mod sampler;
pub mod scenario;
pub mod solver;
pub mod standings;
pub mod table;

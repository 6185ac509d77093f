pub mod ai;
pub mod config;
pub mod llm;
pub mod logging;
pub mod server;
pub mod utils;

pub mod agent;
pub mod config;
pub mod discovery;
pub mod logging;
pub mod relay;
pub mod runner;
pub mod state;
pub mod types;
pub mod util;

#[cfg(test)]
mod test_support;

//! Distributed Warp benchmarks.

mod runner;
mod template;

pub use runner::WarpRunner;
pub use template::{
    config_file, render, WarpPlan, WarpTarget, CLIENT_PORT, CONFIG_FILE_NAME, CONFIG_MAP_NAME, WARP_NAME,
};

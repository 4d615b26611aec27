pub mod config;
pub mod loan;

pub use config::{BackendConfig, Config};
pub use loan::*;

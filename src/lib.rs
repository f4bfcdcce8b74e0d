use shadow_rs::shadow;

shadow!(build);

pub mod backup;
pub mod cli;
pub mod client;
pub mod db;
pub mod error;
pub mod fetch;
pub mod history;
pub mod import;
pub mod models;
pub mod refresh;
pub mod util;

pub use error::{Error, Result};

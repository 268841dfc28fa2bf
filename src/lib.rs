pub mod bookmarks;
pub mod config;
pub mod error;
pub mod histogram;
pub mod index;
pub mod readers;
pub mod reference;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};

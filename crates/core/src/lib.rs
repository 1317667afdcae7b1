pub mod admins;
pub mod config;
pub mod error;
pub mod health;
pub mod location;
pub mod types;

pub use error::{Error, Result};

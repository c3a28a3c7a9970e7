// src/lib.rs

pub mod config;
pub mod error;
pub mod platforms;
pub mod services;

pub use config::Settings;
pub use error::Error;

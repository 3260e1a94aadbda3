pub mod channel;
pub mod client;
pub mod models;

pub use channel::ProgressChannel;
pub use client::{ApiClient, ApiError, Result};

pub mod contracts;
pub mod error;
pub mod jobs;
pub mod properties;
pub mod upload_worker;

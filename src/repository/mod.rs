pub mod errors;
pub mod media;
pub mod nats;
pub mod postgres;

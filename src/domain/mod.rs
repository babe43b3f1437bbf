// Domain layer - Core business entities
pub mod alert;
pub mod connection;
pub mod message;
pub mod motor;
pub mod telemetry;

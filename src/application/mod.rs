// Application layer - Use cases, state ownership and transport orchestration
pub mod alert_evaluator;
pub mod backoff;
pub mod connection_mode;
pub mod event_bus;
pub mod history_service;
pub mod monitor;
pub mod polling;
pub mod push_transport;
pub mod simulation;
pub mod state_store;
pub mod telemetry_repository;

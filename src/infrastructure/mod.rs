// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod credentials;
pub mod error;
pub mod history_cache;
pub mod http_repository;
pub mod ws_connector;

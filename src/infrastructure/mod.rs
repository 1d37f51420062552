// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod migrations;
pub mod sqlite_repository;

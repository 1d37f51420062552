// Application layer - Use cases and the seams they depend on
pub mod access_control;
pub mod error;
pub mod ingestion_service;
pub mod traffic_repository;

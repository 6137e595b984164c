//! API-compatible types: request bodies and response DTOs.

pub mod analytics;
pub mod audit;
pub mod auth;
pub mod credentials;
pub mod election;
pub mod results;
pub mod student;
pub mod vote;

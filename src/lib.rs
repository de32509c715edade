//! Camera Guard collector service
//!
//! This library implements the job-dispatch engine that polls a fleet of
//! network-attached cameras and sensors: a priority work queue, a
//! self-healing worker pool, the retry/classification policy for failed
//! checks, and the client for the external change-detection service.

pub mod app_state;
pub mod collectors;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

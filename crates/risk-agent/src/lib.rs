//! Risk scoring service: HTTP prediction API, health and metrics

pub mod api;
pub mod config;

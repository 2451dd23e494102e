// Library exports for Agora
// Integration tests drive the router and the stores through these modules

pub mod accounts;
pub mod auth;
pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod extractors;
pub mod feed;
pub mod media;
pub mod pagination;
pub mod reporting;
pub mod routes;
pub mod state;

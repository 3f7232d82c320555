//! Blogpress
//!
//! Blog content service with asynchronous PDF export. Request handlers
//! dispatch generation jobs over a Redis queue; worker processes render
//! posts to PDF and park the result in a short-lived, one-shot store.

pub mod app_state;
pub mod config;
pub mod db;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

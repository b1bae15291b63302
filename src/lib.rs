//! Two-tier image store: a hot object tier for live traffic and a cold
//! archive tier for long-term copies, plus on-demand resized renditions.

pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

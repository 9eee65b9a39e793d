pub mod annotate;
pub mod app;
pub mod auth;
pub mod classifier;
pub mod config;
pub mod db;
pub mod state;
pub mod storage;
pub mod uploads;

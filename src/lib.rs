pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod expenses;
pub mod rate_limit;
pub mod state;
pub mod storage;

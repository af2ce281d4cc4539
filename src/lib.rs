pub mod api;
pub mod battle;
pub mod config;
pub mod db;
pub mod error;
pub mod metrics;
pub mod monsters;
pub mod openrag;
pub mod vision;

pub mod bot;
pub mod chain;
pub mod config;
pub mod db;
pub mod error;
pub mod leaderboard;
pub mod models;
pub mod pipeline;
pub mod pricing;
pub mod utils;

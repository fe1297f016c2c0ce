pub mod app;
pub mod bot;
pub mod config;
pub mod error;
pub mod filter;
pub mod format;
pub mod models;
pub mod omdb;
pub mod pipeline;
pub mod telegram;
pub mod yts;

pub mod api;
pub mod collab;
pub mod config;
pub mod error;
pub mod judge;

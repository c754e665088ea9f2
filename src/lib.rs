pub mod api;
pub mod cache;
pub mod catalog;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod services;
pub mod store;

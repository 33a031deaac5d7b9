pub mod cli_client;
pub mod config;
pub mod controllers;
pub mod models;
pub mod runtime;
pub mod services;
pub mod utils;
pub mod views;

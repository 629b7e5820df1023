pub mod commands;
pub mod service;

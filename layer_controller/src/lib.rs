pub mod client;
pub mod communication;
pub mod config;
pub mod controller;
pub mod display;
pub mod logging;
pub mod models;
pub mod rig;

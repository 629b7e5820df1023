pub mod command_queue;
pub mod motor_controller;

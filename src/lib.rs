pub mod configuration;
pub mod controller;
pub mod data_capture;
pub mod error_handling;
pub mod storage;
pub mod web_interface;

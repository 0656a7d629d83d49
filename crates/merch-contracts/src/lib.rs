pub mod catalog;
pub mod config;
pub mod designs;
pub mod errors;
pub mod events;
pub mod storage;
pub mod tools;

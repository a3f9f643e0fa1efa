// src/lib.rs

pub mod app_state;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod service;
pub mod storage;

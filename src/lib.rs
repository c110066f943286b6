// src/lib.rs

//! Tremors: earthquake feed announcer library

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;

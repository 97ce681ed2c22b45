// src/handlers/mod.rs

pub mod lab;
pub mod results;
pub mod session;
pub mod student;

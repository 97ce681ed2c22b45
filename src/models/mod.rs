// src/models/mod.rs

pub mod attempt;
pub mod lab;
pub mod question;
pub mod result;
pub mod student;

// src/handlers/mod.rs

pub mod attempts;
pub mod auth;
pub mod chat;
pub mod chat_sessions;
pub mod exam_results;
pub mod exams;
pub mod profile;

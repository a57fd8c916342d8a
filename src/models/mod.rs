// src/models/mod.rs

pub mod chat_session;
pub mod exam;
pub mod exam_result;
pub mod user;

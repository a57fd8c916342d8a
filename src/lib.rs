// src/lib.rs

pub mod ai;
pub mod config;
pub mod db;
pub mod docs;
pub mod error;
pub mod exam_session;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod state;
pub mod utils;

pub use routes::create_router;

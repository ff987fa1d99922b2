//! Chatter - conversation client core
//!
//! Session handling, conversation state and the API gateway behind a chat
//! front end. The front end renders [`crate::core::ChatState`] snapshots and calls
//! into [`App`]; everything remote goes through an [`api::Gateway`].

pub mod api;
pub mod app;
pub mod config;
pub mod conversation;
pub mod core;
pub mod storage;

pub use app::App;
pub use config::Config;

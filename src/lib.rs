//! Chat operator: keeps web chat conversations answered, one at a time.

pub mod chatbot;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod error;
pub mod operator;
pub mod platform;
pub mod surface;

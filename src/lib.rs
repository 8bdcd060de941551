#![forbid(unsafe_code)]

pub mod batch;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod export;
pub mod json;
pub mod loader;
pub mod logging;
pub mod manifest;
pub mod model;
pub mod openai;
pub mod oracle;
pub mod retry;
pub mod session;
pub mod store;

#[cfg(test)]
mod testing;

//! Side-effecting modules: prompts, oracle transports, config and logs.

pub mod chat;
pub mod command;
pub mod config;
pub mod oracle;
pub mod process;
pub mod prompt;
pub mod turn_log;

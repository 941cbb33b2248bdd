// Library exports for ordertracker crate
// This allows tests and the CLI to use the modules

pub mod auth;
pub mod config;
pub mod email;
pub mod error;
pub mod gmail_client;
pub mod mailbox_dir;
pub mod normalizer;
pub mod records;

// Order field extraction (order ID, tracking, delivery date, status, seller)
pub mod extract;

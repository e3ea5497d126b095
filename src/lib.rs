//! Installs a Selenium Grid from the official container images behind an
//! nginx reverse proxy, with certificates from certbot.
//!
//! The only logic of its own is port allocation ([`core::allocator`]); the
//! rest renders configuration and drives external tools.

pub mod cli;
pub mod config;
pub mod core;
pub mod render;
pub mod tools;
pub mod utils;

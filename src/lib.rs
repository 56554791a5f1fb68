//! MedGuard: admin session client for the drug batch verification service

pub mod activity;
pub mod api;
pub mod config;
pub mod event;
pub mod ipc;
pub mod keepalive;
pub mod modal;
pub mod navigator;
pub mod scanner;
pub mod server;
pub mod session;
pub mod timer;
pub mod view;

pub use event::*;
pub use session::*;

pub mod bus;
pub mod clock;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod pidfile;
pub mod presentation;
pub mod process;
pub mod runtime;
pub mod supervisor;
pub mod system;

pub mod config;
pub mod deps;
pub mod errors;
pub mod home;
pub mod init;
pub mod logging;
pub mod registry;
pub mod resolver;
pub mod restart;
pub mod state;
pub mod ui;

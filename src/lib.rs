pub mod backup;
pub mod config;
pub mod domain;
pub mod hooks;
pub mod mail;
pub mod store;

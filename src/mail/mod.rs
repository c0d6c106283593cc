pub mod download;
pub mod query;
pub mod session;
pub mod transport;

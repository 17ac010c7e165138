pub mod config;
pub mod context;
pub mod device;
pub mod discover;
pub mod history;
pub mod library;
pub mod persist;
pub mod platform;
pub mod protocol;
pub mod search;
pub mod session;
pub mod song;

pub mod config;
pub mod dynamic_now;
pub mod fixtures;
pub mod flusher;
pub mod server;
pub mod state;
pub mod storage;
pub mod sync;
pub mod tasks;

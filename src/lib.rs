#![forbid(unsafe_code)]

pub mod config;
pub mod filter_api;
pub mod hashtag_follow;
pub mod memory_server;
pub mod mute_manager;

//! mass-compress - Background Video Compression Daemon
//!
//! A long-running daemon that accepts filesystem paths over a TCP control
//! channel, queues them and compresses each one sequentially with ffmpeg,
//! handling plain files, DVD folders and mountable disc images.

pub mod classify;
pub mod cli;
pub mod config;
pub mod control;
pub mod encoder;
pub mod error;
pub mod queue;
pub mod server;
pub mod worker;

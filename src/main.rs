use crate::cli::run;

pub mod backend;
pub mod cli;
pub mod config;
pub mod context;
pub mod domain;
pub mod download;
pub mod error;
pub mod ipc;
pub mod media;
pub mod metadata;
pub mod storage;

fn main() -> anyhow::Result<()> {
    run()
}

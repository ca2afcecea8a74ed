pub mod config;
pub mod daemon;
pub mod disks;
pub mod install;
pub mod notices;
pub mod watcher;

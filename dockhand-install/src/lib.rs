//! # dockhand-install
//!
//! The disk-image install pipeline: attach a `.dmg`, find the application
//! bundles on the mounted volumes, copy them into the applications
//! directory, and optionally detach and delete the source.
//!
//! Call [`pipeline::process_image`] for a full run; the smaller pieces
//! (`mount`, `scan`, `copy`, `disks`) are usable on their own. All external
//! commands go through [`exec::CommandRunner`].

pub mod copy;
pub mod disks;
pub mod error;
pub mod exec;
pub mod mount;
pub mod pipeline;
pub mod scan;
#[cfg(test)]
pub(crate) mod testing;

pub use error::InstallError;
pub use pipeline::{process_image, CleanupOutcome, CopyFailure, ImageReport, InstallContext};

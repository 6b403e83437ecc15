//! Subcommands of the `labcamctl` binary.

pub mod cmd_get;
pub mod cmd_info;
pub mod cmd_live;
pub mod cmd_sequence;
pub mod cmd_set;
pub mod cmd_settings;
pub mod common;
pub mod tiff_stack;

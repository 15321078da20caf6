//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Input error - invalid manifest, ignore path or option
pub const INPUT_ERROR: i32 = 2;

/// Reconcile error - at least one object reported an error diagnostic
pub const RECONCILE_ERROR: i32 = 3;

/// Cluster error - could not connect or talk to the API server
pub const CLUSTER_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Config error - invalid configuration file (following sysexits.h convention)
pub const CONFIG_ERROR: i32 = 78;

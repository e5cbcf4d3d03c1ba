//! Exit codes for the CLI.

/// Server ran and shut down cleanly
pub const SUCCESS: u8 = 0;

/// No arguments, unknown flags or an unusable flag value
pub const USAGE: u8 = 1;

/// TLS material could not be loaded or the listener could not be bound
pub const STARTUP_FAILED: u8 = 2;

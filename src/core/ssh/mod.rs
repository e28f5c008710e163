mod client;

pub use client::{CommandOutcome, SshClient, DEFAULT_COMMAND_TIMEOUT};

use miette::Diagnostic;
use thiserror::Error;

/// Runtime error type for command execution, zone/ZFS/network commands,
/// PTY sessions, VNC process supervision, and storage collection.
#[derive(Error, Debug, Diagnostic)]
pub enum RuntimeError {
    /// Zone not found
    #[error("Zone not found: {zone_name}")]
    #[diagnostic(
        code(zoneweaver::runtime::zone_not_found),
        help("Verify the zone name is correct. Use `zoneadm list -cp` to see available zones")
    )]
    ZoneNotFound {
        #[allow(unused)]
        zone_name: String,
    },

    /// Zone operation failed
    #[error("Zone operation failed for '{zone_name}': {message}")]
    #[diagnostic(
        code(zoneweaver::runtime::zone_operation_failed),
        help("Check zone state with `zoneadm list -p`. The zone may need to be in a different state for this operation")
    )]
    ZoneOperationFailed {
        #[allow(unused)]
        zone_name: String,
        #[allow(unused)]
        message: String,
    },

    /// Network error
    #[error("Network operation failed: {message}")]
    #[diagnostic(
        code(zoneweaver::runtime::network_error),
        help("Verify network interfaces exist with `dladm show-link`, and that ipf/ipnat rules parse cleanly")
    )]
    NetworkError {
        #[allow(unused)]
        message: String,
    },

    /// ZFS error
    #[error("ZFS operation failed: {message}")]
    #[diagnostic(
        code(zoneweaver::runtime::zfs_error),
        help("Verify the pool/dataset exists and there is sufficient free space")
    )]
    ZfsError {
        #[allow(unused)]
        message: String,
    },

    /// Command execution failed
    #[error("Command '{command}' failed with exit code {exit_code}")]
    #[diagnostic(code(zoneweaver::runtime::command_failed), help("stderr: {stderr}"))]
    CommandFailed {
        #[allow(unused)]
        command: String,
        #[allow(unused)]
        exit_code: i32,
        #[allow(unused)]
        stderr: String,
    },

    /// Command exceeded its deadline
    #[error("Command '{command}' timed out after {timeout_ms}ms")]
    #[diagnostic(
        code(zoneweaver::runtime::command_timeout),
        help("The process was sent SIGTERM and then SIGKILL. Increase timeout_ms if this is expected to run longer")
    )]
    CommandTimeout {
        #[allow(unused)]
        command: String,
        #[allow(unused)]
        timeout_ms: u64,
    },

    /// Output from an external command could not be parsed
    #[error("Failed to parse output of '{source_command}': {message}")]
    #[diagnostic(
        code(zoneweaver::runtime::parse_error),
        help("The command's output format may have changed, or the line is truncated")
    )]
    ParseError {
        #[allow(unused)]
        source_command: String,
        #[allow(unused)]
        message: String,
    },

    /// PTY session error
    #[error("PTY error for zone '{zone_name}': {message}")]
    #[diagnostic(
        code(zoneweaver::runtime::pty_error),
        help("Check that `zlogin -C` is reachable for this zone and that the zone is not already being consoled from elsewhere")
    )]
    PtyError {
        #[allow(unused)]
        zone_name: String,
        #[allow(unused)]
        message: String,
    },

    /// Recipe step failed or timed out
    #[error("Recipe step failed for zone '{zone_name}': {message}")]
    #[diagnostic(
        code(zoneweaver::runtime::recipe_error),
        help("Check the recipe's step sequence and prompt patterns against the zone's actual boot output")
    )]
    RecipeError {
        #[allow(unused)]
        zone_name: String,
        #[allow(unused)]
        message: String,
    },

    /// No free VNC port in the configured range
    #[error("No free VNC port in range [{low}, {high}]")]
    #[diagnostic(
        code(zoneweaver::runtime::vnc_ports_exhausted),
        help("Stop idle VNC sessions or widen the configured port range")
    )]
    VncPortsExhausted {
        #[allow(unused)]
        low: u16,
        #[allow(unused)]
        high: u16,
    },

    /// Process not found by pid or pattern
    #[error("Process not found: {what}")]
    #[diagnostic(
        code(zoneweaver::runtime::process_not_found),
        help("The process may have already exited")
    )]
    ProcessNotFound {
        #[allow(unused)]
        what: String,
    },

    /// Unsupported platform
    #[error("Operation not supported on this platform")]
    #[diagnostic(
        code(zoneweaver::runtime::unsupported_platform),
        help("This operation requires illumos. Use MockCommandRunner for testing on other platforms")
    )]
    UnsupportedPlatform,

    /// Core library error
    #[error(transparent)]
    #[diagnostic(transparent)]
    CoreError(#[from] zoneweaver_core::ZoneweaverError),

    /// Storage error
    #[error(transparent)]
    #[diagnostic(transparent)]
    StorageError(#[from] zoneweaver_storage::StorageError),

    /// I/O error
    #[error("I/O error: {message}")]
    #[diagnostic(code(zoneweaver::runtime::io_error), help("Check filesystem permissions"))]
    IoError {
        #[allow(unused)]
        message: String,
    },

    /// Internal error
    #[error("Internal runtime error: {message}")]
    #[diagnostic(
        code(zoneweaver::runtime::internal_error),
        help("This is likely a bug. Please report it with the full error details")
    )]
    InternalError {
        #[allow(unused)]
        message: String,
    },
}

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

impl RuntimeError {
    pub fn zone_not_found(zone_name: impl Into<String>) -> Self {
        Self::ZoneNotFound {
            zone_name: zone_name.into(),
        }
    }

    pub fn zone_operation_failed(zone_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ZoneOperationFailed {
            zone_name: zone_name.into(),
            message: message.into(),
        }
    }

    pub fn network_error(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    pub fn zfs_error(message: impl Into<String>) -> Self {
        Self::ZfsError {
            message: message.into(),
        }
    }

    pub fn command_failed(command: impl Into<String>, exit_code: i32, stderr: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            exit_code,
            stderr: stderr.into(),
        }
    }

    pub fn command_timeout(command: impl Into<String>, timeout_ms: u64) -> Self {
        Self::CommandTimeout {
            command: command.into(),
            timeout_ms,
        }
    }

    pub fn parse_error(source_command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseError {
            source_command: source_command.into(),
            message: message.into(),
        }
    }

    pub fn pty_error(zone_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PtyError {
            zone_name: zone_name.into(),
            message: message.into(),
        }
    }

    pub fn recipe_error(zone_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RecipeError {
            zone_name: zone_name.into(),
            message: message.into(),
        }
    }

    pub fn vnc_ports_exhausted(low: u16, high: u16) -> Self {
        Self::VncPortsExhausted { low, high }
    }

    pub fn process_not_found(what: impl Into<String>) -> Self {
        Self::ProcessNotFound { what: what.into() }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for RuntimeError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError { message: err.to_string() }
    }
}

//! Process exit codes for the isoforge CLI.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Pipeline completed (fully or partially succeeded) |
//! | 1 | `TOOL_MISSING` | A required external tool could not be located |
//! | 2 | `FATAL` | Fatal phase failure, corrupt checkpoint, or unmet privilege requirement |
//! | 3 | `INTERRUPTED` | Run cancelled by an external interrupt; checkpoint preserved |
//!
//! The numeric values are part of the public CLI contract: wrapper scripts
//! dispatch on them to distinguish "install the missing tool and rerun" from
//! "inspect the log and resume".

use crate::error::IsoforgeError;

/// Exit codes matching the documented table above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Pipeline completed; partially-succeeded phases still count as success.
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// A required external tool was not found in any known install location.
    pub const TOOL_MISSING: ExitCode = ExitCode(1);

    /// Fatal failure: a required work item failed, the checkpoint store is
    /// corrupt, or a privilege requirement is unmet.
    pub const FATAL: ExitCode = ExitCode(2);

    /// The run was interrupted; resuming is not a post-failure retry.
    pub const INTERRUPTED: ExitCode = ExitCode(3);

    /// Get the numeric exit code value for `std::process::exit()`.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Create an `ExitCode` from a raw value. Prefer the named constants.
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}

/// Map an error to its process exit code.
#[must_use]
pub fn error_to_exit_code(error: &IsoforgeError) -> ExitCode {
    match error {
        IsoforgeError::Tool(tool_err) => {
            use crate::error::ToolError;
            match tool_err {
                ToolError::NotFound { .. } => ExitCode::TOOL_MISSING,
                ToolError::PermissionDenied { .. } => ExitCode::FATAL,
            }
        }
        IsoforgeError::Interrupted => ExitCode::INTERRUPTED,
        // Config, checkpoint, runner, phase, lock and io errors are all fatal
        // preconditions or fatal failures.
        _ => ExitCode::FATAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CheckpointError, ToolError};

    #[test]
    fn table_values_are_stable() {
        assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
        assert_eq!(ExitCode::TOOL_MISSING.as_i32(), 1);
        assert_eq!(ExitCode::FATAL.as_i32(), 2);
        assert_eq!(ExitCode::INTERRUPTED.as_i32(), 3);
    }

    #[test]
    fn missing_tool_maps_to_one() {
        let err = IsoforgeError::Tool(ToolError::NotFound {
            tool: "mksquashfs".to_string(),
            attempted: vec![],
            hint: String::new(),
        });
        assert_eq!(error_to_exit_code(&err), ExitCode::TOOL_MISSING);
    }

    #[test]
    fn permission_denied_is_fatal_not_tool_missing() {
        let err = IsoforgeError::Tool(ToolError::PermissionDenied {
            detail: "pipeline requires root".to_string(),
        });
        assert_eq!(error_to_exit_code(&err), ExitCode::FATAL);
    }

    #[test]
    fn corrupt_checkpoint_maps_to_fatal() {
        let err = IsoforgeError::Checkpoint(CheckpointError::Corrupt {
            path: "x".to_string(),
            reason: "y".to_string(),
        });
        assert_eq!(error_to_exit_code(&err), ExitCode::FATAL);
    }

    #[test]
    fn interrupt_maps_to_three() {
        assert_eq!(
            error_to_exit_code(&IsoforgeError::Interrupted),
            ExitCode::INTERRUPTED
        );
    }
}

// crates/acc-cli/src/container.rs
// ============================================================================
// Module: Container Runtime Invocation
// Description: Spawns the configured container tool after a gate approval.
// Purpose: Keep operational runtime failures separate from trust verdicts.
// Dependencies: acc-core, thiserror
// ============================================================================

//! ## Overview
//! Runs `<tool> run <image> [args...]` or `<tool> push <image>` with inherited
//! stdio. Every failure here happens after the gate allowed the action and is
//! reported as an operational error, never as a trust denial.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::process::Command;

use acc_core::GateAction;
use acc_core::ImageRef;
use acc_core::runtime::resolver::find_in_path;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Container runtime failures.
#[derive(Debug, Error)]
pub(crate) enum RuntimeError {
    /// The tool is not installed.
    #[error("container tool `{0}` not found on PATH")]
    Missing(String),
    /// The tool could not be started.
    #[error("failed to start `{tool}`: {message}")]
    Spawn {
        /// Tool name.
        tool: String,
        /// Spawn error.
        message: String,
    },
    /// The tool exited unsuccessfully.
    #[error("`{tool}` exited with {status}")]
    Exit {
        /// Tool name.
        tool: String,
        /// Exit status rendering.
        status: String,
    },
}

// ============================================================================
// SECTION: Invocation
// ============================================================================

/// Runs the container tool for an approved action.
pub(crate) fn invoke(
    tool: &str,
    action: GateAction,
    image_ref: &ImageRef,
    extra: &[String],
) -> Result<(), RuntimeError> {
    let program = find_in_path(tool).ok_or_else(|| RuntimeError::Missing(tool.to_string()))?;
    let mut command = Command::new(program);
    command.arg(action.as_str()).arg(image_ref.as_str());
    if action == GateAction::Run {
        command.args(extra);
    }
    let status = command.status().map_err(|err| RuntimeError::Spawn {
        tool: tool.to_string(),
        message: err.to_string(),
    })?;
    if status.success() {
        Ok(())
    } else {
        Err(RuntimeError::Exit {
            tool: tool.to_string(),
            status: status.to_string(),
        })
    }
}

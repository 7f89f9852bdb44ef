// src/command/model.rs

use serde::{Deserialize, Serialize};

use crate::types::{CommandStatus, ToolKind, ToolOutput};

/// An intended invocation of the external conversion tool, recorded during
/// the scripting phase and run later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub id: u64,
    pub command: ToolKind,
    pub args: Vec<String>,
    /// Best-effort hint, for diagnostics only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_path: Option<String>,
    /// Best-effort hint, for diagnostics only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    pub status: CommandStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Command {
    pub fn new(id: u64, command: ToolKind, args: Vec<String>) -> Self {
        let hints = PathHints::from_args(&args);
        Self {
            id,
            command,
            args,
            input_path: hints.input,
            output_path: hints.output,
            status: CommandStatus::Pending,
            result: None,
            error: None,
        }
    }
}

/// Input/output paths guessed from an argument vector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathHints {
    pub input: Option<String>,
    pub output: Option<String>,
}

impl PathHints {
    /// Scan left to right; later matches win.
    ///
    /// - the value after `-i` is an input;
    /// - a final argument that is not a flag is the output;
    /// - a non-flag value right after `-y` is the output.
    pub fn from_args(args: &[String]) -> Self {
        let mut hints = PathHints::default();
        let last = args.len().saturating_sub(1);

        for (i, arg) in args.iter().enumerate() {
            let next = args.get(i + 1);
            if arg == "-i" {
                if let Some(next) = next {
                    hints.input = Some(next.clone());
                }
            }
            if i == last && !arg.starts_with('-') {
                hints.output = Some(arg.clone());
            }
            if arg == "-y" {
                if let Some(next) = next.filter(|n| !n.starts_with('-')) {
                    hints.output = Some(next.clone());
                }
            }
        }

        hints
    }
}

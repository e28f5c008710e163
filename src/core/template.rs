use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Exit code recorded for commands that never ran because an earlier
/// command failed or the run was cancelled.
pub const EXIT_NOT_EXECUTED: i32 = -1;

/// Exit code recorded when a command was killed by its per-command timeout.
pub const EXIT_TIMEOUT: i32 = 124;

/// Operational intent of a run. Selects which template list within an
/// application definition is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Installation,
    Backup,
    Restore,
    Uninstall,
    Update,
    Upgrade,
}

impl TaskType {
    pub const ALL: [TaskType; 6] = [
        TaskType::Installation,
        TaskType::Backup,
        TaskType::Restore,
        TaskType::Uninstall,
        TaskType::Update,
        TaskType::Upgrade,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Installation => "installation",
            TaskType::Backup => "backup",
            TaskType::Restore => "restore",
            TaskType::Uninstall => "uninstall",
            TaskType::Update => "update",
            TaskType::Upgrade => "upgrade",
        }
    }

    pub fn parse(s: &str) -> Result<TaskType> {
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                Error::validation_invalid_argument(
                    "task",
                    format!("Unknown task type '{}'", s),
                    None,
                    Some(TaskType::ALL.iter().map(|t| t.as_str().to_string()).collect()),
                )
            })
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a command executes: on the Proxmox host itself, or inside an
/// LXC container on that host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecuteOn {
    Proxmox,
    Lxc,
}

impl std::fmt::Display for ExecuteOn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecuteOn::Proxmox => f.write_str("proxmox"),
            ExecuteOn::Lxc => f.write_str("lxc"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    Command,
    Script,
    Template,
}

/// One step of a template pipeline.
///
/// For `type: command` the `execute` field is the command text; for
/// `type: script` it names a script file (inlined by the application
/// store at load time); for `type: template` it names a nested template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    #[serde(rename = "type")]
    pub command_type: CommandType,
    pub name: String,
    pub execute: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execute_on: Option<ExecuteOn>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    Enum,
    String,
    Number,
    Boolean,
}

impl ParameterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterType::Enum => "enum",
            ParameterType::String => "string",
            ParameterType::Number => "number",
            ParameterType::Boolean => "boolean",
        }
    }
}

/// Declaration of a template parameter.
///
/// A declaration carrying a `template` sub-expression derives its value
/// from earlier-resolved parameters instead of caller input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub parameter_type: ParameterType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(default)]
    pub secure: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

/// What the pipeline does after a command exits non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    #[default]
    Abort,
    Continue,
}

/// Immutable template definition: ordered commands plus typed parameter
/// declarations. Loaded once per run, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub execute_on: ExecuteOn,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,
    pub commands: Vec<CommandSpec>,
    #[serde(default, skip_serializing_if = "is_default_policy")]
    pub on_failure: FailurePolicy,
}

fn is_default_policy(p: &FailurePolicy) -> bool {
    *p == FailurePolicy::Abort
}

/// Result of attempting (or skipping) one command. Append-only, ordered
/// by `index`, immutable once emitted.
///
/// The `command` field always carries the redacted rendering; secure
/// parameter values never appear here in plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub command: String,
    pub stderr: String,
    pub result: Option<String>,
    pub exit_code: i32,
    pub execute_on: ExecuteOn,
    pub index: usize,
}

impl ExecutionRecord {
    /// Record for a command that never started.
    pub fn skipped(command: &CommandSpec, execute_on: ExecuteOn, index: usize) -> Self {
        Self {
            command: command.name.clone(),
            stderr: String::new(),
            result: None,
            exit_code: EXIT_NOT_EXECUTED,
            execute_on,
            index,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

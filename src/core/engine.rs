//! Pipeline runner: drives one template through render → execute → publish.
//!
//! A [`TaskRun`] is single-use. It owns its resolved parameters and output
//! map for the duration of one run; re-running a template means building a
//! fresh `TaskRun`. Commands execute strictly in index order, one at a time,
//! because later commands may depend on state left behind by earlier ones.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::params::{self, ResolvedParams};
use crate::render::{self, RenderedCommand};
use crate::sink::ProgressSink;
use crate::ssh::{CommandOutcome, SshClient, DEFAULT_COMMAND_TIMEOUT};
use crate::target::Target;
use crate::template::{
    ExecutionRecord, FailurePolicy, Template, EXIT_NOT_EXECUTED, EXIT_TIMEOUT,
};

/// Runs one rendered command against a target.
///
/// The pipeline only needs this seam; [`SshClient`] is the production
/// implementation, tests substitute their own.
pub trait CommandExecutor {
    fn execute(&self, command: &RenderedCommand) -> Result<CommandOutcome>;

    /// The per-command timeout the executor enforces, for error reporting.
    fn command_timeout(&self) -> Duration {
        DEFAULT_COMMAND_TIMEOUT
    }
}

impl CommandExecutor for SshClient {
    fn execute(&self, command: &RenderedCommand) -> Result<CommandOutcome> {
        SshClient::execute(self, command)
    }

    fn command_timeout(&self) -> Duration {
        self.timeout()
    }
}

/// Cooperative cancellation flag, checked between commands and never
/// mid-command: an in-flight remote command is drained, not interrupted.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Aborted,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Pending => "pending",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Aborted => "aborted",
            RunState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Aborted | RunState::Failed
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable summary of the infrastructure failure that ended a run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFailure {
    pub code: String,
    pub message: String,
    pub details: Value,
}

impl From<&Error> for RunFailure {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code.as_str().to_string(),
            message: err.message.clone(),
            details: err.details.clone(),
        }
    }
}

/// Final account of one run: terminal state plus an index-complete record
/// list. N commands always yield N records, whatever the outcome.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub id: Uuid,
    pub template: String,
    pub state: RunState,
    pub records: Vec<ExecutionRecord>,
    pub outputs: HashMap<String, String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
}

pub struct TaskRun {
    id: Uuid,
    template: Template,
    supplied: HashMap<String, String>,
    target: Target,
    cancel: CancelToken,
}

impl TaskRun {
    pub fn new(template: Template, supplied: HashMap<String, String>, target: Target) -> Self {
        Self {
            id: Uuid::new_v4(),
            template,
            supplied,
            target,
            cancel: CancelToken::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Handle for cancelling this run from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Pre-run checks: every command's placement must be reachable on the
    /// target, and every placeholder must name a resolved parameter or a
    /// declared output. Failing here means zero records are ever emitted.
    fn validate(&self, resolved: &ResolvedParams) -> Result<()> {
        for command in &self.template.commands {
            let execute_on = command.execute_on.unwrap_or(self.template.execute_on);
            if !self.target.reaches(execute_on) {
                return Err(Error::target_invalid(format!(
                    "command '{}' targets {} but target {} has no container",
                    command.name, execute_on, self.target
                )));
            }
            for token in render::placeholder_tokens(&command.execute) {
                let known =
                    resolved.contains(&token) || self.template.outputs.iter().any(|o| *o == token);
                if !known {
                    return Err(Error::render_unknown_reference(&command.name, &token));
                }
            }
        }
        Ok(())
    }

    /// Render every command with redaction applied, without executing.
    /// Declared outputs are stood in for by `<name>` markers since their
    /// real values only exist at run time.
    pub fn preview(&self) -> Result<Vec<ExecutionRecord>> {
        let resolved = params::resolve(&self.template.parameters, &self.supplied)?;
        self.validate(&resolved)?;

        let mut outputs = HashMap::new();
        for name in &self.template.outputs {
            outputs.insert(name.clone(), format!("<{}>", name));
        }

        let mut records = Vec::with_capacity(self.template.commands.len());
        for (index, command) in self.template.commands.iter().enumerate() {
            let rendered = render::render(command, &resolved, &outputs, self.template.execute_on)?;
            records.push(ExecutionRecord {
                command: rendered.display,
                stderr: String::new(),
                result: None,
                exit_code: EXIT_NOT_EXECUTED,
                execute_on: rendered.execute_on,
                index,
            });
        }
        Ok(records)
    }

    /// Drive the run to a terminal state.
    ///
    /// Parameter or validation failure returns `Err` with zero records
    /// published. Once the first command starts, every outcome (success,
    /// abort, infrastructure failure, cancellation) returns `Ok` with an
    /// index-complete report; infrastructure causes ride along in
    /// `failure`, never as `Err`.
    pub fn run(
        self,
        executor: &dyn CommandExecutor,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport> {
        let started_at = Utc::now();
        let resolved = params::resolve(&self.template.parameters, &self.supplied)?;
        self.validate(&resolved)?;

        log_status!(
            "run",
            "Executing '{}' ({} commands) on {}",
            self.template.name,
            self.template.commands.len(),
            self.target
        );

        let total = self.template.commands.len();
        let mut outputs: HashMap<String, String> = HashMap::new();
        let mut records: Vec<ExecutionRecord> = Vec::with_capacity(total);
        let mut state = RunState::Running;
        let mut failure: Option<Error> = None;
        let mut any_failed = false;

        for (index, command) in self.template.commands.iter().enumerate() {
            if self.cancel.is_cancelled() {
                log_status!("run", "Cancelled before command {}", index);
                skip_from(&self.template, index, sink, &mut records);
                state = RunState::Aborted;
                break;
            }

            let rendered =
                match render::render(command, &resolved, &outputs, self.template.execute_on) {
                    Ok(rendered) => rendered,
                    Err(err) => {
                        // Validation admits declared outputs, so this only
                        // fires when an earlier command never produced one.
                        records.push(publish(
                            sink,
                            ExecutionRecord {
                                command: command.name.clone(),
                                stderr: err.message.clone(),
                                result: None,
                                exit_code: EXIT_NOT_EXECUTED,
                                execute_on: command.execute_on.unwrap_or(self.template.execute_on),
                                index,
                            },
                        ));
                        skip_from(&self.template, index + 1, sink, &mut records);
                        state = RunState::Failed;
                        failure = Some(err);
                        break;
                    }
                };

            let outcome = match executor.execute(&rendered) {
                Ok(outcome) => outcome,
                Err(err) => {
                    records.push(publish(
                        sink,
                        ExecutionRecord {
                            command: rendered.display,
                            stderr: render::scrub(&err.message, &resolved),
                            result: None,
                            exit_code: EXIT_NOT_EXECUTED,
                            execute_on: rendered.execute_on,
                            index,
                        },
                    ));
                    skip_from(&self.template, index + 1, sink, &mut records);
                    state = RunState::Failed;
                    failure = Some(err);
                    break;
                }
            };

            if outcome.timed_out {
                records.push(publish(
                    sink,
                    ExecutionRecord {
                        command: rendered.display,
                        stderr: render::scrub(&outcome.stderr, &resolved),
                        result: Some(render::scrub(&outcome.stdout, &resolved)),
                        exit_code: EXIT_TIMEOUT,
                        execute_on: rendered.execute_on,
                        index,
                    },
                ));
                skip_from(&self.template, index + 1, sink, &mut records);
                state = RunState::Failed;
                failure = Some(Error::remote_command_timeout(
                    &command.name,
                    executor.command_timeout().as_secs(),
                ));
                break;
            }

            capture_outputs(&outcome.stdout, &mut outputs);

            let succeeded = outcome.exit_code == 0;
            records.push(publish(
                sink,
                ExecutionRecord {
                    command: rendered.display,
                    stderr: render::scrub(&outcome.stderr, &resolved),
                    result: Some(render::scrub(&outcome.stdout, &resolved)),
                    exit_code: outcome.exit_code,
                    execute_on: rendered.execute_on,
                    index,
                },
            ));

            if !succeeded {
                any_failed = true;
                if self.template.on_failure == FailurePolicy::Abort {
                    log_status!(
                        "run",
                        "Command {} exited {}; aborting",
                        index,
                        outcome.exit_code
                    );
                    skip_from(&self.template, index + 1, sink, &mut records);
                    state = RunState::Aborted;
                    break;
                }
            }
        }

        if state == RunState::Running {
            state = if any_failed {
                RunState::Aborted
            } else {
                RunState::Completed
            };
        }

        log_status!("run", "Run {} finished: {}", self.id, state);

        Ok(RunReport {
            id: self.id,
            template: self.template.name,
            state,
            records,
            outputs,
            started_at,
            finished_at: Utc::now(),
            failure: failure.as_ref().map(RunFailure::from),
        })
    }
}

fn publish(sink: &dyn ProgressSink, record: ExecutionRecord) -> ExecutionRecord {
    sink.publish(&record);
    record
}

/// Emit not-executed records for every command from `from` onward, keeping
/// the record list index-complete.
fn skip_from(
    template: &Template,
    from: usize,
    sink: &dyn ProgressSink,
    records: &mut Vec<ExecutionRecord>,
) {
    for (index, command) in template.commands.iter().enumerate().skip(from) {
        let execute_on = command.execute_on.unwrap_or(template.execute_on);
        records.push(publish(
            sink,
            ExecutionRecord::skipped(command, execute_on, index),
        ));
    }
}

/// Merge scalar members of a JSON-object stdout into the run's output map.
/// Non-JSON or non-object stdout is just text; nested values are skipped.
fn capture_outputs(stdout: &str, outputs: &mut HashMap<String, String>) {
    let Ok(Value::Object(members)) = serde_json::from_str::<Value>(stdout.trim()) else {
        return;
    };
    for (key, value) in members {
        let rendered = match value {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        outputs.insert(key, rendered);
    }
}

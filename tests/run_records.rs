//! Pipeline runner behavior through a scripted executor: record ordering,
//! failure policy, redaction, and terminal states.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use provost::engine::{CommandExecutor, RunState, TaskRun};
use provost::render::RenderedCommand;
use provost::sink::MemorySink;
use provost::ssh::CommandOutcome;
use provost::target::Target;
use provost::template::{
    CommandSpec, CommandType, ExecuteOn, FailurePolicy, ParameterSpec, ParameterType, Template,
    EXIT_NOT_EXECUTED, EXIT_TIMEOUT,
};
use provost::{Error, ErrorCode, Result};

/// Returns scripted outcomes in order and records every command text it
/// was asked to execute. Runs out of script → plain success.
#[derive(Default)]
struct ScriptedExecutor {
    responses: Mutex<VecDeque<Result<CommandOutcome>>>,
    executed: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    fn respond(self, response: Result<CommandOutcome>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(response);
        self
    }

    fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

impl CommandExecutor for ScriptedExecutor {
    fn execute(&self, command: &RenderedCommand) -> Result<CommandOutcome> {
        self.executed.lock().unwrap().push(command.text.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ok_outcome("")))
    }
}

fn ok_outcome(stdout: &str) -> CommandOutcome {
    CommandOutcome {
        stdout: stdout.to_string(),
        stderr: String::new(),
        exit_code: 0,
        timed_out: false,
    }
}

fn failed_outcome(exit_code: i32, stderr: &str) -> CommandOutcome {
    CommandOutcome {
        stdout: String::new(),
        stderr: stderr.to_string(),
        exit_code,
        timed_out: false,
    }
}

fn command(name: &str, execute: &str) -> CommandSpec {
    CommandSpec {
        command_type: CommandType::Command,
        name: name.to_string(),
        execute: execute.to_string(),
        description: None,
        execute_on: None,
    }
}

fn template(commands: Vec<CommandSpec>) -> Template {
    Template {
        name: "pipeline".to_string(),
        description: None,
        execute_on: ExecuteOn::Lxc,
        parameters: Vec::new(),
        outputs: Vec::new(),
        commands,
        on_failure: FailurePolicy::Abort,
    }
}

fn target() -> Target {
    Target::new("pve.lan", 22, Some("101".to_string()))
}

#[test]
fn success_yields_index_complete_records_and_completed_state() {
    let executor = ScriptedExecutor::default()
        .respond(Ok(ok_outcome("A\n")))
        .respond(Ok(ok_outcome("B\n")));
    let sink = MemorySink::new();
    let run = TaskRun::new(
        template(vec![command("a", "echo A"), command("b", "echo B")]),
        HashMap::new(),
        target(),
    );

    let report = run.run(&executor, &sink).unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.records.len(), 2);
    for (index, record) in report.records.iter().enumerate() {
        assert_eq!(record.index, index);
        assert_eq!(record.exit_code, 0);
    }
    assert_eq!(report.records[0].result.as_deref(), Some("A\n"));
    assert_eq!(report.records[1].result.as_deref(), Some("B\n"));

    // The sink saw the same records, in index order.
    let published: Vec<usize> = sink.records().iter().map(|r| r.index).collect();
    assert_eq!(published, vec![0, 1]);
}

#[test]
fn failure_aborts_and_marks_remaining_not_executed() {
    let executor = ScriptedExecutor::default()
        .respond(Ok(ok_outcome("")))
        .respond(Ok(failed_outcome(7, "boom")));
    let sink = MemorySink::new();
    let run = TaskRun::new(
        template(vec![
            command("a", "step 1"),
            command("b", "step 2"),
            command("c", "step 3"),
            command("d", "step 4"),
        ]),
        HashMap::new(),
        target(),
    );

    let report = run.run(&executor, &sink).unwrap();

    assert_eq!(report.state, RunState::Aborted);
    assert_eq!(report.records.len(), 4);
    assert_eq!(report.records[0].exit_code, 0);
    assert_eq!(report.records[1].exit_code, 7);
    assert_eq!(report.records[1].stderr, "boom");
    assert_eq!(report.records[2].exit_code, EXIT_NOT_EXECUTED);
    assert_eq!(report.records[3].exit_code, EXIT_NOT_EXECUTED);
    // Only the first two commands ever reached the executor.
    assert_eq!(executor.executed().len(), 2);
    assert_eq!(sink.records().len(), 4);
}

#[test]
fn continue_policy_runs_every_command_but_ends_aborted() {
    let executor = ScriptedExecutor::default()
        .respond(Ok(failed_outcome(1, "first failed")))
        .respond(Ok(ok_outcome("")));
    let sink = MemorySink::new();
    let mut tpl = template(vec![command("a", "step 1"), command("b", "step 2")]);
    tpl.on_failure = FailurePolicy::Continue;
    let run = TaskRun::new(tpl, HashMap::new(), target());

    let report = run.run(&executor, &sink).unwrap();

    assert_eq!(report.state, RunState::Aborted);
    assert_eq!(executor.executed().len(), 2);
    assert_eq!(report.records[1].exit_code, 0);
}

#[test]
fn connection_error_fails_the_run_distinct_from_abort() {
    let executor = ScriptedExecutor::default()
        .respond(Ok(ok_outcome("")))
        .respond(Err(Error::ssh_connect_failed(
            "pve.lan",
            22,
            Some("101".to_string()),
            "connection refused",
        )));
    let sink = MemorySink::new();
    let run = TaskRun::new(
        template(vec![command("a", "step 1"), command("b", "step 2")]),
        HashMap::new(),
        target(),
    );

    let report = run.run(&executor, &sink).unwrap();

    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.records.len(), 2);
    assert_eq!(report.records[0].exit_code, 0);
    assert_eq!(report.records[1].exit_code, EXIT_NOT_EXECUTED);
    let failure = report.failure.unwrap();
    assert_eq!(failure.code, "ssh.connect_failed");
}

#[test]
fn timeout_is_an_infrastructure_failure() {
    let executor = ScriptedExecutor::default().respond(Ok(CommandOutcome {
        stdout: "partial".to_string(),
        stderr: String::new(),
        exit_code: EXIT_TIMEOUT,
        timed_out: true,
    }));
    let sink = MemorySink::new();
    let run = TaskRun::new(
        template(vec![command("a", "slow"), command("b", "never")]),
        HashMap::new(),
        target(),
    );

    let report = run.run(&executor, &sink).unwrap();

    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.records[0].exit_code, EXIT_TIMEOUT);
    assert_eq!(report.records[0].result.as_deref(), Some("partial"));
    assert_eq!(report.records[1].exit_code, EXIT_NOT_EXECUTED);
    assert_eq!(report.failure.unwrap().code, "remote.command_timeout");
}

#[test]
fn missing_required_parameter_fails_with_zero_records() {
    let executor = ScriptedExecutor::default();
    let sink = MemorySink::new();
    let mut tpl = template(vec![command("a", "echo {{name}}")]);
    tpl.parameters = vec![ParameterSpec {
        name: "name".to_string(),
        parameter_type: ParameterType::String,
        enum_values: None,
        secure: false,
        description: None,
        default: None,
        required: true,
        template: None,
    }];
    let run = TaskRun::new(tpl, HashMap::new(), target());

    let err = run.run(&executor, &sink).unwrap_err();

    assert_eq!(err.code, ErrorCode::ParamsMissingRequired);
    assert!(sink.records().is_empty());
    assert!(executor.executed().is_empty());
}

#[test]
fn unknown_placeholder_fails_before_any_execution() {
    let executor = ScriptedExecutor::default();
    let sink = MemorySink::new();
    let run = TaskRun::new(
        template(vec![command("a", "echo {{missing}}"), command("b", "echo B")]),
        HashMap::new(),
        target(),
    );

    let err = run.run(&executor, &sink).unwrap_err();

    assert_eq!(err.code, ErrorCode::RenderUnknownReference);
    assert!(sink.records().is_empty());
    assert!(executor.executed().is_empty());
}

#[test]
fn secure_values_never_appear_in_records() {
    let executor = ScriptedExecutor::default()
        .respond(Ok(failed_outcome(1, "auth failed for hunter2")));
    let sink = MemorySink::new();
    let mut tpl = template(vec![
        command("login", "deploy --password {{password}}"),
        command("after", "echo done"),
    ]);
    tpl.parameters = vec![ParameterSpec {
        name: "password".to_string(),
        parameter_type: ParameterType::String,
        enum_values: None,
        secure: true,
        description: None,
        default: None,
        required: true,
        template: None,
    }];
    let supplied = HashMap::from([("password".to_string(), "hunter2".to_string())]);
    let run = TaskRun::new(tpl, supplied, target());

    let report = run.run(&executor, &sink).unwrap();

    assert_eq!(report.state, RunState::Aborted);
    // The executor received the real value.
    assert!(executor.executed()[0].contains("hunter2"));
    // No record field ever carries it in plaintext.
    for record in &report.records {
        assert!(!record.command.contains("hunter2"));
        assert!(!record.stderr.contains("hunter2"));
        assert!(!record.result.as_deref().unwrap_or("").contains("hunter2"));
    }
    assert!(report.records[0].command.contains("********"));
    assert!(report.records[0].stderr.contains("********"));
}

#[test]
fn cancellation_skips_remaining_commands() {
    let executor = ScriptedExecutor::default();
    let sink = MemorySink::new();
    let run = TaskRun::new(
        template(vec![command("a", "step 1"), command("b", "step 2")]),
        HashMap::new(),
        target(),
    );
    run.cancel_token().cancel();

    let report = run.run(&executor, &sink).unwrap();

    assert_eq!(report.state, RunState::Aborted);
    assert_eq!(report.records.len(), 2);
    assert!(report
        .records
        .iter()
        .all(|r| r.exit_code == EXIT_NOT_EXECUTED));
    assert!(executor.executed().is_empty());
}

#[test]
fn json_stdout_feeds_later_placeholders() {
    let executor = ScriptedExecutor::default()
        .respond(Ok(ok_outcome(r#"{"containerIp": "10.0.0.5"}"#)))
        .respond(Ok(ok_outcome("")));
    let sink = MemorySink::new();
    let mut tpl = template(vec![
        command("provision", "pct start 101"),
        command("verify", "ping -c1 {{containerIp}}"),
    ]);
    tpl.outputs = vec!["containerIp".to_string()];
    let run = TaskRun::new(tpl, HashMap::new(), target());

    let report = run.run(&executor, &sink).unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(executor.executed()[1], "ping -c1 10.0.0.5");
    assert_eq!(
        report.outputs.get("containerIp").map(String::as_str),
        Some("10.0.0.5")
    );
}

#[test]
fn outputs_shadow_parameters_with_the_same_name() {
    let executor = ScriptedExecutor::default()
        .respond(Ok(ok_outcome(r#"{"port": "9090"}"#)))
        .respond(Ok(ok_outcome("")));
    let sink = MemorySink::new();
    let mut tpl = template(vec![
        command("detect", "probe"),
        command("use", "curl localhost:{{port}}"),
    ]);
    tpl.outputs = vec!["port".to_string()];
    tpl.parameters = vec![ParameterSpec {
        name: "port".to_string(),
        parameter_type: ParameterType::Number,
        enum_values: None,
        secure: false,
        description: None,
        default: Some(serde_json::json!(8080)),
        required: false,
        template: None,
    }];
    let run = TaskRun::new(tpl, HashMap::new(), target());

    let report = run.run(&executor, &sink).unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(executor.executed()[1], "curl localhost:9090");
}

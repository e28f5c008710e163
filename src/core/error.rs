use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ValidationInvalidArgument,
    ValidationInvalidJson,

    ApplicationNotFound,
    ApplicationInvalid,
    TemplateNotFound,
    TemplateInvalid,

    ParamsMissingRequired,
    ParamsInvalidType,
    ParamsInvalidEnum,
    ParamsUnresolvedReference,
    RenderUnknownReference,

    TargetInvalid,
    TargetNotConfigured,
    SshConnectFailed,

    RemoteCommandTimeout,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",
            ErrorCode::ValidationInvalidJson => "validation.invalid_json",

            ErrorCode::ApplicationNotFound => "application.not_found",
            ErrorCode::ApplicationInvalid => "application.invalid",
            ErrorCode::TemplateNotFound => "template.not_found",
            ErrorCode::TemplateInvalid => "template.invalid",

            ErrorCode::ParamsMissingRequired => "params.missing_required",
            ErrorCode::ParamsInvalidType => "params.invalid_type",
            ErrorCode::ParamsInvalidEnum => "params.invalid_enum",
            ErrorCode::ParamsUnresolvedReference => "params.unresolved_reference",
            ErrorCode::RenderUnknownReference => "render.unknown_reference",

            ErrorCode::TargetInvalid => "target.invalid",
            ErrorCode::TargetNotConfigured => "target.not_configured",
            ErrorCode::SshConnectFailed => "ssh.connect_failed",

            ErrorCode::RemoteCommandTimeout => "remote.command_timeout",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundDetails {
    pub id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDetails {
    pub parameter: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub got: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnknownReferenceDetails {
    pub command: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetErrorDetails {
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandTimeoutDetails {
    pub command: String,
    pub timeout_secs: u64,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
        }
    }

pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let details = to_details(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.into(),
            id,
            tried,
        });
        Self::new(
            ErrorCode::ValidationInvalidArgument,
            "Invalid argument",
            details,
        )
    }

    pub fn validation_invalid_json(err: serde_json::Error, context: Option<String>) -> Self {
        let details = serde_json::json!({
            "error": err.to_string(),
            "context": context,
        });
        Self::new(ErrorCode::ValidationInvalidJson, "Invalid JSON", details)
    }

    pub fn application_not_found(id: impl Into<String>) -> Self {
        let details = to_details(NotFoundDetails { id: id.into() });
        Self::new(
            ErrorCode::ApplicationNotFound,
            "Application not found",
            details,
        )
        .with_hint("Run 'provost app list' to see available applications")
    }

    pub fn application_invalid(id: impl Into<String>, errors: Vec<String>) -> Self {
        let id = id.into();
        let message = if errors.len() == 1 {
            errors[0].clone()
        } else {
            format!("{} errors while loading application '{}'", errors.len(), id)
        };
        let details = serde_json::json!({ "id": id, "errors": errors });
        Self::new(ErrorCode::ApplicationInvalid, message, details)
    }

    pub fn template_not_found(name: impl Into<String>, requested_in: impl Into<String>) -> Self {
        let name = name.into();
        let details = serde_json::json!({
            "template": name,
            "requestedIn": requested_in.into(),
        });
        Self::new(
            ErrorCode::TemplateNotFound,
            format!("Template file not found: {}", name),
            details,
        )
    }

    pub fn template_invalid(name: impl Into<String>, problem: impl Into<String>) -> Self {
        let name = name.into();
        let problem = problem.into();
        let details = serde_json::json!({ "template": name, "problem": problem });
        Self::new(
            ErrorCode::TemplateInvalid,
            format!("Template '{}' is invalid: {}", name, problem),
            details,
        )
    }

    pub fn params_missing_required(name: impl Into<String>) -> Self {
        let name = name.into();
        let details = to_details(ParameterDetails {
            parameter: name.clone(),
            expected: None,
            got: None,
            allowed: None,
            reference: None,
        });
        Self::new(
            ErrorCode::ParamsMissingRequired,
            format!("Missing required parameter '{}'", name),
            details,
        )
    }

    pub fn params_invalid_type(
        name: impl Into<String>,
        expected: impl Into<String>,
        got: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let expected = expected.into();
        let details = to_details(ParameterDetails {
            parameter: name.clone(),
            expected: Some(expected.clone()),
            got: Some(got.into()),
            allowed: None,
            reference: None,
        });
        Self::new(
            ErrorCode::ParamsInvalidType,
            format!("Parameter '{}' is not a valid {}", name, expected),
            details,
        )
    }

    pub fn params_invalid_enum(
        name: impl Into<String>,
        value: impl Into<String>,
        allowed: Vec<String>,
    ) -> Self {
        let name = name.into();
        let value = value.into();
        let details = to_details(ParameterDetails {
            parameter: name.clone(),
            expected: None,
            got: Some(value.clone()),
            allowed: Some(allowed),
            reference: None,
        });
        Self::new(
            ErrorCode::ParamsInvalidEnum,
            format!("Value '{}' is not allowed for parameter '{}'", value, name),
            details,
        )
    }

    pub fn params_unresolved_reference(
        name: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let reference = reference.into();
        let details = to_details(ParameterDetails {
            parameter: name.clone(),
            expected: None,
            got: None,
            allowed: None,
            reference: Some(reference.clone()),
        });
        Self::new(
            ErrorCode::ParamsUnresolvedReference,
            format!(
                "Parameter '{}' references unresolved parameter '{}'",
                name, reference
            ),
            details,
        )
    }

    pub fn render_unknown_reference(
        command: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        let command = command.into();
        let token = token.into();
        let details = to_details(UnknownReferenceDetails {
            command: command.clone(),
            token: token.clone(),
        });
        Self::new(
            ErrorCode::RenderUnknownReference,
            format!(
                "Command '{}' references unknown parameter '{}'",
                command, token
            ),
            details,
        )
    }

    pub fn target_invalid(problem: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::TargetInvalid,
            "Target is not properly configured",
            serde_json::json!({ "problem": problem.into() }),
        )
    }

    pub fn target_not_configured() -> Self {
        Self::new(
            ErrorCode::TargetNotConfigured,
            "No default target configured",
            Value::Object(serde_json::Map::new()),
        )
        .with_hint("Run 'provost target set <host>' to configure the Proxmox host")
    }

    pub fn ssh_connect_failed(
        host: impl Into<String>,
        port: u16,
        container_id: Option<String>,
        cause: impl Into<String>,
    ) -> Self {
        let details = to_details(TargetErrorDetails {
            host: host.into(),
            port,
            container_id,
            cause: Some(cause.into()),
        });
        Self::new(
            ErrorCode::SshConnectFailed,
            "Failed to connect to target",
            details,
        )
    }

    pub fn remote_command_timeout(command: impl Into<String>, timeout_secs: u64) -> Self {
        let details = to_details(CommandTimeoutDetails {
            command: command.into(),
            timeout_secs,
        });
        Self::new(
            ErrorCode::RemoteCommandTimeout,
            format!("Remote command timed out after {}s", timeout_secs),
            details,
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let details = serde_json::json!({
            "error": error.into(),
            "context": context,
        });
        Self::new(ErrorCode::InternalIoError, "IO error", details)
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        let details = serde_json::json!({
            "error": error.into(),
            "context": context,
        });
        Self::new(ErrorCode::InternalJsonError, "JSON error", details)
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }
}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

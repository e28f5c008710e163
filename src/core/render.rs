//! Command rendering: substitutes resolved parameter values into command
//! text per the `{{ name }}` placeholder grammar.
//!
//! Rendering always produces two strings together: `text` with real values
//! for execution, and `display` with secure values redacted for records and
//! logs. The two are never interchanged.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::params::{ResolvedParams, REDACTED};
use crate::template::{CommandSpec, ExecuteOn};

/// A command ready for execution on its resolved target.
#[derive(Debug, Clone)]
pub struct RenderedCommand {
    /// Real command text, fed to the executor. Never logged.
    pub text: String,
    /// Redacted twin of `text`, safe for records and logs.
    pub display: String,
    pub execute_on: ExecuteOn,
}

/// The placeholder grammar is closed: `{{`, optional spaces, a token with
/// no spaces or braces, optional spaces, `}}`. Anything else containing
/// `{{` is rejected rather than passed through.
fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{ *([^}{ ]+) *\}\}").expect("placeholder regex"))
}

/// Extract all distinct placeholder tokens from a command or script body.
/// Used by the application store to validate authoring before any run.
pub fn placeholder_tokens(text: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for captures in placeholder_re().captures_iter(text) {
        let token = captures[1].to_string();
        if !seen.contains(&token) {
            seen.push(token);
        }
    }
    seen
}

/// Render one command against the run's outputs and resolved parameters.
///
/// Outputs shadow parameters: a value captured from an earlier command's
/// stdout wins over a caller-supplied or defaulted parameter of the same
/// name. `template_target` is the enclosing template's default target,
/// used when the command does not declare its own.
pub fn render(
    command: &CommandSpec,
    params: &ResolvedParams,
    outputs: &HashMap<String, String>,
    template_target: ExecuteOn,
) -> Result<RenderedCommand> {
    let execute_on = command.execute_on.unwrap_or(template_target);

    let mut text = String::with_capacity(command.execute.len());
    let mut display = String::with_capacity(command.execute.len());
    let mut last = 0;

    for captures in placeholder_re().captures_iter(&command.execute) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        let token = &captures[1];

        let literal = &command.execute[last..whole.start()];
        reject_stray_braces(&command.name, literal)?;
        text.push_str(literal);
        display.push_str(literal);

        if let Some(value) = outputs.get(token) {
            text.push_str(value);
            display.push_str(value);
        } else if params.contains(token) {
            text.push_str(&params.render(token).unwrap_or_default());
            display.push_str(&params.display(token).unwrap_or_default());
        } else {
            return Err(Error::render_unknown_reference(&command.name, token));
        }

        last = whole.end();
    }

    let tail = &command.execute[last..];
    reject_stray_braces(&command.name, tail)?;
    text.push_str(tail);
    display.push_str(tail);

    Ok(RenderedCommand {
        text,
        display,
        execute_on,
    })
}

/// Scrub occurrences of secure parameter values from free-form text
/// (stderr, connection causes) before it leaves the engine.
pub fn scrub(text: &str, params: &ResolvedParams) -> String {
    let mut scrubbed = text.to_string();
    for secret in params.secure_values() {
        if !secret.is_empty() {
            scrubbed = scrubbed.replace(&secret, REDACTED);
        }
    }
    scrubbed
}

/// A stray `{{` left in a literal segment is an authoring mistake, not
/// literal output. Only the command text itself is checked, so values
/// substituted in may contain braces freely.
fn reject_stray_braces(command: &str, segment: &str) -> Result<()> {
    match segment.find("{{") {
        Some(pos) => {
            let snippet: String = segment[pos..].chars().take(24).collect();
            Err(Error::render_unknown_reference(command, snippet))
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::resolve;
    use crate::template::{CommandType, ParameterSpec, ParameterType};
    use crate::ErrorCode;

    fn command(execute: &str) -> CommandSpec {
        CommandSpec {
            command_type: CommandType::Command,
            name: "step".to_string(),
            execute: execute.to_string(),
            description: None,
            execute_on: None,
        }
    }

    fn params_with(pairs: &[(&str, &str, bool)]) -> ResolvedParams {
        let declarations: Vec<ParameterSpec> = pairs
            .iter()
            .map(|(name, _, secure)| ParameterSpec {
                name: name.to_string(),
                parameter_type: ParameterType::String,
                enum_values: None,
                secure: *secure,
                description: None,
                default: None,
                required: true,
                template: None,
            })
            .collect();
        let supplied = pairs
            .iter()
            .map(|(name, value, _)| (name.to_string(), value.to_string()))
            .collect();
        resolve(&declarations, &supplied).unwrap()
    }

    #[test]
    fn substitutes_parameters_with_and_without_spaces() {
        let params = params_with(&[("vm_id", "101", false)]);
        let rendered = render(
            &command("pct start {{ vm_id }} && pct status {{vm_id}}"),
            &params,
            &HashMap::new(),
            ExecuteOn::Proxmox,
        )
        .unwrap();
        assert_eq!(rendered.text, "pct start 101 && pct status 101");
        assert_eq!(rendered.display, rendered.text);
    }

    #[test]
    fn outputs_shadow_parameters() {
        let params = params_with(&[("vm_id", "101", false)]);
        let mut outputs = HashMap::new();
        outputs.insert("vm_id".to_string(), "202".to_string());
        let rendered = render(
            &command("pct start {{ vm_id }}"),
            &params,
            &outputs,
            ExecuteOn::Proxmox,
        )
        .unwrap();
        assert_eq!(rendered.text, "pct start 202");
    }

    #[test]
    fn secure_values_redacted_only_in_display() {
        let params = params_with(&[("password", "hunter2", true)]);
        let rendered = render(
            &command("chpasswd <<< 'root:{{ password }}'"),
            &params,
            &HashMap::new(),
            ExecuteOn::Lxc,
        )
        .unwrap();
        assert!(rendered.text.contains("hunter2"));
        assert!(!rendered.display.contains("hunter2"));
        assert!(rendered.display.contains(REDACTED));
    }

    #[test]
    fn unknown_placeholder_is_rejected() {
        let params = params_with(&[]);
        let err = render(
            &command("echo {{ missing }}"),
            &params,
            &HashMap::new(),
            ExecuteOn::Proxmox,
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::RenderUnknownReference);
    }

    #[test]
    fn malformed_placeholder_is_rejected_not_passed_through() {
        let params = params_with(&[("a", "1", false)]);
        let err = render(
            &command("echo {{ not closed"),
            &params,
            &HashMap::new(),
            ExecuteOn::Proxmox,
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::RenderUnknownReference);
    }

    #[test]
    fn substituted_values_may_contain_braces() {
        let params = params_with(&[("pattern", "prefix{{literal", false)]);
        let rendered = render(
            &command("grep -F '{{ pattern }}' log.txt"),
            &params,
            &HashMap::new(),
            ExecuteOn::Lxc,
        )
        .unwrap();
        assert_eq!(rendered.text, "grep -F 'prefix{{literal' log.txt");
        assert_eq!(rendered.display, rendered.text);
    }

    #[test]
    fn command_target_overrides_template_target() {
        let params = params_with(&[]);
        let mut cmd = command("hostname");
        cmd.execute_on = Some(ExecuteOn::Proxmox);
        let rendered = render(&cmd, &params, &HashMap::new(), ExecuteOn::Lxc).unwrap();
        assert_eq!(rendered.execute_on, ExecuteOn::Proxmox);

        let inherited = render(&command("hostname"), &params, &HashMap::new(), ExecuteOn::Lxc)
            .unwrap();
        assert_eq!(inherited.execute_on, ExecuteOn::Lxc);
    }

    #[test]
    fn placeholder_tokens_deduplicates_in_order() {
        let tokens = placeholder_tokens("{{ a }} {{b}} {{ a }} {{ c }}");
        assert_eq!(tokens, vec!["a", "b", "c"]);
    }

    #[test]
    fn scrub_removes_secret_from_free_text() {
        let params = params_with(&[("password", "hunter2", true)]);
        assert_eq!(
            scrub("auth failed for hunter2", &params),
            format!("auth failed for {}", REDACTED)
        );
    }
}

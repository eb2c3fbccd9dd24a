use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Declarative description of one external command in a sequence.
///
/// Steps are immutable once built: the builder methods consume `self` and
/// there are no setters, so a manifest cannot be mutated while a run is
/// walking it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDescriptor {
    description: String,
    program: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stdin_input: Option<String>,
    #[serde(default)]
    elevated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    working_dir: Option<PathBuf>,
    #[serde(default)]
    allow_failure: bool,
}

impl StepDescriptor {
    pub fn new(description: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            program: program.into(),
            args: Vec::new(),
            stdin_input: None,
            elevated: false,
            working_dir: None,
            allow_failure: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Text written to the process's stdin before it is closed.
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin_input = Some(input.into());
        self
    }

    /// Run through the host's privilege-escalation program.
    pub fn elevated(mut self) -> Self {
        self.elevated = true;
        self
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Let the sequence continue when this step fails.
    pub fn allow_failure(mut self) -> Self {
        self.allow_failure = true;
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn stdin_input(&self) -> Option<&str> {
        self.stdin_input.as_deref()
    }

    pub fn is_elevated(&self) -> bool {
        self.elevated
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    pub fn is_failure_allowed(&self) -> bool {
        self.allow_failure
    }

    /// Human readable command line, for logs only. Never executed.
    pub fn command_line(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 2);
        if self.elevated {
            parts.push("[elevated]".to_string());
        }
        parts.push(self.program.clone());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let step = StepDescriptor::new("Reload systemd", "systemctl").arg("daemon-reload");

        assert_eq!(step.description(), "Reload systemd");
        assert_eq!(step.program(), "systemctl");
        assert_eq!(step.arguments(), &["daemon-reload".to_string()]);
        assert!(!step.is_elevated());
        assert!(!step.is_failure_allowed());
        assert!(step.stdin_input().is_none());
        assert!(step.working_dir().is_none());
    }

    #[test]
    fn test_builder_flags() {
        let step = StepDescriptor::new("Write unit", "tee")
            .arg("/etc/systemd/system/pod.service")
            .stdin("[Unit]\n")
            .elevated()
            .allow_failure()
            .in_dir("/tmp");

        assert!(step.is_elevated());
        assert!(step.is_failure_allowed());
        assert_eq!(step.stdin_input(), Some("[Unit]\n"));
        assert_eq!(step.working_dir(), Some(Path::new("/tmp")));
    }

    #[test]
    fn test_command_line_marks_elevation() {
        let step = StepDescriptor::new("Start", "systemctl")
            .args(["start", "pod.service"])
            .elevated();
        assert_eq!(step.command_line(), "[elevated] systemctl start pod.service");
    }

    #[test]
    fn test_deserialize_minimal_step() {
        let json = r#"{"description":"List","program":"ls"}"#;
        let step: StepDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(step, StepDescriptor::new("List", "ls"));
    }
}

//! Error types for registration, compilation, dependency access, and step outputs.
//!
//! Registration and compile errors are fatal and surface synchronously to the
//! caller. Dependency and output errors are raised inside step callables and
//! become ordinary step failures when propagated with `?`.

use std::fmt;

use jalan_types::{StepKey, StepPhase};
use thiserror::Error;

use crate::{dependency::DependencyToken, registry::RegistrationSite};

/// Errors raised while a handler's steps are being registered.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("{origin}: {phase} '{key}' is already registered as a workflow {phase} of '{handler}'")]
    DuplicateRegistration {
        handler: String,
        phase: StepPhase,
        key: StepKey,
        origin: RegistrationSite,
    },

    #[error("{origin}: a callable for '{key}' is already registered on '{handler}'")]
    DuplicateCallable {
        handler: String,
        key: StepKey,
        origin: RegistrationSite,
    },
}

impl RegistrationError {
    pub fn duplicate_registration(
        handler: impl Into<String>,
        phase: StepPhase,
        key: StepKey,
        origin: RegistrationSite,
    ) -> Self {
        Self::DuplicateRegistration {
            handler: handler.into(),
            phase,
            key,
            origin,
        }
    }

    pub fn duplicate_callable(handler: impl Into<String>, key: StepKey, origin: RegistrationSite) -> Self {
        Self::DuplicateCallable {
            handler: handler.into(),
            key,
            origin,
        }
    }

    /// Registration site of the offending (second) registration.
    pub fn origin(&self) -> &RegistrationSite {
        match self {
            RegistrationError::DuplicateRegistration { origin, .. } | RegistrationError::DuplicateCallable { origin, .. } => origin,
        }
    }
}

/// Errors raised while compiling a handler definition into a controller.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{origin}: {phase} '{key}' is registered more than once on '{handler}'")]
    DuplicateRegistration {
        handler: String,
        phase: StepPhase,
        key: StepKey,
        origin: RegistrationSite,
    },

    #[error("{0}")]
    UnresolvedDependency(UnresolvedDependencies),

    #[error("handler '{handler}' does not declare a dependency configuration")]
    NotConfiguredHandler { handler: String },
}

impl CompileError {
    pub fn not_configured(handler: impl Into<String>) -> Self {
        Self::NotConfiguredHandler { handler: handler.into() }
    }

    /// Registration site the error should be reported against, when one applies.
    pub fn origin(&self) -> Option<&RegistrationSite> {
        match self {
            CompileError::DuplicateRegistration { origin, .. } => Some(origin),
            CompileError::UnresolvedDependency(report) => report.steps.first().map(|step| &step.origin),
            CompileError::NotConfiguredHandler { .. } => None,
        }
    }
}

/// Every unresolved dependency found across a handler's main and teardown steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedDependencies {
    pub handler: String,
    pub steps: Vec<UnresolvedStep>,
}

impl UnresolvedDependencies {
    /// Total number of missing tokens across all steps.
    pub fn missing_count(&self) -> usize {
        self.steps.iter().map(|step| step.missing.len()).sum()
    }
}

/// One step with at least one token absent from the dependency map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedStep {
    pub phase: StepPhase,
    pub key: StepKey,
    pub origin: RegistrationSite,
    pub missing: Vec<MissingToken>,
}

/// A required token and its position in the step's parameter list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingToken {
    pub position: usize,
    pub token: DependencyToken,
}

impl fmt::Display for UnresolvedDependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(first) = self.steps.first() {
            write!(f, "{}: ", first.origin)?;
        }
        write!(
            f,
            "handler '{}' has {} unresolved dependenc{}",
            self.handler,
            self.missing_count(),
            if self.missing_count() == 1 { "y" } else { "ies" }
        )?;
        for step in &self.steps {
            write!(f, "\n  {} '{}' (registered at {}):", step.phase, step.key, step.origin)?;
            for missing in &step.missing {
                write!(f, " token '{}' at position {};", missing.token, missing.position)?;
            }
        }
        Ok(())
    }
}

/// Errors raised when a step reads its resolved dependencies.
#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("no dependency at position {position}; the step resolved {len}")]
    MissingPosition { position: usize, len: usize },

    #[error("dependency '{token}' is not a {expected}")]
    TypeMismatch { token: DependencyToken, expected: &'static str },

    #[error("dependency '{token}' was not resolved for this step")]
    UnknownToken { token: DependencyToken },
}

/// Failures produced by the controller itself while invoking a step.
///
/// Rejections returned by a step's own callable are reported as-is; these
/// cover the cases where there was nothing to call or the call panicked.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("{key} is not a function")]
    NotInvocable { key: StepKey },

    #[error("{key} panicked: {message}")]
    Panicked { key: StepKey, message: String },
}

impl StepError {
    pub fn not_invocable(key: StepKey) -> Self {
        Self::NotInvocable { key }
    }

    pub fn panicked(key: StepKey, message: impl Into<String>) -> Self {
        Self::Panicked {
            key,
            message: message.into(),
        }
    }
}

/// Errors raised by the output store.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Workflow {key} is not yet finished!")]
    NotYetFinished { key: StepKey },

    #[error("output of workflow {key} cannot be decoded: {source}")]
    Decode {
        key: StepKey,
        #[source]
        source: serde_json::Error,
    },
}

impl OutputError {
    pub fn not_yet_finished(key: impl Into<StepKey>) -> Self {
        Self::NotYetFinished { key: key.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(line: u32) -> RegistrationSite {
        RegistrationSite::Source {
            file: "src/release.rs",
            line,
            column: 9,
        }
    }

    #[test]
    fn unresolved_report_enumerates_every_missing_token() {
        let report = UnresolvedDependencies {
            handler: "release".into(),
            steps: vec![
                UnresolvedStep {
                    phase: StepPhase::Main,
                    key: "build".into(),
                    origin: site(12),
                    missing: vec![
                        MissingToken {
                            position: 0,
                            token: DependencyToken::from_static("toolchain"),
                        },
                        MissingToken {
                            position: 2,
                            token: DependencyToken::from_static("cache"),
                        },
                    ],
                },
                UnresolvedStep {
                    phase: StepPhase::Teardown,
                    key: "cleanup".into(),
                    origin: site(30),
                    missing: vec![MissingToken {
                        position: 0,
                        token: DependencyToken::from_static("workspace"),
                    }],
                },
            ],
        };

        let message = CompileError::UnresolvedDependency(report).to_string();
        assert!(message.starts_with("src/release.rs:12:9: "), "unexpected message: {message}");
        assert!(message.contains("3 unresolved dependencies"));
        assert!(message.contains("token 'toolchain' at position 0"));
        assert!(message.contains("token 'cache' at position 2"));
        assert!(message.contains("teardown step 'cleanup' (registered at src/release.rs:30:9)"));
        assert!(message.contains("token 'workspace' at position 0"));
    }

    #[test]
    fn not_yet_finished_matches_handler_wording() {
        let error = OutputError::not_yet_finished("fetch");
        assert_eq!(error.to_string(), "Workflow fetch is not yet finished!");
    }

    #[test]
    fn compile_error_origin_points_at_first_offending_step() {
        let error = CompileError::DuplicateRegistration {
            handler: "release".into(),
            phase: StepPhase::Main,
            key: "build".into(),
            origin: site(40),
        };
        assert_eq!(error.origin(), Some(&site(40)));
        assert!(CompileError::not_configured("release").origin().is_none());
    }
}

//! Step descriptors and the registration-site marker they carry.

use std::{fmt, panic::Location};

use jalan_types::{StepKey, StepPhase};

use crate::dependency::DependencyToken;

/// Where a step was registered, used to point diagnostics at the registration
/// instead of at the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationSite {
    /// A call site in Rust source, captured with `#[track_caller]`.
    Source { file: &'static str, line: u32, column: u32 },
    /// An entry of a step manifest file.
    Manifest { path: String, phase: StepPhase, index: usize },
}

impl RegistrationSite {
    /// The caller's location. Call from a `#[track_caller]` function.
    #[track_caller]
    pub fn caller() -> Self {
        Location::caller().into()
    }
}

impl From<&'static Location<'static>> for RegistrationSite {
    fn from(location: &'static Location<'static>) -> Self {
        Self::Source {
            file: location.file(),
            line: location.line(),
            column: location.column(),
        }
    }
}

impl fmt::Display for RegistrationSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationSite::Source { file, line, column } => write!(f, "{file}:{line}:{column}"),
            RegistrationSite::Manifest { path, phase, index } => {
                let section = match phase {
                    StepPhase::Main => "steps",
                    StepPhase::Teardown => "teardown",
                };
                write!(f, "manifest {path} {section}[{index}]")
            }
        }
    }
}

/// One registered workflow step. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDescriptor {
    /// Execution rank; lower runs first, ties keep registration order.
    pub order: i64,
    pub key: StepKey,
    /// Tokens the step's callable receives, positionally.
    pub required_tokens: Vec<DependencyToken>,
    pub origin: RegistrationSite,
}

impl StepDescriptor {
    /// Descriptor whose origin is the caller's location.
    #[track_caller]
    pub fn new<K, I, T>(order: i64, key: K, required_tokens: I) -> Self
    where
        K: Into<StepKey>,
        I: IntoIterator<Item = T>,
        T: Into<DependencyToken>,
    {
        Self {
            order,
            key: key.into(),
            required_tokens: required_tokens.into_iter().map(Into::into).collect(),
            origin: RegistrationSite::caller(),
        }
    }

    pub fn with_origin(mut self, origin: RegistrationSite) -> Self {
        self.origin = origin;
        self
    }
}

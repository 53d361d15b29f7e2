//! Declarative step tables.
//!
//! A manifest lists a handler's descriptors in YAML so that step ordering and
//! dependency tokens can live next to deployment configuration while the
//! callables stay in code:
//!
//! ```yaml
//! handler: release
//! steps:
//!   - { order: 1, key: build, requires: [toolchain] }
//!   - { order: 2, key: publish, requires: [registry, credentials] }
//! teardown:
//!   - { order: 1, key: cleanup }
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use jalan_types::{StepKey, StepPhase};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    dependency::DependencyToken,
    registry::{RegistrationSite, StepDescriptor},
};

static NAME_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.:-]*$").expect("valid name pattern"));

/// Errors raised while reading a step manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read step manifest {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{section}[{index}]: '{name}' is not a valid {kind}; use letters, digits, '_', '.', ':' or '-'")]
    InvalidName {
        section: &'static str,
        index: usize,
        kind: &'static str,
        name: String,
    },
}

/// One manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestStep {
    pub order: i64,
    pub key: String,
    #[serde(default)]
    pub requires: Vec<String>,
}

/// Declarative table of a handler's main and teardown steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepManifest {
    #[serde(default)]
    pub handler: Option<String>,
    #[serde(default)]
    pub steps: Vec<ManifestStep>,
    #[serde(default)]
    pub teardown: Vec<ManifestStep>,
    #[serde(skip)]
    source: Option<String>,
}

impl StepManifest {
    pub fn from_yaml_str(content: &str) -> Result<Self, ManifestError> {
        let manifest: StepManifest = serde_yaml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Read and validate a manifest file; descriptors will point back at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut manifest = Self::from_yaml_str(&content)?;
        manifest.source = Some(path.display().to_string());
        Ok(manifest)
    }

    /// Descriptors of `phase`, in manifest order.
    pub fn descriptors(&self, phase: StepPhase) -> Vec<StepDescriptor> {
        let entries = match phase {
            StepPhase::Main => &self.steps,
            StepPhase::Teardown => &self.teardown,
        };
        let path = self.source.clone().unwrap_or_else(|| "<inline>".to_string());

        entries
            .iter()
            .enumerate()
            .map(|(index, entry)| StepDescriptor {
                order: entry.order,
                key: StepKey::new(entry.key.clone()),
                required_tokens: entry.requires.iter().cloned().map(DependencyToken::new).collect(),
                origin: RegistrationSite::Manifest {
                    path: path.clone(),
                    phase,
                    index,
                },
            })
            .collect()
    }

    fn validate(&self) -> Result<(), ManifestError> {
        for (section, entries) in [("steps", &self.steps), ("teardown", &self.teardown)] {
            for (index, entry) in entries.iter().enumerate() {
                validate_name(section, index, "step key", &entry.key)?;
                for token in &entry.requires {
                    validate_name(section, index, "dependency token", token)?;
                }
            }
        }
        Ok(())
    }
}

fn validate_name(section: &'static str, index: usize, kind: &'static str, name: &str) -> Result<(), ManifestError> {
    if NAME_PATTERN.is_match(name) {
        return Ok(());
    }
    Err(ManifestError::InvalidName {
        section,
        index,
        kind,
        name: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELEASE: &str = r#"
handler: release
steps:
  - order: 2
    key: publish
    requires: [registry, credentials]
  - order: 1
    key: build
    requires: [toolchain]
teardown:
  - order: 1
    key: cleanup
"#;

    #[test]
    fn manifest_yields_descriptors_in_manifest_order() {
        let manifest = StepManifest::from_yaml_str(RELEASE).expect("parse manifest");
        assert_eq!(manifest.handler.as_deref(), Some("release"));

        let main = manifest.descriptors(StepPhase::Main);
        assert_eq!(main.len(), 2);
        assert_eq!(main[0].key.as_str(), "publish");
        assert_eq!(
            main[0].required_tokens,
            vec![DependencyToken::from("registry"), DependencyToken::from("credentials")]
        );
        assert_eq!(main[1].origin.to_string(), "manifest <inline> steps[1]");

        let teardown = manifest.descriptors(StepPhase::Teardown);
        assert_eq!(teardown.len(), 1);
        assert!(teardown[0].required_tokens.is_empty());
    }

    #[test]
    fn loaded_manifest_points_descriptors_at_the_file() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("release.yaml");
        fs::write(&path, RELEASE).expect("write manifest");

        let manifest = StepManifest::load(&path).expect("load manifest");
        let teardown = manifest.descriptors(StepPhase::Teardown);
        assert_eq!(teardown[0].origin.to_string(), format!("manifest {} teardown[0]", path.display()));
    }

    #[test]
    fn invalid_names_are_rejected() {
        let error = StepManifest::from_yaml_str(
            r#"
steps:
  - order: 1
    key: build
    requires: ["tool chain"]
"#,
        )
        .expect_err("space is not allowed in tokens");

        assert!(matches!(error, ManifestError::InvalidName { index: 0, .. }));
        assert!(error.to_string().contains("'tool chain' is not a valid dependency token"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let error = StepManifest::from_yaml_str("steps:\n  - { order: 1, key: build, retry: 3 }\n").expect_err("unknown field");
        assert!(matches!(error, ManifestError::Yaml(_)));
    }

    #[test]
    fn missing_file_reports_the_path() {
        let error = StepManifest::load("/nonexistent/jalan/release.yaml").expect_err("missing file");
        assert!(error.to_string().contains("/nonexistent/jalan/release.yaml"));
    }
}

//! Finished step outputs, readable by later steps through the handler.
//!
//! A handler embeds an [`OutputStore`] and returns it from
//! [`WorkflowHandler::output_store`](crate::WorkflowHandler::output_store). The
//! controller publishes each successful step's return value under the step's
//! key; steps that run later read it back with [`OutputStore::get_output`].

use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

use jalan_types::StepKey;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::OutputError;

/// Outputs of finished steps, keyed by step key.
///
/// A key is present only once its step has finished successfully, so a step
/// that never ran is distinguishable from one that returned `null`.
#[derive(Debug, Default)]
pub struct OutputStore {
    outputs: RwLock<HashMap<StepKey, Value>>,
}

impl OutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `key` as finished with `value`.
    pub fn set_output(&self, key: impl Into<StepKey>, value: Value) {
        self.outputs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value);
    }

    /// Output of a finished step, or [`OutputError::NotYetFinished`].
    pub fn get_output(&self, key: &str) -> Result<Value, OutputError> {
        self.outputs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| OutputError::not_yet_finished(key))
    }

    /// Output of a finished step, decoded into `T`.
    pub fn get_output_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, OutputError> {
        let value = self.get_output(key)?;
        serde_json::from_value(value).map_err(|source| OutputError::Decode { key: key.into(), source })
    }

    pub fn is_finished(&self, key: &str) -> bool {
        self.outputs.read().unwrap_or_else(PoisonError::into_inner).contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.outputs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every finished output.
    pub fn reset(&self) {
        self.outputs.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[test]
    fn unfinished_steps_are_reported_as_such() {
        let store = OutputStore::new();
        let error = store.get_output("fetch").expect_err("nothing has finished");
        assert!(matches!(error, OutputError::NotYetFinished { ref key } if key.as_str() == "fetch"));
    }

    #[test]
    fn null_outputs_still_count_as_finished() {
        let store = OutputStore::new();
        store.set_output("notify", Value::Null);

        assert!(store.is_finished("notify"));
        assert_eq!(store.get_output("notify").expect("finished"), Value::Null);
    }

    #[test]
    fn outputs_decode_into_typed_values() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Artifact {
            name: String,
            size: u64,
        }

        let store = OutputStore::new();
        store.set_output("build", json!({ "name": "app.tar", "size": 42 }));

        let artifact: Artifact = store.get_output_as("build").expect("decode");
        assert_eq!(
            artifact,
            Artifact {
                name: "app.tar".into(),
                size: 42
            }
        );

        let error = store.get_output_as::<Vec<String>>("build").expect_err("wrong shape");
        assert!(matches!(error, OutputError::Decode { .. }));
    }

    #[test]
    fn reset_forgets_everything() {
        let store = OutputStore::new();
        store.set_output("build", json!(1));
        store.reset();
        assert!(store.is_empty());
        assert!(!store.is_finished("build"));
    }
}

//! Artifacts and their accumulation over a run.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::OutputSchema;

/// Key every task output uses to report its artifacts.
pub const ARTIFACTS_FIELD: &str = "artifacts";

/// An opaque reference to a produced output, attributed to its task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// File path or other identifier.
    pub path: String,
    pub kind: String,
    pub produced_by: String,
}

/// An artifact as reported in a task's output document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub path: String,
    pub kind: String,
}

impl Artifact {
    /// Schema for the `artifacts` array every task output carries.
    pub fn list_schema() -> OutputSchema {
        OutputSchema::array_of(
            OutputSchema::object()
                .required("path", OutputSchema::string())
                .required("kind", OutputSchema::string()),
        )
    }

    /// Read the artifacts reported in a (validated) task output.
    ///
    /// Entries that do not deserialize are skipped; schema validation has
    /// already reported them.
    pub fn from_output(task_name: &str, output: &Value) -> Vec<Artifact> {
        output
            .get(ARTIFACTS_FIELD)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value::<ArtifactRef>(item.clone()).ok())
                    .map(|r| Artifact {
                        path: r.path,
                        kind: r.kind,
                        produced_by: task_name.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Append-only, ordered artifact list for one run.
///
/// Order is the order tasks completed in the runner's iteration, whether
/// their output was freshly produced or served from the effect store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactAggregator {
    artifacts: Vec<Artifact>,
}

impl ArtifactAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, artifacts: impl IntoIterator<Item = Artifact>) {
        self.artifacts.extend(artifacts);
    }

    pub fn all(&self) -> &[Artifact] {
        &self.artifacts
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn into_vec(self) -> Vec<Artifact> {
        self.artifacts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_output_attributes_task() {
        let output = json!({
            "artifacts": [
                {"path": ".goreleaser.yml", "kind": "config"},
                {"path": "Makefile", "kind": "build-script"}
            ]
        });
        let artifacts = Artifact::from_output("build-configuration", &output);
        assert_eq!(artifacts.len(), 2);
        assert!(artifacts.iter().all(|a| a.produced_by == "build-configuration"));
        assert_eq!(artifacts[1].path, "Makefile");
    }

    #[test]
    fn test_from_output_without_artifacts() {
        assert!(Artifact::from_output("t", &json!({"x": 1})).is_empty());
    }

    #[test]
    fn test_aggregator_preserves_append_order() {
        let mut agg = ArtifactAggregator::new();
        agg.append(Artifact::from_output("b", &json!({"artifacts": [{"path": "2", "kind": "k"}]})));
        agg.append(Artifact::from_output("a", &json!({"artifacts": [{"path": "1", "kind": "k"}]})));

        let order: Vec<&str> = agg.all().iter().map(|a| a.produced_by.as_str()).collect();
        assert_eq!(order, vec!["b", "a"]);
    }
}

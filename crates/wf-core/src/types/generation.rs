use crate::types::enums::OperationKind;
use crate::types::file::ProjectFile;
use crate::types::job::{BuildDirective, DependencyGraph};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One event emitted by the generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum GenerationEvent {
    ThinkingStep {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    BuildReady {
        directive: String,
        summary: Option<String>,
        project_name: Option<String>,
        #[serde(default)]
        dependency_graph: DependencyGraph,
    },
    FileStart {
        path: String,
        action: OperationKind,
    },
    FileChunk {
        path: String,
        text: String,
    },
    FileDone {
        path: String,
        content: String,
    },
    MessageDelta {
        text: String,
    },
    Done,
    Error {
        message: String,
        code: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PlanRequest {
    pub prompt: String,
    /// Paths already present in the project.
    pub existing_paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GenerateRequest {
    pub directive: BuildDirective,
    pub files: Vec<ProjectFile>,
}

/// A directive produced by planning, waiting to be built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PendingBuild {
    pub original_prompt: String,
    pub directive: BuildDirective,
    pub dependency_graph: DependencyGraph,
}

impl PendingBuild {
    /// A pending build for a plain prompt with no planning step.
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        Self {
            directive: BuildDirective::new(prompt.clone()),
            original_prompt: prompt,
            dependency_graph: DependencyGraph::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_decode_from_wire_shape() {
        let line = r#"{"type":"file-start","path":"src/App.tsx","action":"create"}"#;
        let event: GenerationEvent = serde_json::from_str(line).unwrap();
        assert_eq!(
            event,
            GenerationEvent::FileStart {
                path: "src/App.tsx".to_string(),
                action: OperationKind::Create,
            }
        );

        let done: GenerationEvent = serde_json::from_str(r#"{"type":"done"}"#).unwrap();
        assert_eq!(done, GenerationEvent::Done);
    }

    #[test]
    fn build_ready_uses_camel_case_fields() {
        let line = r#"{"type":"build-ready","directive":"Build a bakery site","summary":"Bakery","projectName":"crumbs","dependencyGraph":{"files":[{"path":"index.html","phase":1}]}}"#;
        let GenerationEvent::BuildReady {
            project_name,
            dependency_graph,
            ..
        } = serde_json::from_str(line).unwrap()
        else {
            panic!("expected build-ready");
        };
        assert_eq!(project_name.as_deref(), Some("crumbs"));
        assert_eq!(dependency_graph.phase_of("index.html"), Some(1));
    }
}

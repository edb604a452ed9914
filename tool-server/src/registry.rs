//! Static tool registry.
//!
//! Tools are declared in a compile-time table mapping names to parameter
//! schemas; dispatch is a table lookup plus schema validation, then a match
//! in the server module. No runtime registration.

use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Integer,
    String,
    Boolean,
    StringArray,
}

impl ParamKind {
    fn type_name(self) -> &'static str {
        match self {
            ParamKind::Integer => "integer",
            ParamKind::String => "string",
            ParamKind::Boolean => "boolean",
            ParamKind::StringArray => "array",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            ParamKind::Integer => value.is_i64() || value.is_u64(),
            ParamKind::String => value.is_string(),
            ParamKind::Boolean => value.is_boolean(),
            ParamKind::StringArray => value
                .as_array()
                .map(|items| items.iter().all(Value::is_string))
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
}

const fn required(name: &'static str, kind: ParamKind, description: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        required: true,
        description,
    }
}

const fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        required: false,
        description,
    }
}

/// The complete tool set, mirroring the task operations of the REST surface.
pub static TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "add-task",
        description: "Create a new task in a project",
        params: &[
            required("project_id", ParamKind::Integer, "Project to create the task in"),
            required("title", ParamKind::String, "Task title"),
            optional("description", ParamKind::String, "Detailed description"),
            optional("priority", ParamKind::String, "low, medium, high, or critical"),
            optional("assignee_id", ParamKind::Integer, "Worker to assign"),
            optional("due_date", ParamKind::String, "Deadline, RFC3339"),
            optional("tags", ParamKind::StringArray, "Tags for categorization"),
            optional("is_recurring", ParamKind::Boolean, "Whether the task recurs"),
            optional(
                "recurrence_pattern",
                ParamKind::String,
                "1m, 5m, 10m, 15m, 30m, 1h, daily, weekly, or monthly",
            ),
            optional("max_occurrences", ParamKind::Integer, "Cap on the recurrence chain"),
        ],
    },
    ToolSpec {
        name: "list-tasks",
        description: "List tasks in a project with filters",
        params: &[
            required("project_id", ParamKind::Integer, "Project to list"),
            optional("status", ParamKind::String, "Filter by status"),
            optional("assignee_id", ParamKind::Integer, "Filter by assignee"),
            optional("priority", ParamKind::String, "Filter by priority"),
            optional("search", ParamKind::String, "Title substring search"),
            optional("tags", ParamKind::String, "Comma-separated tags, AND logic"),
            optional("limit", ParamKind::Integer, "Page size, at most 100"),
            optional("offset", ParamKind::Integer, "Page offset"),
        ],
    },
    ToolSpec {
        name: "get-task",
        description: "Get task details including subtasks",
        params: &[required("task_id", ParamKind::Integer, "Task to fetch")],
    },
    ToolSpec {
        name: "update-task",
        description: "Update task fields",
        params: &[
            required("task_id", ParamKind::Integer, "Task to update"),
            optional("title", ParamKind::String, "New title"),
            optional("description", ParamKind::String, "New description"),
            optional("priority", ParamKind::String, "New priority"),
            optional("tags", ParamKind::StringArray, "Replacement tag set"),
            optional("due_date", ParamKind::String, "New deadline, RFC3339"),
        ],
    },
    ToolSpec {
        name: "delete-task",
        description: "Delete a task and its subtasks",
        params: &[required("task_id", ParamKind::Integer, "Task to delete")],
    },
    ToolSpec {
        name: "update-status",
        description: "Change task status through the workflow state machine",
        params: &[
            required("task_id", ParamKind::Integer, "Task to transition"),
            required(
                "status",
                ParamKind::String,
                "pending, in_progress, review, completed, or blocked",
            ),
        ],
    },
    ToolSpec {
        name: "update-progress",
        description: "Report progress on an in-progress task",
        params: &[
            required("task_id", ParamKind::Integer, "Task to update"),
            required("percent", ParamKind::Integer, "Completion percentage, 0-100"),
            optional("note", ParamKind::String, "Progress note for the audit trail"),
        ],
    },
    ToolSpec {
        name: "assign-task",
        description: "Assign a task to a project member",
        params: &[
            required("task_id", ParamKind::Integer, "Task to assign"),
            required("assignee_id", ParamKind::Integer, "Worker to assign"),
        ],
    },
    ToolSpec {
        name: "list-projects",
        description: "List projects the caller belongs to",
        params: &[
            optional("limit", ParamKind::Integer, "Page size, at most 100"),
            optional("offset", ParamKind::Integer, "Page offset"),
        ],
    },
];

pub fn find(name: &str) -> Option<&'static ToolSpec> {
    TOOLS.iter().find(|tool| tool.name == name)
}

/// Validate call arguments against the declared schema: required parameters
/// present, every provided parameter known and of the declared type.
pub fn validate_args(spec: &ToolSpec, args: &Map<String, Value>) -> Result<(), String> {
    for param in spec.params {
        match args.get(param.name) {
            None | Some(Value::Null) => {
                if param.required {
                    return Err(format!("Missing required parameter '{}'", param.name));
                }
            }
            Some(value) => {
                if !param.kind.matches(value) {
                    return Err(format!(
                        "Parameter '{}' must be of type {}",
                        param.name,
                        param.kind.type_name()
                    ));
                }
            }
        }
    }
    for key in args.keys() {
        if !spec.params.iter().any(|p| p.name == key) {
            return Err(format!("Unknown parameter '{key}'"));
        }
    }
    Ok(())
}

/// JSON-schema shape advertised by `tools/list`.
pub fn input_schema(spec: &ToolSpec) -> Value {
    let mut properties = Map::new();
    let mut required_names = Vec::new();
    for param in spec.params {
        let mut prop = json!({
            "type": param.kind.type_name(),
            "description": param.description,
        });
        if param.kind == ParamKind::StringArray {
            prop["items"] = json!({ "type": "string" });
        }
        properties.insert(param.name.to_string(), prop);
        if param.required {
            required_names.push(param.name);
        }
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required_names,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_the_tool_surface() {
        let names: Vec<&str> = TOOLS.iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "add-task",
                "list-tasks",
                "get-task",
                "update-task",
                "delete-task",
                "update-status",
                "update-progress",
                "assign-task",
                "list-projects",
            ]
        );
    }

    #[test]
    fn test_validate_args_required() {
        let spec = find("add-task").unwrap();
        let args = serde_json::from_value::<Map<String, Value>>(json!({ "title": "x" })).unwrap();
        let err = validate_args(spec, &args).unwrap_err();
        assert!(err.contains("project_id"));

        let args =
            serde_json::from_value(json!({ "project_id": 1, "title": "x" })).unwrap();
        assert!(validate_args(spec, &args).is_ok());
    }

    #[test]
    fn test_validate_args_type_mismatch() {
        let spec = find("update-progress").unwrap();
        let args =
            serde_json::from_value(json!({ "task_id": 1, "percent": "fifty" })).unwrap();
        let err = validate_args(spec, &args).unwrap_err();
        assert!(err.contains("percent"));
        assert!(err.contains("integer"));
    }

    #[test]
    fn test_validate_args_rejects_unknown() {
        let spec = find("get-task").unwrap();
        let args =
            serde_json::from_value(json!({ "task_id": 1, "verbose": true })).unwrap();
        let err = validate_args(spec, &args).unwrap_err();
        assert!(err.contains("verbose"));
    }

    #[test]
    fn test_input_schema_shape() {
        let spec = find("update-status").unwrap();
        let schema = input_schema(spec);
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["status"]["type"], "string");
        assert_eq!(schema["required"], json!(["task_id", "status"]));
    }
}

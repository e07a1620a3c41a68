use crate::char_edit::CharOperation;
use crate::error::FsError;
use crate::helper::HelperOperation;
use crate::line_edit::LineOperation;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PathArgs {
	/// File or directory path, absolute or relative to the server's working directory.
	pub path: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadMultipleArgs {
	pub paths: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WriteFileArgs {
	pub path: String,
	pub content: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MoveFileArgs {
	pub source: String,
	pub destination: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilesArgs {
	/// Directory to search recursively.
	pub path: String,
	/// Case-insensitive substring matched against entry names.
	pub pattern: String,
	/// Glob patterns matched against paths relative to `path`; matches are skipped.
	#[serde(default)]
	pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModifyCharsArgs {
	pub path: String,
	pub operations: Vec<CharOperation>,
	/// Report the diff without writing the file.
	#[serde(default)]
	pub dry_run: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModifyLinesArgs {
	pub path: String,
	pub operations: Vec<LineOperation>,
	#[serde(default)]
	pub dry_run: bool,
}

#[derive(Clone, Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TextEdit {
	/// Exact text to find; must occur exactly once.
	pub old_text: String,
	pub new_text: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EditFileArgs {
	pub path: String,
	pub edits: Vec<TextEdit>,
	#[serde(default)]
	pub dry_run: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct NoArgs {}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct AddImportArgs {
	pub file_path: String,
	/// Import statements, e.g. `from typing import List`.
	pub imports: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct AddMethodArgs {
	pub file_path: String,
	pub class_name: String,
	pub method_content: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub after_method: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct AddClassArgs {
	pub file_path: String,
	pub class_def: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub after_class: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct AddParameterArgs {
	pub file_path: String,
	pub method_name: String,
	pub param_name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub param_type: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub default_value: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct UpdateMethodArgs {
	pub file_path: String,
	pub method_name: String,
	pub new_body: String,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct UpdateClassArgs {
	pub file_path: String,
	pub class_name: String,
	pub new_class_def: String,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct RemoveClassArgs {
	pub file_path: String,
	pub class_name: String,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct MoveMethodArgs {
	pub source_file: String,
	pub target_file: String,
	pub method_name: String,
	pub source_class: String,
	pub target_class: String,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct MoveCodeArgs {
	pub source_file: String,
	pub target_file: String,
	pub start_line: usize,
	pub end_line: usize,
	pub target_line: usize,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub move_imports: Option<bool>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct FixIndentationArgs {
	pub file_path: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub spaces_per_indent: Option<usize>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub line_length: Option<usize>,
}

/// Deserializes tool arguments; a missing argument object counts as `{}`.
pub fn parse<T: DeserializeOwned>(arguments: &Value) -> Result<T, FsError> {
	let value = if arguments.is_null() {
		json!({})
	}
	else {
		arguments.clone()
	};
	serde_json::from_value(value).map_err(|err| FsError::invalid_arguments(err.to_string()))
}

pub fn require_items<T>(items: &[T], field: &str) -> Result<(), FsError> {
	if items.is_empty() {
		return Err(FsError::invalid_arguments(format!("{} must not be empty", field)));
	}
	Ok(())
}

/// Validates a helper payload against its argument struct and returns the normalized payload.
pub fn python_payload(operation: HelperOperation, arguments: &Value) -> Result<Value, FsError> {
	match operation {
		HelperOperation::AddImport => normalized::<AddImportArgs>(arguments),
		HelperOperation::AddMethod => normalized::<AddMethodArgs>(arguments),
		HelperOperation::AddClass => normalized::<AddClassArgs>(arguments),
		HelperOperation::AddParameter => normalized::<AddParameterArgs>(arguments),
		HelperOperation::UpdateMethod => normalized::<UpdateMethodArgs>(arguments),
		HelperOperation::UpdateClass => normalized::<UpdateClassArgs>(arguments),
		HelperOperation::RemoveClass => normalized::<RemoveClassArgs>(arguments),
		HelperOperation::MoveMethod => normalized::<MoveMethodArgs>(arguments),
		HelperOperation::MoveCode => normalized::<MoveCodeArgs>(arguments),
		HelperOperation::FixIndentation => normalized::<FixIndentationArgs>(arguments),
	}
}

fn normalized<T: DeserializeOwned + Serialize>(arguments: &Value) -> Result<Value, FsError> {
	let parsed: T = parse(arguments)?;
	serde_json::to_value(parsed).map_err(|err| FsError::invalid_arguments(err.to_string()))
}

fn input_schema<T: JsonSchema>() -> Value {
	let mut schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or_else(|_| json!({ "type": "object" }));
	if let Some(obj) = schema.as_object_mut() {
		obj.remove("$schema");
		obj.remove("title");
		obj.entry("properties").or_insert_with(|| json!({}));
	}
	schema
}

fn python_schema(operation: HelperOperation) -> Value {
	match operation {
		HelperOperation::AddImport => input_schema::<AddImportArgs>(),
		HelperOperation::AddMethod => input_schema::<AddMethodArgs>(),
		HelperOperation::AddClass => input_schema::<AddClassArgs>(),
		HelperOperation::AddParameter => input_schema::<AddParameterArgs>(),
		HelperOperation::UpdateMethod => input_schema::<UpdateMethodArgs>(),
		HelperOperation::UpdateClass => input_schema::<UpdateClassArgs>(),
		HelperOperation::RemoveClass => input_schema::<RemoveClassArgs>(),
		HelperOperation::MoveMethod => input_schema::<MoveMethodArgs>(),
		HelperOperation::MoveCode => input_schema::<MoveCodeArgs>(),
		HelperOperation::FixIndentation => input_schema::<FixIndentationArgs>(),
	}
}

fn python_description(operation: HelperOperation) -> &'static str {
	match operation {
		HelperOperation::AddImport => "Add import statements to a Python file after its existing imports.",
		HelperOperation::AddMethod => "Add a method to a class in a Python file, optionally after a named method.",
		HelperOperation::AddClass => "Add a class definition to a Python file, optionally after a named class.",
		HelperOperation::AddParameter => "Add a parameter to a function or method in a Python file.",
		HelperOperation::UpdateMethod => "Replace the body of a method in a Python file.",
		HelperOperation::UpdateClass => "Replace a class definition in a Python file.",
		HelperOperation::RemoveClass => "Remove a class definition from a Python file.",
		HelperOperation::MoveMethod => "Move a method from one class to another, possibly across files.",
		HelperOperation::MoveCode => "Move a block of lines from one Python file to a line in another, carrying needed imports.",
		HelperOperation::FixIndentation => "Normalize indentation of a Python file.",
	}
}

fn tool(name: &str, description: &str, schema: Value) -> Value {
	json!({
		"name": name,
		"description": description,
		"inputSchema": schema
	})
}

pub fn tool_definitions() -> Vec<Value> {
	let mut tools = vec![
		tool(
			"read_file",
			"Read the complete text of a file inside the allowed directories.",
			input_schema::<PathArgs>()
		),
		tool(
			"read_multiple_files",
			"Read several files at once. A path that fails is reported in its own entry and does not stop the others.",
			input_schema::<ReadMultipleArgs>()
		),
		tool(
			"write_file",
			"Create a file or overwrite it completely with the given content.",
			input_schema::<WriteFileArgs>()
		),
		tool(
			"create_directory",
			"Create a directory and any missing parents. Succeeds if it already exists.",
			input_schema::<PathArgs>()
		),
		tool(
			"list_directory",
			"List the entries of a directory, each tagged as file or directory.",
			input_schema::<PathArgs>()
		),
		tool(
			"move_file",
			"Move or rename a file or directory. Fails if the destination already exists.",
			input_schema::<MoveFileArgs>()
		),
		tool(
			"search_files",
			"Recursively find entries whose name contains the pattern (case-insensitive). Returns full paths; entries outside the allowed directories are skipped.",
			input_schema::<SearchFilesArgs>()
		),
		tool(
			"modify_chars",
			"Apply insert/replace/delete operations addressed by zero-based character offsets. All offsets refer to the original content, so operations can be given in any order; overlapping ranges are rejected. Source files are checked for balanced delimiters after each operation and nothing is written if a check fails.",
			input_schema::<ModifyCharsArgs>()
		),
		tool(
			"modify_text",
			"Apply insertLines/replaceLines/deleteLines operations addressed by 1-based line numbers. Operations run in the given order and each sees the lines as left by the previous ones, so later line numbers must account for lines added or removed earlier in the batch. Source files are checked for balanced delimiters once at the end and nothing is written if the check fails.",
			input_schema::<ModifyLinesArgs>()
		),
		tool(
			"edit_file",
			"Replace exact text snippets. Each oldText must occur exactly once in the content as left by the previous edits. Returns a unified diff; dryRun skips the write.",
			input_schema::<EditFileArgs>()
		),
		tool(
			"get_file_info",
			"Report size, timestamps, type, and permission bits of a file or directory.",
			input_schema::<PathArgs>()
		),
		tool(
			"list_allowed_directories",
			"List the directories this server may access.",
			input_schema::<NoArgs>()
		),
	];
	let lines_alias = tool(
		"modify_lines",
		"Alias of modify_text.",
		input_schema::<ModifyLinesArgs>()
	);
	tools.push(lines_alias);
	for operation in HelperOperation::ALL {
		tools.push(tool(&operation.tool_name(), python_description(operation), python_schema(operation)));
	}
	tools
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn every_tool_has_an_object_schema() {
		let tools = tool_definitions();
		assert_eq!(tools.len(), 13 + HelperOperation::ALL.len());
		for tool in &tools {
			let schema = &tool["inputSchema"];
			assert_eq!(schema["type"], "object", "{}", tool["name"]);
			assert!(schema.get("$schema").is_none());
		}
	}

	#[test]
	fn schemas_use_wire_field_names() {
		let tools = tool_definitions();
		let modify = tools.iter().find(|tool| tool["name"] == "modify_chars").expect("modify_chars");
		let required = modify["inputSchema"]["required"].as_array().expect("required");
		assert!(required.contains(&json!("path")));
		assert!(required.contains(&json!("operations")));
		assert!(modify["inputSchema"]["properties"].get("dryRun").is_some());
	}

	#[test]
	fn parse_reports_missing_fields() {
		let err = parse::<WriteFileArgs>(&json!({ "path": "a.txt" })).unwrap_err();
		assert_eq!(err.code(), "INVALID_ARGUMENTS");
		assert!(err.to_string().contains("content"));
		parse::<NoArgs>(&Value::Null).expect("empty args");
	}

	#[test]
	fn python_payload_keeps_helper_keys() {
		let payload = python_payload(
			HelperOperation::MoveCode,
			&json!({
				"source_file": "a.py",
				"target_file": "b.py",
				"start_line": 3,
				"end_line": 5,
				"target_line": 1,
				"extra": true
			})
		).expect("payload");
		assert_eq!(payload["start_line"], 3);
		assert!(payload.get("extra").is_none());
		assert!(payload.get("move_imports").is_none());
		let err = python_payload(HelperOperation::RemoveClass, &json!({ "file_path": "a.py" })).unwrap_err();
		assert!(err.to_string().contains("class_name"));
	}

	#[test]
	fn empty_batches_are_rejected() {
		let err = require_items::<u8>(&[], "operations").unwrap_err();
		assert_eq!(err.to_string(), "invalid arguments: operations must not be empty");
	}
}

use crate::char_edit;
use crate::config::{config_schema, Config};
use crate::error::{io_code, FsError};
use crate::fs::{self, Edited};
use crate::helper::HelperOperation;
use crate::line_edit;
use crate::protocol::{Request, Response};
use crate::sandbox::ResolvedPath;
use crate::tools::{
	self,
	EditFileArgs,
	ModifyCharsArgs,
	ModifyLinesArgs,
	MoveFileArgs,
	NoArgs,
	PathArgs,
	ReadMultipleArgs,
	SearchFilesArgs,
	WriteFileArgs
};
use anyhow::Result;
use opentelemetry::global;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::resource::Resource;
use opentelemetry_sdk::trace as sdktrace;
use opentelemetry_semantic_conventions::resource as semconv;
use serde_json::{json, Value};
use std::future::Future;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, info_span, warn, Instrument, Span};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug)]
struct ProtocolError {
	code: i64,
	message: String,
}

impl ProtocolError {
	fn new(code: i64, message: impl Into<String>) -> Self {
		Self {
			code,
			message: message.into()
		}
	}
}

impl std::fmt::Display for ProtocolError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.message)
	}
}

impl std::error::Error for ProtocolError {}

pub fn init_tracing(config: &Config) {
	let _ = global::set_error_handler(|_| {});
	let resource = Resource::new(
		vec![
		opentelemetry::KeyValue::new(semconv::SERVICE_NAME, config.otel_service_name.clone()),
		opentelemetry::KeyValue::new(semconv::SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
		opentelemetry::KeyValue::new("mcp.session_id", config.session_id.clone()),
		]
	);
	let tracing_layer = if config.otel_enabled {
		let exporter = opentelemetry_otlp::new_exporter().tonic().with_endpoint(config.otel_endpoint.clone());
		// install_batch registers the global provider itself
		let tracer = opentelemetry_otlp::new_pipeline()
			.tracing()
			.with_exporter(exporter)
			.with_trace_config(sdktrace::Config::default().with_resource(resource))
			.install_batch(opentelemetry_sdk::runtime::Tokio)
			.ok();
		if let Some(tracer) = tracer {
			Some(OpenTelemetryLayer::new(tracer))
		}
		else {
			None
		}
	}
	else {
		None
	};
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	// stdout carries the protocol
	let fmt_layer = tracing_subscriber::fmt::layer()
		.with_target(false)
		.with_writer(std::io::stderr);
	let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
	if let Some(layer) = tracing_layer {
		subscriber.with(layer).init();
	}
	else {
		subscriber.init();
	}
}

pub async fn run(config: Config) -> Result<()> {
	let stdin = io::stdin();
	let stdout = io::stdout();
	let mut reader = BufReader::new(stdin);
	let mut writer = io::BufWriter::new(stdout);
	for root in config.sandbox.roots() {
		info!(root = %root.path().display(), real = %root.real_path().display(), "allowed directory");
	}
	info!(session_id = %config.session_id, "serving on stdio");
	let mut raw = Vec::new();
	loop {
		raw.clear();
		if reader.read_until(b'\n', &mut raw).await? == 0 {
			break;
		}
		let line = match std::str::from_utf8(&raw) {
			Ok(line) => line,
			Err(err) => {
				warn!(error = %err, "request line is not utf-8");
				let resp = Response::err(Value::Null, -32700, format!("parse error: {}", err));
				write_response(&mut writer, resp).await?;
				continue;
			}
		};
		if line.trim().is_empty() {
			continue;
		}
		let req: Request = match serde_json::from_str(line) {
			Ok(req) => req,
			Err(err) => {
				warn!(error = %err, "unparseable request line");
				let resp = Response::err(Value::Null, -32700, format!("parse error: {}", err));
				write_response(&mut writer, resp).await?;
				continue;
			}
		};
		if req.is_notification() {
			debug!(method = %req.method, "notification");
			continue;
		}
		let resp = handle_request(&config, req).await;
		write_response(&mut writer, resp).await?;
	}
	info!("stdin closed, shutting down");
	Ok(())
}

async fn handle_request(config: &Config, req: Request) -> Response {
	let id = req.id.clone().unwrap_or(Value::Null);
	let tool_name = extract_tool_name(&req.method, &req.params);
	let span = info_span!(
		"mcp.request",
		"mcp.session_id" = %config.session_id,
		"mcp.method" = %req.method,
		"mcp.tool_name" = tool_name.as_deref().unwrap_or(""),
		"mcp.is_error" = tracing::field::Empty,
		"mcp.error_code" = tracing::field::Empty,
		"mcp.count" = tracing::field::Empty,
		"mcp.response_bytes" = tracing::field::Empty,
	);
	match route(config, &req).instrument(span.clone()).await {
		Ok(value) => {
			record_result(&span, &value);
			Response::ok(id, value)
		}
		Err(err) => {
			if let Some(protocol) = err.downcast_ref::<ProtocolError>() {
				Response::err(id, protocol.code, protocol.message.clone())
			}
			else {
				Response::err(id, -32000, err.to_string())
			}
		}
	}
}

async fn route(config: &Config, req: &Request) -> Result<Value> {
	match req.method.as_str() {
		"initialize" => {
			let version = req.params
				.get("protocolVersion")
				.and_then(Value::as_str)
				.unwrap_or(PROTOCOL_VERSION);
			Ok(json!({
				"protocolVersion": version,
				"serverInfo": {
					"name": env!("CARGO_PKG_NAME"),
					"version": env!("CARGO_PKG_VERSION")
				},
				"capabilities": {
					"tools": {
						"listChanged": false
					}
				},
				"configSchema": config_schema()
			}))
		}
		"ping" => Ok(json!({})),
		"tools/list" => Ok(json!({
			"tools": tools::tool_definitions()
		})),
		"tools/call" => {
			let name = req.params
				.get("name")
				.and_then(Value::as_str)
				.ok_or_else(|| ProtocolError::new(-32602, "name is required"))?;
			let arguments = req.params
				.get("arguments")
				.cloned()
				.unwrap_or(Value::Null);
			execute_tool(config, name, &arguments).await
		}
		_ => Err(ProtocolError::new(-32601, "method not found").into()),
	}
}

async fn execute_tool(config: &Config, name: &str, arguments: &Value) -> Result<Value> {
	let result = match name {
		"read_file" => run_tool(name, || read_file(config, arguments)).await,
		"read_multiple_files" => run_tool(name, || read_multiple_files(config, arguments)).await,
		"write_file" => run_tool(name, || write_file(config, arguments)).await,
		"create_directory" => run_tool(name, || create_directory(config, arguments)).await,
		"list_directory" => run_tool(name, || list_directory(config, arguments)).await,
		"move_file" => run_tool(name, || move_file(config, arguments)).await,
		"search_files" => run_tool(name, || search_files(config, arguments)).await,
		"modify_chars" => run_tool(name, || modify_chars(config, arguments)).await,
		"modify_text" | "modify_lines" => run_tool(name, || modify_lines(config, arguments)).await,
		"edit_file" => run_tool(name, || edit_file(config, arguments)).await,
		"get_file_info" => run_tool(name, || get_file_info(config, arguments)).await,
		"list_allowed_directories" => run_tool(name, || list_allowed_directories(config, arguments)).await,
		_ => match HelperOperation::from_tool_name(name) {
			Some(operation) => run_tool(name, || python_tool(config, operation, arguments)).await,
			None => return Err(ProtocolError::new(-32602, format!("unknown tool: {}", name)).into()),
		},
	};
	Ok(result)
}

async fn run_tool<F, Fut>(name: &str, handler: F) -> Value
where
	F: FnOnce() -> Fut,
	Fut: Future<Output = Result<Value>>, {
	match handler().await {
		Ok(structured) => tool_success(name, structured),
		Err(err) => {
			warn!(tool = name, code = error_code(&err), error = %err, "tool call failed");
			tool_error(&err)
		}
	}
}

async fn read_file(config: &Config, arguments: &Value) -> Result<Value> {
	let args: PathArgs = tools::parse(arguments)?;
	let path = config.sandbox.authorize(&args.path)?;
	let content = fs::read_text(&path).await?;
	Ok(json!({
		"path": path.display().to_string(),
		"content": content
	}))
}

async fn read_one(config: &Config, requested: &str) -> Result<String> {
	let path = config.sandbox.authorize(requested)?;
	fs::read_text(&path).await
}

async fn read_multiple_files(config: &Config, arguments: &Value) -> Result<Value> {
	let args: ReadMultipleArgs = tools::parse(arguments)?;
	tools::require_items(&args.paths, "paths")?;
	let mut files = Vec::with_capacity(args.paths.len());
	let mut failed = 0usize;
	for requested in &args.paths {
		match read_one(config, requested).await {
			Ok(content) => files.push(json!({
				"path": requested,
				"content": content
			})),
			Err(err) => {
				failed += 1;
				files.push(json!({
					"path": requested,
					"error": err.to_string(),
					"code": error_code(&err)
				}));
			}
		}
	}
	Ok(json!({
		"count": files.len(),
		"failed": failed,
		"files": files
	}))
}

async fn write_file(config: &Config, arguments: &Value) -> Result<Value> {
	let args: WriteFileArgs = tools::parse(arguments)?;
	let path = config.sandbox.authorize(&args.path)?;
	fs::write_text(&path, &args.content).await
}

async fn create_directory(config: &Config, arguments: &Value) -> Result<Value> {
	let args: PathArgs = tools::parse(arguments)?;
	let path = config.sandbox.authorize_directory(&args.path)?;
	fs::create_directory(&path).await
}

async fn list_directory(config: &Config, arguments: &Value) -> Result<Value> {
	let args: PathArgs = tools::parse(arguments)?;
	let path = config.sandbox.authorize(&args.path)?;
	fs::list_directory(&path).await
}

async fn move_file(config: &Config, arguments: &Value) -> Result<Value> {
	let args: MoveFileArgs = tools::parse(arguments)?;
	let source = config.sandbox.authorize(&args.source)?;
	let destination = config.sandbox.authorize(&args.destination)?;
	fs::move_path(&source, &destination).await
}

async fn search_files(config: &Config, arguments: &Value) -> Result<Value> {
	let args: SearchFilesArgs = tools::parse(arguments)?;
	if args.pattern.is_empty() {
		return Err(FsError::invalid_arguments("pattern must not be empty").into());
	}
	let root = config.sandbox.authorize(&args.path)?;
	fs::search(&config.sandbox, &root, &args.pattern, &args.exclude_patterns).await
}

async fn modify_chars(config: &Config, arguments: &Value) -> Result<Value> {
	let args: ModifyCharsArgs = tools::parse(arguments)?;
	tools::require_items(&args.operations, "operations")?;
	let path = config.sandbox.authorize(&args.path)?;
	fs::apply_edit(&path, args.dry_run, |content, validate| {
		let outcome = char_edit::apply(content, &args.operations, validate)?;
		Ok(Edited {
			content: outcome.content,
			summary: json!({
				"applied": outcome.applied,
				"shift": outcome.shift
			})
		})
	}).await
}

async fn modify_lines(config: &Config, arguments: &Value) -> Result<Value> {
	let args: ModifyLinesArgs = tools::parse(arguments)?;
	tools::require_items(&args.operations, "operations")?;
	let path = config.sandbox.authorize(&args.path)?;
	fs::apply_edit(&path, args.dry_run, |content, validate| {
		let outcome = line_edit::apply(content, &args.operations, validate)?;
		Ok(Edited {
			content: outcome.content,
			summary: json!({
				"applied": outcome.applied,
				"lineCount": outcome.line_count
			})
		})
	}).await
}

async fn edit_file(config: &Config, arguments: &Value) -> Result<Value> {
	let args: EditFileArgs = tools::parse(arguments)?;
	tools::require_items(&args.edits, "edits")?;
	let path = config.sandbox.authorize(&args.path)?;
	fs::apply_edit(&path, args.dry_run, |content, validate| {
		Ok(Edited {
			content: fs::replace_exact(content, &args.edits, validate)?,
			summary: json!({
				"applied": args.edits.len()
			})
		})
	}).await
}

async fn get_file_info(config: &Config, arguments: &Value) -> Result<Value> {
	let args: PathArgs = tools::parse(arguments)?;
	let path = config.sandbox.authorize(&args.path)?;
	fs::file_info(&path).await
}

async fn list_allowed_directories(config: &Config, arguments: &Value) -> Result<Value> {
	let _: NoArgs = tools::parse(arguments)?;
	let directories = config.sandbox
		.roots()
		.iter()
		.map(|root| root.path().display().to_string())
		.collect::<Vec<_>>();
	Ok(json!({
		"count": directories.len(),
		"directories": directories
	}))
}

async fn python_tool(config: &Config, operation: HelperOperation, arguments: &Value) -> Result<Value> {
	let mut payload = tools::python_payload(operation, arguments)?;
	let mut files: Vec<ResolvedPath> = Vec::new();
	for field in operation.path_fields() {
		let requested = payload.get(*field)
			.and_then(Value::as_str)
			.ok_or_else(|| FsError::invalid_arguments(format!("{} is required", field)))?
			.to_string();
		let resolved = config.sandbox.authorize(&requested)?;
		payload[*field] = Value::String(resolved.display().to_string());
		files.push(resolved);
	}
	let helper = config.helper
		.as_ref()
		.ok_or_else(|| FsError::HelperProcess {
			operation: operation.as_str().to_string(),
			message: "python helpers are not configured; start the server with --helper-dir".to_string()
		})?;
	helper.invoke(operation, &payload).await?;
	let files = files.iter()
		.map(|path| path.display().to_string())
		.collect::<Vec<_>>();
	Ok(json!({
		"operation": operation.as_str(),
		"files": files
	}))
}

fn tool_success(name: &str, structured: Value) -> Value {
	let message = tool_message(name, &structured);
	json!({
		"structuredContent": structured,
		"content": [
			{
				"type": "text",
				"text": message
			}
		]
	})
}

fn tool_error(err: &anyhow::Error) -> Value {
	let message = err.to_string();
	let code = error_code(err);
	json!({
		"isError": true,
		"structuredContent": {
			"code": code,
			"message": message
		},
		"content": [
			{
				"type": "text",
				"text": message
			}
		]
	})
}

fn error_code(err: &anyhow::Error) -> &'static str {
	for cause in err.chain() {
		if let Some(fs_err) = cause.downcast_ref::<FsError>() {
			return fs_err.code();
		}
		if let Some(io_err) = cause.downcast_ref::<std::io::Error>() {
			return io_code(io_err);
		}
	}
	"EXECUTION_ERROR"
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
	value.get(key)
		.and_then(Value::as_str)
		.unwrap_or("")
}

fn tool_message(name: &str, structured: &Value) -> String {
	let path = str_field(structured, "path");
	match name {
		"read_file" => str_field(structured, "content").to_string(),
		"read_multiple_files" => {
			let files = structured.get("files")
				.and_then(Value::as_array)
				.cloned()
				.unwrap_or_default();
			files.iter()
				.map(|file| {
					let file_path = str_field(file, "path");
					match file.get("error").and_then(Value::as_str) {
						Some(error) => format!("{}: Error - {}", file_path, error),
						None => format!("{}:\n{}", file_path, str_field(file, "content")),
					}
				})
				.collect::<Vec<_>>()
				.join("\n---\n")
		}
		"write_file" => {
			let bytes = structured.get("bytes")
				.and_then(Value::as_u64)
				.unwrap_or(0);
			format!("Wrote {} bytes to {}", bytes, path)
		}
		"create_directory" => format!("Created directory {}", path),
		"list_directory" => {
			let entries = structured.get("entries")
				.and_then(Value::as_array)
				.cloned()
				.unwrap_or_default();
			if entries.is_empty() {
				return format!("{} is empty", path);
			}
			entries.iter()
				.map(|entry| {
					let tag = if str_field(entry, "type") == "directory" {
						"[DIR]"
					}
					else {
						"[FILE]"
					};
					format!("{} {}", tag, str_field(entry, "name"))
				})
				.collect::<Vec<_>>()
				.join("\n")
		}
		"move_file" => format!(
			"Moved {} to {}",
			str_field(structured, "source"),
			str_field(structured, "destination")
		),
		"search_files" => {
			let matches = structured.get("matches")
				.and_then(Value::as_array)
				.cloned()
				.unwrap_or_default();
			if matches.is_empty() {
				return "No matches found".to_string();
			}
			matches.iter()
				.filter_map(Value::as_str)
				.collect::<Vec<_>>()
				.join("\n")
		}
		"modify_chars" | "modify_text" | "modify_lines" | "edit_file" => {
			let diff = str_field(structured, "diff");
			let changed = structured.get("changed")
				.and_then(Value::as_bool)
				.unwrap_or(false);
			if !changed {
				return format!("No changes to {}", path);
			}
			let applied = structured.get("applied")
				.and_then(Value::as_u64)
				.unwrap_or(0);
			let dry_run = structured.get("dryRun")
				.and_then(Value::as_bool)
				.unwrap_or(false);
			if dry_run {
				format!("Dry run, {} not written:\n{}", path, diff)
			}
			else {
				format!("Applied {} edit(s) to {}\n{}", applied, path, diff)
			}
		}
		"get_file_info" => ["size", "created", "modified", "accessed", "isDirectory", "isFile", "permissions"]
			.iter()
			.map(|key| {
				let value = match structured.get(*key) {
					Some(Value::String(text)) => text.clone(),
					Some(Value::Null) | None => "unknown".to_string(),
					Some(other) => other.to_string(),
				};
				format!("{}: {}", key, value)
			})
			.collect::<Vec<_>>()
			.join("\n"),
		"list_allowed_directories" => {
			let directories = structured.get("directories")
				.and_then(Value::as_array)
				.cloned()
				.unwrap_or_default();
			let listed = directories.iter()
				.filter_map(Value::as_str)
				.collect::<Vec<_>>()
				.join("\n");
			format!("Allowed directories:\n{}", listed)
		}
		_ => {
			let files = structured.get("files")
				.and_then(Value::as_array)
				.cloned()
				.unwrap_or_default();
			let listed = files.iter()
				.filter_map(Value::as_str)
				.collect::<Vec<_>>()
				.join(", ");
			format!("{} completed for {}", name, listed)
		}
	}
}

fn extract_tool_name(method: &str, params: &Value) -> Option<String> {
	if method != "tools/call" {
		return None;
	}
	params.get("name")
		.and_then(Value::as_str)
		.map(|value| value.to_string())
}

fn record_result(span: &Span, result: &Value) {
	let response_bytes = serde_json::to_string(result).map(|value| value.len() as u64).ok();
	if let Some(bytes) = response_bytes {
		span.record("mcp.response_bytes", bytes);
	}
	let is_error = result.get("isError")
		.and_then(Value::as_bool)
		.unwrap_or(false);
	span.record("mcp.is_error", is_error);
	if let Some(code) = result.get("structuredContent")
		.and_then(|value| value.get("code"))
		.and_then(Value::as_str) {
		span.record("mcp.error_code", code);
	}
	if let Some(count) = result.get("structuredContent")
		.and_then(|value| value.get("count"))
		.and_then(Value::as_u64) {
		span.record("mcp.count", count);
	}
}

async fn write_response(writer: &mut io::BufWriter<io::Stdout>, resp: Response) -> Result<()> {
	let line = serde_json::to_string(&resp)?;
	writer.write_all(line.as_bytes()).await?;
	writer.write_all(b"\n").await?;
	writer.flush().await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::Settings;
	use crate::helper::CodeTransformHelper;
	use async_trait::async_trait;
	use std::path::{Path, PathBuf};
	use std::sync::{Arc, Mutex};

	#[derive(Default)]
	struct RecordingHelper {
		calls: Mutex<Vec<(HelperOperation, Value)>>,
	}

	#[async_trait]
	impl CodeTransformHelper for RecordingHelper {
		async fn invoke(&self, operation: HelperOperation, payload: &Value) -> Result<(), FsError> {
			self.calls.lock().expect("calls").push((operation, payload.clone()));
			Ok(())
		}
	}

	fn config_for(root: &Path) -> Config {
		let settings = Settings {
			roots: vec![root.display().to_string()],
			..Settings::default()
		};
		Config::build(settings, root).expect("config")
	}

	fn scratch() -> (tempfile::TempDir, PathBuf) {
		let dir = tempfile::tempdir().expect("tempdir");
		let base = dunce::canonicalize(dir.path()).expect("canonical");
		(dir, base)
	}

	#[tokio::test]
	async fn modify_chars_dry_run_reports_diff_without_writing() {
		let (_dir, base) = scratch();
		std::fs::write(base.join("notes.txt"), "hello world\n").expect("write");
		let config = config_for(&base);
		let result = execute_tool(&config, "modify_chars", &json!({
			"path": "notes.txt",
			"dryRun": true,
			"operations": [{ "startPosition": 0, "endPosition": 5, "kind": "replace", "newContent": "howdy" }]
		})).await.expect("tool");
		assert!(result.get("isError").is_none());
		assert_eq!(result["structuredContent"]["shift"], 0);
		assert!(result["content"][0]["text"].as_str().unwrap().contains("+howdy world"));
		assert_eq!(std::fs::read_to_string(base.join("notes.txt")).unwrap(), "hello world\n");
	}

	#[tokio::test]
	async fn tool_errors_carry_stable_codes() {
		let (_dir, base) = scratch();
		std::fs::write(base.join("a.txt"), "abc").expect("write");
		let config = config_for(&base);
		let result = execute_tool(&config, "modify_chars", &json!({
			"path": "a.txt",
			"operations": [{ "startPosition": 9, "kind": "insert", "newContent": "x" }]
		})).await.expect("tool");
		assert_eq!(result["isError"], true);
		assert_eq!(result["structuredContent"]["code"], "INVALID_OFFSET");
		let result = execute_tool(&config, "read_file", &json!({ "path": "missing.txt" })).await.expect("tool");
		assert_eq!(result["structuredContent"]["code"], "FILE_NOT_FOUND");
		let result = execute_tool(&config, "write_file", &json!({ "path": "a.txt" })).await.expect("tool");
		assert_eq!(result["structuredContent"]["code"], "INVALID_ARGUMENTS");
		let result = execute_tool(&config, "modify_text", &json!({ "path": "a.txt", "operations": [] })).await.expect("tool");
		assert_eq!(result["structuredContent"]["code"], "INVALID_ARGUMENTS");
	}

	#[tokio::test]
	async fn unknown_tool_is_a_protocol_error() {
		let (_dir, base) = scratch();
		let config = config_for(&base);
		let err = execute_tool(&config, "delete_everything", &json!({})).await.unwrap_err();
		let protocol = err.downcast_ref::<ProtocolError>().expect("protocol error");
		assert_eq!(protocol.code, -32602);
	}

	#[tokio::test]
	async fn python_tools_pass_resolved_paths_to_helper() {
		let (_dir, base) = scratch();
		std::fs::create_dir(base.join("pkg")).expect("pkg");
		std::fs::write(base.join("pkg/models.py"), "class A:\n    pass\n").expect("write");
		let helper = Arc::new(RecordingHelper::default());
		let mut config = config_for(&base);
		config.helper = Some(helper.clone());
		let result = execute_tool(&config, "python_remove_class", &json!({
			"file_path": "pkg/../pkg/models.py",
			"class_name": "A"
		})).await.expect("tool");
		assert!(result.get("isError").is_none());
		let calls = helper.calls.lock().expect("calls");
		assert_eq!(calls.len(), 1);
		assert_eq!(calls[0].0, HelperOperation::RemoveClass);
		assert_eq!(calls[0].1["file_path"], base.join("pkg/models.py").display().to_string());
		assert_eq!(calls[0].1["class_name"], "A");
	}

	#[tokio::test]
	async fn create_directory_makes_every_missing_level() {
		let (_dir, base) = scratch();
		let config = config_for(&base);
		let result = execute_tool(&config, "create_directory", &json!({ "path": "one/two/three" })).await.expect("tool");
		assert!(result.get("isError").is_none(), "{}", result);
		assert_eq!(result["structuredContent"]["created"], true);
		assert!(base.join("one/two/three").is_dir());
		let result = execute_tool(&config, "write_file", &json!({ "path": "four/five/a.txt", "content": "x" })).await.expect("tool");
		assert_eq!(result["structuredContent"]["code"], "PARENT_NOT_FOUND");
	}

	#[tokio::test]
	async fn python_tools_check_sandbox_before_helper() {
		let (_dir, base) = scratch();
		let helper = Arc::new(RecordingHelper::default());
		let mut config = config_for(&base);
		config.helper = Some(helper.clone());
		let result = execute_tool(&config, "python_fix_indentation", &json!({ "file_path": "/etc/passwd" })).await.expect("tool");
		assert_eq!(result["structuredContent"]["code"], "ACCESS_DENIED");
		assert!(helper.calls.lock().expect("calls").is_empty());
		config.helper = None;
		std::fs::write(base.join("m.py"), "x = 1\n").expect("write");
		let result = execute_tool(&config, "python_fix_indentation", &json!({ "file_path": "m.py" })).await.expect("tool");
		assert_eq!(result["structuredContent"]["code"], "HELPER_FAILED");
	}

	#[test]
	fn messages_summarize_results() {
		let listing = json!({
			"path": "/w",
			"entries": [{ "name": "src", "type": "directory" }, { "name": "a.txt", "type": "file" }]
		});
		assert_eq!(tool_message("list_directory", &listing), "[DIR] src\n[FILE] a.txt");
		assert_eq!(tool_message("search_files", &json!({ "matches": [] })), "No matches found");
		let files = json!({
			"files": [
				{ "path": "a.txt", "content": "A" },
				{ "path": "b.txt", "error": "access denied", "code": "ACCESS_DENIED" }
			]
		});
		assert_eq!(tool_message("read_multiple_files", &files), "a.txt:\nA\n---\nb.txt: Error - access denied");
	}
}

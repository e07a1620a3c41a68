use crate::helper::{CodeTransformHelper, PythonHelper};
use crate::sandbox::{AllowedRoot, PathSandbox};
use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_HELPER_TIMEOUT_SECS: u64 = 60;

/// Raw settings as collected from env, flags, and the config file, before any path is checked.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
	pub roots: Vec<String>,
	pub helper_dir: Option<String>,
	pub python: String,
	pub helper_timeout: Option<u64>,
	pub otel_enabled: bool,
	pub otel_endpoint: String,
	pub otel_service_name: String,
	pub config_path: Option<String>,
	pub print_schema: bool,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			roots: Vec::new(),
			helper_dir: None,
			python: String::from("python3"),
			helper_timeout: Some(DEFAULT_HELPER_TIMEOUT_SECS),
			otel_enabled: false,
			otel_endpoint: String::from("http://127.0.0.1:4317"),
			otel_service_name: String::from("mcp-fs-edit"),
			config_path: None,
			print_schema: false
		}
	}
}

#[derive(Clone)]
pub struct Config {
	pub sandbox: PathSandbox,
	pub helper: Option<Arc<dyn CodeTransformHelper>>,
	pub otel_enabled: bool,
	pub otel_endpoint: String,
	pub otel_service_name: String,
	pub session_id: String,
}

impl Config {
	pub fn build(settings: Settings, cwd: &Path) -> Result<Self> {
		if settings.roots.is_empty() {
			return Err(anyhow!("at least one allowed directory is required"));
		}
		let roots = settings.roots
			.iter()
			.map(|raw| AllowedRoot::new(raw, cwd))
			.collect::<Result<Vec<_>>>()?;
		let helper = match &settings.helper_dir {
			Some(dir) => {
				let expanded = shellexpand::tilde(dir);
				let script_dir = cwd.join(expanded.as_ref());
				if !script_dir.is_dir() {
					return Err(anyhow!("helper directory {} is not a directory", script_dir.display()));
				}
				let timeout = settings.helper_timeout.map(Duration::from_secs);
				let helper: Arc<dyn CodeTransformHelper> = Arc::new(PythonHelper::new(settings.python.clone(), script_dir, timeout));
				Some(helper)
			}
			None => None,
		};
		Ok(Self {
			sandbox: PathSandbox::new(roots, cwd.to_path_buf()),
			helper,
			otel_enabled: settings.otel_enabled,
			otel_endpoint: settings.otel_endpoint,
			otel_service_name: settings.otel_service_name,
			session_id: uuid::Uuid::new_v4().to_string()
		})
	}
}

pub fn load_config() -> Result<Config> {
	let settings = parse_settings(std::env::args().skip(1), |key| std::env::var(key).ok())?;
	if settings.print_schema {
		let payload = serde_json::to_string_pretty(&config_schema())?;
		println!("{}", payload);
		std::process::exit(0);
	}
	let cwd = std::env::current_dir()?;
	let settings = match settings.config_path.clone() {
		Some(path) => {
			let value = load_config_value(&path)?;
			apply_config_override(settings, &value)?
		}
		None => settings,
	};
	Config::build(settings, &cwd)
}

/// Env vars first, then flags; positional arguments and `MCP_ALLOWED_ROOTS` both add roots.
pub fn parse_settings<I, E>(args: I, env: E) -> Result<Settings>
where
	I: IntoIterator<Item = String>,
	E: Fn(&str) -> Option<String>, {
	let mut settings = Settings::default();
	let env_value = |key: &str| env(key).filter(|value| !value.trim().is_empty());
	if let Some(env_roots) = env_value("MCP_ALLOWED_ROOTS") {
		for value in env_roots.split(',') {
			let trimmed = value.trim();
			if !trimmed.is_empty() {
				settings.roots.push(trimmed.to_string());
			}
		}
	}
	if let Some(dir) = env_value("MCP_HELPER_DIR") {
		settings.helper_dir = Some(dir);
	}
	if let Some(python) = env_value("MCP_PYTHON") {
		settings.python = python;
	}
	if let Some(timeout) = env_value("MCP_HELPER_TIMEOUT") {
		settings.helper_timeout = parse_timeout(&timeout, "MCP_HELPER_TIMEOUT")?;
	}
	if let Some(enabled) = env_value("MCP_OTEL_ENABLED") {
		settings.otel_enabled = parse_bool(&enabled, "MCP_OTEL_ENABLED")?;
	}
	if let Some(endpoint) = env_value("MCP_OTEL_ENDPOINT") {
		settings.otel_endpoint = endpoint;
	}
	if let Some(service) = env_value("MCP_OTEL_SERVICE_NAME") {
		settings.otel_service_name = service;
	}
	if let Some(path) = env_value("MCP_CONFIG") {
		settings.config_path = Some(path);
	}
	let mut args = args.into_iter();
	while let Some(arg) = args.next() {
		match arg.as_str() {
			"--config" => {
				let value = args.next().ok_or_else(|| anyhow!("--config requires a value"))?;
				settings.config_path = Some(value);
			}
			"--print-config-schema" => {
				settings.print_schema = true;
			}
			"--helper-dir" => {
				let value = args.next().ok_or_else(|| anyhow!("--helper-dir requires a value"))?;
				settings.helper_dir = Some(value);
			}
			"--python" => {
				let value = args.next().ok_or_else(|| anyhow!("--python requires a value"))?;
				settings.python = value;
			}
			"--helper-timeout" => {
				let value = args.next().ok_or_else(|| anyhow!("--helper-timeout requires a value"))?;
				settings.helper_timeout = parse_timeout(&value, "--helper-timeout")?;
			}
			"--otel-enabled" => {
				let value = args.next().ok_or_else(|| anyhow!("--otel-enabled requires a value"))?;
				settings.otel_enabled = parse_bool(&value, "--otel-enabled")?;
			}
			"--otel-endpoint" => {
				let value = args.next().ok_or_else(|| anyhow!("--otel-endpoint requires a value"))?;
				settings.otel_endpoint = value;
			}
			"--otel-service-name" => {
				let value = args.next().ok_or_else(|| anyhow!("--otel-service-name requires a value"))?;
				settings.otel_service_name = value;
			}
			flag if flag.starts_with("--") => return Err(anyhow!("unknown argument: {}", arg)),
			_ => {
				if !arg.trim().is_empty() {
					settings.roots.push(arg);
				}
			}
		}
	}
	Ok(settings)
}

pub fn config_schema() -> Value {
	json!({
		"$schema": "http://json-schema.org/draft-07/schema#",
		"title": "mcp-fs-edit configuration",
		"type": "object",
		"additionalProperties": false,
		"properties": {
			"roots": {
				"type": "array",
				"minItems": 1,
				"items": { "type": "string" },
				"description": "Allowed directories. Replaces the directories given on the command line."
			},
			"helper_dir": {
				"type": ["string", "null"],
				"description": "Directory holding the Python helper scripts."
			},
			"python": {
				"type": "string",
				"description": "Interpreter used to run the helper scripts."
			},
			"helper_timeout": {
				"type": "integer",
				"minimum": 0,
				"description": "Seconds a helper may run before it is killed; 0 disables the limit."
			},
			"otel_enabled": {
				"type": "boolean",
				"description": "Enable OTLP trace export."
			},
			"otel_endpoint": {
				"type": "string",
				"description": "OTLP endpoint."
			},
			"otel_service_name": {
				"type": "string",
				"description": "OTEL service.name."
			}
		}
	})
}

fn load_config_value(path: &str) -> Result<Value> {
	let content = std::fs::read_to_string(path)
		.map_err(|err| anyhow!("failed to read config {}: {}", path, err))?;
	let value: Value = serde_json::from_str(&content)
		.map_err(|err| anyhow!("failed to parse config {}: {}", path, err))?;
	Ok(value)
}

pub fn apply_config_override(base: Settings, value: &Value) -> Result<Settings> {
	let obj = value.as_object().ok_or_else(|| anyhow!("config must be an object"))?;
	let mut next = base;
	for (key, value) in obj {
		match key.as_str() {
			"roots" => {
				let items = value.as_array().ok_or_else(|| anyhow!("roots must be an array"))?;
				next.roots = items.iter()
					.map(|item| {
						item.as_str()
							.map(|path| path.to_string())
							.ok_or_else(|| anyhow!("roots must contain strings"))
					})
					.collect::<Result<Vec<_>>>()?;
			}
			"helper_dir" => {
				next.helper_dir = match value {
					Value::Null => None,
					_ => Some(value.as_str().ok_or_else(|| anyhow!("helper_dir must be a string"))?.to_string()),
				};
			}
			"python" => {
				if !value.is_null() {
					next.python = value.as_str().ok_or_else(|| anyhow!("python must be a string"))?.to_string();
				}
			}
			"helper_timeout" => {
				if !value.is_null() {
					let secs = value.as_u64().ok_or_else(|| anyhow!("helper_timeout must be a non-negative integer"))?;
					next.helper_timeout = (secs > 0).then_some(secs);
				}
			}
			"otel_enabled" => {
				if !value.is_null() {
					next.otel_enabled = value.as_bool().ok_or_else(|| anyhow!("otel_enabled must be a boolean"))?;
				}
			}
			"otel_endpoint" => {
				if !value.is_null() {
					next.otel_endpoint = value.as_str().ok_or_else(|| anyhow!("otel_endpoint must be a string"))?.to_string();
				}
			}
			"otel_service_name" => {
				if !value.is_null() {
					next.otel_service_name = value.as_str().ok_or_else(|| anyhow!("otel_service_name must be a string"))?.to_string();
				}
			}
			_ => return Err(anyhow!("unknown config key: {}", key)),
		}
	}
	Ok(next)
}

fn parse_timeout(value: &str, label: &str) -> Result<Option<u64>> {
	let secs = value.trim()
		.parse::<u64>()
		.map_err(|_| anyhow!("{} must be a non-negative integer", label))?;
	Ok((secs > 0).then_some(secs))
}

fn parse_bool(value: &str, label: &str) -> Result<bool> {
	let value = value.trim().to_lowercase();
	match value.as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		_ => Err(anyhow!("{} must be a boolean", label)),
	}
}

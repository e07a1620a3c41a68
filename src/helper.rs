use crate::error::FsError;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HelperOperation {
	AddImport,
	AddMethod,
	AddClass,
	AddParameter,
	UpdateMethod,
	UpdateClass,
	RemoveClass,
	MoveMethod,
	MoveCode,
	FixIndentation,
}

impl HelperOperation {
	pub const ALL: [HelperOperation; 10] = [
		HelperOperation::AddImport,
		HelperOperation::AddMethod,
		HelperOperation::AddClass,
		HelperOperation::AddParameter,
		HelperOperation::UpdateMethod,
		HelperOperation::UpdateClass,
		HelperOperation::RemoveClass,
		HelperOperation::MoveMethod,
		HelperOperation::MoveCode,
		HelperOperation::FixIndentation,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			HelperOperation::AddImport => "add_import",
			HelperOperation::AddMethod => "add_method",
			HelperOperation::AddClass => "add_class",
			HelperOperation::AddParameter => "add_parameter",
			HelperOperation::UpdateMethod => "update_method",
			HelperOperation::UpdateClass => "update_class",
			HelperOperation::RemoveClass => "remove_class",
			HelperOperation::MoveMethod => "move_method",
			HelperOperation::MoveCode => "move_code",
			HelperOperation::FixIndentation => "fix_indentation",
		}
	}

	pub fn tool_name(self) -> String {
		format!("python_{}", self.as_str())
	}

	pub fn from_tool_name(name: &str) -> Option<Self> {
		let op = name.strip_prefix("python_")?;
		Self::ALL.into_iter().find(|candidate| candidate.as_str() == op)
	}

	/// Payload keys holding file paths; these go through the sandbox before the helper runs.
	pub fn path_fields(self) -> &'static [&'static str] {
		match self {
			HelperOperation::MoveMethod | HelperOperation::MoveCode => &["source_file", "target_file"],
			_ => &["file_path"],
		}
	}
}

#[async_trait]
pub trait CodeTransformHelper: Send + Sync {
	async fn invoke(&self, operation: HelperOperation, payload: &Value) -> Result<(), FsError>;
}

/// Runs `<interpreter> <script_dir>/<operation>.py '<payload>'` and waits for it.
pub struct PythonHelper {
	interpreter: String,
	script_dir: PathBuf,
	timeout: Option<Duration>,
}

impl PythonHelper {
	pub fn new(interpreter: impl Into<String>, script_dir: PathBuf, timeout: Option<Duration>) -> Self {
		Self {
			interpreter: interpreter.into(),
			script_dir,
			timeout
		}
	}

	fn failure(operation: HelperOperation, message: impl Into<String>) -> FsError {
		FsError::HelperProcess {
			operation: operation.as_str().to_string(),
			message: message.into()
		}
	}
}

#[async_trait]
impl CodeTransformHelper for PythonHelper {
	async fn invoke(&self, operation: HelperOperation, payload: &Value) -> Result<(), FsError> {
		let script = self.script_dir.join(format!("{}.py", operation.as_str()));
		if !script.is_file() {
			return Err(Self::failure(operation, format!("helper script not found: {}", script.display())));
		}
		let mut cmd = Command::new(&self.interpreter);
		cmd.arg(&script)
			.arg(payload.to_string())
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true);
		debug!(operation = operation.as_str(), script = %script.display(), "spawning python helper");
		let child = cmd.spawn().map_err(|err| Self::failure(operation, format!("spawn {}: {}", self.interpreter, err)))?;
		let output = match self.timeout {
			Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
				Ok(result) => result,
				Err(_) => {
					warn!(operation = operation.as_str(), timeout = ?limit, "python helper timed out");
					return Err(Self::failure(operation, format!("timed out after {:?}", limit)));
				}
			},
			None => child.wait_with_output().await,
		}
		.map_err(|err| Self::failure(operation, err.to_string()))?;
		if output.status.success() {
			return Ok(());
		}
		let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
		let status = match output.status.code() {
			Some(code) => format!("exit status {}", code),
			None => "terminated by signal".to_string(),
		};
		warn!(operation = operation.as_str(), %status, "python helper failed");
		if stderr.is_empty() {
			Err(Self::failure(operation, status))
		}
		else {
			Err(Self::failure(operation, format!("{}: {}", status, stderr)))
		}
	}
}

#[cfg(all(test, unix))]
mod tests {
	use super::*;
	use serde_json::json;

	fn helper_with(script: &str, op: HelperOperation, timeout: Option<Duration>) -> (tempfile::TempDir, PythonHelper) {
		let dir = tempfile::tempdir().expect("tempdir");
		std::fs::write(dir.path().join(format!("{}.py", op.as_str())), script).expect("script");
		let helper = PythonHelper::new("sh", dir.path().to_path_buf(), timeout);
		(dir, helper)
	}

	#[test]
	fn tool_names_round_trip() {
		for op in HelperOperation::ALL {
			assert_eq!(HelperOperation::from_tool_name(&op.tool_name()), Some(op));
		}
		assert_eq!(HelperOperation::from_tool_name("python_eval"), None);
		assert_eq!(HelperOperation::from_tool_name("add_method"), None);
	}

	#[tokio::test]
	async fn success_exit_is_ok() {
		let (dir, helper) = helper_with("echo \"$1\" > \"$(dirname \"$0\")/payload.json\"\n", HelperOperation::RemoveClass, None);
		let payload = json!({ "file_path": "/tmp/x.py", "class_name": "A" });
		helper.invoke(HelperOperation::RemoveClass, &payload).await.expect("helper ok");
		let written = std::fs::read_to_string(dir.path().join("payload.json")).expect("payload");
		let parsed: Value = serde_json::from_str(written.trim()).expect("json payload");
		assert_eq!(parsed, payload);
	}

	#[tokio::test]
	async fn non_zero_exit_is_helper_error() {
		let (_dir, helper) = helper_with("echo 'class not found' >&2\nexit 3\n", HelperOperation::RemoveClass, None);
		let err = helper.invoke(HelperOperation::RemoveClass, &json!({})).await.unwrap_err();
		assert_eq!(err.code(), "HELPER_FAILED");
		assert_eq!(err.to_string(), "python helper remove_class failed: exit status 3: class not found");
	}

	#[tokio::test]
	async fn missing_script_is_reported() {
		let (_dir, helper) = helper_with("exit 0\n", HelperOperation::RemoveClass, None);
		let err = helper.invoke(HelperOperation::AddClass, &json!({})).await.unwrap_err();
		assert!(err.to_string().contains("helper script not found"));
	}

	#[tokio::test]
	async fn hung_helper_times_out() {
		let (_dir, helper) = helper_with("sleep 5\n", HelperOperation::FixIndentation, Some(Duration::from_millis(200)));
		let err = helper.invoke(HelperOperation::FixIndentation, &json!({})).await.unwrap_err();
		assert!(err.to_string().contains("timed out"));
	}
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct Request {
	/// Absent for notifications.
	#[serde(default)]
	pub id: Option<Value>,
	pub method: String,
	#[serde(default)]
	pub params: Value,
}

impl Request {
	pub fn is_notification(&self) -> bool {
		self.id.is_none() || self.method.starts_with("notifications/")
	}
}

#[derive(Debug, Serialize)]
pub struct Response {
	pub jsonrpc: &'static str,
	pub id: Value,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorObject>,
}

#[derive(Debug, Serialize)]
pub struct ErrorObject {
	pub code: i64,
	pub message: String,
}

impl Response {
	pub fn ok(id: Value, result: Value) -> Self {
		Self {
			jsonrpc: "2.0",
			id,
			result: Some(result),
			error: None
		}
	}

	pub fn err(id: Value, code: i64, message: impl Into<String>) -> Self {
		Self {
			jsonrpc: "2.0",
			id,
			result: None,
			error: Some(ErrorObject {
				code,
				message: message.into()
			})
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn requests_without_id_are_notifications() {
		let req: Request = serde_json::from_value(json!({ "jsonrpc": "2.0", "method": "notifications/initialized" })).unwrap();
		assert!(req.is_notification());
		assert!(req.params.is_null());
		let req: Request = serde_json::from_value(json!({ "jsonrpc": "2.0", "id": 7, "method": "tools/list" })).unwrap();
		assert!(!req.is_notification());
	}

	#[test]
	fn responses_carry_version_and_skip_empty_fields() {
		let value = serde_json::to_value(Response::err(json!(3), -32601, "method not found")).unwrap();
		assert_eq!(value, json!({
			"jsonrpc": "2.0",
			"id": 3,
			"error": { "code": -32601, "message": "method not found" }
		}));
	}
}

use std::fmt;
use std::io;
use thiserror::Error;

/// A 1-based position inside a file's content, with the literal text of that line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
	pub line: usize,
	pub column: usize,
	pub text: String,
}

impl Location {
	pub fn caret(&self) -> String {
		let wanted = self.column.saturating_sub(1);
		let mut marker = String::new();
		let mut taken = 0usize;
		for ch in self.text.chars().take(wanted) {
			// keep tabs so the caret lines up under tab-indented code
			marker.push(if ch == '\t' {
				'\t'
			}
			else {
				' '
			});
			taken += 1;
		}
		for _ in taken..wanted {
			marker.push(' ');
		}
		marker.push('^');
		marker
	}
}

impl fmt::Display for Location {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"line {}, column {}\n{}\n{}",
			self.line,
			self.column,
			self.text,
			self.caret()
		)
	}
}

#[derive(Debug, Error)]
pub enum FsError {
	#[error("invalid arguments: {0}")]
	ArgumentValidation(String),
	#[error("access denied: {path} is outside the allowed directories")]
	AccessDenied {
		path: String,
	},
	#[error("parent directory not found for {path}")]
	ParentNotFound {
		path: String,
	},
	#[error("invalid offset {offset}: content has {length} character(s){}", at(.location))]
	InvalidOffset {
		offset: usize,
		length: usize,
		location: Option<Location>,
	},
	#[error("invalid line number {line}: file has {line_count} line(s){}", at(.location))]
	InvalidLineNumber {
		line: usize,
		line_count: usize,
		location: Option<Location>,
	},
	#[error("unbalanced delimiters: {detail} at {location}")]
	UnbalancedDelimiters {
		detail: String,
		location: Location,
	},
	#[error("{action} {path}: {source}")]
	Io {
		action: &'static str,
		path: String,
		#[source]
		source: io::Error,
	},
	#[error("find text not found: edit {index}")]
	FindNotFound {
		index: usize,
	},
	#[error("find text not unique: edit {index} matches {count} times")]
	FindNotUnique {
		index: usize,
		count: usize,
	},
	#[error("python helper {operation} failed: {message}")]
	HelperProcess {
		operation: String,
		message: String,
	},
}

fn at(location: &Option<Location>) -> String {
	match location {
		Some(location) => format!(" at {}", location),
		None => String::new(),
	}
}

impl FsError {
	pub fn io(action: &'static str, path: impl fmt::Display, source: io::Error) -> Self {
		Self::Io {
			action,
			path: path.to_string(),
			source
		}
	}

	pub fn invalid_arguments(message: impl Into<String>) -> Self {
		Self::ArgumentValidation(message.into())
	}

	pub fn code(&self) -> &'static str {
		match self {
			FsError::ArgumentValidation(_) => "INVALID_ARGUMENTS",
			FsError::AccessDenied { .. } => "ACCESS_DENIED",
			FsError::ParentNotFound { .. } => "PARENT_NOT_FOUND",
			FsError::InvalidOffset { .. } => "INVALID_OFFSET",
			FsError::InvalidLineNumber { .. } => "INVALID_LINE_NUMBER",
			FsError::UnbalancedDelimiters { .. } => "UNBALANCED_DELIMITERS",
			FsError::Io { source, .. } => io_code(source),
			FsError::FindNotFound { .. } => "FIND_NOT_FOUND",
			FsError::FindNotUnique { .. } => "FIND_NOT_UNIQUE",
			FsError::HelperProcess { .. } => "HELPER_FAILED",
		}
	}
}

pub fn io_code(err: &io::Error) -> &'static str {
	match err.kind() {
		io::ErrorKind::NotFound => "FILE_NOT_FOUND",
		io::ErrorKind::PermissionDenied => "PERMISSION_DENIED",
		io::ErrorKind::AlreadyExists => "TARGET_EXISTS",
		_ => "EXECUTION_ERROR",
	}
}

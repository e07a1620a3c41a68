//! Line-addressed edits applied in caller order.
//!
//! Line numbers are checked against the original content before anything is applied. While
//! applying, each operation sees the lines as left by the operations before it, and ranges that
//! run past the end are clamped.

use crate::error::FsError;
use crate::position::PositionIndex;
use crate::structure;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum LineEditKind {
	InsertLines,
	ReplaceLines,
	DeleteLines,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LineOperation {
	/// 1-based first line. For insertLines the new lines go before this line; one past the last line appends.
	pub start_line: usize,
	/// 1-based inclusive last line; required for replaceLines and deleteLines.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub end_line: Option<usize>,
	#[serde(alias = "type")]
	pub kind: LineEditKind,
	/// Replacement or inserted text, split into lines; required for insertLines and replaceLines.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub new_content: Option<String>,
}

#[derive(Debug)]
pub struct LineEditOutcome {
	pub content: String,
	pub applied: usize,
	pub line_count: usize,
}

struct Line {
	text: String,
	eol: &'static str,
}

/// Lines split on `\n`, each keeping its own terminator so mixed `\r\n`/`\n` files survive.
/// Inserted lines take the file's dominant terminator.
struct LineBuffer {
	lines: Vec<Line>,
	eol: &'static str,
	trailing_newline: bool,
}

impl LineBuffer {
	fn split(content: &str) -> Self {
		let eol = dominant_eol(content);
		let (body, trailing_newline) = match content.strip_suffix('\n') {
			Some(body) => (body, true),
			None => (content, false),
		};
		let lines = if content.is_empty() {
			Vec::new()
		}
		else {
			body.split('\n')
				.map(|piece| match piece.strip_suffix('\r') {
					Some(text) => Line {
						text: text.to_string(),
						eol: "\r\n"
					},
					None => Line {
						text: piece.to_string(),
						eol: "\n"
					},
				})
				.collect()
		};
		let mut buffer = Self {
			lines,
			eol,
			trailing_newline
		};
		if !trailing_newline {
			// an unterminated last line has no terminator of its own to keep
			if let Some(last) = buffer.lines.last_mut() {
				if last.eol == "\r\n" {
					last.text.push('\r');
				}
				last.eol = eol;
			}
		}
		buffer
	}

	fn new_lines(&self, text: &str) -> Vec<Line> {
		text_lines(text)
			.into_iter()
			.map(|text| Line {
				text,
				eol: self.eol
			})
			.collect()
	}

	fn join(&self) -> String {
		let mut out = String::new();
		for line in &self.lines {
			out.push_str(&line.text);
			out.push_str(line.eol);
		}
		if !self.trailing_newline {
			if let Some(last) = self.lines.last() {
				out.truncate(out.len() - last.eol.len());
			}
		}
		out
	}
}

fn dominant_eol(content: &str) -> &'static str {
	let crlf = content.matches("\r\n").count();
	let lf = content.matches('\n').count() - crlf;
	if crlf > lf {
		"\r\n"
	}
	else {
		"\n"
	}
}

pub fn apply(content: &str, operations: &[LineOperation], validate: bool) -> Result<LineEditOutcome, FsError> {
	let mut buffer = LineBuffer::split(content);
	let original_count = buffer.lines.len();
	let index = PositionIndex::build(content);
	for (position, operation) in operations.iter().enumerate() {
		check_operation(position, operation, original_count, &index)?;
	}
	for operation in operations {
		let len = buffer.lines.len();
		let at = (operation.start_line - 1).min(len);
		match operation.kind {
			LineEditKind::InsertLines => {
				let new_lines = buffer.new_lines(operation.new_content.as_deref().unwrap_or_default());
				buffer.lines.splice(at..at, new_lines);
			}
			LineEditKind::ReplaceLines => {
				let count = span(operation).min(len - at);
				let new_lines = buffer.new_lines(operation.new_content.as_deref().unwrap_or_default());
				buffer.lines.splice(at..at + count, new_lines);
			}
			LineEditKind::DeleteLines => {
				let count = span(operation).min(len - at);
				buffer.lines.drain(at..at + count);
			}
		}
	}
	let joined = buffer.join();
	if validate {
		if let Err(err) = structure::check(&joined) {
			let FsError::UnbalancedDelimiters { detail, location } = err else {
				return Err(err);
			};
			warn!(operations = operations.len(), "line edit batch rejected by structural check");
			return Err(FsError::UnbalancedDelimiters {
				detail: format!("{} after applying {} line operation(s)", detail, operations.len()),
				location
			});
		}
	}
	debug!(applied = operations.len(), lines = buffer.lines.len(), "applied line edit batch");
	Ok(LineEditOutcome {
		content: joined,
		applied: operations.len(),
		line_count: buffer.lines.len()
	})
}

fn check_operation(position: usize, operation: &LineOperation, line_count: usize, index: &PositionIndex) -> Result<(), FsError> {
	let invalid_line = |line: usize| FsError::InvalidLineNumber {
		line,
		line_count,
		location: Some(index.end_of_line_location(line))
	};
	if operation.start_line == 0 {
		return Err(invalid_line(0));
	}
	match operation.kind {
		LineEditKind::InsertLines => {
			if operation.new_content.is_none() {
				return Err(FsError::invalid_arguments(format!("operation {}: insertLines requires newContent", position)));
			}
			if operation.start_line > line_count + 1 {
				return Err(invalid_line(operation.start_line));
			}
		}
		LineEditKind::ReplaceLines | LineEditKind::DeleteLines => {
			let name = match operation.kind {
				LineEditKind::ReplaceLines => "replaceLines",
				_ => "deleteLines",
			};
			let Some(end_line) = operation.end_line else {
				return Err(FsError::invalid_arguments(format!("operation {}: {} requires endLine", position, name)));
			};
			if operation.kind == LineEditKind::ReplaceLines && operation.new_content.is_none() {
				return Err(FsError::invalid_arguments(format!("operation {}: replaceLines requires newContent", position)));
			}
			if end_line < operation.start_line {
				return Err(FsError::invalid_arguments(format!(
					"operation {}: endLine {} is before startLine {}",
					position, end_line, operation.start_line
				)));
			}
			if operation.start_line > line_count {
				return Err(invalid_line(operation.start_line));
			}
			if end_line > line_count {
				return Err(invalid_line(end_line));
			}
		}
	}
	Ok(())
}

fn span(operation: &LineOperation) -> usize {
	operation.end_line
		.map(|end| end + 1 - operation.start_line)
		.unwrap_or(1)
}

fn text_lines(text: &str) -> Vec<String> {
	if text.is_empty() {
		return vec![String::new()];
	}
	text.lines()
		.map(str::to_string)
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	fn op(kind: LineEditKind, start_line: usize, end_line: Option<usize>, text: Option<&str>) -> LineOperation {
		LineOperation {
			start_line,
			end_line,
			kind,
			new_content: text.map(str::to_string)
		}
	}

	#[test]
	fn replaces_a_single_line() {
		let outcome = apply(
			"alpha\nbeta\ngamma",
			&[op(LineEditKind::ReplaceLines, 2, Some(2), Some("BETA"))],
			false
		).unwrap();
		assert_eq!(outcome.content, "alpha\nBETA\ngamma");
		assert_eq!(outcome.line_count, 3);
	}

	#[rstest]
	#[case(op(LineEditKind::InsertLines, 1, None, Some("zero")), "zero\none\ntwo\n")]
	#[case(op(LineEditKind::InsertLines, 3, None, Some("three")), "one\ntwo\nthree\n")]
	#[case(op(LineEditKind::InsertLines, 2, None, Some("a\nb\n")), "one\na\nb\ntwo\n")]
	#[case(op(LineEditKind::DeleteLines, 1, Some(1), None), "two\n")]
	#[case(op(LineEditKind::DeleteLines, 1, Some(2), None), "")]
	#[case(op(LineEditKind::ReplaceLines, 1, Some(2), Some("only")), "only\n")]
	#[case(op(LineEditKind::ReplaceLines, 2, Some(2), Some("")), "one\n\n")]
	fn keeps_trailing_newline(#[case] operation: LineOperation, #[case] expected: &str) {
		let outcome = apply("one\ntwo\n", &[operation], false).unwrap();
		assert_eq!(outcome.content, expected);
	}

	#[test]
	fn insert_one_past_last_line_appends() {
		let outcome = apply("a\nb", &[op(LineEditKind::InsertLines, 3, None, Some("c"))], false).unwrap();
		assert_eq!(outcome.content, "a\nb\nc");
	}

	#[test]
	fn insert_into_empty_file() {
		let outcome = apply("", &[op(LineEditKind::InsertLines, 1, None, Some("first"))], false).unwrap();
		assert_eq!(outcome.content, "first");
	}

	#[test]
	fn crlf_is_preserved() {
		let outcome = apply(
			"one\r\ntwo\r\n",
			&[op(LineEditKind::ReplaceLines, 2, Some(2), Some("TWO"))],
			false
		).unwrap();
		assert_eq!(outcome.content, "one\r\nTWO\r\n");
	}

	#[test]
	fn mixed_line_endings_keep_every_line() {
		let content = "a\r\nb\nc\n";
		let outcome = apply(content, &[op(LineEditKind::ReplaceLines, 2, Some(2), Some("B"))], false).unwrap();
		assert_eq!(outcome.content, "a\r\nB\nc\n");
		assert_eq!(outcome.line_count, 3);
		let outcome = apply(content, &[op(LineEditKind::ReplaceLines, 3, Some(3), Some("C"))], false).unwrap();
		assert_eq!(outcome.content, "a\r\nb\nC\n");
		let outcome = apply(content, &[op(LineEditKind::DeleteLines, 1, Some(1), None)], false).unwrap();
		assert_eq!(outcome.content, "b\nc\n");
	}

	#[test]
	fn inserted_lines_use_dominant_ending() {
		let outcome = apply("a\r\nb\r\nc\n", &[op(LineEditKind::InsertLines, 4, None, Some("d"))], false).unwrap();
		assert_eq!(outcome.content, "a\r\nb\r\nc\nd\r\n");
		let outcome = apply("a\r\nb", &[op(LineEditKind::InsertLines, 3, None, Some("c"))], false).unwrap();
		assert_eq!(outcome.content, "a\r\nb\r\nc");
	}

	#[test]
	fn unterminated_last_line_keeps_carriage_return() {
		let outcome = apply("a\nb\r", &[op(LineEditKind::ReplaceLines, 1, Some(1), Some("A"))], false).unwrap();
		assert_eq!(outcome.content, "A\nb\r");
	}

	#[test]
	fn later_operations_see_earlier_changes() {
		let outcome = apply(
			"a\nb\nc",
			&[
				op(LineEditKind::DeleteLines, 1, Some(1), None),
				op(LineEditKind::ReplaceLines, 1, Some(1), Some("B"))
			],
			false
		).unwrap();
		assert_eq!(outcome.content, "B\nc");
	}

	#[test]
	fn ranges_past_the_shrunken_end_are_clamped() {
		let outcome = apply(
			"a\nb\nc",
			&[
				op(LineEditKind::DeleteLines, 1, Some(2), None),
				op(LineEditKind::DeleteLines, 2, Some(3), None),
				op(LineEditKind::InsertLines, 4, None, Some("z"))
			],
			false
		).unwrap();
		assert_eq!(outcome.content, "c\nz");
	}

	#[test]
	fn out_of_range_lines_fail_before_anything_applies() {
		let err = apply(
			"a\nb\nc",
			&[
				op(LineEditKind::ReplaceLines, 1, Some(1), Some("A")),
				op(LineEditKind::DeleteLines, 2, Some(7), None)
			],
			false
		).unwrap_err();
		let FsError::InvalidLineNumber { line, line_count, location } = err else {
			panic!("expected invalid line number");
		};
		assert_eq!((line, line_count), (7, 3));
		let location = location.expect("location");
		assert_eq!((location.line, location.column), (3, 2));
		assert_eq!(location.text, "c");
	}

	#[rstest]
	#[case(op(LineEditKind::InsertLines, 5, None, Some("x")))]
	#[case(op(LineEditKind::ReplaceLines, 4, Some(4), Some("x")))]
	#[case(op(LineEditKind::DeleteLines, 0, Some(1), None))]
	fn rejects_line_numbers_outside_file(#[case] operation: LineOperation) {
		let err = apply("a\nb\nc", &[operation], false).unwrap_err();
		assert!(matches!(err, FsError::InvalidLineNumber { .. }));
	}

	#[rstest]
	#[case(op(LineEditKind::DeleteLines, 1, None, None))]
	#[case(op(LineEditKind::ReplaceLines, 1, Some(1), None))]
	#[case(op(LineEditKind::InsertLines, 1, None, None))]
	#[case(op(LineEditKind::DeleteLines, 2, Some(1), None))]
	fn rejects_incomplete_operations(#[case] operation: LineOperation) {
		let err = apply("a\nb\nc", &[operation], false).unwrap_err();
		assert!(matches!(err, FsError::ArgumentValidation(_)));
	}

	#[test]
	fn validates_final_content_once() {
		let content = "fn main() {\n    run();\n}\n";
		let err = apply(content, &[op(LineEditKind::DeleteLines, 3, Some(3), None)], true).unwrap_err();
		let FsError::UnbalancedDelimiters { detail, location } = err else {
			panic!("expected unbalanced delimiters");
		};
		assert!(detail.starts_with("unclosed '{'"));
		assert_eq!((location.line, location.column), (1, 11));
		// an intermediate imbalance is fine when the final content balances
		let outcome = apply(
			content,
			&[
				op(LineEditKind::DeleteLines, 3, Some(3), None),
				op(LineEditKind::InsertLines, 3, None, Some("}"))
			],
			true
		).unwrap();
		assert_eq!(outcome.content, content);
	}
}

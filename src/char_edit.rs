//! Offset-addressed edits applied as one batch.
//!
//! Every operation addresses the original content. The batch is applied from the rightmost
//! edit to the leftmost, so an applied edit never moves the coordinates of one still pending.

use crate::error::FsError;
use crate::position::PositionIndex;
use crate::structure;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CharEditKind {
	Insert,
	Replace,
	Delete,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CharOperation {
	/// Zero-based character offset where the operation starts.
	pub start_position: usize,
	/// Exclusive end offset; required for replace and delete, ignored by insert.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub end_position: Option<usize>,
	#[serde(alias = "type")]
	pub kind: CharEditKind,
	/// Text to insert; required for insert and replace.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub new_content: Option<String>,
}

#[derive(Debug)]
pub struct CharEditOutcome {
	pub content: String,
	pub applied: usize,
	pub shift: isize,
}

#[derive(Debug)]
struct PlannedEdit<'a> {
	index: usize,
	start: usize,
	end: usize,
	text: &'a str,
}

pub fn apply(content: &str, operations: &[CharOperation], validate: bool) -> Result<CharEditOutcome, FsError> {
	let index = PositionIndex::build(content);
	let mut planned = operations.iter()
		.enumerate()
		.map(|(position, operation)| plan(position, operation, &index))
		.collect::<Result<Vec<_>, _>>()?;
	planned.sort_by(|a, b| (a.start, a.end, a.index).cmp(&(b.start, b.end, b.index)));
	reject_overlaps(&planned)?;
	// byte ranges are taken from the untouched content; right-to-left application keeps them valid
	let bounds = planned.iter()
		.flat_map(|edit| [edit.start, edit.end])
		.collect::<Vec<_>>();
	let bytes = char_to_byte(content, &bounds);
	let byte_ranges = bytes.chunks(2)
		.map(|pair| (pair[0], pair[1]))
		.collect::<Vec<_>>();
	let mut buffer = content.to_string();
	let mut shift = 0isize;
	let mut applied = 0usize;
	let total = planned.len();
	for (edit, (byte_start, byte_end)) in planned.iter().zip(byte_ranges).rev() {
		buffer.replace_range(byte_start..byte_end, edit.text);
		shift += edit.text.chars().count() as isize - (edit.end - edit.start) as isize;
		applied += 1;
		if !validate {
			continue;
		}
		if let Err(err) = structure::check(&buffer) {
			let FsError::UnbalancedDelimiters { detail, location } = err else {
				return Err(err);
			};
			warn!(
				operation = edit.index,
				applied,
				total,
				"character edit batch aborted by structural check"
			);
			return Err(FsError::UnbalancedDelimiters {
				detail: format!(
					"{} after operation {} ({} of {} applied, net shift {:+})",
					detail,
					edit.index,
					applied,
					total,
					shift
				),
				location
			});
		}
	}
	debug!(applied, shift, "applied character edit batch");
	Ok(CharEditOutcome {
		content: buffer,
		applied,
		shift
	})
}

fn plan<'a>(position: usize, operation: &'a CharOperation, index: &PositionIndex) -> Result<PlannedEdit<'a>, FsError> {
	let start = operation.start_position;
	// checked for every kind, inserts included
	if let Some(end) = operation.end_position.filter(|end| *end < start) {
		return Err(FsError::invalid_arguments(format!(
			"operation {}: endPosition {} is before startPosition {}",
			position, end, start
		)));
	}
	let (end, text) = match operation.kind {
		CharEditKind::Insert => {
			let text = required_text(position, operation)?;
			(start, text)
		}
		CharEditKind::Replace => {
			let end = required_end(position, operation)?;
			let text = required_text(position, operation)?;
			(end, text)
		}
		CharEditKind::Delete => (required_end(position, operation)?, ""),
	};
	for offset in [start, end] {
		if offset > index.len() {
			return Err(FsError::InvalidOffset {
				offset,
				length: index.len(),
				location: Some(index.location(offset))
			});
		}
	}
	Ok(PlannedEdit {
		index: position,
		start,
		end,
		text
	})
}

fn required_end(position: usize, operation: &CharOperation) -> Result<usize, FsError> {
	operation.end_position.ok_or_else(|| FsError::invalid_arguments(format!(
		"operation {}: {} requires endPosition",
		position,
		kind_name(operation.kind)
	)))
}

fn required_text(position: usize, operation: &CharOperation) -> Result<&str, FsError> {
	operation.new_content
		.as_deref()
		.ok_or_else(|| FsError::invalid_arguments(format!(
			"operation {}: {} requires newContent",
			position,
			kind_name(operation.kind)
		)))
}

fn kind_name(kind: CharEditKind) -> &'static str {
	match kind {
		CharEditKind::Insert => "insert",
		CharEditKind::Replace => "replace",
		CharEditKind::Delete => "delete",
	}
}

fn reject_overlaps(sorted: &[PlannedEdit<'_>]) -> Result<(), FsError> {
	let mut reach: Option<(usize, usize)> = None;
	for edit in sorted {
		if let Some((end, owner)) = reach {
			if edit.start < end {
				return Err(FsError::invalid_arguments(format!(
					"operations {} and {} overlap",
					owner.min(edit.index),
					owner.max(edit.index)
				)));
			}
		}
		if reach.map(|(end, _)| edit.end > end).unwrap_or(true) {
			reach = Some((edit.end, edit.index));
		}
	}
	Ok(())
}

/// Maps non-decreasing char offsets to byte offsets in one walk over `content`.
fn char_to_byte(content: &str, offsets: &[usize]) -> Vec<usize> {
	let mut boundaries = content.char_indices()
		.map(|(byte, _)| byte)
		.chain(std::iter::once(content.len()))
		.enumerate();
	let mut current = boundaries.next();
	let mut out = Vec::with_capacity(offsets.len());
	for &offset in offsets {
		while let Some((index, _)) = current {
			if index >= offset {
				break;
			}
			current = boundaries.next();
		}
		out.push(current.map(|(_, byte)| byte).unwrap_or(content.len()));
	}
	out
}

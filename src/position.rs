//! Line/column coordinates over a file's content.
//!
//! Offsets count Unicode scalar values, lines and columns are 1-based. An index is built
//! from one snapshot of the content and must be rebuilt after every mutation.

use crate::error::{FsError, Location};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineColumn {
	pub line: usize,
	pub column: usize,
}

#[derive(Debug)]
pub struct PositionIndex {
	lines: Vec<String>,
	line_starts: Vec<usize>,
	len: usize,
}

impl PositionIndex {
	pub fn build(content: &str) -> Self {
		let mut lines = Vec::new();
		let mut line_starts = Vec::new();
		let mut offset = 0usize;
		for line in content.split('\n') {
			line_starts.push(offset);
			offset += line.chars().count() + 1;
			lines.push(line.strip_suffix('\r').unwrap_or(line).to_string());
		}
		Self {
			lines,
			line_starts,
			len: offset.saturating_sub(1)
		}
	}

	pub fn len(&self) -> usize {
		self.len
	}

	pub fn line_count(&self) -> usize {
		self.lines.len()
	}

	#[cfg(test)]
	pub fn line_starts(&self) -> &[usize] {
		&self.line_starts
	}

	pub fn line_text(&self, line: usize) -> Option<&str> {
		line.checked_sub(1)
			.and_then(|index| self.lines.get(index))
			.map(String::as_str)
	}

	pub fn offset_to_line_column(&self, offset: usize) -> Result<LineColumn, FsError> {
		if offset > self.len {
			return Err(FsError::InvalidOffset {
				offset,
				length: self.len,
				location: None
			});
		}
		// line_starts[0] == 0, so at least one start is <= offset
		let index = self.line_starts.partition_point(|start| *start <= offset) - 1;
		Ok(LineColumn {
			line: index + 1,
			column: offset - self.line_starts[index] + 1
		})
	}

	pub fn line_column_to_offset(&self, line: usize, column: usize) -> Result<usize, FsError> {
		let Some(index) = line.checked_sub(1).filter(|index| *index < self.line_starts.len()) else {
			return Err(FsError::InvalidLineNumber {
				line,
				line_count: self.line_count(),
				location: None
			});
		};
		let start = self.line_starts[index];
		let end = match self.line_starts.get(index + 1) {
			Some(next) => next - 1,
			None => self.len,
		};
		if column == 0 || start + column - 1 > end {
			return Err(FsError::InvalidOffset {
				offset: start + column.saturating_sub(1),
				length: self.len,
				location: None
			});
		}
		Ok(start + column - 1)
	}

	/// Location of `offset`, clamped to the end of the content.
	pub fn location(&self, offset: usize) -> Location {
		let LineColumn { line, column } = self.offset_to_line_column(offset.min(self.len))
			.unwrap_or(LineColumn {
				line: 1,
				column: 1
			});
		Location {
			line,
			column,
			text: self.line_text(line).unwrap_or_default().to_string()
		}
	}

	/// Location just past the last character of `line`, or of the last line when `line` is beyond it.
	pub fn end_of_line_location(&self, line: usize) -> Location {
		let line = line.clamp(1, self.line_count());
		let width = self.lines[line - 1].chars().count();
		match self.line_column_to_offset(line, width + 1) {
			Ok(offset) => self.location(offset),
			Err(_) => self.location(self.line_starts[line - 1]),
		}
	}
}

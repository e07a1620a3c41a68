//! Balanced-delimiter sanity check for source files.
//!
//! The scan is a flat character stream: `{`, `(` and `[` inside string literals or comments
//! count like any other. It is a guard against obviously broken edits, not a parser.

use crate::error::FsError;
use crate::position::PositionIndex;
use std::path::Path;

const CHECKED_EXTENSIONS: &[&str] = &[
	"c", "cc", "cjs", "cpp", "cs", "css", "cxx", "go", "h", "hpp", "java", "js", "json", "jsx", "kt", "kts", "less",
	"mjs", "mts", "cts", "php", "py", "rs", "scala", "scss", "swift", "ts", "tsx",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Imbalance {
	pub offset: usize,
	pub detail: String,
}

pub fn validates(path: &Path) -> bool {
	path.extension()
		.and_then(|ext| ext.to_str())
		.map(|ext| {
			let ext = ext.to_ascii_lowercase();
			CHECKED_EXTENSIONS.contains(&ext.as_str())
		})
		.unwrap_or(false)
}

pub fn scan(content: &str) -> Option<Imbalance> {
	let mut stack: Vec<(char, usize)> = Vec::new();
	for (offset, ch) in content.chars().enumerate() {
		match ch {
			'{' | '(' | '[' => stack.push((ch, offset)),
			'}' | ')' | ']' => {
				let expected_open = opener_for(ch);
				match stack.pop() {
					Some((open, _)) if open == expected_open => {}
					Some((open, open_offset)) => {
						return Some(Imbalance {
							offset,
							detail: format!(
								"found '{}' but '{}' opened at offset {} expects '{}'",
								ch,
								open,
								open_offset,
								closer_for(open)
							)
						});
					}
					None => {
						return Some(Imbalance {
							offset,
							detail: format!("unexpected '{}' with no matching '{}'", ch, expected_open)
						});
					}
				}
			}
			_ => {}
		}
	}
	stack.pop().map(|(open, offset)| Imbalance {
		offset,
		detail: format!("unclosed '{}'", open)
	})
}

pub fn check(content: &str) -> Result<(), FsError> {
	let Some(imbalance) = scan(content) else {
		return Ok(());
	};
	let index = PositionIndex::build(content);
	Err(FsError::UnbalancedDelimiters {
		detail: imbalance.detail,
		location: index.location(imbalance.offset)
	})
}

fn opener_for(close: char) -> char {
	match close {
		'}' => '{',
		')' => '(',
		_ => '[',
	}
}

fn closer_for(open: char) -> char {
	match open {
		'{' => '}',
		'(' => ')',
		_ => ']',
	}
}

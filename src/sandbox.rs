//! Allow-list confinement for every path a tool touches.
//!
//! A requested path is expanded, made absolute, and lexically normalized, then checked against
//! the roots. If it exists, its symlink-resolved form is checked again. A target that does not
//! exist yet is authorized through the resolved form of its parent directory; directories to be
//! created recursively go through their nearest existing ancestor instead.
//!
//! `..` is removed lexically before any symlink is resolved, so `root/link/../x` names `root/x`
//! even when `link` points elsewhere. The result is still confined to the roots, but it may
//! differ from the file the OS would open for the same string.

use crate::error::FsError;
use anyhow::{anyhow, Result};
use std::ffi::OsStr;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

const CASE_INSENSITIVE: bool = cfg!(any(windows, target_os = "macos"));

#[derive(Clone, Debug)]
pub struct AllowedRoot {
	nominal: PathBuf,
	real: PathBuf,
	nominal_key: String,
	real_key: String,
}

impl AllowedRoot {
	pub fn new(raw: &str, cwd: &Path) -> Result<Self> {
		let expanded = shellexpand::tilde(raw);
		let path = PathBuf::from(expanded.as_ref());
		let absolute = if path.is_absolute() {
			path
		}
		else {
			cwd.join(path)
		};
		let nominal = normalize_path(&absolute);
		let real = dunce::canonicalize(&nominal).map_err(|err| anyhow!("allowed directory {}: {}", nominal.display(), err))?;
		let meta = std::fs::metadata(&real).map_err(|err| anyhow!("allowed directory {}: {}", nominal.display(), err))?;
		if !meta.is_dir() {
			return Err(anyhow!("allowed directory {} is not a directory", nominal.display()));
		}
		Ok(Self {
			nominal_key: comparison_key(&nominal),
			real_key: comparison_key(&real),
			nominal,
			real
		})
	}

	pub fn path(&self) -> &Path {
		&self.nominal
	}

	pub fn real_path(&self) -> &Path {
		&self.real
	}
}

/// A path that passed sandbox authorization. Only [`PathSandbox`] can create one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedPath {
	path: PathBuf,
	existed: bool,
}

impl ResolvedPath {
	pub fn as_path(&self) -> &Path {
		&self.path
	}

	pub fn existed(&self) -> bool {
		self.existed
	}

	pub fn display(&self) -> std::path::Display<'_> {
		self.path.display()
	}
}

impl AsRef<Path> for ResolvedPath {
	fn as_ref(&self) -> &Path {
		&self.path
	}
}

#[derive(Clone, Debug)]
pub struct PathSandbox {
	roots: Arc<Vec<AllowedRoot>>,
	cwd: PathBuf,
}

impl PathSandbox {
	pub fn new(roots: Vec<AllowedRoot>, cwd: PathBuf) -> Self {
		Self {
			roots: Arc::new(roots),
			cwd
		}
	}

	pub fn roots(&self) -> &[AllowedRoot] {
		&self.roots
	}

	pub fn authorize(&self, requested: &str) -> Result<ResolvedPath, FsError> {
		let expanded = shellexpand::tilde(requested);
		self.authorize_path(Path::new(expanded.as_ref()))
	}

	pub fn authorize_path(&self, requested: &Path) -> Result<ResolvedPath, FsError> {
		let normalized = self.checked_nominal(requested)?;
		match dunce::canonicalize(&normalized) {
			Ok(real) => {
				if !self.permits_real(&real) {
					return Err(self.deny(requested, &real, "symlink target outside allowed directories"));
				}
				Ok(ResolvedPath {
					path: real,
					existed: true
				})
			}
			Err(err) if err.kind() == io::ErrorKind::NotFound => self.authorize_new(requested, &normalized),
			Err(err) => Err(FsError::io("resolve", requested.display(), err)),
		}
	}

	/// Authorizes a directory to be created with all missing parents. The nearest existing
	/// ancestor must resolve inside a root; the missing segments are appended to its real path.
	pub fn authorize_directory(&self, requested: &str) -> Result<ResolvedPath, FsError> {
		let expanded = shellexpand::tilde(requested);
		let requested = Path::new(expanded.as_ref());
		let normalized = self.checked_nominal(requested)?;
		let mut missing: Vec<&OsStr> = Vec::new();
		let mut cursor = normalized.as_path();
		loop {
			match dunce::canonicalize(cursor) {
				Ok(real) => {
					if !self.permits_real(&real) {
						return Err(self.deny(requested, &real, "ancestor outside allowed directories"));
					}
					let existed = missing.is_empty();
					let mut path = real;
					for segment in missing.iter().rev() {
						path.push(segment);
					}
					debug!(path = %path.display(), created = missing.len(), "authorized directory through ancestor");
					return Ok(ResolvedPath {
						path,
						existed
					});
				}
				Err(err) if err.kind() == io::ErrorKind::NotFound => {
					if std::fs::symlink_metadata(cursor).is_ok() {
						return Err(self.deny(requested, cursor, "dangling symlink"));
					}
					let (Some(parent), Some(name)) = (cursor.parent(), cursor.file_name()) else {
						return Err(FsError::ParentNotFound {
							path: requested.display().to_string()
						});
					};
					missing.push(name);
					cursor = parent;
				}
				Err(err) => return Err(FsError::io("resolve", requested.display(), err)),
			}
		}
	}

	fn checked_nominal(&self, requested: &Path) -> Result<PathBuf, FsError> {
		let absolute = if requested.is_absolute() {
			requested.to_path_buf()
		}
		else {
			self.cwd.join(requested)
		};
		let normalized = normalize_path(&absolute);
		if !self.permits_nominal(&normalized) {
			return Err(self.deny(requested, &normalized, "outside allowed directories"));
		}
		Ok(normalized)
	}

	fn authorize_new(&self, requested: &Path, normalized: &Path) -> Result<ResolvedPath, FsError> {
		if std::fs::symlink_metadata(normalized).is_ok() {
			// a dangling link would let a write land wherever it points
			return Err(self.deny(requested, normalized, "dangling symlink"));
		}
		let parent_not_found = || FsError::ParentNotFound {
			path: requested.display().to_string()
		};
		let (Some(parent), Some(name)) = (normalized.parent(), normalized.file_name()) else {
			return Err(parent_not_found());
		};
		let real_parent = dunce::canonicalize(parent).map_err(|_| parent_not_found())?;
		if !self.permits_real(&real_parent) {
			return Err(self.deny(requested, &real_parent, "parent outside allowed directories"));
		}
		debug!(path = %normalized.display(), "authorized new path through parent");
		Ok(ResolvedPath {
			path: real_parent.join(name),
			existed: false
		})
	}

	fn permits_nominal(&self, path: &Path) -> bool {
		let key = comparison_key(path);
		self.roots
			.iter()
			.any(|root| is_within(&key, &root.nominal_key) || is_within(&key, &root.real_key))
	}

	fn permits_real(&self, path: &Path) -> bool {
		let key = comparison_key(path);
		self.roots
			.iter()
			.any(|root| is_within(&key, &root.real_key))
	}

	fn deny(&self, requested: &Path, checked: &Path, reason: &str) -> FsError {
		warn!(
			requested = %requested.display(),
			checked = %checked.display(),
			reason,
			"sandbox denied path"
		);
		FsError::AccessDenied {
			path: requested.display().to_string()
		}
	}
}

fn comparison_key(path: &Path) -> String {
	let mut key = path.to_string_lossy().to_string();
	if cfg!(windows) {
		key = key.replace('/', "\\");
	}
	if CASE_INSENSITIVE {
		key = key.to_lowercase();
	}
	while key.len() > 1 && key.ends_with(std::path::MAIN_SEPARATOR) && !key.ends_with(":\\") {
		key.pop();
	}
	key
}

fn is_within(key: &str, root_key: &str) -> bool {
	if key == root_key {
		return true;
	}
	if root_key.ends_with(std::path::MAIN_SEPARATOR) {
		return key.starts_with(root_key);
	}
	key.len() > root_key.len()
		&& key.starts_with(root_key)
		&& key[root_key.len()..].starts_with(std::path::MAIN_SEPARATOR)
}

pub fn normalize_path(path: &Path) -> PathBuf {
	let mut stack: Vec<std::ffi::OsString> = Vec::new();
	let mut prefix: Option<std::ffi::OsString> = None;
	let mut absolute = false;
	for component in path.components() {
		match component {
			Component::Prefix(prefix_component) => {
				prefix = Some(prefix_component.as_os_str().to_os_string());
			}
			Component::RootDir => {
				absolute = true;
				stack.clear();
			}
			Component::CurDir => {}
			Component::ParentDir => {
				if !stack.is_empty() {
					stack.pop();
				}
				else if !absolute {
					stack.push(std::ffi::OsString::from(".."));
				}
			}
			Component::Normal(part) => stack.push(part.to_os_string()),
		}
	}
	let mut out = PathBuf::new();
	if let Some(prefix) = prefix {
		out.push(prefix);
	}
	if absolute {
		out.push(std::path::MAIN_SEPARATOR.to_string());
	}
	for part in stack {
		out.push(part);
	}
	out
}

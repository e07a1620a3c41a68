use crate::error::FsError;
use crate::sandbox::{PathSandbox, ResolvedPath};
use crate::structure;
use crate::tools::TextEdit;
use anyhow::{anyhow, Result};
use filetime::{set_file_times, FileTime};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use serde_json::{json, Value};
use similar::TextDiff;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::SystemTime;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::fs;
use tracing::{debug, info};

/// New content plus tool-specific summary fields produced by an editor.
pub struct Edited {
	pub content: String,
	pub summary: Value,
}

pub async fn read_text(path: &ResolvedPath) -> Result<String> {
	let content = fs::read_to_string(path).await.map_err(|err| FsError::io("read", path.display(), err))?;
	Ok(content)
}

pub async fn write_text(path: &ResolvedPath, content: &str) -> Result<Value> {
	fs::write(path, content).await.map_err(|err| FsError::io("write", path.display(), err))?;
	Ok(json!({
		"path": path.display().to_string(),
		"bytes": content.len(),
		"created": !path.existed()
	}))
}

pub async fn create_directory(path: &ResolvedPath) -> Result<Value> {
	fs::create_dir_all(path).await.map_err(|err| FsError::io("create directory", path.display(), err))?;
	Ok(json!({
		"path": path.display().to_string(),
		"created": !path.existed()
	}))
}

pub async fn list_directory(path: &ResolvedPath) -> Result<Value> {
	let mut entries = fs::read_dir(path).await.map_err(|err| FsError::io("list", path.display(), err))?;
	let mut listed = Vec::new();
	while let Some(entry) = entries.next_entry().await.map_err(|err| FsError::io("list", path.display(), err))? {
		let is_dir = entry.file_type()
			.await
			.map(|kind| kind.is_dir())
			.unwrap_or(false);
		listed.push((entry.file_name().to_string_lossy().to_string(), is_dir));
	}
	listed.sort();
	let entries = listed.into_iter()
		.map(|(name, is_dir)| {
			let kind = if is_dir {
				"directory"
			}
			else {
				"file"
			};
			json!({
				"name": name,
				"type": kind
			})
		})
		.collect::<Vec<_>>();
	Ok(json!({
		"path": path.display().to_string(),
		"count": entries.len(),
		"entries": entries
	}))
}

pub async fn move_path(from: &ResolvedPath, to: &ResolvedPath) -> Result<Value> {
	if fs::symlink_metadata(to).await.is_ok() {
		return Err(FsError::io(
			"move",
			to.display(),
			std::io::Error::new(std::io::ErrorKind::AlreadyExists, "target exists")
		).into());
	}
	match fs::rename(from, to).await {
		Ok(_) => {}
		Err(err) if is_cross_device(&err) => {
			debug!(from = %from.display(), to = %to.display(), "rename crossed devices, copying");
			let meta = fs::metadata(from).await.map_err(|err| FsError::io("move", from.display(), err))?;
			if meta.is_dir() {
				copy_dir_recursive(from.as_path().to_path_buf(), to.as_path().to_path_buf()).await?;
				fs::remove_dir_all(from).await?;
			}
			else {
				copy_file_with_meta(from.as_path(), to.as_path()).await?;
				fs::remove_file(from).await?;
			}
		}
		Err(err) => return Err(FsError::io("move", from.display(), err).into()),
	}
	Ok(json!({
		"source": from.display().to_string(),
		"destination": to.display().to_string()
	}))
}

async fn copy_file_with_meta(from: &Path, to: &Path) -> Result<()> {
	fs::copy(from, to).await?;
	let meta = fs::metadata(from).await?;
	fs::set_permissions(to, meta.permissions()).await?;
	let atime = FileTime::from_last_access_time(&meta);
	let mtime = FileTime::from_last_modification_time(&meta);
	set_file_times(to, atime, mtime)?;
	Ok(())
}

fn copy_dir_recursive(from: PathBuf, to: PathBuf) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
	Box::pin(
		async move {
			fs::create_dir_all(&to).await?;
			let mut entries = fs::read_dir(&from).await?;
			while let Some(entry) = entries.next_entry().await? {
				let src = entry.path();
				let dst = to.join(entry.file_name());
				let meta = fs::symlink_metadata(&src).await?;
				if meta.is_dir() {
					copy_dir_recursive(src, dst).await?;
				}
				else if meta.file_type().is_symlink() {
					let target = fs::read_link(&src).await?;
					copy_symlink(&target, &dst).await?;
				}
				else {
					copy_file_with_meta(&src, &dst).await?;
				}
			}
			let meta = fs::metadata(&from).await?;
			fs::set_permissions(&to, meta.permissions()).await?;
			let atime = FileTime::from_last_access_time(&meta);
			let mtime = FileTime::from_last_modification_time(&meta);
			set_file_times(&to, atime, mtime)?;
			Ok(())
		}
	)
}

#[cfg(unix)]
async fn copy_symlink(target: &Path, link: &Path) -> Result<()> {
	fs::symlink(target, link).await?;
	Ok(())
}

#[cfg(not(unix))]
async fn copy_symlink(target: &Path, link: &Path) -> Result<()> {
	Err(anyhow!("cannot copy symlink {} to {} across devices", target.display(), link.display()))
}

#[cfg(unix)]
fn is_cross_device(err: &std::io::Error) -> bool {
	err.raw_os_error() == Some(libc::EXDEV)
}

#[cfg(not(unix))]
fn is_cross_device(err: &std::io::Error) -> bool {
	err.raw_os_error() == Some(17)
}

/// Walks `root` and returns the full paths of entries whose name contains `pattern`, ignoring case.
/// Entries that fail sandbox authorization or match an exclude glob are skipped along with their subtrees.
pub async fn search(sandbox: &PathSandbox, root: &ResolvedPath, pattern: &str, exclude: &[String]) -> Result<Value> {
	let excludes = build_exclude_set(exclude)?;
	let needle = pattern.to_lowercase();
	let root_path = root.as_path().to_path_buf();
	let mut builder = WalkBuilder::new(&root_path);
	builder.standard_filters(false);
	builder.follow_links(false);
	let guard = sandbox.clone();
	let walk_root = root_path.clone();
	builder.filter_entry(move |entry| {
		if entry.depth() == 0 {
			return true;
		}
		if let Some(excludes) = &excludes {
			let rel = relative_display(&walk_root, entry.path());
			let name = entry.file_name().to_string_lossy();
			if excludes.is_match(&rel) || excludes.is_match(name.as_ref()) {
				return false;
			}
		}
		guard.authorize_path(entry.path()).is_ok()
	});
	let mut matches = Vec::new();
	let mut skipped = 0usize;
	for entry in builder.build() {
		let entry = match entry {
			Ok(entry) => entry,
			Err(err) => {
				debug!(error = %err, "search skipped unreadable entry");
				skipped += 1;
				continue;
			}
		};
		if entry.depth() == 0 {
			continue;
		}
		let name = entry.file_name().to_string_lossy().to_lowercase();
		if name.contains(&needle) {
			matches.push(entry.path().display().to_string());
		}
	}
	matches.sort();
	Ok(json!({
		"path": root.display().to_string(),
		"pattern": pattern,
		"count": matches.len(),
		"matches": matches,
		"skipped": skipped
	}))
}

fn build_exclude_set(patterns: &[String]) -> Result<Option<GlobSet>> {
	if patterns.is_empty() {
		return Ok(None);
	}
	let mut builder = GlobSetBuilder::new();
	for pattern in patterns {
		let glob = GlobBuilder::new(pattern)
			.literal_separator(true)
			.build()
			.map_err(|err| FsError::invalid_arguments(format!("invalid exclude glob {}: {}", pattern, err)))?;
		builder.add(glob);
	}
	Ok(Some(builder.build().map_err(|err| anyhow!("invalid exclude set: {}", err))?))
}

fn relative_display(root: &Path, path: &Path) -> String {
	if let Ok(rel) = path.strip_prefix(root) {
		return rel.to_string_lossy().to_string();
	}
	path.to_string_lossy().to_string()
}

pub async fn file_info(path: &ResolvedPath) -> Result<Value> {
	let meta = fs::metadata(path).await.map_err(|err| FsError::io("stat", path.display(), err))?;
	Ok(json!({
		"path": path.display().to_string(),
		"size": meta.len(),
		"created": timestamp(meta.created()),
		"modified": timestamp(meta.modified()),
		"accessed": timestamp(meta.accessed()),
		"isDirectory": meta.is_dir(),
		"isFile": meta.is_file(),
		"permissions": permissions(&meta)
	}))
}

fn timestamp(value: std::io::Result<SystemTime>) -> Value {
	value.ok()
		.and_then(|time| OffsetDateTime::from(time).format(&Rfc3339).ok())
		.map(Value::String)
		.unwrap_or(Value::Null)
}

#[cfg(unix)]
fn permissions(meta: &std::fs::Metadata) -> String {
	use std::os::unix::fs::PermissionsExt;
	format!("{:o}", meta.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn permissions(meta: &std::fs::Metadata) -> String {
	if meta.permissions().readonly() {
		"r--".to_string()
	}
	else {
		"rw-".to_string()
	}
}

/// Reads the file, runs `edit` over it, and writes the result back unless `dry_run`.
/// `edit` receives whether the result must pass the delimiter check; nothing is written when it fails.
pub async fn apply_edit<F>(path: &ResolvedPath, dry_run: bool, edit: F) -> Result<Value>
where
	F: FnOnce(&str, bool) -> Result<Edited, FsError>, {
	let original = read_text(path).await?;
	let validate = if structure::validates(path.as_path()) {
		match structure::check(&original) {
			Ok(()) => true,
			Err(err) => {
				info!(path = %path.display(), error = %err, "file already unbalanced, editing without delimiter check");
				false
			}
		}
	}
	else {
		false
	};
	let edited = edit(&original, validate)?;
	let diff = make_diff(&original, &edited.content, path.as_path());
	let changed = edited.content != original;
	if !dry_run && changed {
		fs::write(path, &edited.content).await.map_err(|err| FsError::io("write", path.display(), err))?;
	}
	let mut result = edited.summary;
	if let Some(obj) = result.as_object_mut() {
		obj.insert("path".to_string(), Value::String(path.display().to_string()));
		obj.insert("dryRun".to_string(), Value::Bool(dry_run));
		obj.insert("validated".to_string(), Value::Bool(validate));
		obj.insert("changed".to_string(), Value::Bool(changed));
		obj.insert("diff".to_string(), Value::String(diff));
	}
	Ok(result)
}

/// Applies exact-text replacements in order; each search text must occur exactly once when its turn comes.
pub fn replace_exact(content: &str, edits: &[TextEdit], validate: bool) -> Result<String, FsError> {
	let mut buffer = content.to_string();
	for (index, edit) in edits.iter().enumerate() {
		if edit.old_text.is_empty() {
			return Err(FsError::invalid_arguments(format!("edit {}: oldText must not be empty", index)));
		}
		let count = buffer.matches(edit.old_text.as_str()).count();
		match count {
			0 => return Err(FsError::FindNotFound { index }),
			1 => buffer = buffer.replacen(edit.old_text.as_str(), &edit.new_text, 1),
			_ => return Err(FsError::FindNotUnique { index, count }),
		}
	}
	if validate {
		structure::check(&buffer)?;
	}
	Ok(buffer)
}

fn make_diff(existing: &str, updated: &str, path: &Path) -> String {
	let diff = TextDiff::from_lines(existing, updated);
	diff.unified_diff()
		.context_radius(3)
		.header(&format!("a/{}", path.display()), &format!("b/{}", path.display()))
		.to_string()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sandbox::AllowedRoot;

	fn edit(old: &str, new: &str) -> TextEdit {
		TextEdit {
			old_text: old.to_string(),
			new_text: new.to_string()
		}
	}

	fn sandbox_for(dir: &Path) -> PathSandbox {
		let root = AllowedRoot::new(dir.to_str().expect("utf8"), dir).expect("root");
		PathSandbox::new(vec![root], dir.to_path_buf())
	}

	#[test]
	fn replace_exact_applies_in_order() {
		let out = replace_exact("let a = 1;\nlet b = 2;\n", &[edit("a = 1", "a = 10"), edit("a = 10;\nlet b", "a = 10;\nlet c")], false).unwrap();
		assert_eq!(out, "let a = 10;\nlet c = 2;\n");
	}

	#[test]
	fn replace_exact_requires_unique_match() {
		let err = replace_exact("x x", &[edit("x", "y")], false).unwrap_err();
		assert_eq!(err.code(), "FIND_NOT_UNIQUE");
		let err = replace_exact("abc", &[edit("b", "B"), edit("zz", "y")], false).unwrap_err();
		assert!(matches!(err, FsError::FindNotFound { index: 1 }));
		assert!(matches!(replace_exact("abc", &[edit("", "y")], false), Err(FsError::ArgumentValidation(_))));
	}

	#[test]
	fn replace_exact_checks_delimiters_when_asked() {
		let err = replace_exact("f() { g(); }", &[edit("}", "")], true).unwrap_err();
		assert_eq!(err.code(), "UNBALANCED_DELIMITERS");
		assert_eq!(replace_exact("f() { g(); }", &[edit("}", "")], false).unwrap(), "f() { g(); ");
	}

	#[tokio::test]
	async fn apply_edit_leaves_file_on_failure_and_dry_run() {
		let dir = tempfile::tempdir().expect("tempdir");
		let base = dunce::canonicalize(dir.path()).expect("canonical");
		std::fs::write(base.join("app.ts"), "function f() { return 1; }").expect("write");
		let sandbox = sandbox_for(&base);
		let path = sandbox.authorize("app.ts").expect("authorized");
		let err = apply_edit(&path, false, |content, validate| {
			assert!(validate);
			Ok(Edited {
				content: replace_exact(content, &[edit(" }", " ")], validate)?,
				summary: json!({})
			})
		}).await.unwrap_err();
		assert_eq!(err.downcast_ref::<FsError>().map(FsError::code), Some("UNBALANCED_DELIMITERS"));
		let result = apply_edit(&path, true, |content, validate| {
			Ok(Edited {
				content: replace_exact(content, &[edit("1", "2")], validate)?,
				summary: json!({ "applied": 1 })
			})
		}).await.expect("dry run");
		assert_eq!(result["dryRun"], true);
		assert!(result["diff"].as_str().unwrap().contains("+function f() { return 2; }"));
		assert_eq!(std::fs::read_to_string(base.join("app.ts")).unwrap(), "function f() { return 1; }");
	}

	#[tokio::test]
	async fn already_unbalanced_files_skip_validation() {
		let dir = tempfile::tempdir().expect("tempdir");
		let base = dunce::canonicalize(dir.path()).expect("canonical");
		std::fs::write(base.join("broken.js"), "if (x {\n").expect("write");
		let path = sandbox_for(&base).authorize("broken.js").expect("authorized");
		let result = apply_edit(&path, false, |content, validate| {
			assert!(!validate);
			Ok(Edited {
				content: format!("{}// todo\n", content),
				summary: json!({})
			})
		}).await.expect("edit");
		assert_eq!(result["validated"], false);
		assert_eq!(std::fs::read_to_string(base.join("broken.js")).unwrap(), "if (x {\n// todo\n");
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn search_skips_entries_outside_sandbox() {
		let dir = tempfile::tempdir().expect("tempdir");
		let base = dunce::canonicalize(dir.path()).expect("canonical");
		let root = base.join("workspace");
		let outside = base.join("outside");
		std::fs::create_dir_all(root.join("nested/.hidden")).expect("dirs");
		std::fs::create_dir_all(&outside).expect("outside");
		std::fs::write(root.join("config.json"), "{}").expect("file");
		std::fs::write(root.join("nested/.hidden/app.conf"), "").expect("file");
		std::fs::write(root.join("nested/conf.log"), "").expect("file");
		std::fs::write(outside.join("conf-secret.txt"), "").expect("file");
		std::os::unix::fs::symlink(&outside, root.join("linked")).expect("link");
		let sandbox = sandbox_for(&root);
		let resolved = sandbox.authorize(root.to_str().unwrap()).expect("root");
		let result = search(&sandbox, &resolved, "CONF", &["*.log".to_string()]).await.expect("search");
		let matches = result["matches"].as_array().expect("matches")
			.iter()
			.filter_map(Value::as_str)
			.collect::<Vec<_>>();
		let expected_config = root.join("config.json").display().to_string();
		let expected_hidden = root.join("nested/.hidden/app.conf").display().to_string();
		assert_eq!(matches, vec![expected_config.as_str(), expected_hidden.as_str()]);
	}

	#[tokio::test]
	async fn move_refuses_existing_target() {
		let dir = tempfile::tempdir().expect("tempdir");
		let base = dunce::canonicalize(dir.path()).expect("canonical");
		std::fs::write(base.join("a.txt"), "a").expect("a");
		std::fs::write(base.join("b.txt"), "b").expect("b");
		let sandbox = sandbox_for(&base);
		let from = sandbox.authorize("a.txt").expect("from");
		let to = sandbox.authorize("b.txt").expect("to");
		let err = move_path(&from, &to).await.unwrap_err();
		assert_eq!(err.downcast_ref::<FsError>().map(FsError::code), Some("TARGET_EXISTS"));
		let to = sandbox.authorize("c.txt").expect("new target");
		move_path(&from, &to).await.expect("move");
		assert_eq!(std::fs::read_to_string(base.join("c.txt")).unwrap(), "a");
		assert!(!base.join("a.txt").exists());
	}

	#[tokio::test]
	async fn file_info_reports_type_and_times() {
		let dir = tempfile::tempdir().expect("tempdir");
		let base = dunce::canonicalize(dir.path()).expect("canonical");
		std::fs::write(base.join("a.txt"), "hello").expect("a");
		let path = sandbox_for(&base).authorize("a.txt").expect("path");
		let info = file_info(&path).await.expect("info");
		assert_eq!(info["size"], 5);
		assert_eq!(info["isFile"], true);
		assert_eq!(info["isDirectory"], false);
		let modified = info["modified"].as_str().expect("modified");
		assert!(OffsetDateTime::parse(modified, &Rfc3339).is_ok());
	}
}

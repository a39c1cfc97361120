//! Workspace-sandboxed file toolkit: read, write, append, rename,
//! delete, and list, all confined under one root directory.
//!
//! Requests use workspace-relative paths. Absolute paths and `..`
//! components are refused outright; paths that exist are additionally
//! canonicalized so a symlink inside the workspace can't point reads
//! or writes outside it.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Deserialize)]
pub struct ReadArgs {
    pub path: String,
    /// First line to return (0-indexed).
    #[serde(default)]
    pub offset: Option<usize>,
    /// Maximum number of lines to return.
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WriteArgs {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenameArgs {
    pub source: String,
    pub destination: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteArgs {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListArgs {
    #[serde(default = "d_dot")]
    pub path: String,
}

fn d_dot() -> String {
    ".".into()
}

#[derive(Debug, Clone, Serialize)]
struct ListingEntry {
    name: String,
    size: u64,
    modified: String,
    is_dir: bool,
}

/// The sandbox root plus every operation allowed inside it.
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a workspace-relative request onto a real path, refusing
    /// anything that could land outside the root.
    fn resolve(&self, requested: &str) -> Result<PathBuf, String> {
        let requested_path = Path::new(requested);
        if requested_path.is_absolute() {
            return Err(format!(
                "'{requested}' is absolute; paths must be relative to the workspace root"
            ));
        }
        if requested_path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(format!("'{requested}' contains '..', which is not allowed"));
        }

        let root = self
            .root
            .canonicalize()
            .map_err(|e| format!("workspace root '{}' is unusable: {e}", self.root.display()))?;
        let candidate = root.join(requested_path);

        // Existing targets get the full canonicalization + containment
        // check so in-workspace symlinks can't escape. A target that
        // doesn't exist yet can't escape lexically (no `..`, relative).
        if candidate.exists() {
            let resolved = candidate
                .canonicalize()
                .map_err(|e| format!("cannot resolve '{requested}': {e}"))?;
            if !resolved.starts_with(&root) {
                return Err(format!("'{requested}' resolves outside the workspace"));
            }
            Ok(resolved)
        } else {
            Ok(candidate)
        }
    }

    /// Read a file, optionally a line window of it.
    pub async fn read(&self, args: ReadArgs) -> Result<Value, String> {
        let path = self.resolve(&args.path)?;
        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| format!("failed to read '{}': {e}", args.path))?;

        let lines: Vec<&str> = content.lines().collect();
        let offset = args.offset.unwrap_or(0);
        let limit = args.limit.unwrap_or(usize::MAX);
        let window: Vec<&str> = lines.iter().skip(offset).take(limit).copied().collect();

        Ok(serde_json::json!({
            "path": args.path,
            "content": window.join("\n"),
            "total_lines": lines.len(),
            "offset": offset,
            "lines_returned": window.len(),
        }))
    }

    /// Create or overwrite a file. The write lands in a temp sibling
    /// first and is renamed into place, so readers never see a torn file.
    pub async fn write(&self, args: WriteArgs) -> Result<Value, String> {
        let path = self.resolve(&args.path)?;
        self.ensure_parent(&path).await?;

        let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().as_simple()));
        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|e| format!("failed to create '{}': {e}", args.path))?;
        file.write_all(args.content.as_bytes())
            .await
            .map_err(|e| format!("failed to write '{}': {e}", args.path))?;
        file.sync_data()
            .await
            .map_err(|e| format!("failed to sync '{}': {e}", args.path))?;
        drop(file);

        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(format!("failed to finalize '{}': {e}", args.path));
        }

        Ok(serde_json::json!({
            "path": args.path,
            "bytes_written": args.content.len(),
        }))
    }

    /// Append to a file, creating it if needed.
    pub async fn append(&self, args: WriteArgs) -> Result<Value, String> {
        let path = self.resolve(&args.path)?;
        self.ensure_parent(&path).await?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| format!("failed to open '{}' for append: {e}", args.path))?;
        file.write_all(args.content.as_bytes())
            .await
            .map_err(|e| format!("failed to append to '{}': {e}", args.path))?;
        file.flush()
            .await
            .map_err(|e| format!("failed to flush '{}': {e}", args.path))?;

        Ok(serde_json::json!({
            "path": args.path,
            "bytes_appended": args.content.len(),
        }))
    }

    /// Move or rename within the workspace.
    pub async fn rename(&self, args: RenameArgs) -> Result<Value, String> {
        let source = self.resolve(&args.source)?;
        let destination = self.resolve(&args.destination)?;

        if !source.exists() {
            return Err(format!("source '{}' does not exist", args.source));
        }
        self.ensure_parent(&destination).await?;

        fs::rename(&source, &destination)
            .await
            .map_err(|e| format!("failed to move '{}' to '{}': {e}", args.source, args.destination))?;

        Ok(serde_json::json!({
            "source": args.source,
            "destination": args.destination,
        }))
    }

    /// Delete a file or an empty directory.
    pub async fn delete(&self, args: DeleteArgs) -> Result<Value, String> {
        let path = self.resolve(&args.path)?;
        let meta = fs::metadata(&path)
            .await
            .map_err(|e| format!("failed to stat '{}': {e}", args.path))?;

        if meta.is_dir() {
            fs::remove_dir(&path)
                .await
                .map_err(|e| format!("failed to remove directory '{}' (must be empty): {e}", args.path))?;
        } else {
            fs::remove_file(&path)
                .await
                .map_err(|e| format!("failed to remove '{}': {e}", args.path))?;
        }

        Ok(serde_json::json!({"path": args.path, "deleted": true}))
    }

    /// List a directory, sorted by name.
    pub async fn list(&self, args: ListArgs) -> Result<Value, String> {
        let path = self.resolve(&args.path)?;
        let mut dir = fs::read_dir(&path)
            .await
            .map_err(|e| format!("failed to read directory '{}': {e}", args.path))?;

        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| format!("failed to read directory entry: {e}"))?
        {
            let meta = entry
                .metadata()
                .await
                .map_err(|e| format!("failed to stat '{}': {e}", entry.path().display()))?;
            let modified = meta
                .modified()
                .ok()
                .map(|t| DateTime::<Utc>::from(t).to_rfc3339())
                .unwrap_or_default();
            entries.push(ListingEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: meta.len(),
                modified,
                is_dir: meta.is_dir(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(serde_json::json!({
            "path": args.path,
            "entries": entries,
            "count": entries.len(),
        }))
    }

    async fn ensure_parent(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("failed to create parent directory: {e}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workspace() -> (TempDir, Workspace) {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::new(dir.path());
        (dir, ws)
    }

    fn read_args(path: &str) -> ReadArgs {
        ReadArgs {
            path: path.into(),
            offset: None,
            limit: None,
        }
    }

    fn write_args(path: &str, content: &str) -> WriteArgs {
        WriteArgs {
            path: path.into(),
            content: content.into(),
        }
    }

    #[tokio::test]
    async fn parent_traversal_is_refused() {
        let (_dir, ws) = workspace();
        let err = ws.read(read_args("../etc/passwd")).await.unwrap_err();
        assert!(err.contains(".."));
    }

    #[tokio::test]
    async fn absolute_path_is_refused() {
        let (_dir, ws) = workspace();
        let err = ws.read(read_args("/etc/passwd")).await.unwrap_err();
        assert!(err.contains("absolute"));
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let (_dir, ws) = workspace();
        ws.write(write_args("notes.txt", "alpha\nbeta\n")).await.unwrap();
        let result = ws.read(read_args("notes.txt")).await.unwrap();
        assert_eq!(result["content"], "alpha\nbeta");
        assert_eq!(result["total_lines"], 2);
    }

    #[tokio::test]
    async fn read_line_window() {
        let (_dir, ws) = workspace();
        ws.write(write_args("lines.txt", "l0\nl1\nl2\nl3\n")).await.unwrap();
        let result = ws
            .read(ReadArgs {
                path: "lines.txt".into(),
                offset: Some(1),
                limit: Some(2),
            })
            .await
            .unwrap();
        assert_eq!(result["content"], "l1\nl2");
        assert_eq!(result["lines_returned"], 2);
    }

    #[tokio::test]
    async fn write_creates_missing_parent_directories() {
        let (dir, ws) = workspace();
        ws.write(write_args("deep/nested/file.txt", "x")).await.unwrap();
        assert!(dir.path().join("deep/nested/file.txt").exists());
    }

    #[tokio::test]
    async fn append_accumulates() {
        let (_dir, ws) = workspace();
        ws.append(write_args("log.txt", "first\n")).await.unwrap();
        ws.append(write_args("log.txt", "second\n")).await.unwrap();
        let result = ws.read(read_args("log.txt")).await.unwrap();
        assert_eq!(result["content"], "first\nsecond");
    }

    #[tokio::test]
    async fn rename_moves_the_file() {
        let (dir, ws) = workspace();
        ws.write(write_args("old.txt", "data")).await.unwrap();
        ws.rename(RenameArgs {
            source: "old.txt".into(),
            destination: "new.txt".into(),
        })
        .await
        .unwrap();
        assert!(!dir.path().join("old.txt").exists());
        assert!(dir.path().join("new.txt").exists());
    }

    #[tokio::test]
    async fn delete_file_and_empty_directory() {
        let (dir, ws) = workspace();
        ws.write(write_args("doomed.txt", "bye")).await.unwrap();
        ws.delete(DeleteArgs { path: "doomed.txt".into() }).await.unwrap();
        assert!(!dir.path().join("doomed.txt").exists());

        std::fs::create_dir(dir.path().join("hollow")).unwrap();
        ws.delete(DeleteArgs { path: "hollow".into() }).await.unwrap();
        assert!(!dir.path().join("hollow").exists());
    }

    #[tokio::test]
    async fn list_is_sorted_and_marks_directories() {
        let (dir, ws) = workspace();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let result = ws.list(ListArgs { path: ".".into() }).await.unwrap();
        assert_eq!(result["count"], 3);
        let entries = result["entries"].as_array().unwrap();
        assert_eq!(entries[0]["name"], "a.txt");
        assert_eq!(entries[2]["name"], "sub");
        assert_eq!(entries[2]["is_dir"], true);
    }
}

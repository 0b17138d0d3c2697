//! File I/O tool: read, write and list files inside one sandbox directory.
//!
//! Filenames are resolved relative to the sandbox. Absolute paths, `..`
//! components and symlinks that escape the sandbox are refused.

use async_trait::async_trait;
use orchestrator_core::error::ToolError;
use orchestrator_core::tool::Tool;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

const ACCESS_DENIED: &str = "Error: Access denied - file outside allowed directory";

pub struct FileIoTool {
    root: PathBuf,
}

impl FileIoTool {
    /// Create the tool, creating `dir` if it does not exist yet.
    pub fn new(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir.as_ref())?;
        let root = dir.as_ref().canonicalize()?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `filename` inside the sandbox, or `None` if it would escape.
    fn resolve(&self, filename: &str) -> Option<PathBuf> {
        let relative = Path::new(filename);
        let lexically_safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !lexically_safe || filename.trim().is_empty() {
            return None;
        }

        let candidate = self.root.join(relative);
        let resolved = if candidate.exists() {
            candidate.canonicalize().ok()?
        } else {
            let parent = candidate.parent()?.canonicalize().ok()?;
            parent.join(candidate.file_name()?)
        };

        resolved.starts_with(&self.root).then_some(resolved)
    }

    async fn list(&self) -> Result<String, std::io::Error> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        if files.is_empty() {
            return Ok("No files found in directory.".into());
        }
        files.sort();
        let listing: Vec<String> = files.iter().map(|f| format!("- {f}")).collect();
        Ok(format!("Files in directory:\n{}", listing.join("\n")))
    }

    async fn read(&self, filename: Option<&str>) -> Result<String, std::io::Error> {
        let Some(filename) = filename else {
            return Ok("Error: filename required for read operation".into());
        };
        let Some(path) = self.resolve(filename) else {
            return Ok(ACCESS_DENIED.into());
        };
        if !path.exists() {
            return Ok(format!("Error: File '{filename}' not found"));
        }
        let content = tokio::fs::read_to_string(&path).await?;
        Ok(format!("Contents of '{filename}':\n\n{content}"))
    }

    async fn write(
        &self,
        filename: Option<&str>,
        content: Option<&str>,
    ) -> Result<String, std::io::Error> {
        let Some(filename) = filename else {
            return Ok("Error: filename required for write operation".into());
        };
        let Some(content) = content else {
            return Ok("Error: content required for write operation".into());
        };
        let Some(path) = self.resolve(filename) else {
            return Ok(ACCESS_DENIED.into());
        };
        tokio::fs::write(&path, content).await?;
        debug!(path = %path.display(), bytes = content.len(), "file_io wrote file");
        Ok(format!(
            "Successfully wrote {} characters to '{filename}'",
            content.chars().count()
        ))
    }
}

#[async_trait]
impl Tool for FileIoTool {
    fn name(&self) -> &str {
        "file_io"
    }

    fn display_name(&self) -> &str {
        "File I/O"
    }

    fn description(&self) -> &str {
        "Reads and writes files from the disk (with safety restrictions)"
    }

    fn icon(&self) -> &str {
        "IconFile"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["read", "write", "list"],
                    "description": "File operation to perform"
                },
                "filename": {
                    "type": "string",
                    "description": "Name of the file (for read/write operations)"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write (for write operation only)"
                }
            },
            "required": ["operation"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let operation = arguments["operation"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'operation' argument".into()))?;
        let filename = arguments["filename"].as_str();
        let content = arguments["content"].as_str();

        let outcome = match operation {
            "list" => self.list().await,
            "read" => self.read(filename).await,
            "write" => self.write(filename, content).await,
            other => return Ok(format!("Error: Unknown operation '{other}'")),
        };

        Ok(outcome.unwrap_or_else(|e| format!("Error: {e}")))
    }
}

//! Per-run artifact directories.
//!
//! Every replay gets its own directory for screenshots and metadata:
//! - Unique run directories under the configured base location
//! - Automatic cleanup unless explicitly preserved
//! - Run metadata in `.session.json`

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::config;

/// Directory holding the artifacts of one replay
#[derive(Debug, Clone)]
pub struct ArtifactDir {
    /// Unique run ID
    pub id: String,
    /// Root directory for this run
    pub dir: PathBuf,
    /// Whether to keep files after the run ends
    pub keep: bool,
}

impl ArtifactDir {
    /// Create a run directory with a unique ID under the configured base
    pub fn new() -> Self {
        let id = generate_run_id();
        let dir = base_dir().join(&id);
        Self { id, dir, keep: false }
    }

    /// Create a run directory with a readable prefix (usually the test id)
    pub fn with_name(name: &str) -> Self {
        let id = format!("{}_{}", sanitize_name(name), generate_timestamp_suffix());
        let dir = base_dir().join(&id);
        Self { id, dir, keep: false }
    }

    /// Use a caller-chosen directory. These are kept by default.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let id = dir
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(generate_run_id);
        Self { id, dir, keep: true }
    }

    pub fn keep(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }

    /// Create the directory and write run metadata
    pub fn init(&self, test_id: Option<&str>) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;

        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_default();
        let metadata = serde_json::json!({
            "id": self.id,
            "created": chrono::Utc::now().to_rfc3339(),
            "host": host,
            "testId": test_id,
        });
        fs::write(self.dir.join(".session.json"), serde_json::to_string_pretty(&metadata)?)?;
        debug!(dir = %self.dir.display(), "artifact directory ready");
        Ok(())
    }

    /// Path for a named capture
    pub fn capture_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.png", sanitize_name(name)))
    }

    /// Path for the capture of step `index`, optionally with a user-given name
    pub fn step_capture_path(&self, index: usize, kind: &str, name: Option<&str>) -> PathBuf {
        let suffix = name
            .map(|s| format!("_{}", sanitize_name(s)))
            .unwrap_or_default();
        self.dir
            .join(format!("step_{:03}_{}{}.png", index, kind.to_lowercase(), suffix))
    }

    /// Write a capture, creating the directory if `init` was skipped
    pub fn save(&self, path: &Path, png: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, png)
    }

    /// List all PNG files of the run
    pub fn list_captures(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut captures = Vec::new();
        if self.dir.exists() {
            for entry in fs::read_dir(&self.dir)? {
                let path = entry?.path();
                if path.extension().map(|e| e == "png").unwrap_or(false) {
                    captures.push(path);
                }
            }
        }
        captures.sort();
        Ok(captures)
    }

    pub fn cleanup(&self) -> std::io::Result<()> {
        if self.dir.exists() && !self.keep {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}

impl Default for ArtifactDir {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ArtifactDir {
    fn drop(&mut self) {
        if !self.keep {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }
}

fn base_dir() -> PathBuf {
    PathBuf::from(&config::get().artifacts.base_dir)
}

fn generate_run_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("run_{}_{}", timestamp, std::process::id())
}

fn generate_timestamp_suffix() -> String {
    chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Sanitize a name for use in filenames
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

/// Remove run directories under `base` older than `max_age`
pub fn cleanup_old_runs(base: &Path, max_age: Duration) -> std::io::Result<usize> {
    if !base.exists() {
        return Ok(0);
    }

    let now = SystemTime::now();
    let mut cleaned = 0;
    for entry in fs::read_dir(base)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if age.is_some_and(|age| age > max_age) && fs::remove_dir_all(&path).is_ok() {
            cleaned += 1;
        }
    }
    Ok(cleaned)
}

/// List run directories under `base`
pub fn list_runs(base: &Path) -> std::io::Result<Vec<PathBuf>> {
    if !base.exists() {
        return Ok(Vec::new());
    }

    let mut runs = Vec::new();
    for entry in fs::read_dir(base)? {
        let path = entry?.path();
        if path.is_dir() {
            runs.push(path);
        }
    }
    runs.sort();
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_dir_new() {
        let run = ArtifactDir::new();
        assert!(run.id.starts_with("run_"));
        assert!(!run.keep);
    }

    #[test]
    fn test_with_name() {
        let run = ArtifactDir::with_name("test 42");
        assert!(run.id.starts_with("test_42_"));
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("hello world"), "hello_world");
        assert_eq!(sanitize_name("https://a.b/c"), "https___a_b_c");
    }

    #[test]
    fn test_step_capture_path() {
        let run = ArtifactDir::in_dir("/tmp/crusher-replay-test");
        assert!(run.step_capture_path(3, "PAGE_SCREENSHOT", None).ends_with("step_003_page_screenshot.png"));
        assert!(run
            .step_capture_path(12, "ELEMENT_SCREENSHOT", Some("hero banner"))
            .ends_with("step_012_element_screenshot_hero_banner.png"));
    }

    #[test]
    fn test_init_writes_metadata_and_drop_cleans() {
        let base = tempfile::tempdir().unwrap();
        let dir = base.path().join("run");
        {
            let run = ArtifactDir::in_dir(&dir).keep(false);
            run.init(Some("7")).unwrap();
            let raw = fs::read_to_string(dir.join(".session.json")).unwrap();
            let meta: serde_json::Value = serde_json::from_str(&raw).unwrap();
            assert_eq!(meta["testId"], "7");

            run.save(&run.capture_path("page"), b"png").unwrap();
            assert_eq!(run.list_captures().unwrap().len(), 1);
        }
        assert!(!dir.exists());
    }

    #[test]
    fn test_list_and_cleanup_runs() {
        let base = tempfile::tempdir().unwrap();
        fs::create_dir(base.path().join("run_a")).unwrap();
        fs::create_dir(base.path().join("run_b")).unwrap();
        assert_eq!(list_runs(base.path()).unwrap().len(), 2);
        assert_eq!(cleanup_old_runs(base.path(), Duration::from_secs(3600)).unwrap(), 0);
        assert_eq!(list_runs(&base.path().join("missing")).unwrap(), Vec::<PathBuf>::new());
    }
}

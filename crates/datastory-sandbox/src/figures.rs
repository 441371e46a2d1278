//! Shared, append-only figures area.
//!
//! File names are `<UTC timestamp with microseconds>_<run id>_<label>.png`, so
//! concurrent runs never collide, and files are created with `create_new` so an
//! existing figure is never overwritten.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use base64::Engine;
use chrono::{DateTime, Utc};
use regex::Regex;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::SandboxError;

fn figure_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,160}\.png$").expect("valid figure name pattern"))
}

/// Whether a `results` entry carries an inline-encoded image.
pub fn is_inline_figure(key: &str, value: &serde_json::Value) -> bool {
    match value.as_str() {
        Some(s) => s.starts_with("data:image") || key == "plot",
        None => false,
    }
}

fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(64)
        .collect();
    if cleaned.is_empty() { "figure".to_string() } else { cleaned }
}

#[derive(Debug, Clone)]
pub struct FigureStore {
    root: PathBuf,
}

impl FigureStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Collision-resistant file name for one figure of one run.
    pub fn figure_name(run_id: &str, label: &str, at: DateTime<Utc>) -> String {
        format!(
            "{}_{}_{}.png",
            at.format("%Y%m%d_%H%M%S_%6f"),
            sanitize_label(run_id),
            sanitize_label(label)
        )
    }

    /// Write PNG bytes under a fresh name and return the stored path.
    pub async fn save_png(&self, run_id: &str, label: &str, png: &[u8]) -> Result<PathBuf, SandboxError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(Self::figure_name(run_id, label, Utc::now()));
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        file.write_all(png).await?;
        file.flush().await?;
        debug!(path = %path.display(), bytes = png.len(), "Saved figure");
        Ok(path)
    }

    /// Decode an inline image (`data:image/png;base64,...` or bare base64) and store it.
    pub async fn save_inline(&self, run_id: &str, label: &str, encoded: &str) -> Result<PathBuf, SandboxError> {
        let payload = match encoded.split_once(',') {
            Some((_, data)) => data,
            None => encoded,
        };
        let png = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| SandboxError::Figure(format!("'{label}' is not valid base64: {e}")))?;
        self.save_png(run_id, label, &png).await
    }

    /// Map a requested figure name to a path inside the store; rejects anything
    /// that is not a plain figure file name.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        if !figure_name_pattern().is_match(name) {
            return None;
        }
        Some(self.root.join(name))
    }

    /// Read a stored figure; `None` if the name is invalid or absent.
    pub async fn read(&self, name: &str) -> Result<Option<Vec<u8>>, SandboxError> {
        let Some(path) = self.resolve(name) else {
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    #[test]
    fn test_figure_name_layout() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let name = FigureStore::figure_name("ab12cd34", "revenue by region", at);
        assert_eq!(name, "20240309_140507_000000_ab12cd34_revenue_by_region.png");
    }

    #[test]
    fn test_inline_detection() {
        assert!(is_inline_figure("chart", &serde_json::json!("data:image/png;base64,AAAA")));
        assert!(is_inline_figure("plot", &serde_json::json!("AAAA")));
        assert!(!is_inline_figure("plot", &serde_json::json!(3)));
        assert!(!is_inline_figure("summary", &serde_json::json!("sales grew")));
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let store = FigureStore::new("/tmp/figures");
        assert!(store.resolve("../secret.png").is_none());
        assert!(store.resolve("a/b.png").is_none());
        assert!(store.resolve("notes.txt").is_none());
        assert!(store.resolve("20240309_140507_000000_run_plot.png").is_some());
    }

    #[tokio::test]
    async fn test_concurrent_saves_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = FigureStore::new(dir.path());
        let (a, b) = tokio::join!(
            store.save_png("run-a", "plot", PNG_HEADER),
            store.save_png("run-b", "plot", PNG_HEADER),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a, b);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_inline_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FigureStore::new(dir.path());
        let encoded = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(PNG_HEADER)
        );
        let path = store.save_inline("run", "plot", &encoded).await.unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(store.read(name).await.unwrap().unwrap(), PNG_HEADER);
    }

    #[tokio::test]
    async fn test_bad_base64_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FigureStore::new(dir.path());
        assert!(matches!(
            store.save_inline("run", "plot", "not base64 at all!").await,
            Err(SandboxError::Figure(_))
        ));
    }
}

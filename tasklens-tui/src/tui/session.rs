use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Per-user browse state restored on the next `browse` of the same file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub input_path: String,
    #[serde(default)]
    pub last_query: String,
    #[serde(default)]
    pub cursor: usize,
    #[serde(default)]
    pub saved_queries: Vec<String>,
}

impl Session {
    pub fn cache_path() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tasklens")
            .join("session.json")
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::cache_path())
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load() -> Option<Self> {
        Self::load_from(&Self::cache_path())
    }

    pub fn load_from(path: &Path) -> Option<Self> {
        serde_json::from_str(&std::fs::read_to_string(path).ok()?).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let s = Session {
            input_path: "tasks.json".into(),
            last_query: "project:work +next".into(),
            cursor: 12,
            saved_queries: vec!["status:pending".into()],
        };
        s.save_to(&path).unwrap();
        assert_eq!(Session::load_from(&path), Some(s));
    }

    #[test]
    fn old_or_broken_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        assert!(Session::load_from(&path).is_none());
        std::fs::write(&path, r#"{"input_path": "x.json"}"#).unwrap();
        assert_eq!(Session::load_from(&path).map(|s| s.cursor), Some(0));
        std::fs::write(&path, "garbage").unwrap();
        assert!(Session::load_from(&path).is_none());
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use super::{JobStore, SessionSnapshot};
use crate::errors::Result;

/// JSON-файл сессии с резервной копией предыдущего сохранения
#[derive(Debug, Clone)]
pub struct JsonSessionStore {
    path: PathBuf,
    backup: PathBuf,
}

impl JsonSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "session".to_string());
        let backup = path.with_file_name(format!("{}_backup.json", stem));
        Self { path, backup }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup
    }

    fn read(path: &Path) -> Result<SessionSnapshot> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl JobStore for JsonSessionStore {
    fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, &self.backup) {
                debug!("[session] backup copy failed (ignored): {}", e);
            }
        }

        let json = serde_json::to_string_pretty(snapshot)?;
        fs::write(&self.path, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }

        info!("[session] saved {} job(s)", snapshot.url_queue.len());
        Ok(())
    }

    fn load(&self) -> Result<Option<SessionSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        match Self::read(&self.path) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) if self.backup.exists() => {
                warn!("[session] {} unreadable ({}), using backup", self.path.display(), e);
                Self::read(&self.backup).map(Some)
            }
            Err(e) => Err(e),
        }
    }

    fn clear(&self) -> Result<()> {
        for path in [&self.path, &self.backup] {
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        info!("[session] cleared");
        Ok(())
    }
}

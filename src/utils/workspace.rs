//! Рабочие директории заданий
//!
//! Каждое задание получает собственную директорию для скачанного источника,
//! синтезированного аудио и промежуточных файлов.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use tempfile::TempDir;

use crate::errors::Result;

/// Превращает URL в безопасное имя директории
pub fn sanitize_filename(input: &str) -> String {
    let invalid_chars = ['/', '\\', ':', '*', '?', '"', '<', '>', '|', ' ', '\t', '&', '=', '#'];
    let mut result = input.to_lowercase();
    for c in invalid_chars {
        result = result.replace(c, "_");
    }
    let trimmed: String = result.trim_matches('_').chars().take(80).collect();
    if trimmed.is_empty() { "job".to_string() } else { trimmed }
}

enum Root {
    Owned(TempDir),
    Borrowed(PathBuf),
}

/// Директория задания
pub struct JobWorkspace {
    root: Root,
    files: Vec<PathBuf>,
    cleanup: bool,
}

impl JobWorkspace {
    /// Создает директорию внутри `base` или во временном каталоге системы
    pub fn create(base: Option<&Path>, url: &str, cleanup: bool) -> Result<Self> {
        let root = match base {
            Some(base) => {
                let dir = base.join(format!("{}_{}", sanitize_filename(url), short_id()));
                fs::create_dir_all(&dir)?;
                Root::Borrowed(dir)
            }
            None => Root::Owned(tempfile::Builder::new().prefix("narration-").tempdir()?),
        };

        Ok(Self {
            root,
            files: Vec::new(),
            cleanup,
        })
    }

    pub fn path(&self) -> &Path {
        match &self.root {
            Root::Owned(dir) => dir.path(),
            Root::Borrowed(dir) => dir,
        }
    }

    /// Путь к новому уникальному файлу внутри директории
    pub fn file_path(&mut self, prefix: &str, extension: &str) -> PathBuf {
        let path = self
            .path()
            .join(format!("{}_{}.{}", prefix, short_id(), extension));
        self.files.push(path.clone());
        path
    }

    /// Удаляет созданные файлы, если включена очистка
    ///
    /// Директория внутри `work_dir` удаляется целиком вместе со скачанным
    /// источником; временный каталог удаляется при освобождении.
    pub fn cleanup(&mut self) -> Result<()> {
        if !self.cleanup {
            return Ok(());
        }
        match &self.root {
            Root::Borrowed(dir) => {
                if dir.exists() {
                    fs::remove_dir_all(dir)?;
                    debug!("Removed workspace {}", dir.display());
                }
            }
            Root::Owned(dir) => {
                for file in &self.files {
                    if file.exists() {
                        fs::remove_file(file)?;
                    }
                }
                debug!("Removed {} workspace files in {}", self.files.len(), dir.path().display());
            }
        }
        self.files.clear();
        Ok(())
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

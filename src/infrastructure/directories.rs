use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::config::DirectoryConfig;

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub logs_dir: PathBuf,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
}

/// Creates the log and data directories and checks the data directory is writable
/// before the database is opened there.
pub fn ensure_directories(cfg: &DirectoryConfig) -> Result<ResolvedPaths> {
    let logs_dir = ensure_dir(Path::new(&cfg.logs_dir))?;
    let data_dir = ensure_dir(Path::new(&cfg.data_dir))?;
    check_writable(&data_dir)?;
    let db_path = data_dir.join(&cfg.db_filename);

    Ok(ResolvedPaths {
        logs_dir,
        data_dir,
        db_path,
    })
}

fn ensure_dir(dir: &Path) -> Result<PathBuf> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create directory {}", dir.display()))?;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = fs::metadata(dir) {
            let mut perms = metadata.permissions();
            perms.set_mode(0o755);
            let _ = fs::set_permissions(dir, perms);
        }
    }
    Ok(dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf()))
}

fn check_writable(dir: &Path) -> Result<()> {
    let marker = dir.join(".write-test");
    fs::write(&marker, b"ok")
        .with_context(|| format!("data directory {} is not writable", dir.display()))?;
    fs::remove_file(&marker)?;
    Ok(())
}

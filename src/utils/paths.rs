//! Cross-Platform Path Utilities
//!
//! Functions for resolving memory bank directories across platforms.
//! Handles ~/.memory-bank/ and the backup directory beside a database file.

use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

/// Get the user's home directory
pub fn home_dir() -> AppResult<PathBuf> {
    dirs::home_dir().ok_or_else(|| AppError::config("Could not determine home directory"))
}

/// Get the memory bank directory (~/.memory-bank/)
pub fn memory_bank_dir() -> AppResult<PathBuf> {
    Ok(home_dir()?.join(".memory-bank"))
}

/// Get the config file path (~/.memory-bank/config.json)
pub fn config_path() -> AppResult<PathBuf> {
    Ok(memory_bank_dir()?.join("config.json"))
}

/// Get the default database file path (~/.memory-bank/memory.db)
pub fn database_path() -> AppResult<PathBuf> {
    Ok(memory_bank_dir()?.join("memory.db"))
}

/// Backup directory for a database file: a sibling directory named
/// `backup_dir_name` in the same parent.
pub fn backup_dir_for(db_path: &Path, backup_dir_name: &str) -> PathBuf {
    db_path
        .parent()
        .map(|p| p.join(backup_dir_name))
        .unwrap_or_else(|| PathBuf::from(backup_dir_name))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Get the memory bank directory, creating if it doesn't exist
pub fn ensure_memory_bank_dir() -> AppResult<PathBuf> {
    let path = memory_bank_dir()?;
    ensure_dir(&path)?;
    Ok(path)
}

//! Model discovery
//!
//! Scans the models directory for checkpoint folders and appends the fixed
//! fallback identifiers.

use std::path::Path;
use tokio::fs;

use crate::types::model::ModelProfile;

/// Files whose presence marks a folder as a model checkpoint
const METADATA_FILES: [&str; 2] = ["config.json", "pytorch_model.bin"];

/// Discover available models.
///
/// Local folders come first in directory-listing order, then every fallback
/// not already present. A missing or unreadable directory only skips the
/// scan, so the result is never empty as long as `fallbacks` is not.
pub async fn discover_models(models_dir: &Path, fallbacks: &[String]) -> Vec<ModelProfile> {
    let mut names: Vec<String> = match scan_models_dir(models_dir).await {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!("Cannot scan models directory {}: {}", models_dir.display(), e);
            Vec::new()
        }
    };

    for fallback in fallbacks {
        if !names.contains(fallback) {
            names.push(fallback.clone());
        }
    }

    let mut unique: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        if !unique.contains(&name) {
            unique.push(name);
        }
    }

    unique.into_iter().map(ModelProfile::resolve).collect()
}

/// Convenience wrapper returning identifiers only
pub async fn discover_model_names(models_dir: &Path, fallbacks: &[String]) -> Vec<String> {
    discover_models(models_dir, fallbacks)
        .await
        .into_iter()
        .map(|profile| profile.name)
        .collect()
}

async fn scan_models_dir(models_dir: &Path) -> std::io::Result<Vec<String>> {
    let mut found = Vec::new();
    let mut entries = fs::read_dir(models_dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let file_type = entry.file_type().await?;
        let is_dir = if file_type.is_symlink() {
            fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false)
        } else {
            file_type.is_dir()
        };
        if !is_dir {
            continue;
        }
        if is_model_folder(&path).await {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                found.push(name.to_string());
            }
        }
    }

    Ok(found)
}

/// A folder is a model if it carries checkpoint metadata or GGUF weights.
pub async fn is_model_folder(path: &Path) -> bool {
    for file in METADATA_FILES {
        if fs::metadata(path.join(file)).await.is_ok() {
            return true;
        }
    }

    let Ok(mut entries) = fs::read_dir(path).await else {
        return false;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if has_gguf_extension(&entry.path()) {
            return true;
        }
    }
    false
}

pub fn has_gguf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gguf"))
}

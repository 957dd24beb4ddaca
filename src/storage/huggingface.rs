//! HuggingFace hub resolution
//!
//! Turns an external model identifier into a local GGUF file, downloading it
//! into the data directory on first use.

use crate::storage::StorageError;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

const HUB_BASE: &str = "https://huggingface.co";

/// GGUF conversions of the fallback checkpoints, which ship no GGUF weights
/// in their own repositories.
pub const DEFAULT_GGUF_ALIASES: [(&str, &str); 4] = [
    ("microsoft/DialoGPT-medium", "RichardErkhov/microsoft_-_DialoGPT-medium-gguf"),
    ("microsoft/DialoGPT-small", "RichardErkhov/microsoft_-_DialoGPT-small-gguf"),
    ("gpt2", "RichardErkhov/openai-community_-_gpt2-gguf"),
    ("distilgpt2", "RichardErkhov/distilbert_-_distilgpt2-gguf"),
];

pub fn default_gguf_aliases() -> HashMap<String, String> {
    DEFAULT_GGUF_ALIASES
        .iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect()
}

/// Repository to fetch GGUF weights from for `identifier`
pub fn gguf_repo_for<'a>(identifier: &'a str, aliases: &'a HashMap<String, String>) -> &'a str {
    aliases
        .get(identifier.trim())
        .map(String::as_str)
        .unwrap_or(identifier)
}

static DOWNLOAD_SEQ: AtomicU64 = AtomicU64::new(0);

/// Parsed reference to a hub repository (and optionally one file in it)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubModelRef {
    pub repo_id: String,
    pub filename: String,
    pub revision: String,
}

fn sanitize_local_filename(filename: &str) -> Result<String, StorageError> {
    let trimmed = filename.trim();
    if trimmed.is_empty() {
        return Err(StorageError::Hub("Invalid model filename".to_string()));
    }

    let no_query = trimmed.split('?').next().unwrap_or(trimmed);
    let no_fragment = no_query.split('#').next().unwrap_or(no_query);
    let no_leading = no_fragment.trim_start_matches('/');

    let flattened = no_leading.replace('\\', "/").replace('/', "__");

    let mut sanitized = String::with_capacity(flattened.len());
    for ch in flattened.chars() {
        let invalid = matches!(ch, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*');
        if invalid || ch.is_control() {
            sanitized.push('_');
        } else {
            sanitized.push(ch);
        }
    }

    while sanitized.ends_with('.') || sanitized.ends_with(' ') {
        sanitized.pop();
    }

    if sanitized.is_empty() || sanitized == ".." {
        return Err(StorageError::Hub("Invalid model filename".to_string()));
    }

    Ok(sanitized)
}

impl HubModelRef {
    /// Parse the identifier formats accepted by the chat API:
    /// 1. https://huggingface.co/owner/repo/blob/main/model.gguf
    /// 2. https://huggingface.co/owner/repo/resolve/main/model.gguf
    /// 3. owner/repo/model.gguf
    /// 4. owner/repo
    /// 5. repo (legacy un-namespaced names such as "gpt2")
    pub fn parse(identifier: &str) -> Result<Self, StorageError> {
        let id = identifier.trim();
        let id = id.split('?').next().unwrap_or(id);
        let id = id.split('#').next().unwrap_or(id);

        if id.contains("huggingface.co") {
            let path = id
                .replace("https://huggingface.co/", "")
                .replace("http://huggingface.co/", "");

            let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
            if parts.len() < 2 {
                return Err(StorageError::Hub(format!("Invalid HuggingFace URL: {}", identifier)));
            }

            let repo_id = format!("{}/{}", parts[0], parts[1]);

            if let Some(pos) = parts.iter().position(|&p| p == "blob" || p == "resolve") {
                if parts.len() > pos + 2 {
                    return Ok(Self {
                        repo_id,
                        filename: parts[pos + 2..].join("/"),
                        revision: parts[pos + 1].to_string(),
                    });
                }
            }

            return Ok(Self {
                repo_id,
                filename: String::new(),
                revision: "main".to_string(),
            });
        }

        let parts: Vec<&str> = id.split('/').filter(|p| !p.is_empty()).collect();
        match parts.len() {
            0 => Err(StorageError::Hub("Empty model identifier".to_string())),
            1 => Ok(Self {
                repo_id: parts[0].to_string(),
                filename: String::new(),
                revision: "main".to_string(),
            }),
            _ => Ok(Self {
                repo_id: format!("{}/{}", parts[0], parts[1]),
                filename: parts[2..].join("/"),
                revision: "main".to_string(),
            }),
        }
    }

    /// Build the download URL for a file in this repository
    pub fn download_url(&self, filename: &str) -> String {
        format!("{}/{}/resolve/{}/{}", HUB_BASE, self.repo_id, self.revision, filename)
    }
}

/// Pick a GGUF file from a repository listing: a Q4_K_M quantisation when
/// available, otherwise the first file in name order.
pub fn choose_gguf(mut files: Vec<String>) -> Option<String> {
    files.retain(|f| f.to_lowercase().ends_with(".gguf"));
    files.sort();
    files
        .iter()
        .find(|f| f.to_uppercase().contains("Q4_K_M"))
        .or_else(|| files.first())
        .cloned()
}

/// Resolve an external identifier to a local GGUF path, downloading it into
/// `cache_dir` if needed.
pub async fn resolve_model(identifier: &str, cache_dir: &Path) -> Result<PathBuf, StorageError> {
    let hub_ref = HubModelRef::parse(identifier)?;

    let filename = if hub_ref.filename.is_empty() {
        let files = list_repo_files(&hub_ref).await?;
        choose_gguf(files).ok_or_else(|| {
            StorageError::Hub(format!("No GGUF files found in repository {}", hub_ref.repo_id))
        })?
    } else {
        hub_ref.filename.clone()
    };

    let target_dir = cache_dir.join(sanitize_local_filename(&hub_ref.repo_id)?);
    fs::create_dir_all(&target_dir)?;

    let output_path = target_dir.join(sanitize_local_filename(&filename)?);
    if let Ok(metadata) = fs::metadata(&output_path) {
        if metadata.len() > 0 {
            tracing::info!("Model already downloaded: {}", output_path.display());
            return Ok(output_path);
        }
    }

    download_file(&hub_ref.download_url(&filename), &output_path).await?;
    Ok(output_path)
}

/// Partial-download path next to `output_path`, unique per call so that
/// concurrent downloads of the same file never share a temp file.
fn temp_download_path(output_path: &Path) -> PathBuf {
    let name = output_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string());
    let seq = DOWNLOAD_SEQ.fetch_add(1, Ordering::Relaxed);
    output_path.with_file_name(format!(".{}.{}.{}.part", name, std::process::id(), seq))
}

async fn download_file(url: &str, output_path: &Path) -> Result<(), StorageError> {
    let temp_path = temp_download_path(output_path);

    let result = match fetch_to(url, &temp_path).await {
        Ok(()) => fs::rename(&temp_path, output_path).map_err(StorageError::from),
        Err(e) => Err(e),
    };

    if result.is_err() {
        let _ = tokio::fs::remove_file(&temp_path).await;
    } else {
        tracing::info!("Download complete: {}", output_path.display());
    }
    result
}

async fn fetch_to(url: &str, temp_path: &Path) -> Result<(), StorageError> {
    tracing::info!("Downloading from: {}", url);
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(3600)) // 1 hour timeout for large models
        .user_agent("aichat/0.2.0")
        .build()?;

    let mut response = client.get(url).send().await?.error_for_status()?;
    let total_size = response.content_length();

    if let Some(total) = total_size {
        tracing::info!("File size: {}", format_size(total));
    }

    let mut temp_file = File::create(temp_path).await?;
    let mut downloaded: u64 = 0;
    while let Some(chunk) = response.chunk().await? {
        temp_file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
    }
    temp_file.flush().await?;

    if let Some(total) = total_size {
        if downloaded != total {
            return Err(StorageError::Hub(format!(
                "Download incomplete: got {} bytes, expected {}",
                downloaded, total
            )));
        }
    }

    Ok(())
}

/// List the files of a hub repository
async fn list_repo_files(hub_ref: &HubModelRef) -> Result<Vec<String>, StorageError> {
    let api_url = format!(
        "{}/api/models/{}/tree/{}",
        HUB_BASE, hub_ref.repo_id, hub_ref.revision
    );

    let files: Vec<FileInfo> = reqwest::Client::new()
        .get(&api_url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    Ok(files.into_iter().map(|f| f.path).collect())
}

#[derive(Debug, serde::Deserialize)]
struct FileInfo {
    path: String,
}

/// Get a human-readable size string
pub fn format_size(bytes: u64) -> String {
    let bytes = bytes as f64;
    if bytes < 1024.0 {
        format!("{} B", bytes as u64)
    } else if bytes < 1024.0 * 1024.0 {
        format!("{:.2} KB", bytes / 1024.0)
    } else if bytes < 1024.0 * 1024.0 * 1024.0 {
        format!("{:.2} MB", bytes / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hub_url_full() {
        let url = "https://huggingface.co/TheBloke/Llama-2-7B-GGUF/blob/main/llama-2-7b.Q4_K_M.gguf";
        let parsed = HubModelRef::parse(url).unwrap();
        assert_eq!(parsed.repo_id, "TheBloke/Llama-2-7B-GGUF");
        assert_eq!(parsed.filename, "llama-2-7b.Q4_K_M.gguf");
        assert_eq!(parsed.revision, "main");
    }

    #[test]
    fn test_parse_owner_repo() {
        let parsed = HubModelRef::parse("microsoft/DialoGPT-medium").unwrap();
        assert_eq!(parsed.repo_id, "microsoft/DialoGPT-medium");
        assert_eq!(parsed.filename, "");
    }

    #[test]
    fn test_parse_bare_name() {
        let parsed = HubModelRef::parse("gpt2").unwrap();
        assert_eq!(parsed.repo_id, "gpt2");
        assert!(HubModelRef::parse("  ").is_err());
    }

    #[test]
    fn test_download_url() {
        let parsed = HubModelRef::parse("TheBloke/Llama-2-7B-GGUF").unwrap();
        assert_eq!(
            parsed.download_url("a.gguf"),
            "https://huggingface.co/TheBloke/Llama-2-7B-GGUF/resolve/main/a.gguf"
        );
    }

    #[test]
    fn test_choose_gguf() {
        let files = vec![
            "README.md".to_string(),
            "model.Q8_0.gguf".to_string(),
            "model.Q4_K_M.gguf".to_string(),
        ];
        assert_eq!(choose_gguf(files).as_deref(), Some("model.Q4_K_M.gguf"));

        let files = vec!["b.gguf".to_string(), "a.gguf".to_string()];
        assert_eq!(choose_gguf(files).as_deref(), Some("a.gguf"));

        assert!(choose_gguf(vec!["config.json".to_string()]).is_none());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_local_filename("owner/repo").unwrap(), "owner__repo");
        assert_eq!(sanitize_local_filename("a:b?.gguf").unwrap(), "a_b");
        assert!(sanitize_local_filename("..").is_err());
    }

    #[test]
    fn test_fallbacks_have_gguf_aliases() {
        use crate::storage::settings::FALLBACK_MODELS;

        let aliases = default_gguf_aliases();
        for fallback in FALLBACK_MODELS {
            let repo = gguf_repo_for(fallback, &aliases);
            assert_ne!(repo, fallback);
            assert!(repo.to_lowercase().ends_with("-gguf"), "{} -> {}", fallback, repo);

            let parsed = HubModelRef::parse(repo).unwrap();
            assert_eq!(parsed.repo_id, repo);
            assert!(parsed.filename.is_empty());
        }
    }

    #[test]
    fn test_unaliased_identifier_passes_through() {
        let aliases = default_gguf_aliases();
        assert_eq!(
            gguf_repo_for("TheBloke/Llama-2-7B-GGUF", &aliases),
            "TheBloke/Llama-2-7B-GGUF"
        );
        assert_eq!(gguf_repo_for("gpt2", &HashMap::new()), "gpt2");
    }

    #[test]
    fn test_temp_download_paths_are_unique() {
        let output = Path::new("/models/owner__repo/model.Q4_K_M.gguf");
        let first = temp_download_path(output);
        let second = temp_download_path(output);

        assert_ne!(first, second);
        assert_eq!(first.parent(), output.parent());
        assert_ne!(first, output);
    }

    #[tokio::test]
    async fn test_truncated_download_leaves_no_files() {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n0123456789")
                .await;
            // dropping the socket cuts the body short
        });

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("model.gguf");
        let result = download_file(&format!("http://{}/model.gguf", addr), &output).await;

        assert!(result.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }
}

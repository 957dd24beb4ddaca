//! Document context
//!
//! Turns files referenced by a chat request into a text block prepended to the
//! prompt. Extraction is blocking; callers run it on the blocking pool.

use image::ImageDecoder;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Pdf(String),
    #[error("{0}")]
    Image(#[from] image::ImageError),
    #[error("path is outside the documents directory: {}", .0.display())]
    OutsideRoot(PathBuf),
}

/// What a file extension is extracted as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    Pdf,
    Image,
    Text,
    Unsupported,
}

impl DocumentKind {
    fn from_extension(ext: &str) -> Self {
        match ext {
            "pdf" => DocumentKind::Pdf,
            "jpg" | "jpeg" | "png" | "gif" => DocumentKind::Image,
            "txt" | "md" => DocumentKind::Text,
            _ => DocumentKind::Unsupported,
        }
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Extract text from one file. Unsupported types yield a marker, not an error.
pub fn extract_text(path: &Path) -> Result<String, DocumentError> {
    let ext = extension_of(path);
    match DocumentKind::from_extension(&ext) {
        DocumentKind::Pdf => extract_pdf(path),
        DocumentKind::Image => describe_image(path),
        DocumentKind::Text => Ok(fs::read_to_string(path)?),
        DocumentKind::Unsupported => Ok(format!("Unsupported file type: {}", ext)),
    }
}

/// pdf-extract panics on some malformed documents (e.g. a font reference on a
/// page without `/Resources`); the panic is turned into an error for that file.
fn extract_pdf(path: &Path) -> Result<String, DocumentError> {
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_by_pages(path))
        .map_err(|payload| DocumentError::Pdf(format!("PDF parser failed: {}", panic_message(payload.as_ref()))))?
        .map_err(|e| DocumentError::Pdf(e.to_string()))?;
    Ok(pages.join("\n").trim().to_string())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown error".to_string()
    }
}

/// Image metadata only, no OCR
fn describe_image(path: &Path) -> Result<String, DocumentError> {
    let reader = image::ImageReader::open(path)?.with_guessed_format()?;
    let format = reader
        .format()
        .map(format_name)
        .unwrap_or_else(|| "UNKNOWN".to_string());

    let decoder = reader.into_decoder()?;
    let (width, height) = decoder.dimensions();
    let mode = color_mode(decoder.color_type());

    Ok(format!(
        "Image: {}, Size: ({}, {}), Mode: {}",
        format, width, height, mode
    ))
}

fn format_name(format: image::ImageFormat) -> String {
    match format {
        image::ImageFormat::Png => "PNG".to_string(),
        image::ImageFormat::Jpeg => "JPEG".to_string(),
        image::ImageFormat::Gif => "GIF".to_string(),
        other => format!("{:?}", other).to_uppercase(),
    }
}

fn color_mode(color: image::ColorType) -> String {
    use image::ColorType;
    match color {
        ColorType::L8 => "L".to_string(),
        ColorType::La8 => "LA".to_string(),
        ColorType::Rgb8 => "RGB".to_string(),
        ColorType::Rgba8 => "RGBA".to_string(),
        ColorType::L16 => "I;16".to_string(),
        other => format!("{:?}", other),
    }
}

/// Resolve `path` against `root` and make sure it stays inside it.
fn confine(path: &Path, root: &Path) -> Result<PathBuf, DocumentError> {
    let root = root.canonicalize()?;
    let resolved = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };

    let resolved = resolved.canonicalize()?;
    if !resolved.starts_with(&root) {
        return Err(DocumentError::OutsideRoot(path.to_path_buf()));
    }
    Ok(resolved)
}

fn process_file(path: &Path, root: &Path) -> Result<String, DocumentError> {
    // Unsupported types never touch the filesystem
    let ext = extension_of(path);
    if DocumentKind::from_extension(&ext) == DocumentKind::Unsupported {
        return Ok(format!("Unsupported file type: {}", ext));
    }

    let resolved = confine(path, root)?;
    extract_text(&resolved)
}

/// Build a context block for `paths`. Per-file failures become inline
/// messages; the batch always completes.
pub fn build_context(paths: &[String], root: &Path) -> String {
    let mut context = String::from("Document Context:\n");

    for raw in paths {
        let path = Path::new(raw);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| raw.clone());

        let body = match process_file(path, root) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("File processing error for {}: {}", raw, e);
                format!("Error processing file: {}", e)
            }
        };

        context.push_str(&format!("\n--- {} ---\n{}\n", name, body));
    }

    context
}

/// Split a comma-separated request argument into trimmed, non-empty entries.
pub fn split_paths(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "Line one\nLine two").unwrap();
        fs::write(dir.path().join("data.xyz"), "opaque").unwrap();
        dir
    }

    #[test]
    fn test_text_and_unsupported() {
        let dir = fixture();
        let paths = vec!["notes.txt".to_string(), "data.xyz".to_string()];
        let context = build_context(&paths, dir.path());

        assert!(context.starts_with("Document Context:\n"));
        assert!(context.contains("\n--- notes.txt ---\nLine one\nLine two\n"));
        assert!(context.contains("\n--- data.xyz ---\nUnsupported file type: xyz\n"));
    }

    #[test]
    fn test_missing_file_does_not_abort_batch() {
        let dir = fixture();
        let paths = vec!["missing.md".to_string(), "notes.txt".to_string()];
        let context = build_context(&paths, dir.path());

        assert!(context.contains("\n--- missing.md ---\nError processing file: "));
        assert!(context.contains("Line one"));
    }

    /// Minimal PDF whose page draws with `/F1` but carries no `/Resources`
    fn pdf_without_resources() -> Vec<u8> {
        let content = "BT /F1 12 Tf 72 712 Td (Hello) Tj ET";
        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R >>".to_string(),
            format!("<< /Length {} >>\nstream\n{}\nendstream", content.len(), content),
        ];

        let mut out = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }

        let xref = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
        for offset in offsets {
            out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                objects.len() + 1,
                xref
            )
            .as_bytes(),
        );
        out
    }

    #[test]
    fn test_malformed_pdf_does_not_abort_batch() {
        let dir = fixture();
        fs::write(dir.path().join("bad.pdf"), pdf_without_resources()).unwrap();

        let paths = vec!["bad.pdf".to_string(), "notes.txt".to_string()];
        let context = build_context(&paths, dir.path());

        assert!(context.contains("\n--- bad.pdf ---\nError processing file: "));
        assert!(context.contains("\n--- notes.txt ---\nLine one\nLine two\n"));
    }

    #[test]
    fn test_escape_is_rejected() {
        let outer = tempfile::tempdir().unwrap();
        let root = outer.path().join("docs");
        fs::create_dir(&root).unwrap();
        fs::write(outer.path().join("secret.txt"), "top secret").unwrap();

        let paths = vec!["../secret.txt".to_string()];
        let context = build_context(&paths, &root);

        assert!(context.contains("Error processing file: path is outside the documents directory"));
        assert!(!context.contains("top secret"));
    }

    #[test]
    fn test_absolute_path_inside_root() {
        let dir = fixture();
        let absolute = dir.path().join("notes.txt").to_string_lossy().into_owned();
        let context = build_context(&[absolute], dir.path());
        assert!(context.contains("Line two"));
    }

    #[test]
    fn test_image_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixel.png");
        image::RgbImage::new(3, 2).save(&path).unwrap();

        assert_eq!(
            extract_text(&path).unwrap(),
            "Image: PNG, Size: (3, 2), Mode: RGB"
        );
    }

    #[test]
    fn test_extension_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("README.MD");
        fs::write(&path, "# Title").unwrap();
        assert_eq!(extract_text(&path).unwrap(), "# Title");
    }

    #[test]
    fn test_split_paths() {
        assert_eq!(split_paths(" a.txt, ,b.md,"), vec!["a.txt", "b.md"]);
        assert!(split_paths("").is_empty());
    }
}

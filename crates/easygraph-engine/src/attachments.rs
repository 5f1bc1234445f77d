use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use easygraph_contracts::chat::Attachment;

pub const MAX_ATTACHMENT_BYTES: u64 = 20 * 1024 * 1024;

/// Reads a file into a base64 attachment tagged with its MIME type.
pub fn load_attachment(path: &Path) -> Result<Attachment> {
    let metadata =
        fs::metadata(path).with_context(|| format!("failed reading {}", path.display()))?;
    if !metadata.is_file() {
        bail!("{} is not a file", path.display());
    }
    if metadata.len() > MAX_ATTACHMENT_BYTES {
        bail!(
            "{} is {} bytes; attachments are limited to {} bytes",
            path.display(),
            metadata.len(),
            MAX_ATTACHMENT_BYTES
        );
    }
    let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    Ok(Attachment::new(
        name,
        mime_for_path(path),
        BASE64.encode(bytes),
    ))
}

pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" => "image/heic",
        "csv" => "text/csv",
        "tsv" => "text/tab-separated-values",
        "txt" | "md" => "text/plain",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xls" => "application/vnd.ms-excel",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use base64::Engine as _;
    use easygraph_contracts::chat::AttachmentKind;

    use super::{load_attachment, mime_for_path, BASE64};

    #[test]
    fn csv_file_becomes_file_attachment() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("sales.CSV");
        fs::write(&path, b"month,total\nJan,10\n")?;
        let attachment = load_attachment(&path)?;
        assert_eq!(attachment.kind, AttachmentKind::File);
        assert_eq!(attachment.name, "sales.CSV");
        assert_eq!(attachment.mime_type, "text/csv");
        assert_eq!(BASE64.decode(attachment.data.as_bytes())?, b"month,total\nJan,10\n");
        Ok(())
    }

    #[test]
    fn image_extension_marks_image_attachment() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("chart.jpeg");
        fs::write(&path, b"jpeg-bytes")?;
        assert_eq!(load_attachment(&path)?.kind, AttachmentKind::Image);
        Ok(())
    }

    #[test]
    fn missing_and_directory_paths_fail() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        assert!(load_attachment(&temp.path().join("nope.csv")).is_err());
        assert!(load_attachment(temp.path()).is_err());
        Ok(())
    }

    #[test]
    fn unknown_extension_is_octet_stream() {
        assert_eq!(mime_for_path(Path::new("blob.bin")), "application/octet-stream");
        assert_eq!(mime_for_path(Path::new("noext")), "application/octet-stream");
    }
}

use crate::utils::error::AppResult;
use crate::utils::validation::sanitize_file_name;

const OCTET_STREAM: &str = "application/octet-stream";

pub struct ValidatedUpload {
    pub file_name: String,
    pub mime_type: String,
    pub extension: String,
}

/// Sniff a handful of common formats from their magic bytes.
pub fn detect_mime_from_bytes(data: &[u8]) -> Option<&'static str> {
    let detected = match data {
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [0x89, 0x50, 0x4E, 0x47, ..] => "image/png",
        [0x47, 0x49, 0x46, 0x38, ..] => "image/gif",
        [0x25, 0x50, 0x44, 0x46, ..] => "application/pdf",
        [0x50, 0x4B, 0x03, 0x04, ..] | [0x50, 0x4B, 0x05, 0x06, ..] => "application/zip",
        [0x1F, 0x8B, ..] => "application/gzip",
        [0x53, 0x51, 0x4C, 0x69, 0x74, 0x65, 0x20, 0x66, ..] => "application/vnd.sqlite3",
        [0x00, 0x00, 0x00, _, 0x66, 0x74, 0x79, 0x70, ..] => "video/mp4",
        [0x1A, 0x45, 0xDF, 0xA3, ..] => "video/webm",
        [0x49, 0x44, 0x33, ..] | [0xFF, 0xFB, ..] | [0xFF, 0xF3, ..] | [0xFF, 0xF2, ..] => {
            "audio/mpeg"
        }
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x41, 0x56, 0x45, ..] => "audio/wav",
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => "image/webp",
        _ => return None,
    };
    Some(detected)
}

/// The claimed content type when it is a well-formed, specific MIME type;
/// otherwise whatever the bytes look like; otherwise octet-stream.
pub fn resolve_mime(claimed: Option<&str>, data: &[u8]) -> String {
    let claimed = claimed
        .and_then(|c| c.parse::<mime::Mime>().ok())
        .filter(|m| m.essence_str() != OCTET_STREAM);

    if let Some(mime) = claimed {
        return mime.essence_str().to_string();
    }

    detect_mime_from_bytes(data)
        .unwrap_or(OCTET_STREAM)
        .to_string()
}

/// Lower-case extension of a file name, limited to short alphanumeric
/// suffixes so it can be embedded in a stored blob name.
pub fn extension_of(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 16
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => "bin".to_string(),
    }
}

pub fn validate_upload(
    file_name: &str,
    claimed_mime: Option<&str>,
    data: &[u8],
) -> AppResult<ValidatedUpload> {
    let file_name = sanitize_file_name(file_name)?;
    let mime_type = resolve_mime(claimed_mime, data);

    if let Some(detected) = detect_mime_from_bytes(data)
        && detected != mime_type
    {
        tracing::debug!(
            "MIME type mismatch: claimed={}, detected={}",
            mime_type,
            detected
        );
    }

    let extension = extension_of(&file_name);

    Ok(ValidatedUpload {
        file_name,
        mime_type,
        extension,
    })
}

/// `Content-Disposition` value for a download. Quotes and backslashes are
/// escaped; non-ASCII names also get an RFC 5987 `filename*` parameter.
pub fn content_disposition(file_name: &str) -> String {
    let ascii: String = file_name
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '_' })
        .collect();
    let escaped = ascii.replace('\\', "\\\\").replace('"', "\\\"");

    if file_name.is_ascii() {
        format!("attachment; filename=\"{}\"", escaped)
    } else {
        let encoded: String = file_name
            .bytes()
            .map(|b| {
                if b.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&b) {
                    (b as char).to_string()
                } else {
                    format!("%{:02X}", b)
                }
            })
            .collect();
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            escaped, encoded
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_mime() {
        assert_eq!(
            detect_mime_from_bytes(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A]),
            Some("image/png")
        );
        assert_eq!(detect_mime_from_bytes(b"%PDF-1.7"), Some("application/pdf"));
        assert_eq!(detect_mime_from_bytes(b""), None);
        assert_eq!(detect_mime_from_bytes(b"hello"), None);
    }

    #[test]
    fn test_resolve_mime_prefers_specific_claim() {
        assert_eq!(resolve_mime(Some("text/plain; charset=utf-8"), b"hi"), "text/plain");
        assert_eq!(
            resolve_mime(Some("application/octet-stream"), b"%PDF-1.4"),
            "application/pdf"
        );
        assert_eq!(resolve_mime(Some("not a mime"), b"%PDF-1.4"), "application/pdf");
        assert_eq!(resolve_mime(None, b""), "application/octet-stream");
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("photo.JPG"), "jpg");
        assert_eq!(extension_of("archive.tar.gz"), "gz");
        assert_eq!(extension_of("README"), "bin");
        assert_eq!(extension_of(".bashrc"), "bin");
        assert_eq!(extension_of("weird.ex$t"), "bin");
    }

    #[test]
    fn test_validate_upload_allows_empty_content() {
        let upload = validate_upload("empty.txt", Some("text/plain"), b"").unwrap();
        assert_eq!(upload.file_name, "empty.txt");
        assert_eq!(upload.mime_type, "text/plain");
        assert_eq!(upload.extension, "txt");
    }

    #[test]
    fn test_content_disposition_escapes_quotes() {
        assert_eq!(
            content_disposition("a\"b.txt"),
            "attachment; filename=\"a\\\"b.txt\""
        );
    }

    #[test]
    fn test_content_disposition_non_ascii() {
        let value = content_disposition("résumé.pdf");
        assert!(value.starts_with("attachment; filename=\"r_sum_.pdf\""));
        assert!(value.ends_with("filename*=UTF-8''r%C3%A9sum%C3%A9.pdf"));
    }
}

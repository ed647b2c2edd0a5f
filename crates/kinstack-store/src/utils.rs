//! Shared helpers: upload ids, range headers, continuation tokens and
//! content-type guessing.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::types::ByteRange;

// ---------------------------------------------------------------------------
// ID generation
// ---------------------------------------------------------------------------

/// Generate an upload id for a multipart upload.
///
/// # Examples
///
/// ```
/// use kinstack_store::utils::generate_upload_id;
///
/// let id = generate_upload_id();
/// assert_eq!(id.len(), 36);
/// ```
#[must_use]
pub fn generate_upload_id() -> String {
    Uuid::new_v4().to_string()
}

// ---------------------------------------------------------------------------
// Range header parsing
// ---------------------------------------------------------------------------

/// Parse an HTTP `Range` header value into a [`ByteRange`] of an object of
/// `content_length` bytes.
///
/// Supported formats:
/// - `bytes=0-499` -- first 500 bytes
/// - `bytes=-500` -- last 500 bytes
/// - `bytes=500-` -- from byte 500 to the end
///
/// # Examples
///
/// ```
/// use kinstack_store::types::ByteRange;
/// use kinstack_store::utils::parse_range_header;
///
/// assert_eq!(parse_range_header("bytes=0-499", 1000).unwrap(), ByteRange::new(0, 500));
/// assert_eq!(parse_range_header("bytes=-10", 1000).unwrap(), ByteRange::new(990, 10));
/// ```
pub fn parse_range_header(range: &str, content_length: u64) -> StoreResult<ByteRange> {
    let invalid = || StoreError::InvalidArgument(format!("Invalid range header: {range}"));
    let spec = range.strip_prefix("bytes=").ok_or_else(invalid)?;

    let unsatisfiable = |offset: u64| StoreError::InvalidRange {
        offset,
        length: 0,
        size: content_length,
    };

    if let Some(suffix) = spec.strip_prefix('-') {
        let n: u64 = suffix.parse().map_err(|_| invalid())?;
        if n == 0 {
            return Err(unsatisfiable(content_length));
        }
        let n = n.min(content_length);
        Ok(ByteRange::new(content_length - n, n))
    } else if let Some(prefix) = spec.strip_suffix('-') {
        let start: u64 = prefix.parse().map_err(|_| invalid())?;
        if start >= content_length {
            return Err(unsatisfiable(start));
        }
        Ok(ByteRange::from_offset(start))
    } else {
        let (start, end) = spec.split_once('-').ok_or_else(invalid)?;
        let start: u64 = start.parse().map_err(|_| invalid())?;
        let end: u64 = end.parse().map_err(|_| invalid())?;
        if start > end {
            return Err(invalid());
        }
        if start >= content_length {
            return Err(unsatisfiable(start));
        }
        let end = end.min(content_length - 1);
        Ok(ByteRange::new(start, end - start + 1))
    }
}

// ---------------------------------------------------------------------------
// Continuation tokens
// ---------------------------------------------------------------------------

/// Encode an object name as a base64 continuation token.
///
/// # Examples
///
/// ```
/// use kinstack_store::utils::{decode_continuation_token, encode_continuation_token};
///
/// let token = encode_continuation_token("photos/2024/img.jpg");
/// assert_eq!(decode_continuation_token(&token).unwrap(), "photos/2024/img.jpg");
/// ```
#[must_use]
pub fn encode_continuation_token(name: &str) -> String {
    BASE64_STANDARD.encode(name.as_bytes())
}

/// Decode a base64 continuation token back to an object name.
pub fn decode_continuation_token(token: &str) -> StoreResult<String> {
    let bytes = BASE64_STANDARD
        .decode(token)
        .map_err(|_| StoreError::InvalidArgument("Invalid continuation token".to_owned()))?;
    String::from_utf8(bytes).map_err(|_| {
        StoreError::InvalidArgument("Continuation token contains invalid UTF-8".to_owned())
    })
}

// ---------------------------------------------------------------------------
// Content types
// ---------------------------------------------------------------------------

/// Guess a MIME type from the extension of an object name.
///
/// # Examples
///
/// ```
/// use kinstack_store::utils::guess_content_type;
///
/// assert_eq!(guess_content_type("photos/cat.JPG"), "image/jpeg");
/// assert_eq!(guess_content_type("archive"), "application/octet-stream");
/// ```
#[must_use]
pub fn guess_content_type(name: &str) -> String {
    let file = name.rsplit('/').next().unwrap_or(name);
    let Some((_, ext)) = file.rsplit_once('.') else {
        return mime::APPLICATION_OCTET_STREAM.to_string();
    };
    let guessed = match ext.to_ascii_lowercase().as_str() {
        "txt" | "log" => mime::TEXT_PLAIN,
        "htm" | "html" => mime::TEXT_HTML,
        "css" => mime::TEXT_CSS,
        "csv" => mime::TEXT_CSV,
        "xml" => mime::TEXT_XML,
        "js" | "mjs" => mime::TEXT_JAVASCRIPT,
        "json" => mime::APPLICATION_JSON,
        "pdf" => mime::APPLICATION_PDF,
        "jpg" | "jpeg" => mime::IMAGE_JPEG,
        "png" => mime::IMAGE_PNG,
        "gif" => mime::IMAGE_GIF,
        "bmp" => mime::IMAGE_BMP,
        "svg" => mime::IMAGE_SVG,
        "woff" => mime::FONT_WOFF,
        "woff2" => mime::FONT_WOFF2,
        "mp4" => return "video/mp4".to_owned(),
        "mp3" => return "audio/mpeg".to_owned(),
        "zip" => return "application/zip".to_owned(),
        "gz" => return "application/gzip".to_owned(),
        "tar" => return "application/x-tar".to_owned(),
        _ => mime::APPLICATION_OCTET_STREAM,
    };
    guessed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_generate_unique_upload_ids() {
        let a = generate_upload_id();
        let b = generate_upload_id();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn test_should_parse_range_forms() {
        assert_eq!(parse_range_header("bytes=500-", 1000).unwrap(), ByteRange::from_offset(500));
        assert_eq!(parse_range_header("bytes=0-5000", 1000).unwrap(), ByteRange::new(0, 1000));
        assert_eq!(parse_range_header("bytes=-5000", 1000).unwrap(), ByteRange::new(0, 1000));
    }

    #[test]
    fn test_should_reject_bad_ranges() {
        assert!(matches!(
            parse_range_header("items=0-1", 10),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            parse_range_header("bytes=5-1", 10),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            parse_range_header("bytes=10-", 10),
            Err(StoreError::InvalidRange { .. })
        ));
        assert!(matches!(
            parse_range_header("bytes=-0", 10),
            Err(StoreError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_should_reject_garbage_tokens() {
        assert!(decode_continuation_token("!!!").is_err());
        let not_utf8 = BASE64_STANDARD.encode([0xff, 0xfe]);
        assert!(decode_continuation_token(&not_utf8).is_err());
    }

    #[test]
    fn test_should_guess_content_types() {
        assert_eq!(guess_content_type("index.html"), "text/html");
        assert_eq!(guess_content_type("data.json"), "application/json");
        assert_eq!(guess_content_type("dir.d/file"), "application/octet-stream");
        assert_eq!(guess_content_type("a.tar"), "application/x-tar");
    }
}

//! ETag computation.
//!
//! Single-shot objects and parts use the hex MD5 of their content. Completed
//! multipart objects use the MD5 of the concatenated binary part digests,
//! suffixed with `-<part count>`. ETags are stored unquoted.

use digest::Digest;

/// Compute the hex-encoded MD5 digest of `data`.
///
/// # Examples
///
/// ```
/// use kinstack_store::checksums::compute_md5;
///
/// assert_eq!(compute_md5(b"hello"), "5d41402abc4b2a76b9719d911017c592");
/// ```
#[must_use]
pub fn compute_md5(data: &[u8]) -> String {
    let hash = md5::Md5::digest(data);
    hex::encode(hash)
}

/// Compute the ETag of a completed multipart object.
///
/// Each entry in `part_etags` is the hex MD5 of one part, in part order;
/// surrounding quotes are ignored.
///
/// # Examples
///
/// ```
/// use kinstack_store::checksums::compute_multipart_etag;
///
/// let etag = compute_multipart_etag(&["5d41402abc4b2a76b9719d911017c592"]);
/// assert!(etag.ends_with("-1"));
/// ```
#[must_use]
pub fn compute_multipart_etag(part_etags: &[impl AsRef<str>]) -> String {
    let mut combined = Vec::with_capacity(part_etags.len() * 16);
    for etag in part_etags {
        if let Ok(bytes) = hex::decode(etag.as_ref().trim_matches('"')) {
            combined.extend_from_slice(&bytes);
        }
    }
    let digest = hex::encode(md5::Md5::digest(&combined));
    format!("{digest}-{}", part_etags.len())
}

/// Whether `etag` has the shape of a hex MD5 digest.
#[must_use]
pub fn is_md5_hex(etag: &str) -> bool {
    etag.len() == 32 && etag.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Strip surrounding quotes a client may have echoed back.
#[must_use]
pub fn canonical_etag(etag: &str) -> &str {
    etag.trim_matches('"')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_compute_md5_of_empty_input() {
        assert_eq!(compute_md5(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_should_compute_multipart_etag_over_binary_digests() {
        let a = compute_md5(b"part one");
        let b = compute_md5(b"part two");
        let etag = compute_multipart_etag(&[&a, &b]);

        let mut raw = hex::decode(&a).unwrap();
        raw.extend(hex::decode(&b).unwrap());
        assert_eq!(etag, format!("{}-2", compute_md5(&raw)));
    }

    #[test]
    fn test_should_ignore_quotes_in_part_etags() {
        let plain = compute_md5(b"x");
        let quoted = format!("\"{plain}\"");
        assert_eq!(
            compute_multipart_etag(&[&plain]),
            compute_multipart_etag(&[&quoted])
        );
        assert_eq!(canonical_etag(&quoted), plain);
    }

    #[test]
    fn test_should_recognise_md5_hex() {
        assert!(is_md5_hex("d41d8cd98f00b204e9800998ecf8427e"));
        assert!(!is_md5_hex("d41d8cd98f00b204"));
        assert!(!is_md5_hex("z41d8cd98f00b204e9800998ecf8427e"));
    }
}

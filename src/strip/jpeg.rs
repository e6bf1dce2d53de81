//! JPEG metadata stripper
//!
//! Walks the marker segments of a JPEG stream and drops the ones that
//! carry metadata: APP1 (Exif, XMP), APP13 (IPTC / Photoshop) and COM.
//! APP0 (JFIF), APP2 (ICC profile), APP14 (Adobe colour transform) and
//! every coding segment are kept, so the image decodes identically.
//! Entropy-coded data after SOS is copied verbatim.

use super::MetadataStripper;
use crate::error::{MetaSafeError, Result};
use async_trait::async_trait;
use bytes::Bytes;

const MARKER_PREFIX: u8 = 0xFF;
const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const TEM: u8 = 0x01;
const APP1: u8 = 0xE1;
const APP13: u8 = 0xED;
const COM: u8 = 0xFE;

/// Metadata stripper for `image/jpeg`
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegMetadataStripper;

impl JpegMetadataStripper {
    /// Create a new JPEG stripper
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetadataStripper for JpegMetadataStripper {
    async fn strip(&self, content: Bytes) -> Result<Bytes> {
        // Large photos take a while to walk; keep it off the event loop.
        tokio::task::spawn_blocking(move || strip_jpeg(&content).map(Bytes::from))
            .await
            .map_err(|e| MetaSafeError::StripFailure(format!("JPEG strip task failed: {}", e)))?
    }

    fn name(&self) -> &str {
        "jpeg"
    }
}

/// Whether a marker segment carries metadata that must not leave the device
fn is_metadata_segment(marker: u8) -> bool {
    matches!(marker, APP1 | APP13 | COM)
}

/// Markers that stand alone without a length field
fn is_standalone(marker: u8) -> bool {
    marker == TEM || (0xD0..=0xD7).contains(&marker)
}

/// Remove metadata segments from a JPEG stream
pub fn strip_jpeg(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < 4 || data[0] != MARKER_PREFIX || data[1] != SOI {
        return Err(MetaSafeError::StripFailure(
            "Not a JPEG stream: missing SOI marker".to_string(),
        ));
    }

    let mut out = Vec::with_capacity(data.len());
    out.extend_from_slice(&data[..2]);
    let mut pos = 2;

    loop {
        if pos >= data.len() {
            return Err(MetaSafeError::StripFailure(
                "Truncated JPEG: stream ended before image data".to_string(),
            ));
        }
        if data[pos] != MARKER_PREFIX {
            return Err(MetaSafeError::StripFailure(format!(
                "Invalid JPEG: expected marker at offset {}, found 0x{:02X}",
                pos, data[pos]
            )));
        }

        // Any number of 0xFF fill bytes may precede a marker
        while pos < data.len() && data[pos] == MARKER_PREFIX {
            pos += 1;
        }
        if pos >= data.len() {
            return Err(MetaSafeError::StripFailure(
                "Truncated JPEG: marker without code".to_string(),
            ));
        }
        let marker = data[pos];
        pos += 1;

        if marker == 0x00 {
            return Err(MetaSafeError::StripFailure(format!(
                "Invalid JPEG: stuffed byte outside scan at offset {}",
                pos - 1
            )));
        }

        if marker == EOI {
            out.extend_from_slice(&[MARKER_PREFIX, EOI]);
            return Ok(out);
        }

        if is_standalone(marker) {
            out.extend_from_slice(&[MARKER_PREFIX, marker]);
            continue;
        }

        if pos + 2 > data.len() {
            return Err(MetaSafeError::StripFailure(format!(
                "Truncated JPEG: missing length for marker 0x{:02X}",
                marker
            )));
        }
        let length = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
        if length < 2 {
            return Err(MetaSafeError::StripFailure(format!(
                "Invalid JPEG: segment 0x{:02X} has length {}",
                marker, length
            )));
        }
        let end = pos + length;
        if end > data.len() {
            return Err(MetaSafeError::StripFailure(format!(
                "Truncated JPEG: segment 0x{:02X} needs {} bytes, {} left",
                marker,
                length,
                data.len() - pos
            )));
        }

        if marker == SOS {
            // Scan header, entropy data and everything after it stay as-is
            out.push(MARKER_PREFIX);
            out.push(marker);
            out.extend_from_slice(&data[pos..]);
            return Ok(out);
        }

        if is_metadata_segment(marker) {
            tracing::trace!(marker, length, "Dropping JPEG segment");
        } else {
            out.push(MARKER_PREFIX);
            out.push(marker);
            out.extend_from_slice(&data[pos..end]);
        }
        pos = end;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn segment(marker: u8, payload: &[u8]) -> Vec<u8> {
        let len = (payload.len() + 2) as u16;
        let mut seg = vec![0xFF, marker];
        seg.extend_from_slice(&len.to_be_bytes());
        seg.extend_from_slice(payload);
        seg
    }

    /// A minimal JPEG layout: JFIF, Exif with GPS, a comment, DQT and a scan
    pub(crate) fn jpeg_with_exif() -> Vec<u8> {
        let mut data = vec![0xFF, SOI];
        data.extend(segment(0xE0, b"JFIF\0\x01\x01\0\0\x01\0\x01\0\0"));
        data.extend(segment(APP1, b"Exif\0\0MM\0*GPS 37.7749,-122.4194"));
        data.extend(segment(COM, b"shot on Pixel"));
        data.extend(segment(0xDB, &[0u8; 65]));
        data.extend(segment(SOS, &[1, 1, 0, 0, 63, 0]));
        data.extend_from_slice(&[0x12, 0xFF, 0x00, 0x34, 0xFF, 0xD0, 0x56]);
        data.extend_from_slice(&[0xFF, EOI]);
        data
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn test_strip_removes_exif_and_comment() {
        let input = jpeg_with_exif();
        let output = strip_jpeg(&input).unwrap();

        assert!(output.len() < input.len());
        assert!(!contains(&output, b"Exif"));
        assert!(!contains(&output, b"GPS"));
        assert!(!contains(&output, b"shot on Pixel"));
        assert!(contains(&output, b"JFIF"));
        assert_eq!(&output[..2], &[0xFF, SOI]);
        assert_eq!(&output[output.len() - 2..], &[0xFF, EOI]);
    }

    #[test]
    fn test_strip_keeps_scan_data_verbatim() {
        let input = jpeg_with_exif();
        let output = strip_jpeg(&input).unwrap();
        let scan = [0x12, 0xFF, 0x00, 0x34, 0xFF, 0xD0, 0x56];
        assert!(contains(&output, &scan));
    }

    #[test]
    fn test_strip_is_idempotent() {
        let once = strip_jpeg(&jpeg_with_exif()).unwrap();
        let twice = strip_jpeg(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_strip_keeps_icc_and_adobe() {
        let mut data = vec![0xFF, SOI];
        data.extend(segment(0xE2, b"ICC_PROFILE\0"));
        data.extend(segment(0xEE, b"Adobe"));
        data.extend(segment(APP13, b"Photoshop 3.0\08BIM"));
        data.extend(segment(SOS, &[0]));
        data.extend_from_slice(&[0xFF, EOI]);

        let output = strip_jpeg(&data).unwrap();
        assert!(contains(&output, b"ICC_PROFILE"));
        assert!(contains(&output, b"Adobe"));
        assert!(!contains(&output, b"Photoshop"));
    }

    #[test]
    fn test_strip_handles_fill_bytes() {
        let mut data = vec![0xFF, SOI, 0xFF, 0xFF];
        data.extend(segment(APP1, b"Exif\0\0"));
        data.extend_from_slice(&[0xFF, EOI]);
        let output = strip_jpeg(&data).unwrap();
        assert_eq!(output, vec![0xFF, SOI, 0xFF, EOI]);
    }

    #[test]
    fn test_strip_rejects_non_jpeg() {
        assert!(strip_jpeg(b"\x89PNG\r\n\x1a\n").is_err());
        assert!(strip_jpeg(&[]).is_err());
        assert!(strip_jpeg(&[0xFF, SOI]).is_err());
    }

    #[test]
    fn test_strip_rejects_truncated_segment() {
        let mut data = vec![0xFF, SOI, 0xFF, APP1, 0x00, 0x40];
        data.extend_from_slice(b"Exif");
        let err = strip_jpeg(&data).unwrap_err();
        assert!(err.to_string().contains("Truncated"));
    }

    #[test]
    fn test_strip_rejects_missing_image_data() {
        let mut data = vec![0xFF, SOI];
        data.extend(segment(0xE0, b"JFIF\0"));
        assert!(strip_jpeg(&data).is_err());
    }

    #[test]
    fn test_strip_rejects_garbage_between_segments() {
        let mut data = vec![0xFF, SOI];
        data.extend(segment(0xE0, b"JFIF\0"));
        data.extend_from_slice(&[0x00, 0x11, 0x22]);
        assert!(strip_jpeg(&data).is_err());
    }

    #[test]
    fn test_strip_rejects_bad_length() {
        let data = vec![0xFF, SOI, 0xFF, 0xE0, 0x00, 0x01, 0xFF, EOI];
        assert!(strip_jpeg(&data).is_err());
    }

    #[tokio::test]
    async fn test_async_strip() {
        let stripper = JpegMetadataStripper::new();
        assert_eq!(stripper.name(), "jpeg");

        let output = stripper
            .strip(Bytes::from(jpeg_with_exif()))
            .await
            .unwrap();
        assert!(!contains(&output, b"Exif"));

        let err = stripper.strip(Bytes::from_static(b"nope")).await;
        assert!(matches!(err, Err(MetaSafeError::StripFailure(_))));
    }
}

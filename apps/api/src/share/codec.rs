//! Attachment codec. Turns shared file bytes into self-describing base64 data URLs
//! and back.
//!
//! Encoding never hands the whole byte range to a single call: input is fed to the
//! encoder in fixed windows, so peak work per step stays bounded regardless of file size.

use std::io::Write;

use base64::{engine::general_purpose::STANDARD, write::EncoderStringWriter, Engine as _};
use thiserror::Error;
use tracing::debug;

use crate::share::models::SerializedAttachment;

pub const ENCODE_WINDOW_BYTES: usize = 32 * 1024;
pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("attachment is {size} bytes, ceiling is {ceiling}")]
    TooLarge { size: usize, ceiling: usize },

    #[error("encoding failed: {0}")]
    Encode(#[from] std::io::Error),

    #[error("not a base64 data URL")]
    NotDataUrl,

    #[error("invalid base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// A data URL turned back into bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAttachment {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Synthesized name for the `position`-th (1-based) shared file.
pub fn fallback_name(position: usize) -> String {
    format!("shared-file-{position}")
}

/// Normalizes a declared content type for use inside a data URL: the `type/subtype`
/// essence lowercased, followed by any well-formed `key=value` parameters
/// (`text/plain;charset=utf-8`). Malformed parameters are dropped; a missing or
/// unusable essence becomes the octet-stream fallback.
pub fn normalize_mime_type(declared: Option<&str>) -> String {
    let mut parts = declared.unwrap_or_default().split(';');
    let essence = parts
        .next()
        .map(|m| m.trim().to_ascii_lowercase())
        .unwrap_or_default();

    let valid = match essence.split_once('/') {
        Some((kind, sub)) => {
            !kind.is_empty() && !sub.is_empty() && !sub.contains('/') && is_token(&essence)
        }
        None => false,
    };
    if !valid {
        return FALLBACK_MIME_TYPE.to_string();
    }

    let mut normalized = essence;
    for param in parts {
        match param.trim().split_once('=') {
            Some((key, value))
                if !key.trim().is_empty()
                    && !value.trim().is_empty()
                    && is_token(key.trim())
                    && is_token(value.trim()) =>
            {
                normalized.push(';');
                normalized.push_str(&key.trim().to_ascii_lowercase());
                normalized.push('=');
                normalized.push_str(value.trim());
            }
            _ => debug!(param, "Dropping malformed MIME parameter"),
        }
    }
    normalized
}

/// No characters that would break the data-URL header.
fn is_token(value: &str) -> bool {
    !value.contains(|c: char| c.is_whitespace() || c == ',' || c == ';' || c == '"')
}

/// Serializes one shared file.
///
/// `position` is the file's 1-based place in the submission and only matters when
/// `name` is missing. Files above `ceiling` are rejected before any encoding work.
pub fn serialize_attachment(
    bytes: &[u8],
    mime_type: Option<&str>,
    name: Option<&str>,
    position: usize,
    ceiling: usize,
) -> Result<SerializedAttachment, CodecError> {
    if bytes.len() > ceiling {
        return Err(CodecError::TooLarge {
            size: bytes.len(),
            ceiling,
        });
    }

    let mime_type = normalize_mime_type(mime_type);
    let name = name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(String::from)
        .unwrap_or_else(|| fallback_name(position));

    let mut encoder =
        EncoderStringWriter::from_consumer(format!("data:{mime_type};base64,"), &STANDARD);
    for window in bytes.chunks(ENCODE_WINDOW_BYTES) {
        encoder.write_all(window)?;
    }
    let encoded_data = encoder.into_inner();

    Ok(SerializedAttachment {
        name,
        mime_type,
        byte_size: bytes.len(),
        encoded_data,
    })
}

/// Decodes a `data:<mime>;base64,<payload>` string.
pub fn decode_data_url(data_url: &str) -> Result<DecodedAttachment, CodecError> {
    let rest = data_url.strip_prefix("data:").ok_or(CodecError::NotDataUrl)?;
    let (header, payload) = rest.split_once(',').ok_or(CodecError::NotDataUrl)?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or(CodecError::NotDataUrl)?
        .trim();

    let mime_type = if mime.is_empty() {
        FALLBACK_MIME_TYPE.to_string()
    } else {
        mime.to_string()
    };

    Ok(DecodedAttachment {
        mime_type,
        bytes: STANDARD.decode(payload.trim())?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CEILING: usize = 10 * 1024 * 1024;

    fn sample_bytes(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    #[test]
    fn test_round_trip_preserves_bytes_and_mime() {
        for len in [0, 1, 2, 3, 100, ENCODE_WINDOW_BYTES - 1, ENCODE_WINDOW_BYTES + 1, 200_000] {
            let bytes = sample_bytes(len);
            let attachment =
                serialize_attachment(&bytes, Some("image/png"), Some("shot.png"), 1, CEILING)
                    .unwrap();
            let decoded = decode_data_url(&attachment.encoded_data).unwrap();
            assert_eq!(decoded.bytes, bytes, "length {len}");
            assert_eq!(decoded.mime_type, "image/png");
            assert_eq!(attachment.byte_size, len);
        }
    }

    #[test]
    fn test_windowed_encoding_matches_single_shot() {
        let bytes = sample_bytes(3 * ENCODE_WINDOW_BYTES + 17);
        let attachment =
            serialize_attachment(&bytes, Some("image/jpeg"), None, 1, CEILING).unwrap();
        let expected = format!("data:image/jpeg;base64,{}", STANDARD.encode(&bytes));
        assert_eq!(attachment.encoded_data, expected);
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let bytes = sample_bytes(70_000);
        let a = serialize_attachment(&bytes, Some("image/png"), None, 1, CEILING).unwrap();
        let b = serialize_attachment(&bytes, Some("image/png"), None, 1, CEILING).unwrap();
        assert_eq!(a.encoded_data, b.encoded_data);
    }

    #[test]
    fn test_oversized_is_rejected() {
        let bytes = sample_bytes(1025);
        let err = serialize_attachment(&bytes, Some("image/png"), None, 1, 1024).unwrap_err();
        assert!(matches!(err, CodecError::TooLarge { size: 1025, ceiling: 1024 }));
    }

    #[test]
    fn test_exactly_at_ceiling_is_accepted() {
        let bytes = sample_bytes(1024);
        assert!(serialize_attachment(&bytes, None, None, 1, 1024).is_ok());
    }

    #[test]
    fn test_fallback_name_and_mime() {
        let attachment = serialize_attachment(b"abc", None, Some("  "), 3, CEILING).unwrap();
        assert_eq!(attachment.name, "shared-file-3");
        assert_eq!(attachment.mime_type, FALLBACK_MIME_TYPE);
        assert!(attachment
            .encoded_data
            .starts_with("data:application/octet-stream;base64,"));
    }

    #[test]
    fn test_normalize_mime_type_keeps_wellformed_parameters() {
        assert_eq!(
            normalize_mime_type(Some("Text/Plain; Charset=utf-8")),
            "text/plain;charset=utf-8"
        );
        assert_eq!(normalize_mime_type(Some("text/plain; charset=; x")), "text/plain");
        assert_eq!(normalize_mime_type(Some("text/plain; q=\"a,b\"")), "text/plain");
        assert_eq!(normalize_mime_type(Some("image/png")), "image/png");
        assert_eq!(normalize_mime_type(Some("garbage")), FALLBACK_MIME_TYPE);
        assert_eq!(normalize_mime_type(Some("a/b/c")), FALLBACK_MIME_TYPE);
        assert_eq!(normalize_mime_type(Some("image/p,ng")), FALLBACK_MIME_TYPE);
        assert_eq!(normalize_mime_type(None), FALLBACK_MIME_TYPE);
    }

    #[test]
    fn test_round_trip_preserves_mime_parameters() {
        let attachment = serialize_attachment(
            "héllo".as_bytes(),
            Some("text/plain; charset=utf-8"),
            Some("note.txt"),
            1,
            CEILING,
        )
        .unwrap();
        assert!(attachment
            .encoded_data
            .starts_with("data:text/plain;charset=utf-8;base64,"));
        let decoded = decode_data_url(&attachment.encoded_data).unwrap();
        assert_eq!(decoded.mime_type, "text/plain;charset=utf-8");
        assert_eq!(decoded.bytes, "héllo".as_bytes());
    }

    #[test]
    fn test_decode_rejects_non_data_urls() {
        assert!(matches!(
            decode_data_url("https://example.com/a.png"),
            Err(CodecError::NotDataUrl)
        ));
        assert!(matches!(
            decode_data_url("data:image/png,rawtext"),
            Err(CodecError::NotDataUrl)
        ));
        assert!(matches!(
            decode_data_url("data:image/png;base64,@@@"),
            Err(CodecError::Decode(_))
        ));
    }
}

use encoding_rs::Encoding;

/// Encodings tried, in order, when the server names no charset.
const CANDIDATE_ENCODINGS: [&str; 3] = ["utf-8", "gbk", "latin-1"];

/// Extracts the `charset=` parameter from a `Content-Type` header value.
pub(crate) fn charset_from_content_type(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            let value = value.trim().trim_matches('"');
            (!value.is_empty()).then_some(value)
        } else {
            None
        }
    })
}

/// Decodes a fetched body to text. Never fails.
///
/// 1. A `charset=` on the `Content-Type` wins; bytes invalid in that charset
///    become U+FFFD.
/// 2. Otherwise the first of UTF-8, GBK and Latin-1 that decodes cleanly.
/// 3. Otherwise lossy UTF-8.
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> String {
    if let Some(label) = content_type.and_then(charset_from_content_type) {
        match Encoding::for_label(label.as_bytes()) {
            Some(encoding) => {
                let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
                if had_errors {
                    tracing::debug!(charset = %label, "Replaced undecodable bytes");
                }
                return text.into_owned();
            }
            None => tracing::debug!(charset = %label, "Unknown charset label, detecting"),
        }
    }

    for label in CANDIDATE_ENCODINGS {
        let Some(encoding) = Encoding::for_label(label.as_bytes()) else {
            continue;
        };
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            return strip_bom(text.into_owned());
        }
    }

    strip_bom(String::from_utf8_lossy(bytes).into_owned())
}

fn strip_bom(text: String) -> String {
    match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // "中央" in GBK
    const GBK_BYTES: [u8; 4] = [0xD6, 0xD0, 0xD1, 0xEB];

    #[test]
    fn test_charset_param_parsing() {
        assert_eq!(
            charset_from_content_type("text/plain; charset=GBK"),
            Some("GBK")
        );
        assert_eq!(
            charset_from_content_type("text/plain;charset=\"utf-8\""),
            Some("utf-8")
        );
        assert_eq!(charset_from_content_type("text/plain"), None);
        assert_eq!(charset_from_content_type("text/plain; charset="), None);
    }

    #[test]
    fn test_utf8_detected() {
        assert_eq!(decode_body("央视,http://a".as_bytes(), None), "央视,http://a");
    }

    #[test]
    fn test_gbk_detected_without_header() {
        assert_eq!(decode_body(&GBK_BYTES, None), "中央");
    }

    #[test]
    fn test_header_charset_wins() {
        assert_eq!(decode_body(&GBK_BYTES, Some("text/plain; charset=gbk")), "中央");
    }

    #[test]
    fn test_header_charset_replaces_bad_bytes() {
        let text = decode_body(&GBK_BYTES, Some("text/plain; charset=utf-8"));
        assert!(text.contains('\u{fffd}'));
    }

    #[test]
    fn test_latin1_fallback_never_fails() {
        // Invalid in UTF-8 and GBK
        let bytes = [0x41, 0xFF, 0x42];
        let text = decode_body(&bytes, None);
        assert!(text.starts_with('A'));
        assert!(text.ends_with('B'));
    }

    #[test]
    fn test_bom_removed() {
        let bytes = b"\xEF\xBB\xBFCNN,http://a";
        assert_eq!(decode_body(bytes, None), "CNN,http://a");
    }
}

//! Final filename resolution for downloaded assets.
//!
//! A URL such as `https://host/models/sd_xl_base_1.0.safetensors` encodes its
//! filename directly. Gated hosts usually serve from an opaque path
//! (`/api/download/models/12345`) and name the file in the
//! `Content-Disposition` response header instead.

use std::sync::OnceLock;

use regex::Regex;
use reqwest::Url;

/// Name used when neither the URL nor the response yields a filename.
pub const FALLBACK_NAME: &str = "download.bin";

fn extended_filename_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)filename\*\s*=\s*"?([^;"]+)"?"#).ok())
        .as_ref()
}

fn plain_filename_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)filename\s*=\s*(?:"([^"]*)"|([^;]+))"#).ok())
        .as_ref()
}

/// Filename encoded in the URL's last path segment.
///
/// Returns `None` unless the segment looks like a final filename, meaning it
/// carries an extension (`model.safetensors`, not `12345`).
pub fn from_url(url: &str) -> Option<String> {
    let segment = last_segment(url)?;
    let name = sanitize(&unescape(&segment))?;
    has_extension(&name).then_some(name)
}

/// Placeholder name for a URL without a final filename.
///
/// Uses the last path segment when there is one, so that two opaque URLs on
/// one host still get distinct temporary names.
pub fn placeholder(url: &str) -> String {
    last_segment(url)
        .and_then(|s| sanitize(&unescape(&s)))
        .unwrap_or_else(|| FALLBACK_NAME.to_string())
}

/// Filename carried by a `Content-Disposition` header value.
///
/// The RFC 5987 `filename*=` form wins over the plain `filename=` form.
pub fn from_content_disposition(header: &str) -> Option<String> {
    if let Some(caps) = extended_filename_re().and_then(|re| re.captures(header)) {
        let raw = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        // charset'language'value
        let value = match raw.splitn(3, '\'').collect::<Vec<_>>().as_slice() {
            [_, _, value] => *value,
            _ => raw,
        };
        if let Some(name) = sanitize(&unescape(value)) {
            return Some(name);
        }
    }

    let caps = plain_filename_re()?.captures(header)?;
    let raw = caps
        .get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().trim())?;
    sanitize(raw)
}

/// Reduce a candidate to a safe final path component.
///
/// Anything up to the last `/` or `\` is dropped; empty, `.` and `..` are
/// rejected.
pub fn sanitize(candidate: &str) -> Option<String> {
    let base = candidate
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .trim_matches('\0');
    match base {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}

fn last_segment(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    Some(segment.to_string())
}

fn has_extension(name: &str) -> bool {
    match name.rfind('.') {
        Some(idx) => idx > 0 && idx + 1 < name.len(),
        None => false,
    }
}

/// Decode `%XX` escapes; invalid UTF-8 is replaced rather than rejected.
fn unescape(input: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(input.as_bytes())).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_url_with_extension() {
        assert_eq!(
            from_url("https://huggingface.co/x/resolve/main/sd_xl_base_1.0.safetensors"),
            Some("sd_xl_base_1.0.safetensors".to_string())
        );
        assert_eq!(
            from_url("https://host/files/my%20model.ckpt?download=true"),
            Some("my model.ckpt".to_string())
        );
    }

    #[test]
    fn test_from_url_without_extension() {
        assert_eq!(from_url("https://civitai.com/api/download/models/12345"), None);
        assert_eq!(from_url("https://host/"), None);
        assert_eq!(from_url("https://host/.hidden"), None);
        assert_eq!(from_url("not a url"), None);
    }

    #[test]
    fn test_placeholder() {
        assert_eq!(
            placeholder("https://civitai.com/api/download/models/12345"),
            "12345"
        );
        assert_eq!(placeholder("https://host/"), FALLBACK_NAME);
    }

    #[test]
    fn test_content_disposition_plain() {
        assert_eq!(
            from_content_disposition(r#"attachment; filename="epicrealism.safetensors""#),
            Some("epicrealism.safetensors".to_string())
        );
        assert_eq!(
            from_content_disposition("attachment; filename=lora.safetensors; size=12"),
            Some("lora.safetensors".to_string())
        );
    }

    #[test]
    fn test_content_disposition_extended_wins() {
        let header = r#"attachment; filename="fallback.bin"; filename*=UTF-8''real%20name.safetensors"#;
        assert_eq!(
            from_content_disposition(header),
            Some("real name.safetensors".to_string())
        );
    }

    #[test]
    fn test_content_disposition_strips_paths() {
        assert_eq!(
            from_content_disposition(r#"attachment; filename="../../etc/passwd""#),
            Some("passwd".to_string())
        );
        assert_eq!(from_content_disposition(r#"attachment; filename="..""#), None);
        assert_eq!(from_content_disposition("inline"), None);
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("a/b\\c.bin"), Some("c.bin".to_string()));
        assert_eq!(sanitize("  "), None);
        assert_eq!(sanitize("."), None);
    }

    #[test]
    fn test_escaped_names_decode() {
        assert_eq!(
            from_url("https://host/loras/caf%C3%A9%2Bstyle.safetensors"),
            Some("café+style.safetensors".to_string())
        );
        assert_eq!(
            from_content_disposition("attachment; filename*=UTF-8''100%25%20v2.ckpt"),
            Some("100% v2.ckpt".to_string())
        );
        // a stray `%` is kept, an escaped slash still cannot smuggle a path
        assert_eq!(placeholder("https://host/dl/50%off"), "50%off");
        assert_eq!(
            from_url("https://host/dl/..%2F..%2Fevil.bin"),
            Some("evil.bin".to_string())
        );
    }
}

//! Local filename for a download.
//!
//! The server's Content-Disposition wins (`filename*` over `filename`); else
//! the last path segment of the requested URL, percent-decoded. The result is
//! stripped of characters that are unsafe in a path component.

const FALLBACK: &str = "download.bin";
const NAME_MAX: usize = 255;

pub fn derive_filename(url: &str, content_disposition: Option<&str>) -> String {
    let raw = content_disposition
        .and_then(disposition_filename)
        .or_else(|| url_filename(url));
    match raw.map(|r| sanitize(&r)) {
        Some(name) if !name.is_empty() => name,
        _ => FALLBACK.to_string(),
    }
}

/// Filename parameter of a Content-Disposition header value.
pub fn disposition_filename(value: &str) -> Option<String> {
    let mut plain = None;
    for param in value.split(';') {
        let Some((name, v)) = param.split_once('=') else {
            continue;
        };
        let name = name.trim();
        let v = v.trim();
        if name.eq_ignore_ascii_case("filename*") {
            // RFC 5987: charset'language'percent-encoded
            let encoded = v.splitn(3, '\'').nth(2).unwrap_or(v);
            let decoded = percent_decode(encoded.trim_matches('"'));
            if !decoded.is_empty() {
                return Some(decoded);
            }
        } else if name.eq_ignore_ascii_case("filename") {
            let unquoted = match v.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
                Some(inner) => unescape_quoted(inner),
                None => v.to_string(),
            };
            if !unquoted.is_empty() {
                plain = Some(unquoted);
            }
        }
    }
    plain
}

/// Last non-empty path segment of `url`, percent-decoded.
pub fn url_filename(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    Some(percent_decode(segment))
}

/// Drops characters that are illegal or risky in a filename, trailing dots
/// and spaces, and the names `.` and `..`; caps the length at 255 bytes.
pub fn sanitize(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '/' | '\\' | '?' | '<' | '>' | ':' | '*' | '|' | '"'))
        .collect();
    let trimmed = kept.trim_start().trim_end_matches(|c| c == '.' || c == ' ');
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return String::new();
    }
    let mut end = trimmed.len().min(NAME_MAX);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}

fn unescape_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;
    for c in s.chars() {
        if escaped || c != '\\' {
            out.push(c);
            escaped = false;
        } else {
            escaped = true;
        }
    }
    out
}

/// Decodes `%XX` escapes; malformed escapes are kept literally and invalid
/// UTF-8 is replaced.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(h), Some(l)) = (hex(bytes[i + 1]), hex(bytes[i + 2])) {
                out.push(h << 4 | l);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

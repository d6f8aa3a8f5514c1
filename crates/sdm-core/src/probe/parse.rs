//! Header parsing for the probe response.

/// What the probe needs from a response head.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ProbeHead {
    pub content_length: Option<u64>,
    /// Complete length from `Content-Range: bytes a-b/total` (absent for `*`).
    pub range_total: Option<u64>,
    pub content_disposition: Option<String>,
}

impl ProbeHead {
    /// Full resource length, or 0 if the server did not say.
    pub fn total_length(&self) -> u64 {
        self.range_total.or(self.content_length).unwrap_or(0)
    }
}

/// Parses header lines of the final response (status line optional).
pub(crate) fn parse_head(lines: &[String]) -> ProbeHead {
    let mut head = ProbeHead::default();
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            head.content_length = value.parse().ok();
        } else if name.eq_ignore_ascii_case("content-range") {
            head.range_total = content_range_total(value);
        } else if name.eq_ignore_ascii_case("content-disposition") {
            head.content_disposition = Some(value.to_string());
        }
    }
    head
}

/// Total from `bytes <first>-<last>/<total>`; `None` for `*` or garbage.
pub(crate) fn content_range_total(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (_, total) = rest.split_once('/')?;
    total.trim().parse().ok()
}

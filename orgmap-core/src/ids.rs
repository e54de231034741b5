// Record ids and object names as they appear in record page URLs.

use regex::Regex;
use std::sync::LazyLock;

/// Canonical, case-insensitive id length
pub const RECORD_ID_LEN: usize = 18;
const SHORT_ID_LEN: usize = 15;
const CHECKSUM_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ012345";

static LIGHTNING_RECORD_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)/lightning/r/[^/]+/(\w{15,18})/").expect("lightning id pattern")
});
static QUERY_RECORD_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[?&]id=(\w{15,18})").expect("query id pattern"));
static BARE_RECORD_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([a-zA-Z0-9]{15}|[a-zA-Z0-9]{18})\b").expect("bare id pattern")
});
static LIGHTNING_OBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/lightning/r/([^/]+)/([a-zA-Z0-9]{15,18})/").expect("lightning object pattern")
});

fn checksum_suffix(short_id: &str) -> String {
    short_id
        .as_bytes()
        .chunks(5)
        .map(|chunk| {
            let index = chunk
                .iter()
                .enumerate()
                .filter(|(_, b)| b.is_ascii_uppercase())
                .fold(0usize, |acc, (bit, _)| acc | (1 << bit));
            CHECKSUM_ALPHABET[index] as char
        })
        .collect()
}

/// Canonical 18-character form of a record id.
///
/// 15-character ids get their case-safe suffix, anything longer than 18 is
/// truncated. Values that are not alphanumeric, or whose length falls
/// between the two forms, are rejected.
pub fn normalize_record_id(value: &str) -> Option<String> {
    let value = value.trim();
    let candidate: String = value.chars().take(RECORD_ID_LEN).collect();
    if !candidate.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }

    match candidate.len() {
        SHORT_ID_LEN => {
            let suffix = checksum_suffix(&candidate);
            Some(candidate + &suffix)
        }
        RECORD_ID_LEN => Some(candidate),
        _ => None,
    }
}

/// Record id of a page URL: a `/lightning/r/` path first, then an `id=`
/// parameter, then any bare id-shaped word. A capture that is not a valid
/// id falls through to the next shape.
pub fn find_record_id(url: &str) -> Option<String> {
    [&*LIGHTNING_RECORD_ID, &*QUERY_RECORD_ID, &*BARE_RECORD_ID]
        .iter()
        .find_map(|re| {
            re.captures(url)
                .and_then(|c| c.get(1))
                .and_then(|m| normalize_record_id(m.as_str()))
        })
}

pub fn find_object_name(url: &str) -> Option<String> {
    LIGHTNING_OBJECT
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|name| !name.is_empty())
}

/// `Object:id`, the identity of a graph node
pub fn node_key(object_name: &str, record_id: &str) -> String {
    format!("{}:{}", object_name, record_id)
}

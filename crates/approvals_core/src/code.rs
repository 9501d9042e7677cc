//! Human-readable record codes (`WFT-…`, `WF-…`).

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const TEMPLATE_CODE_PREFIX: &str = "WFT";
pub const INSTANCE_CODE_PREFIX: &str = "WF";

/// `PREFIX-<millis base36>-<4 hex of id>`, all upper case.
pub fn human_code(prefix: &str, at: DateTime<Utc>, id: Uuid) -> String {
    let millis = u64::try_from(at.timestamp_millis()).unwrap_or_default();
    let simple = id.simple().to_string();
    format!(
        "{}-{}-{}",
        prefix,
        to_base36(millis),
        simple[..4].to_ascii_uppercase()
    )
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).unwrap_or_default()
}

use thiserror::Error;

pub const KB: u64 = 1024;
pub const MB: u64 = 1024 * KB;
pub const GB: u64 = 1024 * MB;
const TB: u64 = 1024 * GB;

/// Whole megabytes in `bytes`, truncated (`bytes >> 20`).
pub const fn bytes_to_mb(bytes: u64) -> u64 {
    bytes >> 20
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ByteSizeParseError {
    #[error("byte size is empty")]
    Empty,
    #[error("invalid byte size number `{0}`")]
    InvalidNumber(String),
    #[error("unknown byte size suffix `{0}` (expected one of: B, K, KB, KiB, M, MB, MiB, G, GB, GiB, T, TB, TiB)")]
    UnknownSuffix(String),
    #[error("byte size `{0}` overflows u64")]
    Overflow(String),
}

/// Parse a byte count with an optional binary-unit suffix.
///
/// Accepts plain integers (`"1048576"`) and JVM/human style sizes (`"512m"`, `"2G"`, `"16GiB"`).
/// Suffixes are case-insensitive and always use 1024 multiples, matching how `-Xmx` is read.
pub fn parse_byte_size(raw: &str) -> Result<u64, ByteSizeParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ByteSizeParseError::Empty);
    }

    let split = raw
        .find(|ch: char| !ch.is_ascii_digit() && ch != '_')
        .unwrap_or(raw.len());
    let (number, suffix) = raw.split_at(split);
    let number: String = number.chars().filter(|ch| *ch != '_').collect();
    if number.is_empty() {
        return Err(ByteSizeParseError::InvalidNumber(raw.to_owned()));
    }
    let value = number
        .parse::<u64>()
        .map_err(|_| ByteSizeParseError::InvalidNumber(raw.to_owned()))?;

    let multiplier = match suffix.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => KB,
        "m" | "mb" | "mib" => MB,
        "g" | "gb" | "gib" => GB,
        "t" | "tb" | "tib" => TB,
        _ => return Err(ByteSizeParseError::UnknownSuffix(suffix.trim().to_owned())),
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| ByteSizeParseError::Overflow(raw.to_owned()))
}

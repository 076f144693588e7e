//! Identifier and numeric helpers

use bech32::Bech32m;
use uuid7::uuid7;

pub const USER_HRP: &str = "user_";
pub const APPLICATION_HRP: &str = "app_";

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Rounds to two decimals, half away from zero. Applied at every cascade tier.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Splits `total` into `parts` equal shares rounded to cents. Zero parts yields zero.
pub fn even_share(total: f64, parts: usize) -> f64 {
    if parts == 0 {
        return 0.0;
    }
    round_cents(total / parts as f64)
}

/// `PREFIX` followed by the zero padded sequence number.
pub fn format_code(prefix: &str, seq: u64, width: usize) -> String {
    format!("{prefix}{seq:0width$}")
}

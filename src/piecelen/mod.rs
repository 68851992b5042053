//! Piece-length selection: chooses the piece-size exponent from total
//! size, tracker rules, and an optional user cap.

use crate::error::{Error, Result};
use crate::trackerrules::{self, TrackerRule};

pub const MIN_EXP: u32 = 16;
pub const MAX_EXP: u32 = 27;
/// Automatic mode never chooses beyond 16 MiB unless a tracker or user
/// cap raises the ceiling.
pub const AUTO_MAX_EXP: u32 = 24;

const SIZE_BUCKETS: &[(u64, u32)] = &[
    (64 << 20, 15),
    (128 << 20, 16),
    (256 << 20, 17),
    (512 << 20, 18),
    (1 << 30, 19),
    (2 << 30, 20),
    (4 << 30, 21),
    (8 << 30, 22),
    (16 << 30, 23),
    (32 << 30, 24),
    (64 << 30, 25),
    (128 << 30, 26),
];

fn exponent_for_size(total_size: u64) -> u32 {
    for (max_size, exp) in SIZE_BUCKETS {
        if total_size <= *max_size {
            return *exp;
        }
    }
    27
}

/// Select the piece-length exponent for `total_size` bytes, optionally
/// honoring a user-supplied cap and the rule for `tracker_url` (if any
/// rule matches). Returns the exponent `exp` such that the piece length
/// is `2^exp`.
pub fn select_exponent(total_size: u64, user_max_exp: Option<u32>, tracker_url: Option<&str>) -> Result<u32> {
    let mut max_exp_effective = AUTO_MAX_EXP;
    let rule = tracker_url.and_then(trackerrules::lookup);

    if let Some(rule) = rule {
        max_exp_effective = rule.max_piece_exp;
        if let Some(recommended) = rule.recommended_exp(total_size) {
            return Ok(recommended.clamp(MIN_EXP, max_exp_effective));
        }
    }

    let mut auto_mode = true;
    if let Some(user_exp) = user_max_exp {
        auto_mode = false;
        let capped = user_exp.min(MAX_EXP);
        if capped >= MIN_EXP {
            max_exp_effective = capped;
        }
    }

    let mut exp = exponent_for_size(total_size);
    if auto_mode {
        exp = exp.min(AUTO_MAX_EXP);
    }

    Ok(exp.clamp(MIN_EXP, max_exp_effective))
}

/// Validate a user-chosen exponent against the tracker's permitted
/// range, if a rule matches. Fails with a message naming the tracker.
pub fn validate_user_exponent(exp: u32, tracker_url: Option<&str>) -> Result<()> {
    let max_exp_effective = tracker_url
        .and_then(trackerrules::lookup)
        .map(|rule: &TrackerRule| rule.max_piece_exp)
        .unwrap_or(MAX_EXP);

    if exp < MIN_EXP || exp > max_exp_effective {
        return match tracker_url {
            Some(url) => Err(Error::TrackerExponentExceeded {
                url: url.to_string(),
                max_exp: max_exp_effective,
                requested: exp,
            }),
            None => Err(Error::InvalidPieceLength {
                exp,
                min: MIN_EXP,
                max: max_exp_effective,
            }),
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_mode_follows_size_buckets() {
        assert_eq!(select_exponent(39, None, None).unwrap(), 15);
        assert_eq!(select_exponent(100 << 20, None, None).unwrap(), 16);
        assert_eq!(select_exponent(300 << 20, None, None).unwrap(), 17);
        assert_eq!(select_exponent(1500 << 20, None, None).unwrap(), 20);
    }

    #[test]
    fn auto_mode_never_exceeds_24() {
        // Far beyond 128 GiB would normally want exp=27.
        let huge = 500u64 << 30;
        assert_eq!(select_exponent(huge, None, None).unwrap(), 24);
    }

    #[test]
    fn user_cap_above_27_is_clamped() {
        let huge = 500u64 << 30;
        assert_eq!(select_exponent(huge, Some(30), None).unwrap(), 27);
    }

    #[test]
    fn tracker_with_max_exp_caps_selection() {
        // S3: tracker max_piece_exp=23, total 100 GiB -> 23, never 24.
        let url = "https://tracker.trackera.example/announce";
        assert_eq!(select_exponent(100u64 << 30, None, Some(url)).unwrap(), 23);
    }

    #[test]
    fn tracker_with_size_bands_returns_recommended_exp() {
        // S4: tracker size bands; 1.5 GiB falls in the 1 MiB (exp 20) band.
        let url = "https://tracker.trackera.example/announce";
        assert_eq!(
            select_exponent(1500u64 << 20, None, Some(url)).unwrap(),
            20
        );
    }

    #[test]
    fn validate_user_exponent_rejects_out_of_range() {
        assert!(validate_user_exponent(10, None).is_err());
        assert!(validate_user_exponent(28, None).is_err());
        assert!(validate_user_exponent(20, None).is_ok());
    }
}

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

/// OTP validity window.
pub const OTP_TTL_MINUTES: i64 = 10;

/// A freshly issued one-time password: a 6-digit numeric code and the moment
/// it stops being acceptable. Transport (email) is the caller's concern.
#[derive(Debug, Clone)]
pub struct IssuedOtp {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

pub fn issue() -> IssuedOtp {
    let code = rand::rng().random_range(100_000..1_000_000u32).to_string();
    IssuedOtp {
        code,
        expires_at: Utc::now() + Duration::minutes(OTP_TTL_MINUTES),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_six_digits() {
        for _ in 0..100 {
            let otp = issue();
            assert_eq!(otp.code.len(), 6);
            assert!(otp.code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn expiry_is_ten_minutes_out() {
        let otp = issue();
        let window = otp.expires_at - Utc::now();
        assert!(window > Duration::minutes(9));
        assert!(window <= Duration::minutes(10));
    }
}

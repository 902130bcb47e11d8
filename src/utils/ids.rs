use chrono::{DateTime, Utc};

/// Record ids are the movement timestamp down to the microsecond,
/// `YYYYMMDDhhmmss` plus six fractional digits (20 characters).
pub fn generate_unique_id(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d%H%M%S%6f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn ids_are_twenty_digit_timestamps() {
        let at = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap()
            + chrono::Duration::microseconds(89);
        let id = generate_unique_id(at);
        assert_eq!(id, "20250304050607000089");
        assert_eq!(id.len(), 20);
    }
}

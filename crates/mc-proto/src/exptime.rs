use std::time::{Duration, SystemTime, UNIX_EPOCH};

const THIRTY_DAYS: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Encodes a TTL into the wire `exptime` field, reproducing the memcached quirk (§4.1.3):
///
/// - `None` or zero TTL → `0` (no expiration).
/// - TTL under 30 days → the TTL itself, as integer seconds.
/// - TTL at or over 30 days → an absolute unix timestamp, since the server disambiguates a
///   relative offset from an absolute time purely by magnitude.
pub fn encode_exptime(ttl: Option<Duration>) -> u32 {
    let Some(ttl) = ttl.filter(|ttl| !ttl.is_zero()) else {
        return 0;
    };

    if ttl < THIRTY_DAYS {
        ttl.as_secs() as u32
    } else {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        (now + ttl).as_secs() as u32
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn zero_and_none_both_mean_no_expiration() {
        assert_eq!(encode_exptime(None), 0);
        assert_eq!(encode_exptime(Some(Duration::ZERO)), 0);
    }

    #[test]
    fn short_ttl_is_relative_seconds() {
        assert_eq!(encode_exptime(Some(Duration::from_secs(60))), 60);
        assert_eq!(encode_exptime(Some(Duration::from_secs(29 * 86400))), 29 * 86400);
    }

    #[test]
    fn long_ttl_is_absolute_unix_time() {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as u32;
        let encoded = encode_exptime(Some(Duration::from_secs(31 * 86400)));
        assert!(encoded >= now + 31 * 86400);
        assert!(encoded < now + 31 * 86400 + 5);
    }

    proptest! {
        /// The boundary is the only thing that changes behavior: any TTL under 30 days round-trips
        /// as exactly itself, any TTL at or over it becomes a now-relative absolute timestamp
        /// strictly greater than the TTL's own seconds count (since `now` is always > 0).
        #[test]
        fn below_boundary_is_exact_seconds(secs in 0u64..THIRTY_DAYS.as_secs()) {
            prop_assert_eq!(encode_exptime(Some(Duration::from_secs(secs))), secs as u32);
        }

        #[test]
        fn at_or_above_boundary_is_absolute_and_ahead_of_its_own_ttl(extra_secs in 0u64..3_650 * 86_400) {
            let ttl = Duration::from_secs(THIRTY_DAYS.as_secs() + extra_secs);
            let encoded = encode_exptime(Some(ttl));
            prop_assert!(u64::from(encoded) > ttl.as_secs());
        }
    }
}

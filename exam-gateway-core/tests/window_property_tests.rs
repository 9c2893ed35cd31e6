use chrono::{TimeZone, Utc};
use exam_gateway_core::{EndpointPolicy, FixedWindow, RateLimitDecision};
use proptest::prelude::*;

proptest! {
    #[test]
    fn reset_at_is_aligned_regardless_of_position(
        now_ms in 0i64..4_000_000_000_000,
        window_ms in 1u64..86_400_000,
    ) {
        let now = Utc.timestamp_millis_opt(now_ms).unwrap();
        let window = FixedWindow::containing(now, window_ms);

        let expected_start = (now_ms / window_ms as i64) * window_ms as i64;
        prop_assert_eq!(window.start.timestamp_millis(), expected_start);
        prop_assert_eq!(window.reset_at.timestamp_millis(), expected_start + window_ms as i64);
        prop_assert!(window.start <= now && now < window.reset_at);
    }

    #[test]
    fn kth_request_allowed_iff_within_limit(
        max_requests in 1u32..500,
        k in 1i64..1_000,
        now_ms in 0i64..4_000_000_000_000,
    ) {
        let policy = EndpointPolicy::new(60_000, max_requests);
        let now = Utc.timestamp_millis_opt(now_ms).unwrap();
        let window = FixedWindow::containing(now, policy.window_ms);

        let decision = RateLimitDecision::from_count(k, policy, window, now);
        prop_assert_eq!(decision.allowed, k <= i64::from(max_requests));
        prop_assert_eq!(decision.retry_after.is_some(), !decision.allowed);
        if let Some(retry_after) = decision.retry_after {
            prop_assert!(retry_after > 0 && retry_after <= 60);
        }
    }
}

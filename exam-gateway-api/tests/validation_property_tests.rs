use exam_gateway_api::security::{
    constant_time_eq, detect_adversarial, sanitize, validate_length, validate_positive_int,
    CsrfGuard, FieldKind,
};
use proptest::prelude::*;

proptest! {
    #[test]
    fn sanitized_output_has_no_markup_characters(input in ".*") {
        let escaped = sanitize(&input);
        prop_assert!(!escaped.contains(|c: char| matches!(c, '<' | '>' | '"' | '\'' | '/')));
    }

    #[test]
    fn length_check_matches_trimmed_char_count(input in "\\PC{0,260}") {
        let result = validate_length(&input, FieldKind::Subject);
        prop_assert_eq!(result.valid, input.trim().chars().count() <= 200);
    }

    #[test]
    fn any_u32_is_accepted_without_bound(n in any::<u32>()) {
        let text = n.to_string();
        let result = validate_positive_int(&text, None);
        prop_assert_eq!(result.sanitized, Some(text));
    }

    #[test]
    fn negative_numbers_are_rejected(n in i64::MIN..0) {
        prop_assert!(!validate_positive_int(&n.to_string(), None).valid);
    }

    #[test]
    fn plain_words_are_never_adversarial(words in proptest::collection::vec("[a-z]{1,12}", 0..20)) {
        let text = words.join(" ");
        prop_assert_eq!(detect_adversarial(&text), None);
    }

    #[test]
    fn constant_time_eq_agrees_with_equality(a in any::<Vec<u8>>(), b in any::<Vec<u8>>()) {
        prop_assert_eq!(constant_time_eq(&a, &b), a == b);
        prop_assert!(constant_time_eq(&a, &a));
    }
}

#[test]
fn generated_tokens_validate_against_themselves_only() {
    let guard = CsrfGuard::default();
    let token = CsrfGuard::generate_token();
    let other = CsrfGuard::generate_token();

    assert!(guard.validate(Some(&token), Some(&token)).is_ok());
    assert!(guard.validate(Some(&token), Some(&other)).is_err());
}

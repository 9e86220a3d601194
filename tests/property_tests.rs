/// Property-based tests using proptest
/// Tests invariants that should hold for all inputs
use lead_intake_api::models::LeadForm;
use lead_intake_api::notifications::escape_html;
use lead_intake_api::retry_client::backoff_delay_ms;
use proptest::prelude::*;
use validator::Validate;

fn form_with(name: String, email: String, message: String) -> LeadForm {
    LeadForm {
        name,
        email,
        message,
        locale: "en".to_string(),
        token: "test-token".to_string(),
        ..Default::default()
    }
}

// Property: backoff stays inside the jitter envelope
proptest! {
    #[test]
    fn backoff_within_jitter_envelope(attempt in 1u32..=6, initial in 1u64..=5000) {
        let base = initial * (1u64 << (attempt - 1));
        let delay = backoff_delay_ms(attempt, initial);
        prop_assert!(delay >= base / 2, "delay {} below half of base {}", delay, base);
        prop_assert!(delay <= base, "delay {} above base {}", delay, base);
    }

    #[test]
    fn backoff_never_panics(attempt in 0u32..=100, initial in 0u64..=u64::MAX / 2) {
        let _ = backoff_delay_ms(attempt, initial);
    }
}

// Property: HTML escaping neutralizes markup for any input
proptest! {
    #[test]
    fn escaped_text_contains_no_raw_markup(text in "\\PC*") {
        let escaped = escape_html(&text);
        prop_assert!(!escaped.contains('<'));
        prop_assert!(!escaped.contains('>'));
        prop_assert!(!escaped.contains('"'));
        prop_assert!(!escaped.contains('\''));
    }

    #[test]
    fn escaping_preserves_plain_text(text in "[a-zA-Z0-9 .,:@-]*") {
        // No escapable characters means the text passes through untouched
        prop_assert_eq!(escape_html(&text), text);
    }
}

// Property: the validation schema admits exactly the documented shapes
proptest! {
    #[test]
    fn names_inside_bounds_validate(name in "[a-zA-Z][a-zA-Z ]{1,98}[a-zA-Z]") {
        prop_assume!(name.len() >= 2 && name.len() <= 100);
        let form = form_with(name, "test@example.com".to_string(), String::new());
        prop_assert!(form.validate().is_ok());
    }

    #[test]
    fn overlong_names_rejected(extra in 1usize..=50) {
        let form = form_with("x".repeat(100 + extra), "test@example.com".to_string(), String::new());
        prop_assert!(form.validate().is_err());
    }

    #[test]
    fn single_char_names_rejected(name in "[a-zA-Z]") {
        let form = form_with(name, "test@example.com".to_string(), String::new());
        prop_assert!(form.validate().is_err());
    }

    #[test]
    fn simple_valid_emails_validate(local in "[a-z][a-z0-9]{0,15}", domain in "[a-z]{2,12}", tld in "[a-z]{2,4}") {
        let email = format!("{}@{}.{}", local, domain, tld);
        let form = form_with("Test User".to_string(), email, String::new());
        prop_assert!(form.validate().is_ok());
    }

    #[test]
    fn emails_without_at_sign_rejected(email in "[a-z0-9.]{1,30}") {
        prop_assume!(!email.contains('@'));
        let form = form_with("Test User".to_string(), email, String::new());
        prop_assert!(form.validate().is_err());
    }
}

// Property: normalization is deterministic and never mutates the form
proptest! {
    #[test]
    fn email_lowercasing_is_idempotent(local in "[a-zA-Z][a-zA-Z0-9]{0,15}", domain in "[a-zA-Z]{2,12}") {
        let email = format!("{}@{}.com", local, domain);
        let form = form_with("Test User".to_string(), email.clone(), String::new());

        let first = form.to_submission();
        let second = form.to_submission();

        prop_assert_eq!(&first.email, &second.email);
        prop_assert_eq!(first.email.clone(), first.email.to_lowercase());
        // The form keeps the caller's casing
        prop_assert_eq!(&form.email, &email);
    }

    #[test]
    fn empty_optionals_become_absent_nonempty_pass_through(phone in "[0-9]{0,15}") {
        let mut form = form_with("Test User".to_string(), "test@example.com".to_string(), String::new());
        form.phone = phone.clone();
        let submission = form.to_submission();
        if phone.is_empty() {
            prop_assert_eq!(submission.phone, None);
        } else {
            prop_assert_eq!(submission.phone, Some(phone));
        }
    }

    #[test]
    fn message_is_never_absent(message in "\\PC{0,200}") {
        let mut form = form_with("Test User".to_string(), "test@example.com".to_string(), String::new());
        form.message = message.clone();
        let submission = form.to_submission();
        // Even an empty message stays a string
        prop_assert_eq!(submission.message, message);
    }
}

// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recipient address helpers.
//!
//! Phone numbers are accepted in any punctuation (`+62 811-1222-333`) and
//! normalized to the chat network's JID form (`628111222333@s.whatsapp.net`).

use std::sync::LazyLock;

use regex::Regex;

use crate::error::CourierError;

/// Domain suffix of individual-user addresses.
pub const USER_JID_SUFFIX: &str = "@s.whatsapp.net";

/// Country code prefixed to numbers that lack one.
pub const DEFAULT_COUNTRY_CODE: &str = "62";

static VALID_PHONE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^62\d{9,13}$").unwrap());

fn digits(input: &str) -> String {
    input.chars().filter(char::is_ascii_digit).collect()
}

/// Returns the phone part of a JID, or the input unchanged if it has no `@`.
pub fn phone_from_jid(jid: &str) -> &str {
    jid.split('@').next().unwrap_or(jid)
}

/// Whether `input` (phone number or user JID) is a deliverable user address.
///
/// A JID must carry the user domain; any other domain is rejected.
pub fn is_valid_phone(input: &str) -> bool {
    if let Some((_, domain)) = input.split_once('@') {
        if USER_JID_SUFFIX.strip_prefix('@') != Some(domain) {
            return false;
        }
    }
    VALID_PHONE.is_match(&digits(phone_from_jid(input)))
}

/// Normalizes a phone number or JID to a user JID.
///
/// Non-digits and leading zeros are stripped and the default country code is
/// prepended when missing. The result is always rebuilt from the digits.
pub fn to_jid(input: &str) -> String {
    let cleaned = digits(phone_from_jid(input));
    let cleaned = cleaned.trim_start_matches('0');
    if cleaned.starts_with(DEFAULT_COUNTRY_CODE) {
        format!("{cleaned}{USER_JID_SUFFIX}")
    } else {
        format!("{DEFAULT_COUNTRY_CODE}{cleaned}{USER_JID_SUFFIX}")
    }
}

/// Validates `input` and returns its JID, or a validation error.
pub fn resolve_recipient(input: &str) -> Result<String, CourierError> {
    if !is_valid_phone(input) {
        return Err(CourierError::Validation(format!(
            "invalid phone number format: {input}"
        )));
    }
    Ok(to_jid(input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn valid_numbers_accept_punctuation() {
        assert!(is_valid_phone("628111222333"));
        assert!(is_valid_phone("+62 811-1222-333"));
        assert!(is_valid_phone("628111222333@s.whatsapp.net"));
    }

    #[test]
    fn invalid_numbers_rejected() {
        assert!(!is_valid_phone(""));
        assert!(!is_valid_phone("08111222333"));
        assert!(!is_valid_phone("62811"));
        assert!(!is_valid_phone("6281112223334445556"));
        assert!(!is_valid_phone("not-a-number"));
    }

    #[test]
    fn to_jid_normalizes() {
        assert_eq!(to_jid("628111222333"), "628111222333@s.whatsapp.net");
        assert_eq!(to_jid("08111222333"), "628111222333@s.whatsapp.net");
        assert_eq!(to_jid("+62 811 1222 333"), "628111222333@s.whatsapp.net");
        assert_eq!(
            to_jid("+62 811-1222-333@s.whatsapp.net"),
            "628111222333@s.whatsapp.net"
        );
    }

    #[test]
    fn resolve_recipient_rejects_invalid() {
        let err = resolve_recipient("12345").unwrap_err();
        assert!(matches!(err, CourierError::Validation(_)));
        assert_eq!(
            resolve_recipient("628111222333").unwrap(),
            "628111222333@s.whatsapp.net"
        );
    }

    #[test]
    fn resolve_recipient_rebuilds_jids() {
        assert_eq!(
            resolve_recipient("+62 811-1222-333@s.whatsapp.net").unwrap(),
            "628111222333@s.whatsapp.net"
        );
        assert!(matches!(
            resolve_recipient("628111222333@evil.example"),
            Err(CourierError::Validation(_))
        ));
        assert!(resolve_recipient("628111222333@g.us").is_err());
    }

    proptest! {
        #[test]
        fn resolved_jid_is_rebuilt_from_digits(subscriber in "[0-9]{9,13}", sep in "[ .-]?") {
            let spaced: String = subscriber
                .chars()
                .flat_map(|c| std::iter::once(c).chain(sep.chars()))
                .collect();
            let expected = format!("62{subscriber}{USER_JID_SUFFIX}");
            let resolved = resolve_recipient(&format!("+62{spaced}")).unwrap();
            prop_assert_eq!(&resolved, &expected);
            prop_assert_eq!(to_jid(&resolved), expected);
        }
    }

    #[test]
    fn phone_from_jid_splits() {
        assert_eq!(phone_from_jid("628111222333@s.whatsapp.net"), "628111222333");
        assert_eq!(phone_from_jid("628111222333"), "628111222333");
    }
}

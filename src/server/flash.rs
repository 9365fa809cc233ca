// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! One-shot messages carried across a redirect in a signed cookie.

use axum_extra::extract::cookie::{Cookie, Key, SameSite, SignedCookieJar};
use sha2::{Digest, Sha512};

/// Name of the flash cookie.
pub const FLASH_COOKIE: &str = "flash";

/// Derive the cookie signing key from the configured secret.
#[must_use]
pub fn signing_key(secret: &str) -> Key {
    let digest = Sha512::digest(secret.as_bytes());
    Key::from(digest.as_slice())
}

/// Longest message kept, in characters.
pub const MAX_MESSAGE_CHARS: usize = 200;

/// Budget for the encoded cookie value, below the ~4 KB browsers accept once signed.
const MAX_COOKIE_VALUE: usize = 3000;

fn truncate_message(message: &str) -> String {
    if message.chars().count() <= MAX_MESSAGE_CHARS {
        return message.to_string();
    }
    let mut short: String = message.chars().take(MAX_MESSAGE_CHARS - 1).collect();
    short.push('…');
    short
}

/// Queue `message` for the next page render. Long messages are shortened and
/// the oldest pending ones dropped when the cookie would grow too large.
#[must_use]
pub fn push(jar: SignedCookieJar, message: &str) -> SignedCookieJar {
    let mut encoded: Vec<String> = peek(&jar)
        .iter()
        .map(|m| urlencoding::encode(m).into_owned())
        .collect();
    encoded.push(urlencoding::encode(&truncate_message(message)).into_owned());

    while encoded.len() > 1 && encoded.iter().map(|m| m.len() + 1).sum::<usize>() > MAX_COOKIE_VALUE {
        encoded.remove(0);
    }
    let value = encoded.join("&");

    jar.add(
        Cookie::build((FLASH_COOKIE, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax),
    )
}

/// Remove and return all pending messages.
#[must_use]
pub fn take(jar: SignedCookieJar) -> (SignedCookieJar, Vec<String>) {
    let messages = peek(&jar);
    if messages.is_empty() {
        return (jar, messages);
    }
    (jar.remove(Cookie::build(FLASH_COOKIE).path("/")), messages)
}

fn peek(jar: &SignedCookieJar) -> Vec<String> {
    jar.get(FLASH_COOKIE)
        .map(|cookie| {
            cookie
                .value()
                .split('&')
                .filter(|part| !part.is_empty())
                .filter_map(|part| urlencoding::decode(part).ok().map(|m| m.into_owned()))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_take() {
        let jar = SignedCookieJar::new(signing_key("secret"));
        let jar = push(jar, "Please choose an image to upload.");
        let jar = push(jar, "a & b = c");

        let (jar, messages) = take(jar);
        assert_eq!(messages, vec!["Please choose an image to upload.", "a & b = c"]);

        let (_, again) = take(jar);
        assert!(again.is_empty());
    }

    #[test]
    fn test_signing_key_is_deterministic() {
        assert_eq!(signing_key("a").master(), signing_key("a").master());
        assert_ne!(signing_key("a").master(), signing_key("b").master());
    }

    #[test]
    fn test_long_messages_are_shortened() {
        let jar = SignedCookieJar::new(signing_key("secret"));
        let long = format!("Prediction failed: {}", "/very/deep/path".repeat(500));
        let jar = push(jar, &long);

        let (_, messages) = take(jar);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].chars().count(), MAX_MESSAGE_CHARS);
        assert!(messages[0].starts_with("Prediction failed: /very/deep/path"));
        assert!(messages[0].ends_with('…'));
    }

    #[test]
    fn test_cookie_stays_small() {
        let mut jar = SignedCookieJar::new(signing_key("secret"));
        for i in 0..50 {
            jar = push(jar, &format!("{i} {}", "é".repeat(300)));
        }

        let value_len = jar.get(FLASH_COOKIE).unwrap().value().len();
        assert!(value_len <= MAX_COOKIE_VALUE, "{value_len}");
        let (_, messages) = take(jar);
        assert!(messages.last().unwrap().starts_with("49 "));
    }
}

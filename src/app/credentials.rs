use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::warn;

use crate::app::config::UserSettings;

/// Obfuscates a stored credential so it is not kept as plain text in the config file.
/// This is not encryption.
pub fn encode_credential(plain: &str) -> String {
    if plain.is_empty() {
        return String::new();
    }
    STANDARD.encode(plain.as_bytes())
}

/// Reverses [`encode_credential`]. Undecodable values yield an empty string.
pub fn decode_credential(encoded: &str) -> String {
    let trimmed = encoded.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    match STANDARD
        .decode(trimmed)
        .map_err(|err| err.to_string())
        .and_then(|bytes| String::from_utf8(bytes).map_err(|err| err.to_string()))
    {
        Ok(plain) => plain,
        Err(err) => {
            warn!(error = %err, "failed to decode stored credential");
            String::new()
        }
    }
}

/// Plain-text username and password from the user section.
pub fn resolve_credentials(user: &UserSettings) -> (String, String) {
    if user.encoded {
        (
            decode_credential(&user.username),
            decode_credential(&user.password),
        )
    } else {
        (user.username.clone(), user.password.clone())
    }
}

pub fn store_credentials(user: &mut UserSettings, username: &str, password: &str) {
    user.username = encode_credential(username);
    user.password = encode_credential(password);
    user.encoded = true;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_credentials_resolve_to_plain_text() {
        let mut user = UserSettings::default();
        store_credentials(&mut user, "U202412345", "secret pass");
        assert!(user.encoded);
        assert_ne!(user.password, "secret pass");
        assert_eq!(
            resolve_credentials(&user),
            ("U202412345".to_string(), "secret pass".to_string())
        );

        let legacy = UserSettings {
            username: "plain".to_string(),
            password: "text".to_string(),
            encoded: false,
        };
        assert_eq!(
            resolve_credentials(&legacy),
            ("plain".to_string(), "text".to_string())
        );
    }

    #[test]
    fn credentials_round_trip() {
        let encoded = encode_credential("U2024 pass&word");
        assert_ne!(encoded, "U2024 pass&word");
        assert_eq!(decode_credential(&encoded), "U2024 pass&word");
    }

    #[test]
    fn empty_and_garbage_decode_to_empty() {
        assert_eq!(encode_credential(""), "");
        assert_eq!(decode_credential(""), "");
        assert_eq!(decode_credential("***not base64***"), "");
        // valid base64, invalid utf-8
        assert_eq!(decode_credential("/w=="), "");
    }
}

//! Reversible mapping between design ids and HTML form field names.
//!
//! Form decoders rewrite some characters in field names (`.`, spaces and `[`
//! become `_`), so ids like `64f1c2a3b4.1a2b3c4d` cannot be used as checkbox names
//! directly. Every byte outside `[A-Za-z0-9-]` is written as `_` plus two lowercase
//! hex digits, which survives form decoding and decodes back to the exact id.

pub const PUBLISH_FIELD_PREFIX: &str = "publish_";

pub fn encode_field_token(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            out.push(char::from(byte));
        } else {
            out.push('_');
            out.push_str(&hex::encode([byte]));
        }
    }
    out
}

/// Inverse of [`encode_field_token`]; `None` for tokens it could not have produced.
pub fn decode_field_token(token: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(token.len());
    let mut rest = token.as_bytes();
    while let Some((&first, tail)) = rest.split_first() {
        if first == b'_' {
            let (pair, after) = (tail.get(..2)?, tail.get(2..)?);
            let decoded = hex::decode(pair).ok()?;
            bytes.extend(decoded);
            rest = after;
            continue;
        }
        if !(first.is_ascii_alphanumeric() || first == b'-') {
            return None;
        }
        bytes.push(first);
        rest = tail;
    }
    String::from_utf8(bytes).ok()
}

/// Checkbox name used for a design's "published" toggle.
pub fn publish_field_name(id: &str) -> String {
    format!("{PUBLISH_FIELD_PREFIX}{}", encode_field_token(id))
}

/// Design id behind a submitted checkbox name, if it is one.
pub fn id_from_publish_field(name: &str) -> Option<String> {
    decode_field_token(name.strip_prefix(PUBLISH_FIELD_PREFIX)?)
}

#[cfg(test)]
mod tests {
    use super::{
        decode_field_token, encode_field_token, id_from_publish_field, publish_field_name,
    };

    #[test]
    fn dotted_id_round_trips_through_checkbox_name() {
        let id = "64f1c2a3b4c5.1a2b3c4d";
        let name = publish_field_name(id);
        assert_eq!(name, "publish_64f1c2a3b4c5_2e1a2b3c4d");
        assert!(!name.contains('.'));
        assert_eq!(id_from_publish_field(&name).as_deref(), Some(id));
    }

    #[test]
    fn ids_with_underscores_and_brackets_stay_distinct() {
        let dotted = "abc.def";
        let underscored = "abc_def";
        assert_ne!(encode_field_token(dotted), encode_field_token(underscored));
        for id in [dotted, underscored, "a b[c]", "ünï.cødé", "_2e"] {
            let token = encode_field_token(id);
            assert!(
                token.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'),
                "{token}"
            );
            assert_eq!(decode_field_token(&token).as_deref(), Some(id));
        }
    }

    #[test]
    fn mangled_or_foreign_names_are_ignored() {
        assert_eq!(id_from_publish_field("publish_abc_2"), None);
        assert_eq!(id_from_publish_field("publish_abc.def"), None);
        assert_eq!(id_from_publish_field("csrf_token"), None);
        assert_eq!(decode_field_token("_zz"), None);
    }
}

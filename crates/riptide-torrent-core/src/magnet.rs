//! Magnet link inspection that does not require the engine.

use riptide_events::{CONTENT_ID_BASE32_LEN, CONTENT_ID_HEX_LEN, ContentId};
use url::Url;

/// Name used when a link carries no `dn` parameter.
pub const UNKNOWN_NAME: &str = "Unknown";

const BTIH_PREFIX: &str = "urn:btih:";

/// Extract the content id from the first `xt=urn:btih:` parameter.
///
/// Accepts both the 40 character hex and the 32 character base32 encodings.
#[must_use]
pub fn parse_info_hash(uri: &str) -> Option<ContentId> {
    let url = Url::parse(uri).ok()?;
    url.query_pairs()
        .filter(|(key, _)| key == "xt")
        .find_map(|(_, value)| {
            let hash = strip_prefix_ignore_case(&value, BTIH_PREFIX)?;
            match hash.len() {
                CONTENT_ID_HEX_LEN => ContentId::parse_hex(hash).ok(),
                CONTENT_ID_BASE32_LEN => ContentId::parse_base32(hash).ok(),
                _ => None,
            }
        })
}

/// Percent-decoded `dn` parameter, if present and non-empty.
#[must_use]
pub fn display_name(uri: &str) -> Option<String> {
    let url = Url::parse(uri).ok()?;
    url.query_pairs()
        .find(|(key, value)| key == "dn" && !value.trim().is_empty())
        .map(|(_, value)| value.into_owned())
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "0123456789ABCDEF0123456789ABCDEF01234567";

    #[test]
    fn hex_hashes_are_lowercased() {
        let link = format!("magnet:?xt=urn:btih:{HEX}&dn=Foo");
        let id = parse_info_hash(&link).expect("hash");
        assert_eq!(id.as_str(), HEX.to_ascii_lowercase());
    }

    #[test]
    fn base32_hashes_are_converted() {
        let link = format!("magnet:?xt=urn:btih:{}", "A".repeat(32));
        let id = parse_info_hash(&link).expect("hash");
        assert_eq!(id.as_str(), "0".repeat(40));
    }

    #[test]
    fn links_without_hash_are_rejected() {
        assert!(parse_info_hash("magnet:?dn=Foo").is_none());
        assert!(parse_info_hash("magnet:?xt=urn:btih:1234").is_none());
        assert!(parse_info_hash("not a link").is_none());
    }

    #[test]
    fn display_names_are_percent_decoded() {
        let link = format!("magnet:?xt=urn:btih:{HEX}&dn=Big%20Buck+Bunny");
        assert_eq!(display_name(&link).as_deref(), Some("Big Buck Bunny"));
        let bare = format!("magnet:?xt=urn:btih:{HEX}");
        assert!(display_name(&bare).is_none());
    }
}

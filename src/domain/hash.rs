use blake3::Hash;

/// Content hash of a normalized (title, artist) pair.
///
/// Repeated lookups for the same nominal track converge on one hash,
/// regardless of surrounding whitespace or letter case.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(pub Hash);

impl ContentHash {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes))
    }

    pub fn of_track(title: &str, artist: &str) -> Self {
        let normalized = format!(
            "{}\u{1f}{}",
            normalize(title),
            normalize(artist)
        );
        Self::from_bytes(normalized.as_bytes())
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }
}

fn normalize(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::ContentHash;

    #[test]
    fn incidental_differences_share_a_hash() {
        assert_eq!(
            ContentHash::of_track("Example Song", "Example Artist"),
            ContentHash::of_track("  example   SONG ", "EXAMPLE artist")
        );
    }

    #[test]
    fn fields_do_not_bleed_into_each_other() {
        assert_ne!(
            ContentHash::of_track("ab", "c"),
            ContentHash::of_track("a", "bc")
        );
    }

    #[test]
    fn hex_is_stable_length() {
        assert_eq!(ContentHash::of_track("a", "b").to_hex().len(), 64);
    }
}

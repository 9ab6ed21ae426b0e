use std::fmt;

/// A 6-byte Ethernet address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const ZERO: MacAddr = MacAddr([0; 6]);

    /// Builds a [`MacAddr`] from a raw link-layer address attribute.
    ///
    /// Per §4.1, the function MAC attribute is only meaningful at exactly 6 bytes; any other
    /// length means the message should be rejected, not truncated or zero-padded.
    pub fn from_attr_bytes(bytes: &[u8]) -> Option<Self> {
        <[u8; 6]>::try_from(bytes).ok().map(Self)
    }

    /// Parses a standard colon-separated hex MAC address (`xx:xx:xx:xx:xx:xx`).
    pub fn parse(s: &str) -> Option<Self> {
        let mut out = [0u8; 6];
        let mut parts = s.split(':');
        for byte in &mut out {
            let part = parts.next()?;
            if part.len() != 2 {
                return None;
            }
            *byte = u8::from_str_radix(part, 16).ok()?;
        }
        if parts.next().is_some() {
            return None;
        }
        Some(Self(out))
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lowercase() {
        assert_eq!(
            MacAddr::parse("00:53:00:00:00:42"),
            Some(MacAddr([0x00, 0x53, 0x00, 0x00, 0x00, 0x42]))
        );
    }

    #[test]
    fn rejects_malformed() {
        assert_eq!(MacAddr::parse("00:53:00:00:00"), None);
        assert_eq!(MacAddr::parse("00:53:00:00:00:42:ff"), None);
        assert_eq!(MacAddr::parse("zz:53:00:00:00:42"), None);
        assert_eq!(MacAddr::parse(""), None);
    }

    #[test]
    fn from_attr_bytes_requires_exact_length() {
        assert_eq!(MacAddr::from_attr_bytes(&[1, 2, 3, 4, 5, 6]), Some(MacAddr([1, 2, 3, 4, 5, 6])));
        assert_eq!(MacAddr::from_attr_bytes(&[1, 2, 3, 4, 5]), None);
        assert_eq!(MacAddr::from_attr_bytes(&[1, 2, 3, 4, 5, 6, 7]), None);
    }

    #[test]
    fn debug_and_display_match() {
        let mac = MacAddr([0, 0x53, 0, 0, 0, 0x42]);
        assert_eq!(format!("{mac:?}"), "00:53:00:00:00:42");
        assert_eq!(format!("{mac}"), "00:53:00:00:00:42");
    }
}

//! Module location descriptors: `scheme://locator[?offset=<uint>][&size=<uint>]`.

use std::collections::HashMap;

use crate::interfaces::DescriptorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// The image lives in a file reachable from the target.
    File,
    /// The image only exists inside the owning process's memory.
    Memory,
}

/// A parsed module location. Produced only by [`LocationDescriptor::parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationDescriptor {
    pub scheme: Scheme,
    pub locator: String,
    /// Byte offset of the image within the source. 0 when absent.
    pub offset: u64,
    /// Declared image size. 0 means unspecified.
    pub size: u64,
}

/// Plain paths carry no marker and belong to the host loader.
pub fn has_scheme_marker(location: &str) -> bool {
    location.contains("://")
}

impl LocationDescriptor {
    pub fn parse(location: &str) -> Result<Self, DescriptorError> {
        let marker = location
            .find("://")
            .ok_or_else(|| DescriptorError::MissingScheme(location.to_string()))?;
        let scheme = match location[..marker].to_ascii_lowercase().as_str() {
            "file" => Scheme::File,
            "memory" => Scheme::Memory,
            other => return Err(DescriptorError::UnsupportedProtocol(other.to_string())),
        };

        let rest = &location[marker + 3..];
        let locator_end = rest.find(['?', '#']).unwrap_or(rest.len());
        let locator = percent_decode(&rest[..locator_end])?;

        let mut params: HashMap<&str, &str> = HashMap::new();
        if locator_end < rest.len() {
            for token in rest[locator_end + 1..].split('&') {
                // Tokens without '=' are skipped. The first occurrence of a
                // key wins; later duplicates are ignored.
                if let Some((key, value)) = token.split_once('=') {
                    params.entry(key).or_insert(value);
                }
            }
        }

        let offset = match params.get("offset") {
            Some(text) => parse_uint(text)?,
            None => 0,
        };
        let size = match params.get("size") {
            Some(text) => {
                let value = parse_uint(text)?;
                if value == 0 {
                    return Err(DescriptorError::InvalidSize);
                }
                value
            }
            None => 0,
        };

        Ok(LocationDescriptor {
            scheme,
            locator,
            offset,
            size,
        })
    }
}

/// Decode two-hex-digit percent escapes. A truncated or malformed escape is
/// preserved literally rather than rejected. An escape may spell out any
/// byte, but the decoded locator as a whole must still be valid UTF-8.
fn percent_decode(raw: &str) -> Result<String, DescriptorError> {
    let bytes = raw.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                decoded.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(decoded).map_err(|_| DescriptorError::InvalidLocator(raw.to_string()))
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

fn parse_uint(text: &str) -> Result<u64, DescriptorError> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse::<u64>(),
    };
    parsed.map_err(|_| DescriptorError::InvalidInteger(text.to_string()))
}

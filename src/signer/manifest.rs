//! Jar manifest and signature file serialization.
//!
//! Both files use the same line format: `Key: value` lines terminated by
//! CRLF, wrapped at 72 bytes with continuation lines starting with a
//! single space, and sections separated by an empty line.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha1::{Digest, Sha1};

/// Manifest attribute holding an entry digest.
pub const DIGEST_ATTR: &str = "SHA1-Digest";
/// Signature file attribute holding the whole-manifest digest.
pub const DIGEST_MANIFEST_ATTR: &str = "SHA1-Digest-Manifest";

/// Archive path of the manifest.
pub const MANIFEST_NAME: &str = "META-INF/MANIFEST.MF";
/// Archive path of the signature file.
pub const SIGNATURE_FILE_NAME: &str = "META-INF/CERT.SF";
/// Archive path of the signature block.
pub const SIGNATURE_BLOCK_NAME: &str = "META-INF/CERT.RSA";

/// Value of the manifest `Built-By` attribute.
pub const BUILT_BY: &str = "apkpipe";

const MAX_LINE: usize = 72;

type Attributes = Vec<(String, String)>;

/// Main attributes plus one named section per archive entry, in insertion
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    main: Attributes,
    entries: Vec<(String, Attributes)>,
}

impl Manifest {
    /// Create a manifest with the standard main attributes.
    pub fn new(created_by: &str) -> Self {
        let main = vec![
            ("Manifest-Version".to_string(), "1.0".to_string()),
            ("Built-By".to_string(), BUILT_BY.to_string()),
            ("Created-By".to_string(), created_by.to_string()),
        ];
        Self { main, entries: Vec::new() }
    }

    /// Set a main attribute, replacing any previous value.
    pub fn set_main_attribute(&mut self, key: &str, value: &str) {
        match self.main.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value.to_string(),
            None => self.main.push((key.to_string(), value.to_string())),
        }
    }

    /// Set an attribute of a named entry section, creating the section.
    pub fn set_entry_attribute(&mut self, name: &str, key: &str, value: String) {
        let index = match self.entries.iter().position(|(n, _)| n == name) {
            Some(index) => index,
            None => {
                self.entries.push((name.to_string(), Vec::new()));
                self.entries.len() - 1
            }
        };
        let attributes = &mut self.entries[index].1;
        match attributes.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => attributes.push((key.to_string(), value)),
        }
    }

    /// Value of a main attribute.
    pub fn main_attribute(&self, key: &str) -> Option<&str> {
        self.main.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Value of an entry attribute.
    pub fn entry_attribute(&self, name: &str, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, attrs)| attrs.iter().find(|(k, _)| k == key))
            .map(|(_, v)| v.as_str())
    }

    /// Names of every entry section.
    pub fn entry_names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Number of entry sections.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no entry sections.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialized main section, including its terminating empty line.
    pub fn main_section(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (key, value) in &self.main {
            write_attribute(&mut out, key, value);
        }
        out.extend_from_slice(b"\r\n");
        out
    }

    /// Serialized section of one entry, including its terminating empty line.
    pub fn entry_section(&self, name: &str) -> Option<Vec<u8>> {
        let (_, attributes) = self.entries.iter().find(|(n, _)| n == name)?;
        Some(section_bytes(name, attributes))
    }

    /// Full serialized manifest.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.main_section();
        for (name, attributes) in &self.entries {
            out.extend(section_bytes(name, attributes));
        }
        out
    }

    /// Parse a serialized manifest or signature file.
    ///
    /// Continuation lines are joined; unknown lines are ignored.
    pub fn parse(text: &str) -> Self {
        let mut manifest = Manifest::default();
        let mut current: Option<String> = None;
        let mut in_main = true;

        for line in unfold(text) {
            if line.is_empty() {
                in_main = false;
                current = None;
                continue;
            }
            let Some((key, value)) = line.split_once(": ") else {
                continue;
            };
            if in_main {
                manifest.main.push((key.to_string(), value.to_string()));
            } else if key == "Name" && current.is_none() {
                current = Some(value.to_string());
                manifest.entries.push((value.to_string(), Vec::new()));
            } else if let Some(name) = &current {
                let name = name.clone();
                manifest.set_entry_attribute(&name, key, value.to_string());
            }
        }
        manifest
    }
}

fn section_bytes(name: &str, attributes: &Attributes) -> Vec<u8> {
    let mut out = Vec::new();
    write_attribute(&mut out, "Name", name);
    for (key, value) in attributes {
        write_attribute(&mut out, key, value);
    }
    out.extend_from_slice(b"\r\n");
    out
}

/// Write `key: value` wrapped at 72 bytes per line.
fn write_attribute(out: &mut Vec<u8>, key: &str, value: &str) {
    let line = format!("{}: {}", key, value);
    let mut rest = line.as_str();
    let mut limit = MAX_LINE;
    loop {
        if rest.len() <= limit {
            out.extend_from_slice(rest.as_bytes());
            out.extend_from_slice(b"\r\n");
            return;
        }
        let mut split = limit;
        while !rest.is_char_boundary(split) {
            split -= 1;
        }
        out.extend_from_slice(&rest.as_bytes()[..split]);
        out.extend_from_slice(b"\r\n ");
        rest = &rest[split..];
        limit = MAX_LINE - 1;
    }
}

/// Join continuation lines.
fn unfold(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in text.split('\n') {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        if let Some(continuation) = raw.strip_prefix(' ') {
            if let Some(last) = lines.last_mut().filter(|l| !l.is_empty()) {
                last.push_str(continuation);
                continue;
            }
        }
        lines.push(raw.to_string());
    }
    lines
}

/// Base64 of the SHA-1 of `bytes`.
pub fn digest_base64(bytes: &[u8]) -> String {
    BASE64.encode(Sha1::digest(bytes))
}

/// Build the signature file for a manifest.
///
/// The body carries the digest of the whole serialized manifest and, for
/// each entry, the digest of that entry's manifest section.
pub fn signature_file(manifest: &Manifest, manifest_bytes: &[u8], created_by: &str) -> Vec<u8> {
    let mut out = Vec::new();
    write_attribute(&mut out, "Signature-Version", "1.0");
    write_attribute(&mut out, "Created-By", created_by);
    write_attribute(&mut out, DIGEST_MANIFEST_ATTR, &digest_base64(manifest_bytes));
    out.extend_from_slice(b"\r\n");

    for (name, attributes) in &manifest.entries {
        let section = section_bytes(name, attributes);
        write_attribute(&mut out, "Name", name);
        write_attribute(&mut out, DIGEST_ATTR, &digest_base64(&section));
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Append CRLF when the signature file length is an exact multiple of 1024.
///
/// Some old platform jar parsers mis-read files of that exact size.
/// Returns whether padding was added.
pub fn pad_signature_file(signature_file: &mut Vec<u8>) -> bool {
    if signature_file.len() % 1024 == 0 {
        signature_file.extend_from_slice(b"\r\n");
        true
    } else {
        false
    }
}

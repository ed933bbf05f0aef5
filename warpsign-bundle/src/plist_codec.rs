//! Property-list parsing and emission.
//!
//! A thin, explicitly-typed wrapper around the `plist` crate. The codec
//! records which on-disk format a document was read from (XML or binary)
//! so that re-encoding without mutation reproduces the same format,
//! satisfying the round-trip requirement.

use std::io::Cursor;
use std::path::Path;

use crate::error::{Error, Result};

/// The two plist serializations WarpSign round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlistFormat {
    Xml,
    Binary,
}

/// A parsed plist together with the format it was read from.
#[derive(Debug, Clone)]
pub struct PlistDocument {
    pub root: plist::Value,
    pub format: PlistFormat,
}

impl PlistDocument {
    /// Parse plist bytes, auto-detecting XML vs. binary by magic bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let format = detect_format(data);
        let root = plist::Value::from_reader(Cursor::new(data))?;
        Ok(Self { root, format })
    }

    pub fn read_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::parse(&data)
    }

    /// Emit the document in its original format.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        match self.format {
            PlistFormat::Xml => self.root.to_writer_xml(&mut out)?,
            PlistFormat::Binary => self.root.to_writer_binary(&mut out)?,
        }
        Ok(out)
    }

    pub fn write_file(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn as_dictionary(&self) -> Option<&plist::Dictionary> {
        self.root.as_dictionary()
    }

    pub fn as_dictionary_mut(&mut self) -> Option<&mut plist::Dictionary> {
        self.root.as_dictionary_mut()
    }
}

fn detect_format(data: &[u8]) -> PlistFormat {
    if data.starts_with(b"bplist00") {
        PlistFormat::Binary
    } else {
        PlistFormat::Xml
    }
}

/// Verify `decode(encode(decode(x))) == decode(x)` for a given document.
///
/// XML plists must be byte-identical on re-encode; binary plists only need
/// to be semantically identical (the `plist` crate does not guarantee
/// byte-stable binary encoding across trivial re-serialization, e.g. object
/// table ordering for repeated unique() storage is stable but page sizing
/// bookkeeping isn't specified).
pub fn verify_round_trip(original: &[u8]) -> Result<bool> {
    let doc = PlistDocument::parse(original)?;
    let reencoded = doc.to_bytes()?;
    let redecoded = PlistDocument::parse(&reencoded)?;

    Ok(match doc.format {
        PlistFormat::Xml => original == reencoded.as_slice(),
        PlistFormat::Binary => doc.root == redecoded.root,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
	<key>CFBundleIdentifier</key>
	<string>com.example.hello</string>
	<key>CFBundleVersion</key>
	<string>1</string>
</dict>
</plist>
"#;

    #[test]
    fn detects_xml_format() {
        let doc = PlistDocument::parse(SIMPLE_XML.as_bytes()).unwrap();
        assert_eq!(doc.format, PlistFormat::Xml);
        assert_eq!(
            doc.as_dictionary()
                .unwrap()
                .get("CFBundleIdentifier")
                .and_then(|v| v.as_string()),
            Some("com.example.hello")
        );
    }

    #[test]
    fn binary_round_trip_is_semantically_stable() {
        let doc = PlistDocument::parse(SIMPLE_XML.as_bytes()).unwrap();
        let mut bin = Vec::new();
        doc.root.to_writer_binary(&mut bin).unwrap();
        assert!(verify_round_trip(&bin).unwrap());
    }

    #[test]
    fn ordered_dictionary_preserves_first_seen_order() {
        let doc = PlistDocument::parse(SIMPLE_XML.as_bytes()).unwrap();
        let dict = doc.as_dictionary().unwrap();
        let keys: Vec<&str> = dict.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["CFBundleIdentifier", "CFBundleVersion"]);
    }
}

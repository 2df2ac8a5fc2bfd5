//! Length-prefixed mashup container codec
//!
//! The container is nine consecutive fields: a 4-byte version followed by
//! four (length, payload) pairs, lengths as little-endian u32. Only the
//! first payload (`pkgParts`, itself a ZIP package of query definitions) is
//! interpreted; the other three are carried through byte-for-byte. Decode
//! and encode must round-trip exactly when nothing is modified.

use crate::error::PatchError;
use crate::package::Package;
use anyhow::Result;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

/// Decoded mashup container. Length prefixes are not stored; they are
/// derived from the payloads on encode (each payload's length prefix always
/// equals its byte count, and no API mutates the opaque payloads).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MashupContainer {
    pub version: [u8; 4],
    pub pkg_parts: Vec<u8>,
    pub permissions: Vec<u8>,
    pub metadata: Vec<u8>,
    pub permission_bindings: Vec<u8>,
}

/// Cursor over the container bytes with explicit bounds checks, so a bad
/// length prefix surfaces as a deliberate error instead of a slice panic.
struct FieldCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldCursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], PatchError> {
        if len > self.remaining() {
            return Err(PatchError::TruncatedContainer {
                field,
                declared: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn take_u32_le(&mut self, field: &'static str) -> Result<u32, PatchError> {
        let bytes = self.take(4, field)?;
        Ok(u32::from_le_bytes(bytes.try_into().expect("4-byte slice")))
    }

    /// Read one (length, payload) field pair.
    fn take_prefixed(&mut self, field: &'static str) -> Result<Vec<u8>, PatchError> {
        let len = self.take_u32_le(field)? as usize;
        Ok(self.take(len, field)?.to_vec())
    }
}

impl MashupContainer {
    /// Decode the nine fields in their fixed order. The version is opaque
    /// and accepted unchecked. Trailing bytes after the final field are
    /// rejected: the format has no padding.
    pub fn decode(bytes: &[u8]) -> Result<Self, PatchError> {
        let mut cursor = FieldCursor::new(bytes);

        let version: [u8; 4] = cursor
            .take(4, "version")?
            .try_into()
            .expect("4-byte slice");
        let pkg_parts = cursor.take_prefixed("pkgParts")?;
        let permissions = cursor.take_prefixed("permissions")?;
        let metadata = cursor.take_prefixed("metadata")?;
        let permission_bindings = cursor.take_prefixed("permissionBindings")?;

        if cursor.remaining() > 0 {
            return Err(PatchError::TrailingContainerBytes {
                extra: cursor.remaining(),
            });
        }

        Ok(Self {
            version,
            pkg_parts,
            permissions,
            metadata,
            permission_bindings,
        })
    }

    /// Encode back to bytes. `pkgPartsLen` is recomputed from the current
    /// payload; the other length prefixes equal their payloads' byte counts
    /// by construction.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            4 + 16
                + self.pkg_parts.len()
                + self.permissions.len()
                + self.metadata.len()
                + self.permission_bindings.len(),
        );
        out.extend_from_slice(&self.version);
        for payload in [
            &self.pkg_parts,
            &self.permissions,
            &self.metadata,
            &self.permission_bindings,
        ] {
            out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            out.extend_from_slice(payload);
        }
        out
    }

    /// Extract every formula entry of the nested archive into `out_dir`,
    /// flattening to base file names. Returns the number of files written.
    pub fn extract_formula_entries<P: AsRef<Path>>(&self, out_dir: P) -> Result<usize> {
        let package = self.open_pkg_parts()?;
        let out_dir = out_dir.as_ref();
        std::fs::create_dir_all(out_dir)?;

        let mut count = 0;
        for entry in package.entries() {
            if is_formula_entry(&entry.path) {
                std::fs::write(out_dir.join(entry.file_name()), &entry.bytes)?;
                count += 1;
            }
        }
        Ok(count)
    }

    /// Rebuild the nested archive, substituting the content of formula
    /// entries whose base file name appears in `replacements`; every other
    /// entry (and non-matching replacement keys) is left alone. Only
    /// `pkg_parts` changes in the returned container.
    pub fn replace_formula_entries(
        &self,
        replacements: &HashMap<String, Vec<u8>>,
    ) -> Result<MashupContainer> {
        let package = self.open_pkg_parts()?;
        let rewritten = package.rewrite(|entry| {
            if is_formula_entry(&entry.path) {
                Ok(replacements.get(entry.file_name()).cloned())
            } else {
                Ok(None)
            }
        })?;

        Ok(MashupContainer {
            pkg_parts: rewritten.to_bytes()?,
            ..self.clone()
        })
    }

    fn open_pkg_parts(&self) -> Result<Package> {
        Package::from_bytes(&self.pkg_parts).map_err(|e| {
            PatchError::MalformedNestedArchive {
                reason: e.to_string(),
            }
            .into()
        })
    }
}

/// A formula entry lives under `Formulas/` (any depth) with a base name of
/// the form `Section<digits>.m`.
pub fn is_formula_entry(path: &str) -> bool {
    static NAME: OnceLock<Regex> = OnceLock::new();
    let name = NAME.get_or_init(|| Regex::new(r"^Section\d+\.m$").expect("valid regex"));

    match path.strip_prefix("Formulas/") {
        Some(rest) => name.is_match(rest.rsplit('/').next().unwrap_or(rest)),
        None => false,
    }
}

/// Build a replacement map (base file name -> content) from caller-supplied
/// query definition files.
pub fn load_replacements<P: AsRef<Path>>(paths: &[P]) -> Result<HashMap<String, Vec<u8>>> {
    let mut map = HashMap::new();
    for path in paths {
        let path = path.as_ref();
        let name = path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("not a file path: {}", path.display()))?
            .to_string_lossy()
            .into_owned();
        let bytes = std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        map.insert(name, bytes);
    }
    Ok(map)
}

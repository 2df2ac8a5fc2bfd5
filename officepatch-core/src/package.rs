//! Ordered named-entry packages (ZIP archives)
//!
//! One abstraction serves both levels: the outer carrier document
//! (xlsx/pptx) and the nested archive embedded in a mashup container's
//! `pkgParts` field. Entries keep their enumeration order; `rewrite` is the
//! single mechanism every patch flow uses to substitute a subset of entries
//! while copying everything else through byte-for-byte.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

/// A single package entry: decompressed bytes plus the metadata needed to
/// write it back faithfully.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Slash-separated path inside the archive.
    pub path: String,
    /// Decompressed content.
    pub bytes: Vec<u8>,
    /// Compression method the entry was stored with.
    pub compression: CompressionMethod,
    /// Last-modified timestamp, if the archive recorded one.
    pub last_modified: Option<DateTime>,
}

impl Entry {
    /// Base file name (final path component).
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// An ordered collection of uniquely-named entries.
#[derive(Debug, Clone, Default)]
pub struct Package {
    entries: Vec<Entry>,
}

impl Package {
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let mut entries = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let mut bytes = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut bytes)?;
            entries.push(Entry {
                path: file.name().to_string(),
                bytes,
                compression: file.compression(),
                last_modified: file.last_modified(),
            });
        }

        Ok(Self { entries })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(Cursor::new(bytes))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open package: {}", path.display()))?;
        Self::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to read package: {}", path.display()))
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entry(&self, path: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.path == path)
    }

    pub fn push(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    /// Rebuild the package, substituting content for the entries `patch_fn`
    /// claims and copying every other entry through verbatim.
    ///
    /// The output contains exactly the input's entry paths, in the input's
    /// enumeration order. Replaced entries are recompressed with DEFLATE;
    /// untouched entries keep their original compression method. Any error
    /// from `patch_fn` aborts the whole rewrite.
    pub fn rewrite<F>(&self, mut patch_fn: F) -> Result<Package>
    where
        F: FnMut(&Entry) -> Result<Option<Vec<u8>>>,
    {
        let mut entries = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            let replacement = patch_fn(entry)?;
            entries.push(match replacement {
                Some(bytes) => Entry {
                    path: entry.path.clone(),
                    bytes,
                    compression: CompressionMethod::Deflated,
                    last_modified: entry.last_modified,
                },
                None => entry.clone(),
            });
        }

        Ok(Package { entries })
    }

    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<()> {
        let mut zip = ZipWriter::new(writer);

        for entry in &self.entries {
            let mut options = SimpleFileOptions::default().compression_method(
                match entry.compression {
                    CompressionMethod::Stored => CompressionMethod::Stored,
                    _ => CompressionMethod::Deflated,
                },
            );
            if let Some(dt) = entry.last_modified {
                options = options.last_modified_time(dt);
            }

            if entry.path.ends_with('/') {
                zip.add_directory(entry.path.as_str(), options)?;
            } else {
                zip.start_file(entry.path.as_str(), options)?;
                zip.write_all(&entry.bytes)?;
            }
        }

        zip.finish()?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.write_to(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    /// Serialize into a temporary file next to `path`, then atomically
    /// rename over it. ZIP does not support safe partial in-place edits, so
    /// every write-back goes through this wholesale swap; a failure leaves
    /// the file at `path` byte-identical and discards the temporary.
    pub fn save_atomic<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;

        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temporary file in {}", parent.display()))?;
        tmp.write_all(&bytes)?;
        tmp.persist(path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    /// Rewrite the package at `path` in place: read, patch, swap. A failure
    /// anywhere (including inside `patch_fn`) leaves the original untouched.
    pub fn rewrite_file<P, F>(path: P, patch_fn: F) -> Result<()>
    where
        P: AsRef<Path>,
        F: FnMut(&Entry) -> Result<Option<Vec<u8>>>,
    {
        let path = path.as_ref();
        let package = Self::from_file(path)?;
        package.rewrite(patch_fn)?.save_atomic(path)
    }
}

/// Extract every entry of the package at `path` into `out_dir`, recreating
/// the archive's directory structure. Returns the number of file entries
/// written.
pub fn explode<P: AsRef<Path>, Q: AsRef<Path>>(path: P, out_dir: Q) -> Result<usize> {
    let package = Package::from_file(path)?;
    let out_dir = out_dir.as_ref();

    let mut count = 0;
    for entry in package.entries() {
        // Entry paths come from the archive; refuse traversal outside out_dir.
        if entry.path.split('/').any(|c| c == "..") {
            anyhow::bail!("refusing to extract entry with parent reference: {}", entry.path);
        }
        let target = out_dir.join(&entry.path);
        if entry.path.ends_with('/') {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, &entry.bytes)
            .with_context(|| format!("Failed to write {}", target.display()))?;
        count += 1;
    }

    Ok(count)
}

/// Build a DEFLATE package from the directory tree rooted at `dir`. Entry
/// paths are the slash-separated paths relative to `dir`, sorted for
/// deterministic output.
pub fn pack_dir<P: AsRef<Path>>(dir: P) -> Result<Package> {
    let dir = dir.as_ref();
    let mut files = Vec::new();
    collect_files(dir, dir, &mut files)?;
    files.sort();

    let mut package = Package::default();
    for rel in files {
        let bytes = std::fs::read(dir.join(rel.replace('/', std::path::MAIN_SEPARATOR_STR)))?;
        package.push(Entry {
            path: rel,
            bytes,
            compression: CompressionMethod::Deflated,
            last_modified: None,
        });
    }
    Ok(package)
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
    for item in std::fs::read_dir(dir)? {
        let item = item?;
        let path = item.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else {
            let rel: PathBuf = path
                .strip_prefix(root)
                .expect("walked path is under root")
                .to_path_buf();
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push(rel);
        }
    }
    Ok(())
}

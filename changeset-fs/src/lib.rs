//! Shared filesystem helpers built on `cap-std` and `camino`.
//!
//! Besides capability-based path handling this crate opens changeset dumps,
//! transparently decompressing `.bz2` and `.gz` inputs.
#![forbid(unsafe_code)]

use bzip2::read::MultiBzDecoder;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};
use flate2::read::MultiGzDecoder;
use std::io::{self, BufReader, Read};
use std::path::Component;

/// Buffered, decompressed reader over a changeset dump.
pub type DumpReader = BufReader<Box<dyn Read + Send>>;

/// Compression applied to an input file, inferred from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Uncompressed XML.
    Plain,
    /// gzip, possibly multi-member.
    Gzip,
    /// bzip2, possibly multi-stream.
    Bzip2,
}

impl Compression {
    /// Infer the compression from a file extension.
    ///
    /// # Examples
    /// ```
    /// use camino::Utf8Path;
    /// use changeset_fs::Compression;
    ///
    /// assert_eq!(Compression::from_path(Utf8Path::new("discussions.osm.bz2")), Compression::Bzip2);
    /// assert_eq!(Compression::from_path(Utf8Path::new("006.osm.gz")), Compression::Gzip);
    /// assert_eq!(Compression::from_path(Utf8Path::new("sample.osm")), Compression::Plain);
    /// ```
    #[must_use]
    pub fn from_path(path: &Utf8Path) -> Self {
        match path.extension().map(str::to_ascii_lowercase).as_deref() {
            Some("bz2") => Self::Bzip2,
            Some("gz") => Self::Gzip,
            _ => Self::Plain,
        }
    }

    /// Wrap `reader` with the matching decoder.
    pub fn decoder<R: Read + Send + 'static>(self, reader: R) -> DumpReader {
        let inner: Box<dyn Read + Send> = match self {
            Self::Plain => Box::new(reader),
            Self::Gzip => Box::new(MultiGzDecoder::new(reader)),
            Self::Bzip2 => Box::new(MultiBzDecoder::new(reader)),
        };
        BufReader::new(inner)
    }
}

/// Open a changeset dump for streaming, decompressing by extension.
pub fn open_changeset_dump(path: &Utf8Path) -> io::Result<DumpReader> {
    let file = open_utf8_file(path)?;
    Ok(Compression::from_path(path).decoder(file.into_std()))
}

/// Open a UTF-8 file path using ambient authority.
pub fn open_utf8_file(path: &Utf8Path) -> io::Result<fs_utf8::File> {
    fs_utf8::File::open_ambient(path, ambient_authority())
}

/// Open a directory using ambient authority.
pub fn open_utf8_dir(path: &Utf8Path) -> io::Result<fs_utf8::Dir> {
    fs_utf8::Dir::open_ambient_dir(path, ambient_authority())
}

/// Resolve an ambient directory for the given path and return the directory with the file name.
pub fn open_dir_and_file(path: &Utf8Path) -> io::Result<(fs_utf8::Dir, String)> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::other("target should include a file name"))?
        .to_owned();
    let dir = open_utf8_dir(parent)?;
    Ok((dir, file_name))
}

/// Ensure the parent directory for `path` exists, handling absolute paths safely for cap-std.
pub fn ensure_parent_dir(path: &Utf8Path) -> io::Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() || parent == Utf8Path::new("/") {
        return Ok(());
    }

    let (base_dir, relative) = base_dir_and_relative(parent)?;
    if relative.as_os_str().is_empty() {
        return Ok(());
    }
    base_dir.create_dir_all(&relative)?;
    Ok(())
}

/// Return whether a path exists and is a regular file using capability-based IO.
pub fn file_is_file(path: &Utf8Path) -> io::Result<bool> {
    let (dir, name) = open_dir_and_file(path)?;
    dir.metadata(name.as_str()).map(|meta| meta.is_file())
}

/// Split an absolute or relative parent path into an ambient base directory and a relative suffix.
pub fn base_dir_and_relative(parent: &Utf8Path) -> io::Result<(fs_utf8::Dir, Utf8PathBuf)> {
    let std_parent = parent.as_std_path();

    let (base, relative) = match std_parent.components().next() {
        // Windows drive or UNC prefix.
        Some(Component::Prefix(prefix)) => {
            let prefix_str = prefix
                .as_os_str()
                .to_str()
                .ok_or_else(|| io::Error::other("non-UTF-8 path prefix"))?;

            let base = Utf8PathBuf::from(prefix_str).join(std::path::MAIN_SEPARATOR.to_string());
            let relative = std_parent
                .strip_prefix(base.as_std_path())
                .or_else(|_| std_parent.strip_prefix(prefix.as_os_str()))
                .map_err(|_| io::Error::other("failed to strip prefix from parent path"))?
                .to_path_buf();
            (base, relative)
        }
        Some(Component::RootDir) => {
            let base = Utf8PathBuf::from(std::path::MAIN_SEPARATOR.to_string());
            let relative = std_parent
                .strip_prefix(base.as_std_path())
                .map_err(|_| io::Error::other("failed to strip root from absolute path"))?
                .to_path_buf();
            (base, relative)
        }
        _ => (Utf8PathBuf::from("."), std_parent.to_path_buf()),
    };

    let dir = open_utf8_dir(&base)?;
    let relative = Utf8PathBuf::from_path_buf(relative)
        .map_err(|_| io::Error::other("non-UTF-8 parent path"))?;

    Ok((dir, relative))
}

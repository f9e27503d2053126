//! Library for reading and editing `IMG` archives (and supplementary `DIR` files) used throughout the 3D universe-era of Grand Theft Auto games.
//!
//! An archive holds a flat set of named entries, each spanning whole 2048-byte
//! sectors of the payload file. Two on-disk formats exist: version 1 pairs a
//! `dir` file with an `img` file, while version 2 embeds the directory in the
//! `img` file itself behind a `VER2` header.
//!
//! Open an archive with [`open`] (or create one with [`create`]), edit it
//! through the returned [`Archive`], and persist the directory with
//! [`Archive::sync`]. Edits live in memory until then; holes left by removed
//! or replaced entries are reclaimed by [`Archive::pack`].

use std::path::Path;

/// Contains the archive itself, along with the logic for opening, editing and persisting archives.
pub mod archive;

/// Contains the in-memory directory of an archive.
pub mod directory;

/// Contains the directory record of a single entry, and its on-disk form.
pub mod entry;

/// Contains types for errors.
pub mod error;

/// Contains arithmetic for the sector-aligned layout of archives.
pub mod sector;

pub use archive::{guess_version, Archive, Mode, OpenEntry, Version};
pub use entry::Entry;
pub use error::{Error, Result};

/// Attempts to open the archive at the specified path, detecting its version.
///
/// If successful, returns an [`Archive`] which may be inspected and, in
/// [`Mode::ReadWrite`], edited. If unsuccessful, returns an [`Error`].
pub fn open<P>(path: P, mode: Mode) -> Result<Archive>
where
	P: AsRef<Path>,
{
	Archive::open(path, mode)
}

/// Creates a new, empty archive of the specified version at the specified path,
/// opened for editing.
pub fn create<P>(path: P, version: Version) -> Result<Archive>
where
	P: AsRef<Path>,
{
	Archive::create(path, version)
}

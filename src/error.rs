use std::io;

use thiserror::Error;

/// Represents an archive-related error.
#[derive(Debug, Error)]
pub enum Error {
	/// Indicates that a generic I/O error occurred.
	#[error("input/output error [{0}]")]
	Io(#[from] io::Error),

	/// Indicates that the file is not a recognisable archive.
	#[error("invalid archive format [{0}]")]
	InvalidFormat(String),

	/// Indicates that no entry with the provided name exists.
	#[error("no entry named '{0}'")]
	NotFound(String),

	/// Indicates that an entry with the provided name (ignoring case) already exists.
	#[error("an entry named '{0}' already exists")]
	DuplicateName(String),

	/// Indicates that the provided name of an entry is empty, too long or not ASCII.
	#[error("invalid entry name '{0}'")]
	InvalidName(String),

	/// Indicates that the file could not be accessed.
	#[error("access denied to '{0}'")]
	AccessDenied(String),

	/// Indicates that the archive was opened for reading only.
	#[error("archive is open in read-only mode")]
	ReadOnly,

	/// Indicates that a sector count does not fit the on-disk field width.
	#[error("archive size exceeded: {size} sectors > {max}")]
	SizeExceeded { size: u64, max: u64 },

	/// Indicates that the source file for an import holds no bytes.
	#[error("source file '{0}' is empty")]
	EmptySource(String),

	/// Indicates that the archive violates its own layout invariants.
	#[error("corrupt archive [{0}]")]
	Corrupted(String),
}

/// Represents the result of an archive operation.
pub type Result<T> = std::result::Result<T, Error>;

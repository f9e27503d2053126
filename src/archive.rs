use std::{
	fmt,
	fs::{self, File, OpenOptions},
	io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write},
	path::Path,
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::debug;

use crate::{
	directory::Directory,
	entry::{self, Entry, ENTRY_SIZE},
	error::{Error, Result},
	sector::{self, SECTOR_SIZE},
};

/// Represents the magic bytes leading a V2-style header.
pub const VERSION_2_MAGIC: [u8; 4] = [0x56, 0x45, 0x52, 0x32]; // VER2

/// Represents the length of a V2-style header: the magic bytes plus the entry count.
pub const VERSION_2_HEADER_SIZE: u64 = 8;

const COPY_BUFFER_SIZE: u64 = 1024 * 1024;

/// Represents the on-disk format of an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
	/// Paired files: a `dir` file holding the directory and an `img` file holding the data.
	V1,

	/// A single `img` file, leading with a header and the directory.
	V2,
}

/// Represents the mode an archive may be opened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
	/// The archive may only be inspected and extracted from.
	Read,

	/// The archive may also be edited.
	ReadWrite,
}

/// Represents an archive, opened from or created on disk.
///
/// The archive exclusively owns its file handles for as long as it lives.
/// Edits apply to the in-memory directory at once, but reach disk only on
/// [`sync`](Archive::sync); dropping the archive (or calling
/// [`close_without_sync`](Archive::close_without_sync)) discards them.
#[derive(Debug)]
pub struct Archive {
	img: File,
	dir: Option<File>,

	version: Version,
	mode: Mode,

	directory: Directory,
}

/// Represents an entry opened for reading.
///
/// Reads are bounded to the sectors of the entry; reading past them yields
/// end-of-data. Seeking is relative to the start of the entry.
#[derive(Debug)]
pub struct OpenEntry<'a> {
	inner: &'a mut File,

	off: u64,
	len: u64,
	pos: u64,
}

/// Attempts to detect the version of the archive at the specified path.
///
/// A file leading with the V2 magic bytes is a V2 archive. Otherwise, a sibling
/// `dir` file holding a whole number of entries implies the payload half of a V1
/// pair. Anything else is not a recognisable archive.
///
/// The file is probed and closed before returning.
pub fn guess_version<P>(path: P) -> Result<Version>
where
	P: AsRef<Path>,
{
	let path = path.as_ref();
	let mut img = open_file(path, Mode::Read)?;

	// Check if the file leads with a V2-style header, however graciously handle
	// files too short to hold one.

	let mut magic = [0; VERSION_2_MAGIC.len()];

	match img.read_exact(&mut magic) {
		Ok(()) if magic == VERSION_2_MAGIC => return Ok(Version::V2),
		Ok(()) => {}
		Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {}
		Err(err) => return Err(err.into()),
	}

	// No magic: fall back to looking for the directory half of a V1 pair.

	match fs::metadata(path.with_extension("dir")) {
		Ok(meta) if meta.len() % ENTRY_SIZE as u64 == 0 => Ok(Version::V1),
		Ok(_) => Err(Error::InvalidFormat(format!(
			"sibling directory file of '{}' does not hold a whole number of entries",
			path.display()
		))),
		Err(_) => Err(Error::InvalidFormat(format!(
			"'{}' has no version 2 header and no sibling directory file",
			path.display()
		))),
	}
}

impl Archive {
	/// Attempts to open the archive at the specified path in the specified mode,
	/// detecting its version.
	pub fn open<P>(path: P, mode: Mode) -> Result<Self>
	where
		P: AsRef<Path>,
	{
		let path = path.as_ref();

		let archive = match guess_version(path)? {
			Version::V1 => Self::open_v1(path, mode)?,
			Version::V2 => Self::open_v2(path, mode)?,
		};

		debug!("opened {} archive '{}' with {} entries", archive.version, path.display(), archive.entry_count());

		Ok(archive)
	}

	/// Creates a new, empty archive of the specified version at the specified path,
	/// opened for editing.
	///
	/// For V1, the sibling `dir` file is created alongside the `img` file.
	pub fn create<P>(path: P, version: Version) -> Result<Self>
	where
		P: AsRef<Path>,
	{
		let path = path.as_ref();

		let archive = match version {
			Version::V1 => {
				let dir = create_file(&path.with_extension("dir"))?;
				let img = create_file(path)?;

				Self {
					img,
					dir: Some(dir),
					version,
					mode: Mode::ReadWrite,
					directory: Directory::new(),
				}
			}
			Version::V2 => {
				let mut img = create_file(path)?;

				img.write_all(&VERSION_2_MAGIC)?;
				img.write_u32::<LittleEndian>(0)?;
				img.sync_all()?;

				Self {
					img,
					dir: None,
					version,
					mode: Mode::ReadWrite,
					directory: Directory::new(),
				}
			}
		};

		debug!("created empty {} archive '{}'", archive.version, path.display());

		Ok(archive)
	}

	fn open_v1(path: &Path, mode: Mode) -> Result<Self> {
		let mut dir = open_file(&path.with_extension("dir"), mode)?;
		let img = open_file(path, mode)?;

		if dir.metadata()?.len() % ENTRY_SIZE as u64 != 0 {
			return Err(Error::InvalidFormat(format!(
				"directory file of '{}' does not hold a whole number of entries",
				path.display()
			)));
		}

		let mut directory = Directory::new();

		{
			let mut src = BufReader::new(&mut dir);

			loop {
				// Attempt to read the next entry, however graciously handle an EOF.
				// Return any other kind of errors as normal.

				match Entry::read_from(&mut src) {
					Ok(entry) => directory.insert(entry)?,
					Err(err) => match err.kind() {
						io::ErrorKind::UnexpectedEof => break,
						_ => return Err(err.into()),
					},
				}
			}
		}

		let mut archive = Self {
			img,
			dir: Some(dir),
			version: Version::V1,
			mode,
			directory,
		};

		let bytes = archive.img.metadata()?.len();

		archive.validate_bounds(bytes)?;
		archive.directory.clear_dirty();

		Ok(archive)
	}

	fn open_v2(path: &Path, mode: Mode) -> Result<Self> {
		let mut img = open_file(path, mode)?;
		let bytes = img.metadata()?.len();

		// Read the header of the archive.

		let mut magic = [0; VERSION_2_MAGIC.len()];

		img.read_exact(&mut magic)?;

		if magic != VERSION_2_MAGIC {
			return Err(Error::InvalidFormat(format!("'{}' does not lead with a version 2 header", path.display())));
		}

		// Read the (expected) number of entries in the archive, checking that a
		// directory of that many entries actually fits the file.

		let count = img.read_u32::<LittleEndian>()?;

		if VERSION_2_HEADER_SIZE + u64::from(count) * ENTRY_SIZE as u64 > bytes {
			return Err(Error::InvalidFormat(format!("directory of '{}' extends beyond the end of the file", path.display())));
		}

		let mut directory = Directory::new();

		{
			let mut src = BufReader::new(&mut img);

			for _ in 0..count {
				directory.insert(Entry::read_from(&mut src)?)?;
			}
		}

		let mut archive = Self {
			img,
			dir: None,
			version: Version::V2,
			mode,
			directory,
		};

		archive.validate_bounds(bytes)?;
		archive.directory.clear_dirty();

		Ok(archive)
	}

	fn validate_bounds(&self, bytes: u64) -> Result<()> {
		let total = u64::from(sector::to_sectors(bytes)?);

		for entry in self.directory.iter() {
			if u64::from(entry.off) + u64::from(entry.len) > total {
				return Err(Error::InvalidFormat(format!("entry '{}' extends beyond the end of the file", entry.name)));
			}
		}

		Ok(())
	}

	/// Returns the version of the archive.
	pub fn version(&self) -> Version {
		self.version
	}

	/// Returns the mode the archive was opened in.
	pub fn mode(&self) -> Mode {
		self.mode
	}

	/// Returns the number of entries in the archive.
	pub fn entry_count(&self) -> usize {
		self.directory.len()
	}

	/// Returns if the archive is void of any entries.
	pub fn is_empty(&self) -> bool {
		self.directory.is_empty()
	}

	/// Returns the size of the payload file, in sectors, rounding up.
	pub fn size_in_sectors(&self) -> Result<u32> {
		sector::to_sectors(self.img.metadata()?.len())
	}

	/// Returns if any edits have been made since the directory was last synchronised.
	pub fn is_dirty(&self) -> bool {
		self.directory.dirty()
	}

	/// Returns if an entry with the specified name, ignoring case, exists.
	pub fn contains(&self, name: &str) -> bool {
		self.directory.contains(name)
	}

	/// Returns a copy of the entry with the specified name, ignoring case, if it exists.
	pub fn lookup(&self, name: &str) -> Option<Entry> {
		self.directory.lookup(name).cloned()
	}

	/// Returns the entry at the specified index, if it exists.
	pub fn get(&self, index: usize) -> Option<&Entry> {
		self.directory.get(index)
	}

	/// Returns an iterator over each of the entries in the archive, in insertion order.
	pub fn iter(&self) -> impl Iterator<Item = &Entry> {
		self.directory.iter()
	}

	/// Reads and returns the full sectors of the specified entry.
	///
	/// The returned buffer spans the padded length of the entry; any bytes past
	/// the original payload hold the zeroes of the trailing sector.
	pub fn read_entry_data(&mut self, entry: &Entry) -> Result<Vec<u8>> {
		self.img.seek(SeekFrom::Start(entry.off_bytes()))?;

		let mut buf = vec![0; entry.len_bytes() as usize];

		self.img.read_exact(&mut buf)?;

		Ok(buf)
	}

	/// Opens the specified entry for reading.
	pub fn open_entry(&mut self, entry: &Entry) -> OpenEntry<'_> {
		OpenEntry {
			inner: &mut self.img,
			off: entry.off_bytes(),
			len: entry.len_bytes(),
			pos: 0,
		}
	}

	/// Imports the file at the specified path into the archive as a new entry.
	///
	/// The payload lands past every live entry; the trailing partial sector is
	/// padded with zeroes. The directory updates only once the payload is fully
	/// written.
	pub fn import<P>(&mut self, source: P, name: &str) -> Result<()>
	where
		P: AsRef<Path>,
	{
		self.require_writable()?;

		entry::validate_name(name)?;

		if self.directory.contains(name) {
			return Err(Error::DuplicateName(name.to_owned()));
		}

		let source = source.as_ref();
		let mut src = open_file(source, Mode::Read)?;

		// Reject sources the on-disk length field could not describe before any byte moves.

		sector::to_sectors(src.metadata()?.len())?;

		let off = self.placement(self.directory.len() + 1, None)?;
		let len = self.write_payload(off, &mut src)?;

		if len == 0 {
			return Err(Error::EmptySource(source.display().to_string()));
		}

		sector::check_count(u64::from(off) + u64::from(len))?;

		self.directory.insert(Entry::new(name, off, len)?)?;

		debug!("imported '{}' at sector {} ({} sectors)", name, off, len);

		Ok(())
	}

	/// Extracts the entry with the specified name, ignoring case, to a file at the
	/// specified path.
	///
	/// The full sectors of the entry are written verbatim, trailing zero padding
	/// included; the exact payload length is the concern of the payload's own format.
	pub fn extract<P>(&mut self, name: &str, dest: P) -> Result<()>
	where
		P: AsRef<Path>,
	{
		let entry = self
			.lookup(name)
			.ok_or_else(|| Error::NotFound(name.to_owned()))?;

		let mut dst = create_file(dest.as_ref())?;
		let mut src = self.open_entry(&entry);

		io::copy(&mut src, &mut dst)?;

		Ok(())
	}

	/// Removes the entry with the specified name, ignoring case.
	///
	/// The sectors of the entry are neither zeroed nor reclaimed; they become a
	/// hole until the next [`pack`](Archive::pack).
	pub fn remove(&mut self, name: &str) -> Result<()> {
		self.require_writable()?;

		let entry = self.directory.remove(name)?;

		debug!("removed '{}' ({} sectors at {})", entry.name, entry.len, entry.off);

		Ok(())
	}

	/// Renames the entry called `old` to `new`, validating the new name.
	///
	/// No payload moves.
	pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
		self.require_writable()?;
		self.directory.rename(old, new)?;

		debug!("renamed '{}' to '{}'", old, new);

		Ok(())
	}

	/// Replaces the payload of the entry with the specified name, ignoring case,
	/// with the file at the specified path.
	///
	/// Equivalent to a removal followed by an import under the same name, as one
	/// operation: the entry moves to the end of insertion order, and its old
	/// sectors become a hole.
	pub fn replace<P>(&mut self, name: &str, source: P) -> Result<()>
	where
		P: AsRef<Path>,
	{
		self.require_writable()?;

		let index = self
			.directory
			.position(name)
			.ok_or_else(|| Error::NotFound(name.to_owned()))?;

		let source = source.as_ref();
		let mut src = open_file(source, Mode::Read)?;

		sector::to_sectors(src.metadata()?.len())?;

		// Place past every entry bar the one being replaced, so a payload at the
		// tail of the file is overwritten in place rather than leaving a hole.

		let off = self.placement(self.directory.len(), Some(index))?;
		let len = self.write_payload(off, &mut src)?;

		if len == 0 {
			return Err(Error::EmptySource(source.display().to_string()));
		}

		sector::check_count(u64::from(off) + u64::from(len))?;

		self.directory.remove(name)?;
		self.directory.insert(Entry::new(name, off, len)?)?;

		debug!("replaced '{}' at sector {} ({} sectors)", name, off, len);

		Ok(())
	}

	/// Compacts the archive so that, in offset order, its entries are contiguous
	/// with no gaps, and returns the new total size in sectors (the directory
	/// region included).
	///
	/// Entries are moved down with a streaming copy, lowest offset first, so no
	/// copy overlaps its own source. Insertion order is untouched; only offsets
	/// change. Packing an already-packed archive copies nothing and returns the
	/// same size.
	pub fn pack(&mut self) -> Result<u32> {
		self.require_writable()?;

		let mut order: Vec<(usize, Entry)> = self.directory.iter().cloned().enumerate().collect();

		order.sort_by_key(|(_, entry)| entry.off);

		let mut cursor = u64::from(self.first_data_sector(self.directory.len())?);

		for (index, entry) in order {
			let off = u64::from(entry.off);

			if off < cursor {
				return Err(Error::Corrupted(format!("entry '{}' overlaps the entry before it", entry.name)));
			}

			if off > cursor {
				self.copy_sectors(entry.off, cursor as u32, entry.len)?;
				self.directory.set_offset(index, cursor as u32);
			}

			cursor += u64::from(entry.len);
		}

		self.img.set_len(cursor * SECTOR_SIZE)?;
		self.directory.mark_dirty();

		let total = sector::check_count(cursor)?;

		debug!("packed archive down to {} sectors", total);

		Ok(total)
	}

	/// Synchronises the directory to disk and clears the dirty flag.
	///
	/// Without edits since the last synchronisation, this is a no-op. For V2 the
	/// header and directory are rewritten in place; for V1 the `dir` file is
	/// rewritten from scratch. The payload file is flushed to disk either way.
	pub fn sync(&mut self) -> Result<()> {
		if !self.directory.dirty() {
			return Ok(());
		}

		match self.version {
			Version::V1 => self.sync_v1()?,
			Version::V2 => self.sync_v2()?,
		}

		self.directory.clear_dirty();

		debug!("synchronised directory of {} entries", self.directory.len());

		Ok(())
	}

	/// Closes the archive, discarding any edits not yet synchronised.
	pub fn close_without_sync(self) {
		// Dropping the handles releases them; the unsynchronised directory goes with them.
	}

	fn sync_v1(&mut self) -> Result<()> {
		let dir = self
			.dir
			.as_mut()
			.ok_or_else(|| Error::Corrupted("version 1 archive without a directory file".to_owned()))?;

		dir.seek(SeekFrom::Start(0))?;

		{
			let mut dst = BufWriter::new(&mut *dir);

			for entry in self.directory.iter() {
				entry.write_to(&mut dst)?;
			}

			dst.flush()?;
		}

		dir.set_len((self.directory.len() * ENTRY_SIZE) as u64)?;
		dir.sync_all()?;
		self.img.sync_all()?;

		Ok(())
	}

	fn sync_v2(&mut self) -> Result<()> {
		// A live entry below the directory region can only mean the file was
		// mutated externally; flushing the directory over it would clobber it.

		let first = self.first_data_sector(self.directory.len())?;

		for entry in self.directory.iter() {
			if entry.off < first {
				return Err(Error::Corrupted(format!("entry '{}' overlaps the directory region", entry.name)));
			}
		}

		self.img.seek(SeekFrom::Start(0))?;

		{
			let mut dst = BufWriter::new(&mut self.img);

			dst.write_all(&VERSION_2_MAGIC)?;
			dst.write_u32::<LittleEndian>(self.directory.len() as u32)?;

			for entry in self.directory.iter() {
				entry.write_to(&mut dst)?;
			}

			dst.flush()?;
		}

		self.img.sync_all()?;

		Ok(())
	}

	/// Chooses the sector for a new payload: past every live entry, and never
	/// within the directory region a directory of `capacity` entries needs.
	fn placement(&self, capacity: usize, skip: Option<usize>) -> Result<u32> {
		let end = self
			.directory
			.iter()
			.enumerate()
			.filter(|&(index, _)| Some(index) != skip)
			.map(|(_, entry)| u64::from(entry.off) + u64::from(entry.len))
			.max()
			.unwrap_or(0);

		let first = self.first_data_sector(capacity)?;

		sector::check_count(end.max(u64::from(first)))
	}

	fn first_data_sector(&self, capacity: usize) -> Result<u32> {
		match self.version {
			Version::V1 => Ok(0),
			Version::V2 => sector::to_sectors(VERSION_2_HEADER_SIZE + (capacity * ENTRY_SIZE) as u64),
		}
	}

	fn write_payload<R>(&mut self, off: u32, src: &mut R) -> Result<u32>
	where
		R: Read,
	{
		self.img.seek(SeekFrom::Start(sector::to_bytes(off)))?;

		let bytes = io::copy(src, &mut self.img)?;
		let len = sector::to_sectors(bytes)?;

		// Pad the trailing partial sector with zeroes so the full range is written.

		let padding = sector::to_bytes(len) - bytes;

		if padding > 0 {
			self.img.write_all(&vec![0; padding as usize])?;
		}

		Ok(len)
	}

	fn copy_sectors(&mut self, from: u32, to: u32, len: u32) -> Result<()> {
		let mut src = sector::to_bytes(from);
		let mut dst = sector::to_bytes(to);
		let mut remaining = sector::to_bytes(len);

		let mut buf = vec![0; remaining.min(COPY_BUFFER_SIZE) as usize];

		while remaining > 0 {
			let chunk = remaining.min(buf.len() as u64) as usize;

			self.img.seek(SeekFrom::Start(src))?;
			self.img.read_exact(&mut buf[..chunk])?;
			self.img.seek(SeekFrom::Start(dst))?;
			self.img.write_all(&buf[..chunk])?;

			src += chunk as u64;
			dst += chunk as u64;
			remaining -= chunk as u64;
		}

		Ok(())
	}

	fn require_writable(&self) -> Result<()> {
		match self.mode {
			Mode::Read => Err(Error::ReadOnly),
			Mode::ReadWrite => Ok(()),
		}
	}
}

impl Read for OpenEntry<'_> {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		// Check if we are not at EoF (for the entry).

		if self.pos >= self.len {
			return Ok(0);
		}

		// Seek to the start of the entry including any currently read bytes.

		self.inner.seek(SeekFrom::Start(self.off + self.pos))?;

		// Calculate the maximum possible number of bytes to read for the entry, to
		// forbid reading beyond it.

		let max = (self.len - self.pos).min(buf.len() as u64) as usize;
		let read = self.inner.read(&mut buf[0..max])?;

		self.pos += read as u64;

		Ok(read)
	}
}

impl Seek for OpenEntry<'_> {
	fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
		let target = match pos {
			SeekFrom::Start(offset) => Some(offset),
			SeekFrom::End(offset) => self.len.checked_add_signed(offset),
			SeekFrom::Current(offset) => self.pos.checked_add_signed(offset),
		};

		match target {
			Some(target) => {
				self.pos = target;

				Ok(target)
			}
			None => Err(io::Error::new(io::ErrorKind::InvalidInput, "seek before the start of the entry")),
		}
	}
}

impl fmt::Display for Version {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::V1 => write!(f, "VER1"),
			Self::V2 => write!(f, "VER2"),
		}
	}
}

fn open_file(path: &Path, mode: Mode) -> Result<File> {
	let result = match mode {
		Mode::Read => File::open(path),
		Mode::ReadWrite => OpenOptions::new().read(true).write(true).open(path),
	};

	result.map_err(|err| to_access_error(err, path))
}

fn create_file(path: &Path) -> Result<File> {
	OpenOptions::new()
		.read(true)
		.write(true)
		.create(true)
		.truncate(true)
		.open(path)
		.map_err(|err| to_access_error(err, path))
}

fn to_access_error(err: io::Error, path: &Path) -> Error {
	match err.kind() {
		io::ErrorKind::PermissionDenied => Error::AccessDenied(path.display().to_string()),
		_ => err.into(),
	}
}

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::{
	error::{Error, Result},
	sector,
};

/// Represents the maximum length of the name of an entry, including the trailing null.
pub const NAME_SIZE: usize = 24;

/// Represents the size of a single serialised entry.
pub const ENTRY_SIZE: usize = 40;

/// Represents the terminator at the end of the name of an entry.
pub const NULL_TERMINATOR: u8 = 0x00;

/// Represents an entry within the directory of an archive.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct Entry {
	/// The name of the entry, up to 23 characters.
	pub name: String,

	/// The offset, in sectors, of the entry.
	pub off: u32,

	/// The length, in sectors, of the entry.
	pub len: u32,
}

impl Entry {
	/// Creates a new entry with the specified name, offset and length, validating the name.
	pub fn new(name: &str, off: u32, len: u32) -> Result<Self> {
		validate_name(name)?;

		Ok(Self {
			name: name.to_owned(),
			off,
			len,
		})
	}

	/// Attempts to read a single serialised entry from the specified source.
	pub fn read_from<R>(src: &mut R) -> io::Result<Self>
	where
		R: Read,
	{
		// Read the properties of the entry.

		let off = src.read_u32::<LittleEndian>()?;
		let len = src.read_u32::<LittleEndian>()?;

		let mut unused = [0; 8];

		src.read_exact(&mut unused)?; // Unused (always 0)

		// Read the name as a null-terminated string.

		let name = {
			let mut buf = [0; NAME_SIZE];

			src.read_exact(&mut buf)?;

			to_name(&buf)
		};

		Ok(Self {
			name,
			off,
			len,
		})
	}

	/// Attempts to write this entry in its serialised form to the specified destination.
	pub fn write_to<W>(&self, dst: &mut W) -> io::Result<()>
	where
		W: Write,
	{
		// Write the properties of the entry.

		dst.write_u32::<LittleEndian>(self.off)?;
		dst.write_u32::<LittleEndian>(self.len)?;
		dst.write_all(&[NULL_TERMINATOR; 8])?; // Unused (always 0)

		// Write the name as a null-terminated string.

		dst.write_all(&to_null_terminated(&self.name))?;

		Ok(())
	}

	/// Returns the offset of the entry, in bytes.
	pub fn off_bytes(&self) -> u64 {
		sector::to_bytes(self.off)
	}

	/// Returns the length of the entry, in bytes.
	pub fn len_bytes(&self) -> u64 {
		sector::to_bytes(self.len)
	}
}

/// Validates the provided name for use as the name of an entry.
///
/// Names must be between 1 and 23 ASCII characters, with no interior null;
/// anything longer would not survive the fixed-width field on disk.
pub fn validate_name(name: &str) -> Result<()> {
	let valid = !name.is_empty()
		&& name.len() < NAME_SIZE
		&& name.bytes().all(|b| b.is_ascii() && b != NULL_TERMINATOR);

	if valid {
		Ok(())
	} else {
		Err(Error::InvalidName(name.to_owned()))
	}
}

/// Folds the provided name into its case-insensitive lookup form.
pub fn fold_name(name: &str) -> String {
	name.to_ascii_lowercase()
}

fn to_name(buf: &[u8]) -> String {
	buf.iter()
		.map(|&b| char::from(b))
		.take(buf.iter().position(|&b| b == NULL_TERMINATOR).unwrap_or(buf.len()))
		.collect()
}

fn to_null_terminated(str: &str) -> Vec<u8> {
	str.bytes()
		.take(NAME_SIZE - 1)
		.chain(std::iter::repeat(NULL_TERMINATOR))
		.take(NAME_SIZE)
		.collect()
}

#[cfg(test)]
mod tests {
	use std::io::Cursor;

	use super::{fold_name, to_name, to_null_terminated, validate_name, Entry, ENTRY_SIZE};

	#[test]
	fn test_to_name() {
		let slice = vec![83, 111, 109, 101, 98, 111, 100, 121, 79, 110, 99, 101, 84, 111, 108, 100, 77, 101, 87, 111, 114, 108, 100, 0]; // SomebodyOnceToldMeWorld
		let string = to_name(&slice);

		assert_eq!(string, "SomebodyOnceToldMeWorld");
	}

	#[test]
	fn test_to_name_unterminated() {
		let slice = vec![b'x'; 24];
		let string = to_name(&slice);

		assert_eq!(string, "xxxxxxxxxxxxxxxxxxxxxxxx");
	}

	#[test]
	fn test_to_null_terminated() {
		let string = "VIRGO.DFF";
		let slice = to_null_terminated(&string);

		assert_eq!(slice, vec![b'V', b'I', b'R', b'G', b'O', b'.', b'D', b'F', b'F', 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]); // VIRGO.DFF
		assert_eq!(slice.len(), 24);
	}

	#[test]
	fn test_to_null_terminated_truncate() {
		let string = "SomebodyOnceToldMeWorldGonnaRollMe";
		let slice = to_null_terminated(&string);

		assert_eq!(slice, vec![b'S', b'o', b'm', b'e', b'b', b'o', b'd', b'y', b'O', b'n', b'c', b'e', b'T', b'o', b'l', b'd', b'M', b'e', b'W', b'o', b'r', b'l', b'd', 0]); // SomebodyOnceToldMeWorld
		assert_eq!(slice.len(), 24);
	}

	#[test]
	fn test_round_trip() {
		let entry = Entry::new("LANDSTAL.DFF", 11, 5).expect("failed to create entry");

		let mut buf: Vec<u8> = Vec::new();

		entry.write_to(&mut buf).expect("failed to write entry");

		assert_eq!(buf.len(), ENTRY_SIZE);
		assert_eq!(&buf[0..4], &[11, 0, 0, 0]);
		assert_eq!(&buf[4..8], &[5, 0, 0, 0]);
		assert_eq!(&buf[8..16], &[0; 8]);

		let read = Entry::read_from(&mut Cursor::new(buf)).expect("failed to read entry");

		assert_eq!(read, entry);
	}

	#[test]
	fn test_validate_name() {
		assert!(validate_name("player.dff").is_ok());
		assert!(validate_name("abcdefghijklmnopqrstuvw").is_ok()); // 23 characters
	}

	#[test]
	fn test_validate_name_empty() {
		assert!(validate_name("").is_err());
	}

	#[test]
	fn test_validate_name_overlong() {
		assert!(validate_name("abcdefghijklmnopqrstuvwx").is_err()); // 24 characters
	}

	#[test]
	fn test_validate_name_non_ascii() {
		assert!(validate_name("plätter.dff").is_err());
		assert!(validate_name("player\u{0}dff").is_err());
	}

	#[test]
	fn test_fold_name() {
		assert_eq!(fold_name("Player.DFF"), fold_name("PLAYER.dff"));
		assert_eq!(fold_name("player.dff"), "player.dff");
	}
}

//! Command-line tool for inspecting and editing `IMG` archives.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use imged::{Archive, Mode, Version};

#[derive(Debug, Parser)]
#[command(name = "imged", about = "Inspects and edits IMG archives used throughout the 3D universe-era of Grand Theft Auto games.")]
struct Args {
	#[command(subcommand)]
	command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Lists the entries of the archive
	List {
		/// Specifies the image archive
		img: PathBuf,
	},

	/// Summarises the archive
	Info {
		/// Specifies the image archive
		img: PathBuf,
	},

	/// Creates a new, empty archive
	Create {
		/// Specifies the image archive
		img: PathBuf,

		/// Specifies the on-disk format
		#[arg(short, long, value_enum, default_value = "v2")]
		format: Format,
	},

	/// Imports a file into the archive as a new entry
	Import {
		/// Specifies the image archive
		img: PathBuf,

		/// Specifies the file to import
		source: PathBuf,

		/// Specifies the name of the new entry, defaulting to the file name of the source
		#[arg(short, long)]
		name: Option<String>,
	},

	/// Extracts an entry to a file
	Extract {
		/// Specifies the image archive
		img: PathBuf,

		/// Specifies the name of the entry
		name: String,

		/// Specifies the file to extract to
		dest: PathBuf,
	},

	/// Removes an entry from the archive
	Remove {
		/// Specifies the image archive
		img: PathBuf,

		/// Specifies the name of the entry
		name: String,
	},

	/// Renames an entry within the archive
	Rename {
		/// Specifies the image archive
		img: PathBuf,

		/// Specifies the current name of the entry
		old: String,

		/// Specifies the new name of the entry
		new: String,
	},

	/// Replaces the contents of an entry with a file
	Replace {
		/// Specifies the image archive
		img: PathBuf,

		/// Specifies the name of the entry
		name: String,

		/// Specifies the file to import in its place
		source: PathBuf,
	},

	/// Compacts the archive so that its entries are contiguous
	Pack {
		/// Specifies the image archive
		img: PathBuf,
	},
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
	/// Paired `dir` and `img` files
	V1,

	/// Single `img` file with an embedded directory
	V2,
}

fn main() -> anyhow::Result<()> {
	tracing_subscriber::fmt::init();

	match Args::parse().command {
		Command::List { img } => list(&img),
		Command::Info { img } => info(&img),
		Command::Create { img, format } => create(&img, format),
		Command::Import { img, source, name } => import(&img, &source, name),
		Command::Extract { img, name, dest } => extract(&img, &name, &dest),
		Command::Remove { img, name } => remove(&img, &name),
		Command::Rename { img, old, new } => rename(&img, &old, &new),
		Command::Replace { img, name, source } => replace(&img, &name, &source),
		Command::Pack { img } => pack(&img),
	}
}

fn list(img: &Path) -> anyhow::Result<()> {
	let archive = Archive::open(img, Mode::Read)?;

	for entry in archive.iter() {
		println!("{} - offset: {}, length: {}", entry.name, entry.off, entry.len);
	}

	Ok(())
}

fn info(img: &Path) -> anyhow::Result<()> {
	let archive = Archive::open(img, Mode::Read)?;

	println!("version: {}", archive.version());
	println!("entries: {}", archive.entry_count());
	println!("sectors: {}", archive.size_in_sectors()?);

	Ok(())
}

fn create(img: &Path, format: Format) -> anyhow::Result<()> {
	let version = match format {
		Format::V1 => Version::V1,
		Format::V2 => Version::V2,
	};

	Archive::create(img, version)?;

	println!("created empty {} archive at '{}'", version, img.display());

	Ok(())
}

fn import(img: &Path, source: &Path, name: Option<String>) -> anyhow::Result<()> {
	let name = match name {
		Some(name) => name,
		None => source
			.file_name()
			.and_then(|name| name.to_str())
			.context("failed to convert file name to string")?
			.to_owned(),
	};

	let mut archive = Archive::open(img, Mode::ReadWrite)?;

	archive.import(source, &name)?;
	archive.sync()?;

	println!("imported '{}'", name);

	Ok(())
}

fn extract(img: &Path, name: &str, dest: &Path) -> anyhow::Result<()> {
	let mut archive = Archive::open(img, Mode::Read)?;

	archive.extract(name, dest)?;

	println!("extracted '{}' to '{}'", name, dest.display());

	Ok(())
}

fn remove(img: &Path, name: &str) -> anyhow::Result<()> {
	let mut archive = Archive::open(img, Mode::ReadWrite)?;

	archive.remove(name)?;
	archive.sync()?;

	println!("removed '{}'", name);

	Ok(())
}

fn rename(img: &Path, old: &str, new: &str) -> anyhow::Result<()> {
	let mut archive = Archive::open(img, Mode::ReadWrite)?;

	archive.rename(old, new)?;
	archive.sync()?;

	println!("renamed '{}' to '{}'", old, new);

	Ok(())
}

fn replace(img: &Path, name: &str, source: &Path) -> anyhow::Result<()> {
	let mut archive = Archive::open(img, Mode::ReadWrite)?;

	archive.replace(name, source)?;
	archive.sync()?;

	println!("replaced '{}'", name);

	Ok(())
}

fn pack(img: &Path) -> anyhow::Result<()> {
	let mut archive = Archive::open(img, Mode::ReadWrite)?;

	let sectors = archive.pack()?;

	archive.sync()?;

	println!("packed '{}' down to {} sectors", img.display(), sectors);

	Ok(())
}

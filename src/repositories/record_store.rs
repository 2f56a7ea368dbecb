// src/repositories/record_store.rs

use crate::error::{SyncError, SyncResult};
use crate::models::package_record::PackageRecord;
use log::debug;
use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const DEFAULT_COLLECTION: &str = "gems";
const RECORD_EXTENSION: &str = "yml";

/// Flat-file store of advisory records laid out as
/// `<root>/<collection>/<package>/<primary id>.yml`.
pub struct RecordStore {
	root: PathBuf,
	collection: String,
}

impl RecordStore {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self {
			root: root.into(),
			collection: DEFAULT_COLLECTION.to_string(),
		}
	}

	pub fn collection_dir(&self) -> PathBuf {
		self.root.join(&self.collection)
	}

	/// Location of the record for one package of one advisory.
	pub fn file_path_for(&self, package_name: &str, primary_id: &str) -> SyncResult<PathBuf> {
		check_component(package_name)?;
		check_component(primary_id)?;

		Ok(self
			.collection_dir()
			.join(package_name)
			.join(format!("{}.{}", primary_id, RECORD_EXTENSION)))
	}

	/// Reads the first YAML document at `path`.
	///
	/// Returns `Ok(None)` when the file does not exist. Anything after the
	/// first document is reviewer material and is not parsed.
	pub fn load(&self, path: &Path) -> SyncResult<Option<PackageRecord>> {
		let contents = match fs::read_to_string(path) {
			Ok(contents) => contents,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(SyncError::io(path, e)),
		};

		parse_first_document(&contents)
			.map(Some)
			.map_err(|reason| SyncError::Format {
				path: path.to_path_buf(),
				reason,
			})
	}

	/// Writes a new file, failing if one already exists at `path`.
	pub fn create(&self, path: &Path, contents: &str) -> SyncResult<()> {
		let temp = self.stage(path, contents)?;
		temp.persist_noclobber(path)
			.map_err(|e| SyncError::io(path, e.error))?;
		debug!("Created {}", path.display());
		Ok(())
	}

	/// Replaces the file at `path` with the serialized record.
	pub fn write(&self, path: &Path, record: &PackageRecord) -> SyncResult<()> {
		let yaml = record
			.to_yaml()
			.map_err(|e| SyncError::Serialize(e.to_string()))?;
		let temp = self.stage(path, &format!("---\n{}", yaml))?;
		temp.persist(path).map_err(|e| SyncError::io(path, e.error))?;
		debug!("Rewrote {}", path.display());
		Ok(())
	}

	/// Writes `contents` to a temporary file next to `path`.
	///
	/// The temporary file is removed on drop unless it is persisted, so a
	/// failed write never leaves a partial record behind.
	fn stage(&self, path: &Path, contents: &str) -> SyncResult<NamedTempFile> {
		let parent = path
			.parent()
			.ok_or_else(|| SyncError::io(path, std::io::Error::other("record path has no parent")))?;
		fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;

		let mut temp = NamedTempFile::new_in(parent).map_err(|e| SyncError::io(parent, e))?;
		temp.write_all(contents.as_bytes())
			.map_err(|e| SyncError::io(temp.path(), e))?;
		temp.as_file()
			.sync_all()
			.map_err(|e| SyncError::io(temp.path(), e))?;
		Ok(temp)
	}
}

fn check_component(component: &str) -> SyncResult<()> {
	let traverses = component.is_empty()
		|| component == "."
		|| component == ".."
		|| component.contains(['/', '\\']);
	if traverses {
		return Err(SyncError::MalformedIdentifier(format!(
			"'{}' is not usable as a path component",
			component
		)));
	}
	Ok(())
}

fn parse_first_document(contents: &str) -> Result<PackageRecord, String> {
	let document = serde_yaml::Deserializer::from_str(contents)
		.next()
		.ok_or_else(|| "empty document".to_string())?;
	PackageRecord::deserialize(document).map_err(|e| e.to_string())
}

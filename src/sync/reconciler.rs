// src/sync/reconciler.rs

use crate::error::{SyncError, SyncResult};
use crate::models::advisory::Advisory;
use crate::models::package_record::{PackageRecord, Related, Score};
use crate::repositories::record_store::RecordStore;
use crate::sync::versions::patched_versions_for;
use log::{debug, error, info};
use std::path::{Path, PathBuf};

/// NVD detail pages just mirror the advisory, so they are never the `url`.
const NVD_DETAIL_PREFIX: &str = "https://nvd.nist.gov/vuln/detail/";

pub const CVSS_PLACEHOLDER: &str = "<FILL IN IF AVAILABLE>";
pub const PATCHED_PLACEHOLDER: &str = "<FILL IN SEE BELOW>";
pub const UNAFFECTED_PLACEHOLDER: &str = "<OPTIONAL: FILL IN SEE BELOW>";

const RAW_BLOCK_HEADER: &str = "# GitHub advisory data below - **Remove this data before committing**\n\
# Use this data to write patched_versions (and potentially unaffected_versions) above\n";

const RAILS_COMPONENTS: [&str; 12] = [
	"actioncable",
	"actionmailbox",
	"actionmailer",
	"actionpack",
	"actiontext",
	"actionview",
	"activejob",
	"activemodel",
	"activerecord",
	"activestorage",
	"activesupport",
	"railties",
];

/// What happened to one package record.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
	Created(PathBuf),
	Updated(PathBuf),
	Unchanged(PathBuf),
}

impl Outcome {
	pub fn written_path(&self) -> Option<&Path> {
		match self {
			Outcome::Created(path) | Outcome::Updated(path) => Some(path),
			Outcome::Unchanged(_) => None,
		}
	}
}

#[derive(Debug)]
pub struct PackageFailure {
	pub package: String,
	pub advisory: String,
	pub error: SyncError,
}

/// Per-package results for one advisory.
#[derive(Debug, Default)]
pub struct AdvisoryOutcome {
	pub outcomes: Vec<Outcome>,
	pub failures: Vec<PackageFailure>,
}

impl AdvisoryOutcome {
	pub fn written_paths(&self) -> Vec<&Path> {
		self.outcomes.iter().filter_map(Outcome::written_path).collect()
	}
}

pub fn framework_for(package_name: &str) -> Option<&'static str> {
	RAILS_COMPONENTS.contains(&package_name).then_some("rails")
}

pub fn external_reference(advisory: &Advisory) -> Option<String> {
	advisory
		.references
		.iter()
		.find(|url| !url.starts_with(NVD_DETAIL_PREFIX))
		.cloned()
}

/// Fields that can be derived from upstream data alone.
pub fn derive_record(advisory: &Advisory, package_name: &str) -> PackageRecord {
	PackageRecord {
		gem: Some(package_name.to_string()),
		framework: framework_for(package_name).map(str::to_string),
		cve: advisory
			.cve_id
			.as_deref()
			.map(|id| id.strip_prefix("CVE-").unwrap_or(id).to_string()),
		ghsa: advisory
			.secondary_id
			.as_deref()
			.map(|id| id.strip_prefix("GHSA-").unwrap_or(id).to_string()),
		url: external_reference(advisory),
		title: Some(advisory.summary.clone()),
		date: advisory.published_at,
		description: Some(advisory.description.clone()),
		cvss_v3: advisory.severity_score.map(Score::Value),
		..Default::default()
	}
}

/// A first-time record: derived fields plus placeholders for a reviewer.
pub fn skeleton_record(advisory: &Advisory, package_name: &str) -> PackageRecord {
	let patched = patched_versions_for(advisory, package_name);
	let placeholders = PackageRecord {
		cvss_v3: advisory
			.severity_score
			.is_none()
			.then(|| Score::Placeholder(CVSS_PLACEHOLDER.to_string())),
		unaffected_versions: Some(vec![UNAFFECTED_PLACEHOLDER.to_string()]),
		patched_versions: Some(if patched.is_empty() {
			vec![PATCHED_PLACEHOLDER.to_string()]
		} else {
			patched
		}),
		related: (!advisory.references.is_empty()).then(|| Related {
			url: Some(advisory.references.clone()),
			..Default::default()
		}),
		..Default::default()
	};

	PackageRecord::merged_with(&placeholders, &derive_record(advisory, package_name))
}

/// Full text of a new record file: the record, then the upstream data as a
/// second YAML document that record parsers skip.
pub fn render_new_record(advisory: &Advisory, record: &PackageRecord) -> SyncResult<String> {
	let record_yaml = record
		.to_yaml()
		.map_err(|e| SyncError::Serialize(e.to_string()))?;
	let raw_yaml = serde_yaml::to_string(&advisory.raw_source())
		.map_err(|e| SyncError::Serialize(e.to_string()))?;

	Ok(format!("---\n{}{}---\n{}", record_yaml, RAW_BLOCK_HEADER, raw_yaml))
}

pub struct Reconciler<'a> {
	store: &'a RecordStore,
}

impl<'a> Reconciler<'a> {
	pub fn new(store: &'a RecordStore) -> Self {
		Self { store }
	}

	/// Creates or updates the record of every package the advisory affects.
	///
	/// A failure on one package is recorded and the remaining packages are
	/// still processed.
	pub fn reconcile(&self, advisory: &Advisory) -> AdvisoryOutcome {
		let mut result = AdvisoryOutcome::default();

		for package_name in advisory.package_names() {
			match self.sync_package(advisory, package_name) {
				Ok(outcome) => result.outcomes.push(outcome),
				Err(e) => {
					error!("Failed to sync {} for {}: {}", package_name, advisory.primary_id, e);
					result.failures.push(PackageFailure {
						package: package_name.to_string(),
						advisory: advisory.primary_id.clone(),
						error: e,
					});
				}
			}
		}

		result
	}

	fn sync_package(&self, advisory: &Advisory, package_name: &str) -> SyncResult<Outcome> {
		let path = self.store.file_path_for(package_name, &advisory.primary_id)?;
		match self.store.load(&path)? {
			None => self.create(advisory, package_name, path),
			Some(saved) => self.update(advisory, package_name, path, &saved),
		}
	}

	pub fn create(&self, advisory: &Advisory, package_name: &str, path: PathBuf) -> SyncResult<Outcome> {
		for entry in advisory.vulnerabilities.iter().filter(|e| e.package_name == package_name) {
			debug!("{} {} vulnerable: {}", entry.ecosystem, entry.package_name, entry.vulnerable_range);
		}
		let record = skeleton_record(advisory, package_name);
		let contents = render_new_record(advisory, &record)?;
		self.store.create(&path, &contents)?;

		info!("Wrote: {}", path.display());
		Ok(Outcome::Created(path))
	}

	pub fn update(
		&self,
		advisory: &Advisory,
		package_name: &str,
		path: PathBuf,
		saved: &PackageRecord,
	) -> SyncResult<Outcome> {
		let merged = PackageRecord::merged_with(saved, &derive_record(advisory, package_name));
		if &merged == saved {
			return Ok(Outcome::Unchanged(path));
		}

		self.store.write(&path, &merged)?;
		info!("Updated: {}", path.display());
		Ok(Outcome::Updated(path))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::models::advisory::VulnerabilityEntry;
	use chrono::NaiveDate;
	use std::fs;
	use tempfile::tempdir;

	fn entry(package: &str, patched: Option<&str>) -> VulnerabilityEntry {
		VulnerabilityEntry {
			package_name: package.to_string(),
			ecosystem: "RUBYGEMS".to_string(),
			vulnerable_range: "< 1.5.0".to_string(),
			first_patched_version: patched.map(str::to_string),
			raw: serde_json::json!({
				"package": {"name": package, "ecosystem": "RUBYGEMS"},
				"vulnerableVersionRange": "< 1.5.0",
			}),
		}
	}

	fn advisory(entries: Vec<VulnerabilityEntry>, score: Option<f64>) -> Advisory {
		Advisory {
			primary_id: "CVE-2022-24836".to_string(),
			cve_id: Some("CVE-2022-24836".to_string()),
			secondary_id: Some("GHSA-crjr-9rc5-ghw8".to_string()),
			published_at: NaiveDate::from_ymd_opt(2022, 4, 11),
			withdrawn: false,
			summary: "Inefficient regular expression".to_string(),
			description: "A ReDoS in the HTML encoding detection.".to_string(),
			severity_score: score,
			references: vec![
				"https://nvd.nist.gov/vuln/detail/CVE-2022-24836".to_string(),
				"https://github.com/sparklemotion/nokogiri/security/advisories/GHSA-crjr-9rc5-ghw8".to_string(),
			],
			vulnerabilities: entries,
			raw: serde_json::json!({"summary": "Inefficient regular expression"}),
		}
	}

	#[test]
	fn test_framework_for_rails_components() {
		assert_eq!(framework_for("activerecord"), Some("rails"));
		assert_eq!(framework_for("railties"), Some("rails"));
		assert_eq!(framework_for("rack"), None);
	}

	#[test]
	fn test_derive_record_strips_prefixes_and_skips_nvd() {
		let record = derive_record(&advisory(vec![entry("nokogiri", None)], Some(7.5)), "nokogiri");
		assert_eq!(record.cve.as_deref(), Some("2022-24836"));
		assert_eq!(record.ghsa.as_deref(), Some("crjr-9rc5-ghw8"));
		assert_eq!(
			record.url.as_deref(),
			Some("https://github.com/sparklemotion/nokogiri/security/advisories/GHSA-crjr-9rc5-ghw8")
		);
		assert_eq!(record.cvss_v3, Some(Score::Value(7.5)));
		assert!(record.patched_versions.is_none());
	}

	#[test]
	fn test_skeleton_placeholders() {
		let a = advisory(vec![entry("nokogiri", None)], None);
		let record = skeleton_record(&a, "nokogiri");
		assert_eq!(record.cvss_v3, Some(Score::Placeholder(CVSS_PLACEHOLDER.to_string())));
		assert_eq!(record.patched_versions, Some(vec![PATCHED_PLACEHOLDER.to_string()]));
		assert_eq!(record.unaffected_versions, Some(vec![UNAFFECTED_PLACEHOLDER.to_string()]));
		assert_eq!(record.related.and_then(|r| r.url).map(|u| u.len()), Some(2));
	}

	#[test]
	fn test_skeleton_uses_synthesized_versions() {
		let a = advisory(vec![entry("nokogiri", Some("1.13.4")), entry("nokogiri", Some("1.12.5"))], Some(7.5));
		let record = skeleton_record(&a, "nokogiri");
		assert_eq!(
			record.patched_versions,
			Some(vec!["~> 1.12.5".to_string(), ">= 1.13.4".to_string()])
		);
		assert_eq!(record.cvss_v3, Some(Score::Value(7.5)));
	}

	#[test]
	fn test_rendered_file_has_ignored_raw_block() {
		let a = advisory(vec![entry("nokogiri", Some("1.13.4"))], None);
		let text = render_new_record(&a, &skeleton_record(&a, "nokogiri")).unwrap();
		assert!(text.starts_with("---\ngem: nokogiri\n"));
		assert!(text.contains("# GitHub advisory data below"));
		assert_eq!(text.matches("\n---\n").count(), 1);
		assert!(text.contains("vulnerabilities:"));
	}

	#[test]
	fn test_create_then_second_pass_is_unchanged() {
		let dir = tempdir().unwrap();
		let store = RecordStore::new(dir.path());
		let reconciler = Reconciler::new(&store);
		let a = advisory(vec![entry("nokogiri", Some("1.13.4")), entry("loofah", None)], None);

		let first = reconciler.reconcile(&a);
		assert!(first.failures.is_empty());
		assert_eq!(first.written_paths().len(), 2);
		assert!(matches!(first.outcomes[0], Outcome::Created(_)));
		assert!(dir.path().join("gems/nokogiri/CVE-2022-24836.yml").exists());
		assert!(dir.path().join("gems/loofah/CVE-2022-24836.yml").exists());

		let second = reconciler.reconcile(&a);
		assert!(second.written_paths().is_empty());
		assert!(second.outcomes.iter().all(|o| matches!(o, Outcome::Unchanged(_))));
	}

	#[test]
	fn test_update_fills_missing_fields_but_keeps_edits() {
		let dir = tempdir().unwrap();
		let store = RecordStore::new(dir.path());
		let path = store.file_path_for("nokogiri", "CVE-2022-24836").unwrap();
		store
			.create(
				&path,
				"---\ngem: nokogiri\ncve: 2022-24836\ntitle: Curated title\npatched_versions:\n- \">= 1.13.4\"\n",
			)
			.unwrap();

		let reconciler = Reconciler::new(&store);
		let a = advisory(vec![entry("nokogiri", Some("1.13.4"))], Some(7.5));
		let result = reconciler.reconcile(&a);
		assert!(matches!(result.outcomes[0], Outcome::Updated(_)));

		let record = store.load(&path).unwrap().unwrap();
		assert_eq!(record.title.as_deref(), Some("Curated title"));
		assert_eq!(record.patched_versions, Some(vec![">= 1.13.4".to_string()]));
		assert_eq!(record.ghsa.as_deref(), Some("crjr-9rc5-ghw8"));
		assert_eq!(record.cvss_v3, Some(Score::Value(7.5)));

		let again = reconciler.reconcile(&a);
		assert!(matches!(again.outcomes[0], Outcome::Unchanged(_)));
	}

	#[test]
	fn test_unchanged_update_performs_no_write() {
		let dir = tempdir().unwrap();
		let store = RecordStore::new(dir.path());
		let a = advisory(vec![entry("nokogiri", None)], Some(7.5));
		let path = store.file_path_for("nokogiri", &a.primary_id).unwrap();
		store.write(&path, &derive_record(&a, "nokogiri")).unwrap();
		let before = fs::metadata(&path).unwrap().modified().unwrap();
		let contents = fs::read_to_string(&path).unwrap();

		let outcome = Reconciler::new(&store)
			.update(&a, "nokogiri", path.clone(), &store.load(&path).unwrap().unwrap())
			.unwrap();
		assert_eq!(outcome, Outcome::Unchanged(path.clone()));
		assert_eq!(fs::read_to_string(&path).unwrap(), contents);
		assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), before);
	}

	#[test]
	fn test_unparsable_record_fails_only_that_package() {
		let dir = tempdir().unwrap();
		let store = RecordStore::new(dir.path());
		let broken = store.file_path_for("nokogiri", "CVE-2022-24836").unwrap();
		store.create(&broken, "gem: nokogiri\nnot_a_field: 1\n").unwrap();

		let a = advisory(vec![entry("nokogiri", None), entry("loofah", None)], None);
		let result = Reconciler::new(&store).reconcile(&a);
		assert_eq!(result.failures.len(), 1);
		assert_eq!(result.failures[0].package, "nokogiri");
		assert!(matches!(result.failures[0].error, SyncError::Format { .. }));
		assert_eq!(result.written_paths().len(), 1);
		assert_eq!(fs::read_to_string(&broken).unwrap(), "gem: nokogiri\nnot_a_field: 1\n");
	}
}

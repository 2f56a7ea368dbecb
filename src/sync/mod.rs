// src/sync/mod.rs

pub mod aggregator;
pub mod filter;
pub mod reconciler;
pub mod versions;

use crate::error::SyncResult;
use crate::repositories::record_store::RecordStore;
use crate::utils::github_api::{GraphQlTransport, PagedQuery, Paginator};
use log::{debug, info};
use reconciler::{Outcome, PackageFailure, Reconciler};
use serde_json::{json, Map};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct SyncOptions {
	/// Earliest CVE year to sync; advisories without a CVE always sync.
	pub min_year: i32,
	/// Restrict the upstream query to one gem.
	pub gem_name: Option<String>,
	pub page_size: u32,
	pub max_pages: u32,
}

/// What one batch did.
#[derive(Debug, Default)]
pub struct SyncReport {
	pub created: Vec<PathBuf>,
	pub updated: Vec<PathBuf>,
	pub unchanged: usize,
	pub failed: Vec<PackageFailure>,
	/// Advisories dropped for a malformed CVE id.
	pub excluded: usize,
	/// Pagination stopped at the page ceiling.
	pub truncated: bool,
}

impl SyncReport {
	pub fn files_written(&self) -> Vec<&PathBuf> {
		self.created.iter().chain(self.updated.iter()).collect()
	}

	pub fn nothing_written(&self) -> bool {
		self.files_written().is_empty()
	}

	pub fn summary(&self, min_year: i32) -> String {
		let mut out = String::from("Sync completed\n");
		if self.nothing_written() {
			out.push_str(&format!(
				"Nothing to sync today! All CVEs starting from {} are already present\n",
				min_year
			));
		} else {
			if !self.created.is_empty() {
				out.push_str(&format!("Created {} file(s):\n", self.created.len()));
				for path in &self.created {
					out.push_str(&format!("  {}\n", path.display()));
				}
			}
			if !self.updated.is_empty() {
				out.push_str(&format!("Updated {} file(s):\n", self.updated.len()));
				for path in &self.updated {
					out.push_str(&format!("  {}\n", path.display()));
				}
			}
		}
		if self.excluded > 0 {
			out.push_str(&format!("Excluded {} advisory(ies) with a malformed CVE id\n", self.excluded));
		}
		if !self.failed.is_empty() {
			out.push_str(&format!("Failed {} package record(s):\n", self.failed.len()));
			for failure in &self.failed {
				out.push_str(&format!("  {} {}: {}\n", failure.package, failure.advisory, failure.error));
			}
		}
		if self.truncated {
			out.push_str("Warning: the page limit was reached, upstream data may be incomplete\n");
		}
		out
	}

	fn record(&mut self, outcome: Outcome) {
		match outcome {
			Outcome::Created(path) => self.created.push(path),
			Outcome::Updated(path) => self.updated.push(path),
			Outcome::Unchanged(path) => {
				debug!("Unchanged: {}", path.display());
				self.unchanged += 1;
			}
		}
	}
}

/// One full pass: paginate, aggregate, filter, reconcile.
///
/// Network and API failures abort the pass. Per-package failures are
/// collected in the report.
pub async fn run<T: GraphQlTransport + ?Sized>(
	transport: &T,
	store: &RecordStore,
	options: &SyncOptions,
) -> SyncResult<SyncReport> {
	let mut variables = Map::new();
	if let Some(gem_name) = &options.gem_name {
		variables.insert("gem_name".to_string(), json!(gem_name));
	}

	let fetched = Paginator::new(transport)
		.fetch_all(
			&PagedQuery::rubygem_vulnerabilities(),
			variables,
			options.page_size,
			options.max_pages,
		)
		.await?;

	let aggregation = aggregator::aggregate(fetched.nodes)?;
	let (advisories, excluded) = filter::retain_recent(aggregation.advisories, options.min_year);
	info!(
		"{} advisories remain after filtering CVEs before {}",
		advisories.len(),
		options.min_year
	);

	let mut report = SyncReport {
		excluded,
		truncated: fetched.truncated,
		..Default::default()
	};

	let reconciler = Reconciler::new(store);
	for advisory in &advisories {
		let result = reconciler.reconcile(advisory);
		debug!(
			"{}: wrote {} file(s)",
			advisory.primary_id,
			result.written_paths().len()
		);
		for outcome in result.outcomes {
			report.record(outcome);
		}
		report.failed.extend(result.failures);
	}

	Ok(report)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::SyncError;
	use crate::utils::github_api::fake::{page, FakeTransport};
	use serde_json::Value;
	use tempfile::tempdir;

	fn node(package: &str, identifiers: Value, patched: Option<&str>) -> Value {
		json!({
			"package": {"name": package, "ecosystem": "RUBYGEMS"},
			"vulnerableVersionRange": ">= 1.0.0, < 1.5.0",
			"firstPatchedVersion": patched.map(|p| json!({"identifier": p})),
			"advisory": {
				"identifiers": identifiers,
				"summary": "Remote code execution",
				"description": "Crafted input runs code.",
				"severity": "CRITICAL",
				"cvss": {"score": 9.8, "vectorString": "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H"},
				"references": [
					{"url": "https://nvd.nist.gov/vuln/detail/CVE-2023-0001"},
					{"url": "https://github.com/advisories/GHSA-aaaa-bbbb-cccc"}
				],
				"publishedAt": "2023-01-10T12:00:00Z",
				"withdrawnAt": null
			}
		})
	}

	fn cve_2023() -> Value {
		json!([
			{"type": "GHSA", "value": "GHSA-aaaa-bbbb-cccc"},
			{"type": "CVE", "value": "CVE-2023-0001"}
		])
	}

	fn options(min_year: i32) -> SyncOptions {
		SyncOptions {
			min_year,
			gem_name: None,
			page_size: 100,
			max_pages: 10,
		}
	}

	fn two_pages() -> FakeTransport {
		FakeTransport::pages(vec![
			page(vec![node("foo", cve_2023(), Some("1.5.0"))], Some("cursor-1")),
			page(vec![node("bar", cve_2023(), None)], None),
		])
	}

	#[tokio::test]
	async fn test_same_advisory_across_pages_writes_each_package() {
		let dir = tempdir().unwrap();
		let store = RecordStore::new(dir.path());

		let report = run(&two_pages(), &store, &options(2000)).await.unwrap();

		assert_eq!(report.created.len(), 2);
		assert!(report.failed.is_empty());
		assert!(dir.path().join("gems/foo/CVE-2023-0001.yml").exists());
		assert!(dir.path().join("gems/bar/CVE-2023-0001.yml").exists());
		assert!(report.summary(2000).contains("Created 2 file(s)"));
	}

	#[tokio::test]
	async fn test_second_run_writes_nothing() {
		let dir = tempdir().unwrap();
		let store = RecordStore::new(dir.path());

		run(&two_pages(), &store, &options(2000)).await.unwrap();
		let report = run(&two_pages(), &store, &options(2000)).await.unwrap();

		assert!(report.nothing_written());
		assert_eq!(report.unchanged, 2);
		assert!(report
			.summary(2000)
			.contains("Nothing to sync today! All CVEs starting from 2000 are already present"));
	}

	#[tokio::test]
	async fn test_ghsa_only_advisory_file_name() {
		let dir = tempdir().unwrap();
		let store = RecordStore::new(dir.path());
		let transport = FakeTransport::pages(vec![page(
			vec![node("baz", json!([{"type": "GHSA", "value": "GHSA-aaaa-bbbb-cccc"}]), None)],
			None,
		)]);

		let report = run(&transport, &store, &options(2024)).await.unwrap();
		let path = dir.path().join("gems/baz/GHSA-aaaa-bbbb-cccc.yml");
		assert_eq!(report.created, vec![path.clone()]);

		let record = store.load(&path).unwrap().unwrap();
		assert_eq!(record.ghsa.as_deref(), Some("aaaa-bbbb-cccc"));
		assert_eq!(record.cve, None);
	}

	#[tokio::test]
	async fn test_old_cves_filtered_out() {
		let dir = tempdir().unwrap();
		let store = RecordStore::new(dir.path());

		let report = run(&two_pages(), &store, &options(2024)).await.unwrap();
		assert!(report.nothing_written());
		assert!(!dir.path().join("gems").exists());
	}

	#[tokio::test]
	async fn test_gem_filter_is_sent_upstream() {
		let dir = tempdir().unwrap();
		let store = RecordStore::new(dir.path());
		let transport = FakeTransport::pages(vec![page(vec![], None)]);
		let opts = SyncOptions {
			gem_name: Some("rack".to_string()),
			..options(2000)
		};

		run(&transport, &store, &opts).await.unwrap();
		let requests = transport.requests.lock().unwrap();
		assert_eq!(requests[0]["variables"]["gem_name"], json!("rack"));
	}

	#[tokio::test]
	async fn test_api_error_aborts_before_any_write() {
		let dir = tempdir().unwrap();
		let store = RecordStore::new(dir.path());
		let transport = FakeTransport::pages(vec![
			page(vec![node("foo", cve_2023(), None)], Some("cursor-1")),
			json!({"errors": [{"message": "rate limited"}]}),
		]);

		let result = run(&transport, &store, &options(2000)).await;
		assert!(matches!(result, Err(SyncError::Api(_))));
		assert!(!dir.path().join("gems").exists());
	}
}

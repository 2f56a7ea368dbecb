// src/models/advisory.rs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier entry as returned in `advisory.identifiers`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawIdentifier {
	#[serde(rename = "type")]
	pub kind: String,
	pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawCvss {
	pub score: Option<f64>,
	#[serde(rename = "vectorString")]
	pub vector_string: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawReference {
	pub url: String,
}

/// The `advisory` object attached to each vulnerability node.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAdvisory {
	#[serde(default)]
	pub identifiers: Vec<RawIdentifier>,
	#[serde(default)]
	pub summary: String,
	#[serde(default)]
	pub description: String,
	pub cvss: Option<RawCvss>,
	#[serde(default)]
	pub references: Vec<RawReference>,
	pub published_at: Option<DateTime<Utc>>,
	pub withdrawn_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPackage {
	pub name: String,
	pub ecosystem: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPatchedVersion {
	pub identifier: String,
}

/// One node of the `securityVulnerabilities` connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawVulnerabilityNode {
	pub package: RawPackage,
	#[serde(default)]
	pub vulnerable_version_range: String,
	pub first_patched_version: Option<RawPatchedVersion>,
	pub advisory: RawAdvisory,
}

/// One (package, version range) association within an advisory.
#[derive(Debug, Clone, PartialEq)]
pub struct VulnerabilityEntry {
	pub package_name: String,
	pub ecosystem: String,
	pub vulnerable_range: String,
	pub first_patched_version: Option<String>,
	/// Untouched upstream node minus its `advisory` key.
	pub raw: serde_json::Value,
}

/// An upstream advisory with every vulnerability entry seen for it.
#[derive(Debug, Clone)]
pub struct Advisory {
	pub primary_id: String,
	pub cve_id: Option<String>,
	pub secondary_id: Option<String>,
	pub published_at: Option<NaiveDate>,
	pub withdrawn: bool,
	pub summary: String,
	pub description: String,
	pub severity_score: Option<f64>,
	pub references: Vec<String>,
	pub vulnerabilities: Vec<VulnerabilityEntry>,
	/// Untouched upstream `advisory` object, kept for the reviewer block.
	pub raw: serde_json::Value,
}

impl RawAdvisory {
	fn identifier(&self, kind: &str) -> Option<&str> {
		self.identifiers
			.iter()
			.find(|id| id.kind == kind)
			.map(|id| id.value.as_str())
	}

	pub fn cve_id(&self) -> Option<&str> {
		self.identifier("CVE")
	}

	pub fn ghsa_id(&self) -> Option<&str> {
		self.identifier("GHSA")
	}

	/// CVE id when assigned, otherwise the GHSA id.
	pub fn primary_id(&self) -> Option<&str> {
		self.cve_id().or_else(|| self.ghsa_id())
	}

	pub fn is_withdrawn(&self) -> bool {
		self.withdrawn_at.is_some()
	}

	/// The score only counts when upstream also supplied a vector.
	pub fn cvss_score(&self) -> Option<f64> {
		self.cvss
			.as_ref()
			.filter(|c| c.vector_string.is_some())
			.and_then(|c| c.score)
	}
}

impl Advisory {
	/// Builds an advisory from the scalar fields of its first node.
	pub fn new(primary_id: String, raw: &RawAdvisory, raw_json: serde_json::Value) -> Self {
		Self {
			primary_id,
			cve_id: raw.cve_id().map(str::to_string),
			secondary_id: raw.ghsa_id().map(str::to_string),
			published_at: raw.published_at.map(|d| d.date_naive()),
			withdrawn: raw.is_withdrawn(),
			summary: raw.summary.clone(),
			description: raw.description.clone(),
			severity_score: raw.cvss_score(),
			references: raw.references.iter().map(|r| r.url.clone()).collect(),
			vulnerabilities: Vec::new(),
			raw: raw_json,
		}
	}

	/// Distinct package names in order of first appearance.
	pub fn package_names(&self) -> Vec<&str> {
		let mut names: Vec<&str> = Vec::new();
		for entry in &self.vulnerabilities {
			if !names.contains(&entry.package_name.as_str()) {
				names.push(&entry.package_name);
			}
		}
		names
	}

	/// Upstream advisory data plus its vulnerabilities, for human review.
	pub fn raw_source(&self) -> serde_json::Value {
		let mut source = self.raw.clone();
		if let serde_json::Value::Object(ref mut map) = source {
			map.insert(
				"vulnerabilities".to_string(),
				serde_json::Value::Array(self.vulnerabilities.iter().map(|v| v.raw.clone()).collect()),
			);
		}
		source
	}
}

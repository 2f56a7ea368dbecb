// src/models/package_record.rs

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A CVSS value, or the placeholder text left for a reviewer to fill in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Score {
	Value(f64),
	Placeholder(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Related {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub cve: Option<Vec<String>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub ghsa: Option<Vec<String>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub osvdb: Option<Vec<u64>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub url: Option<Vec<String>>,
}

/// One persisted advisory for one package.
///
/// Field declaration order is the serialization order and follows the
/// canonical key order of `utils::schema::GEM_SCHEMA`. Unknown keys are
/// rejected rather than silently dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackageRecord {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub gem: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub library: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub framework: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub platform: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub cve: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub osvdb: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub ghsa: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub date: Option<NaiveDate>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub cvss_v2: Option<Score>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub cvss_v3: Option<Score>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub unaffected_versions: Option<Vec<String>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub patched_versions: Option<Vec<String>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub related: Option<Related>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub notes: Option<String>,
}

macro_rules! prefer_saved {
	($saved:expr, $derived:expr, $($field:ident),+ $(,)?) => {
		PackageRecord {
			$($field: $saved.$field.clone().or_else(|| $derived.$field.clone()),)+
		}
	};
}

impl PackageRecord {
	/// Field-by-field merge in which every value already present in `saved`
	/// wins over the freshly derived one.
	pub fn merged_with(saved: &PackageRecord, derived: &PackageRecord) -> PackageRecord {
		prefer_saved!(
			saved,
			derived,
			gem,
			library,
			framework,
			platform,
			cve,
			osvdb,
			ghsa,
			url,
			title,
			date,
			description,
			cvss_v2,
			cvss_v3,
			unaffected_versions,
			patched_versions,
			related,
			notes,
		)
	}

	pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
		serde_yaml::to_string(self)
	}
}

// src/sync/filter.rs

use crate::error::{SyncError, SyncResult};
use crate::models::advisory::Advisory;
use lazy_static::lazy_static;
use log::warn;
use regex::Regex;

lazy_static! {
	static ref CVE_PATTERN: Regex = Regex::new(r"^CVE-(\d{4})-(\d{4,})$").unwrap();
}

/// Year embedded in a `CVE-YYYY-NNNN` identifier.
pub fn cve_year(cve_id: &str) -> SyncResult<i32> {
	let captures = CVE_PATTERN
		.captures(cve_id)
		.ok_or_else(|| SyncError::MalformedIdentifier(cve_id.to_string()))?;

	captures[1]
		.parse::<i32>()
		.map_err(|_| SyncError::MalformedIdentifier(cve_id.to_string()))
}

/// Whether the advisory's CVE is from `min_year` or later.
///
/// Advisories without a CVE always pass.
pub fn cve_after_year(advisory: &Advisory, min_year: i32) -> SyncResult<bool> {
	match advisory.cve_id.as_deref() {
		None => Ok(true),
		Some(cve_id) => Ok(cve_year(cve_id)? >= min_year),
	}
}

/// Keeps the advisories that are not withdrawn and pass [`cve_after_year`].
///
/// A malformed CVE excludes only that advisory. Returns the survivors and
/// the number excluded as malformed.
pub fn retain_recent(advisories: Vec<Advisory>, min_year: i32) -> (Vec<Advisory>, usize) {
	let mut malformed = 0;
	let recent = advisories
		.into_iter()
		.filter(|advisory| !advisory.withdrawn)
		.filter(|advisory| match cve_after_year(advisory, min_year) {
			Ok(keep) => keep,
			Err(e) => {
				warn!("Excluding advisory {}: {}", advisory.primary_id, e);
				malformed += 1;
				false
			}
		})
		.collect();

	(recent, malformed)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn advisory(cve_id: Option<&str>) -> Advisory {
		Advisory {
			primary_id: cve_id.unwrap_or("GHSA-aaaa-bbbb-cccc").to_string(),
			cve_id: cve_id.map(str::to_string),
			secondary_id: Some("GHSA-aaaa-bbbb-cccc".to_string()),
			published_at: None,
			withdrawn: false,
			summary: String::new(),
			description: String::new(),
			severity_score: None,
			references: Vec::new(),
			vulnerabilities: Vec::new(),
			raw: serde_json::Value::Null,
		}
	}

	#[test]
	fn test_without_cve_always_passes() {
		for year in [0, 2000, 2024, 9999] {
			assert!(cve_after_year(&advisory(None), year).unwrap());
		}
	}

	#[test]
	fn test_year_cutoff() {
		let a = advisory(Some("CVE-2019-12345"));
		assert!(cve_after_year(&a, 2018).unwrap());
		assert!(cve_after_year(&a, 2019).unwrap());
		assert!(!cve_after_year(&a, 2020).unwrap());
	}

	#[test]
	fn test_malformed_cve() {
		assert!(matches!(cve_year("CVE-19-0001"), Err(SyncError::MalformedIdentifier(_))));
		assert!(matches!(cve_year("CVE-2019-ABCD"), Err(SyncError::MalformedIdentifier(_))));
		assert!(cve_after_year(&advisory(Some("cve 2019")), 2000).is_err());
	}

	#[test]
	fn test_retain_recent_excludes_malformed_without_aborting() {
		let advisories = vec![
			advisory(Some("CVE-2021-0001")),
			advisory(Some("CVE-2005-0001")),
			advisory(Some("CVE-BAD")),
			advisory(None),
		];
		let (kept, malformed) = retain_recent(advisories, 2010);
		assert_eq!(kept.len(), 2);
		assert_eq!(malformed, 1);
		let ids: Vec<&str> = kept.iter().map(|a| a.primary_id.as_str()).collect();
		assert_eq!(ids, vec!["CVE-2021-0001", "GHSA-aaaa-bbbb-cccc"]);
	}

	#[test]
	fn test_withdrawn_is_dropped() {
		let mut withdrawn = advisory(Some("CVE-2023-0001"));
		withdrawn.withdrawn = true;
		let (kept, malformed) = retain_recent(vec![withdrawn, advisory(Some("CVE-2023-0002"))], 2000);
		assert_eq!(malformed, 0);
		assert_eq!(kept.len(), 1);
		assert_eq!(kept[0].primary_id, "CVE-2023-0002");
	}
}

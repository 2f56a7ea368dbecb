// src/sync/aggregator.rs

use crate::error::{SyncError, SyncResult};
use crate::models::advisory::{Advisory, RawVulnerabilityNode, VulnerabilityEntry};
use log::{debug, info, warn};
use std::collections::HashMap;

/// Advisories merged from raw vulnerability nodes, in first-seen order.
#[derive(Debug, Default)]
pub struct Aggregation {
	pub advisories: Vec<Advisory>,
	pub withdrawn: usize,
	pub unidentified: usize,
}

/// Groups vulnerability nodes by their advisory's primary id.
///
/// The first node seen for an id supplies the advisory's scalar fields;
/// every node, first or repeat, appends its vulnerability entry. Withdrawn
/// advisories are dropped before merging.
pub fn aggregate(nodes: Vec<serde_json::Value>) -> SyncResult<Aggregation> {
	let mut aggregation = Aggregation::default();
	let mut index: HashMap<String, usize> = HashMap::new();

	for mut node in nodes {
		let parsed: RawVulnerabilityNode = serde_json::from_value(node.clone())
			.map_err(|e| SyncError::Decode(format!("vulnerability node: {}", e)))?;

		if parsed.advisory.is_withdrawn() {
			debug!("Skipping withdrawn advisory {:?}", parsed.advisory.primary_id());
			aggregation.withdrawn += 1;
			continue;
		}

		let Some(primary_id) = parsed.advisory.primary_id().map(str::to_string) else {
			warn!(
				"{}",
				SyncError::MalformedIdentifier(format!(
					"advisory for {} has neither a CVE nor a GHSA id",
					parsed.package.name
				))
			);
			aggregation.unidentified += 1;
			continue;
		};

		let raw_advisory = match node.as_object_mut() {
			Some(map) => map.remove("advisory").unwrap_or_default(),
			None => serde_json::Value::Null,
		};

		let position = match index.get(&primary_id) {
			Some(&position) => position,
			None => {
				aggregation
					.advisories
					.push(Advisory::new(primary_id.clone(), &parsed.advisory, raw_advisory));
				let position = aggregation.advisories.len() - 1;
				index.insert(primary_id, position);
				position
			}
		};

		aggregation.advisories[position].vulnerabilities.push(VulnerabilityEntry {
			package_name: parsed.package.name,
			ecosystem: parsed.package.ecosystem,
			vulnerable_range: parsed.vulnerable_version_range,
			first_patched_version: parsed.first_patched_version.map(|v| v.identifier),
			raw: node,
		});
	}

	info!(
		"Aggregated {} advisories ({} withdrawn, {} without identifiers)",
		aggregation.advisories.len(),
		aggregation.withdrawn,
		aggregation.unidentified
	);

	Ok(aggregation)
}

// src/sync/versions.rs

use crate::models::advisory::Advisory;
use std::cmp::Ordering;

/// A dotted version compared segment by segment.
///
/// Numeric segments compare numerically, alphabetic segments count as
/// pre-release markers and sort below any number, and missing trailing
/// segments count as zero, so `1.0 == 1.0.0` and `1.0.rc1 < 1.0`.
#[derive(Debug, Clone)]
pub struct GemVersion {
	raw: String,
	segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
	Number(u64),
	Text(String),
}

impl GemVersion {
	pub fn parse(raw: &str) -> Self {
		let mut segments = Vec::new();
		for part in raw.trim().split(['.', '-']) {
			// "1rc2" splits into 1, "rc", 2
			let mut current = String::new();
			let mut current_is_digit = None;
			for c in part.chars() {
				let is_digit = c.is_ascii_digit();
				if current_is_digit.is_some_and(|d| d != is_digit) {
					segments.push(Segment::new(&current));
					current.clear();
				}
				current_is_digit = Some(is_digit);
				current.push(c);
			}
			if !current.is_empty() {
				segments.push(Segment::new(&current));
			}
		}

		Self {
			raw: raw.trim().to_string(),
			segments,
		}
	}

	pub fn as_str(&self) -> &str {
		&self.raw
	}
}

impl Segment {
	fn new(s: &str) -> Self {
		match s.parse::<u64>() {
			Ok(n) => Segment::Number(n),
			Err(_) => Segment::Text(s.to_string()),
		}
	}
}

impl Ord for GemVersion {
	fn cmp(&self, other: &Self) -> Ordering {
		let len = self.segments.len().max(other.segments.len());
		let zero = Segment::Number(0);
		for i in 0..len {
			let a = self.segments.get(i).unwrap_or(&zero);
			let b = other.segments.get(i).unwrap_or(&zero);
			let ord = match (a, b) {
				(Segment::Number(x), Segment::Number(y)) => x.cmp(y),
				(Segment::Text(x), Segment::Text(y)) => x.cmp(y),
				(Segment::Number(_), Segment::Text(_)) => Ordering::Greater,
				(Segment::Text(_), Segment::Number(_)) => Ordering::Less,
			};
			if ord != Ordering::Equal {
				return ord;
			}
		}
		Ordering::Equal
	}
}

impl PartialOrd for GemVersion {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl PartialEq for GemVersion {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == Ordering::Equal
	}
}

impl Eq for GemVersion {}

/// Distinct first-patched versions of `package_name`, lowest first.
pub fn first_patched_versions_for(advisory: &Advisory, package_name: &str) -> Vec<GemVersion> {
	let mut versions: Vec<GemVersion> = Vec::new();
	for entry in advisory.vulnerabilities.iter().filter(|v| v.package_name == package_name) {
		if let Some(identifier) = entry.first_patched_version.as_deref() {
			let version = GemVersion::parse(identifier);
			if !versions.contains(&version) {
				versions.push(version);
			}
		}
	}
	versions.sort();
	versions
}

/// Best-effort `patched_versions` constraints for one package.
///
/// Every patched version but the highest becomes a `~>` constraint and the
/// highest becomes an open `>=` bound. Empty when nothing is patched.
pub fn patched_versions_for(advisory: &Advisory, package_name: &str) -> Vec<String> {
	let versions = first_patched_versions_for(advisory, package_name);
	let Some((last, rest)) = versions.split_last() else {
		return Vec::new();
	};

	let mut constraints: Vec<String> = rest.iter().map(|v| format!("~> {}", v.as_str())).collect();
	constraints.push(format!(">= {}", last.as_str()));
	constraints
}

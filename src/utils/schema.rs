// src/utils/schema.rs

use crate::error::{SyncError, SyncResult};
use crate::sync::versions::GemVersion;
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};

lazy_static! {
	static ref REQUIREMENT: Regex =
		Regex::new(r"^\s*(=|!=|>=|<=|>|<|~>)?\s*(\d+(\.[0-9A-Za-z]+)*)\s*$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
	Text,
	Integer,
	Float,
	Date,
	TextList,
	Related,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
	pub name: &'static str,
	pub shape: Shape,
	pub required: bool,
}

const fn field(name: &'static str, shape: Shape, required: bool) -> FieldSpec {
	FieldSpec { name, shape, required }
}

/// Shape of a committed gem advisory record.
pub const GEM_SCHEMA: &[FieldSpec] = &[
	field("gem", Shape::Text, true),
	field("library", Shape::Text, false),
	field("framework", Shape::Text, false),
	field("platform", Shape::Text, false),
	field("cve", Shape::Text, false),
	field("osvdb", Shape::Integer, false),
	field("ghsa", Shape::Text, false),
	field("url", Shape::Text, true),
	field("title", Shape::Text, true),
	field("date", Shape::Date, true),
	field("description", Shape::Text, true),
	field("cvss_v2", Shape::Float, false),
	field("cvss_v3", Shape::Float, false),
	field("unaffected_versions", Shape::TextList, false),
	field("patched_versions", Shape::TextList, false),
	field("related", Shape::Related, false),
	field("notes", Shape::Text, false),
];

const RELATED_SCHEMA: &[FieldSpec] = &[
	field("cve", Shape::TextList, false),
	field("ghsa", Shape::TextList, false),
	field("osvdb", Shape::TextList, false),
	field("url", Shape::TextList, false),
];

#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
	pub path: PathBuf,
	pub message: String,
}

fn shape_matches(value: &Value, shape: Shape) -> bool {
	match shape {
		Shape::Text => value.as_str().is_some_and(|s| !s.trim().is_empty()),
		Shape::Integer => value.is_u64() || value.is_i64(),
		Shape::Float => value.is_number(),
		Shape::Date => value
			.as_str()
			.is_some_and(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()),
		// osvdb ids inside `related` are numbers, everything else strings
		Shape::TextList => value
			.as_sequence()
			.is_some_and(|items| items.iter().all(|i| i.is_string() || i.is_number())),
		Shape::Related => value.is_mapping(),
	}
}

/// Checks key presence, unknown keys and value shapes of one mapping.
pub fn check_shape(document: &Value, schema: &[FieldSpec]) -> Vec<String> {
	let Some(mapping) = document.as_mapping() else {
		return vec!["document is not a mapping".to_string()];
	};

	let mut problems = Vec::new();
	for (key, _) in mapping {
		let known = key
			.as_str()
			.is_some_and(|k| schema.iter().any(|spec| spec.name == k));
		if !known {
			problems.push(format!("unknown key {:?}", key));
		}
	}

	for spec in schema {
		match document.get(spec.name) {
			None | Some(Value::Null) => {
				if spec.required {
					problems.push(format!("missing required key '{}'", spec.name));
				}
			}
			Some(value) => {
				if !shape_matches(value, spec.shape) {
					problems.push(format!("'{}' is not a valid {:?}", spec.name, spec.shape));
				} else if spec.shape == Shape::Related {
					problems.extend(
						check_shape(value, RELATED_SCHEMA)
							.into_iter()
							.map(|p| format!("related: {}", p)),
					);
				}
			}
		}
	}

	problems
}

fn is_requirement(constraint: &str) -> bool {
	constraint.split(',').all(|part| REQUIREMENT.is_match(part))
}

fn requirement_version(constraint: &str) -> Option<GemVersion> {
	let first = constraint.split(',').next()?;
	REQUIREMENT
		.captures(first)
		.map(|c| GemVersion::parse(&c[2]))
}

fn text_list(document: &Value, key: &str) -> Vec<String> {
	document
		.get(key)
		.and_then(Value::as_sequence)
		.map(|items| items.iter().filter_map(|i| i.as_str().map(str::to_string)).collect())
		.unwrap_or_default()
}

/// Cross-field rules that a pure shape check cannot express.
fn check_consistency(document: &Value, path: &Path) -> Vec<String> {
	let mut problems = Vec::new();

	let has_id = ["cve", "osvdb", "ghsa"]
		.iter()
		.any(|k| document.get(*k).is_some_and(|v| !v.is_null()));
	if !has_id {
		problems.push("needs at least one of cve, osvdb or ghsa".to_string());
	}

	if let (Some(gem), Some(dir)) = (
		document.get("gem").and_then(Value::as_str),
		path.parent().and_then(|p| p.file_name()).and_then(|n| n.to_str()),
	) {
		if !gem.eq_ignore_ascii_case(dir) {
			problems.push(format!("gem '{}' does not match directory '{}'", gem, dir));
		}
	}

	let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
	for (prefix, key) in [("CVE-", "cve"), ("GHSA-", "ghsa"), ("OSVDB-", "osvdb")] {
		if let Some(id) = stem.strip_prefix(prefix) {
			let value = document.get(key).map(|v| match v {
				Value::Number(n) => n.to_string(),
				other => other.as_str().unwrap_or_default().to_string(),
			});
			if value.as_deref() != Some(id) {
				problems.push(format!("'{}' should be {} to match the file name", key, id));
			}
		}
	}

	for key in ["cvss_v2", "cvss_v3"] {
		if let Some(score) = document.get(key).and_then(Value::as_f64) {
			if !(0.0..=10.0).contains(&score) {
				problems.push(format!("'{}' must be within 0.0..=10.0", key));
			}
		}
	}

	let patched = text_list(document, "patched_versions");
	let unaffected = text_list(document, "unaffected_versions");
	for constraint in patched.iter().chain(unaffected.iter()) {
		if !is_requirement(constraint) {
			problems.push(format!("'{}' is not a valid version requirement", constraint));
		}
	}

	if !patched.is_empty() {
		let mut all: Vec<&String> = patched.iter().chain(unaffected.iter()).collect();
		all.sort_by_key(|c| requirement_version(c));
		if let Some(highest) = all.last() {
			let open = highest.trim_start().starts_with(">=") || highest.trim_start().starts_with("> ");
			if !open {
				problems.push(format!(
					"highest version constraint '{}' should be an open lower bound",
					highest
				));
			}
		}
	}

	problems
}

/// Validates one record file's text. Only the first YAML document counts.
pub fn validate_contents(path: &Path, contents: &str) -> Vec<Violation> {
	let document = serde_yaml::Deserializer::from_str(contents)
		.next()
		.map(Value::deserialize);

	let messages = match document {
		Some(Ok(document)) => {
			let mut messages = check_shape(&document, GEM_SCHEMA);
			messages.extend(check_consistency(&document, path));
			messages
		}
		Some(Err(e)) => vec![format!("invalid YAML: {}", e)],
		None => vec!["empty file".to_string()],
	};

	messages
		.into_iter()
		.map(|message| Violation {
			path: path.to_path_buf(),
			message,
		})
		.collect()
}

/// Validates every `<collection_dir>/<gem>/*.yml` file.
pub fn validate_tree(collection_dir: &Path) -> SyncResult<(usize, Vec<Violation>)> {
	let mut checked = 0;
	let mut violations = Vec::new();

	let mut gem_dirs: Vec<PathBuf> = fs::read_dir(collection_dir)
		.map_err(|e| SyncError::io(collection_dir, e))?
		.filter_map(|entry| entry.ok().map(|e| e.path()))
		.filter(|p| p.is_dir())
		.collect();
	gem_dirs.sort();

	for dir in gem_dirs {
		let mut files: Vec<PathBuf> = fs::read_dir(&dir)
			.map_err(|e| SyncError::io(&dir, e))?
			.filter_map(|entry| entry.ok().map(|e| e.path()))
			.filter(|p| p.extension().is_some_and(|ext| ext == "yml"))
			.collect();
		files.sort();

		for file in files {
			let contents = fs::read_to_string(&file).map_err(|e| SyncError::io(&file, e))?;
			violations.extend(validate_contents(&file, &contents));
			checked += 1;
		}
	}

	Ok((checked, violations))
}

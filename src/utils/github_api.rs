// src/utils/github_api.rs

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;
use serde_json::{json, Map, Value};

pub const GITHUB_API_URL: &str = "https://api.github.com/graphql";
const CLIENT_USER_AGENT: &str = "advisory-sync/0.1 rubysec advisory sync";

pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_MAX_PAGES: u32 = 1000;

/// Every Ruby gem vulnerability together with its GitHub advisory.
pub const RUBYGEM_VULNERABILITIES_QUERY: &str = r#"
query($first: Int, $after: String, $gem_name: String) {
  securityVulnerabilities(first: $first, after: $after, ecosystem: RUBYGEMS, package: $gem_name) {
    pageInfo {
      endCursor
      hasNextPage
      hasPreviousPage
      startCursor
    }
    nodes {
      package {
        name
        ecosystem
      }
      vulnerableVersionRange
      firstPatchedVersion {
        identifier
      }
      advisory {
        identifiers {
          type
          value
        }
        summary
        description
        severity
        cvss {
          score
          vectorString
        }
        references {
          url
        }
        publishedAt
        withdrawnAt
      }
    }
  }
}
"#;

/// Raw HTTP outcome of one GraphQL POST.
#[derive(Debug, Clone)]
pub struct TransportResponse {
	pub status: u16,
	pub url: String,
	pub body: String,
}

/// Sends one GraphQL request body and returns the raw response.
#[async_trait]
pub trait GraphQlTransport: Send + Sync {
	async fn post(&self, body: &Value) -> SyncResult<TransportResponse>;
}

pub struct GitHubApiClient {
	client: reqwest::Client,
	url: String,
}

impl GitHubApiClient {
	pub fn new(api_url: &str, token: &str) -> SyncResult<Self> {
		info!("Initializing GitHub API connection to URL: {}", api_url);

		let mut headers = HeaderMap::new();
		headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
		headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
		let mut auth = HeaderValue::from_str(&format!("token {}", token))
			.map_err(|_| SyncError::Config("GH_API_TOKEN contains invalid header characters".to_string()))?;
		auth.set_sensitive(true);
		headers.insert(AUTHORIZATION, auth);

		let client = reqwest::Client::builder().default_headers(headers).build()?;

		Ok(Self {
			client,
			url: api_url.to_string(),
		})
	}
}

#[async_trait]
impl GraphQlTransport for GitHubApiClient {
	async fn post(&self, body: &Value) -> SyncResult<TransportResponse> {
		let response = self.client.post(&self.url).json(body).send().await?;
		let status = response.status().as_u16();
		let url = response.url().to_string();
		let body = response.text().await?;

		Ok(TransportResponse { status, url, body })
	}
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorMessage {
	message: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlEnvelope {
	data: Option<Value>,
	errors: Option<Vec<GraphQlErrorMessage>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
	#[serde(default)]
	has_next_page: bool,
	end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Connection {
	page_info: PageInfo,
	#[serde(default)]
	nodes: Vec<Value>,
}

/// A named GraphQL query over one cursor-paginated connection.
#[derive(Debug, Clone, Copy)]
pub struct PagedQuery<'a> {
	pub name: &'a str,
	pub text: &'a str,
	/// Field under `data` holding `{pageInfo, nodes}`.
	pub collection: &'a str,
}

impl PagedQuery<'static> {
	pub fn rubygem_vulnerabilities() -> Self {
		Self {
			name: "RUBYGEM_VULNERABILITIES_WITH_GITHUB_ADVISORIES",
			text: RUBYGEM_VULNERABILITIES_QUERY,
			collection: "securityVulnerabilities",
		}
	}
}

/// Nodes gathered by [`Paginator::fetch_all`].
#[derive(Debug, Default)]
pub struct FetchedPages {
	pub nodes: Vec<Value>,
	pub pages: u32,
	/// True when the page ceiling was hit while upstream still had pages.
	pub truncated: bool,
}

/// Walks a cursor-paginated connection one page at a time.
pub struct Paginator<'t, T: GraphQlTransport + ?Sized> {
	transport: &'t T,
}

impl<'t, T: GraphQlTransport + ?Sized> Paginator<'t, T> {
	pub fn new(transport: &'t T) -> Self {
		Self { transport }
	}

	/// Runs one query and checks the response envelope.
	pub async fn query(&self, query: &PagedQuery<'_>, variables: &Map<String, Value>) -> SyncResult<Value> {
		debug!("Executing GraphQL request: {}. Request variables: {:?}", query.name, variables);

		let body = json!({ "query": query.text, "variables": variables });
		let response = self.transport.post(&body).await?;
		info!("Got response code: {}", response.status);

		if !(200..300).contains(&response.status) {
			return Err(SyncError::Transport {
				status: response.status,
				url: response.url,
				body: response.body,
			});
		}

		let envelope: GraphQlEnvelope = serde_json::from_str(&response.body)
			.map_err(|e| SyncError::Decode(format!("response body is not a GraphQL envelope: {}", e)))?;

		if let Some(errors) = envelope.errors.filter(|errors| !errors.is_empty()) {
			let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
			return Err(SyncError::Api(messages.join(", ")));
		}

		envelope
			.data
			.ok_or_else(|| SyncError::Decode("response has neither data nor errors".to_string()))
	}

	/// Fetches pages of `page_size` nodes until upstream reports no next page
	/// or `max_pages` requests have been made.
	///
	/// Any failed request aborts the whole fetch.
	pub async fn fetch_all(
		&self,
		query: &PagedQuery<'_>,
		initial_variables: Map<String, Value>,
		page_size: u32,
		max_pages: u32,
	) -> SyncResult<FetchedPages> {
		let mut variables = initial_variables;
		variables.insert("first".to_string(), json!(page_size));

		let mut fetched = FetchedPages::default();
		for page_num in 1..=max_pages {
			info!("Getting page {} of {}", page_num, query.collection);

			let data = self.query(query, &variables).await?;
			let connection_value = data
				.get(query.collection)
				.cloned()
				.ok_or_else(|| SyncError::Decode(format!("missing data.{}", query.collection)))?;
			let connection: Connection = serde_json::from_value(connection_value)
				.map_err(|e| SyncError::Decode(format!("data.{}: {}", query.collection, e)))?;

			fetched.pages = page_num;
			fetched.nodes.extend(connection.nodes);

			if !connection.page_info.has_next_page {
				break;
			}

			let cursor = connection.page_info.end_cursor.ok_or_else(|| {
				SyncError::Decode("hasNextPage is true but endCursor is missing".to_string())
			})?;
			variables.insert("after".to_string(), json!(cursor));

			if page_num == max_pages {
				fetched.truncated = true;
				warn!(
					"Stopped after {} pages while more were available; results may be incomplete",
					max_pages
				);
			}
		}

		info!("Retrieved {} nodes from {} page(s)", fetched.nodes.len(), fetched.pages);
		Ok(fetched)
	}
}

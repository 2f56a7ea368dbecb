pub mod github_api;
pub mod logger;
pub mod schema;

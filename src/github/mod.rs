// GitHub REST client.
// Org repository listing, latest commit and Actions run per repository, and gist reads/writes.

pub mod client;
pub mod endpoints;
pub mod types;

pub use client::{GITHUB_API_BASE, GitHubClient};
pub use types::*;

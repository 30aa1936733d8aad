//! GitHub REST client implementing the issue provider port.

pub mod client;

pub use client::GitHubClient;

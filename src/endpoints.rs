//! Discovery of the paid routes, for `GET /api/endpoints`.
//!
//! Each route has a directory under the routes dir holding a `route.json`
//! marker. The listing is `/api/<dir>` for each such directory, sorted.

use std::io;
use std::path::{Path, PathBuf};

/// Name of the file marking a directory as a route.
pub const ROUTE_MARKER: &str = "route.json";

/// Listed when the routes dir can not be read.
pub const FALLBACK_ENDPOINTS: [&str; 2] = ["/api/premium", "/api/twitter"];

#[derive(Debug, Clone)]
pub struct EndpointCatalog {
    dir: PathBuf,
}

impl EndpointCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Route paths found on disk, or [`FALLBACK_ENDPOINTS`] on a read error.
    pub async fn list(&self) -> Vec<String> {
        match self.scan().await {
            Ok(endpoints) => endpoints,
            Err(err) => {
                tracing::error!(
                    dir = %self.dir.display(),
                    error = %err,
                    "Error reading API endpoints"
                );
                FALLBACK_ENDPOINTS.iter().map(|e| e.to_string()).collect()
            }
        }
    }

    async fn scan(&self) -> io::Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut endpoints = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name == "endpoints" {
                continue;
            }
            if tokio::fs::try_exists(entry.path().join(ROUTE_MARKER)).await? {
                endpoints.push(format!("/api/{name}"));
            }
        }
        endpoints.sort();
        Ok(endpoints)
    }
}

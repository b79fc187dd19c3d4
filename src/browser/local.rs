//! Local filesystem browsing

use super::{BrowserError, BrowserResult, DataBrowser};
use crate::server::DataServerConfig;
use async_trait::async_trait;
use std::io::ErrorKind;

/// Browser for servers mounted on the local filesystem
pub struct LocalBrowser {
    server: DataServerConfig,
}

impl LocalBrowser {
    /// Create a local browser
    pub fn new(server: DataServerConfig) -> Self {
        Self { server }
    }
}

#[async_trait]
impl DataBrowser for LocalBrowser {
    fn server(&self) -> &DataServerConfig {
        &self.server
    }

    async fn list_files(&self, location: &str, extension: &str) -> BrowserResult<Vec<String>> {
        let io_error = |e: std::io::Error| BrowserError::Io {
            location: location.to_string(),
            message: e.to_string(),
        };

        let mut entries = match tokio::fs::read_dir(location).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(e)),
        };

        let suffix = format!(".{extension}");
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            let file_type = entry.file_type().await.map_err(io_error)?;
            if !file_type.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(&suffix) {
                files.push(entry.path().to_string_lossy().into_owned());
            }
        }

        files.sort();
        Ok(files)
    }
}

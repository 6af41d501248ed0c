//! Retrieval of the generated project archive.

use std::path::{Path, PathBuf};

use futures::StreamExt as _;
use tokio::io::AsyncWriteExt as _;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::errors::{ClientError, TransportError};
use crate::event::SessionResult;

/// Downloads finished archives through `POST /fetch-zip`.
pub struct ArtifactFetcher {
    client: reqwest::Client,
    config: ClientConfig,
}

impl ArtifactFetcher {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let client = config.http_client()?;
        Ok(Self { client, config })
    }

    /// Streams the archive for `result` into `target_dir` and returns the
    /// written file's path. The directory is created if missing.
    pub async fn download(
        &self,
        result: &SessionResult,
        target_dir: &Path,
    ) -> Result<PathBuf, ClientError> {
        let locator = result.artifact_locator.trim();
        if locator.is_empty() {
            return Err(ClientError::Validation(
                "artifact locator must not be empty".into(),
            ));
        }

        let url = self.config.fetch_zip_url();
        debug!(%url, locator, "requesting artifact");
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "zip_path": locator }))
            .send()
            .await
            .map_err(|e| TransportError::transport(format!("artifact request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            warn!(status = status.as_u16(), locator, "artifact request rejected");
            return Err(TransportError::rejected(
                status.as_u16(),
                format!("{status}: {}", body.trim()),
            )
            .into());
        }

        tokio::fs::create_dir_all(target_dir).await?;
        let path = target_dir.join(artifact_file_name(result));
        let partial = partial_path(&path);
        let written = match write_body(response, &partial).await {
            Ok(written) => written,
            Err(err) => {
                let _ = tokio::fs::remove_file(&partial).await;
                warn!(locator, error = %err, "artifact download aborted");
                return Err(err);
            }
        };

        if written == 0 {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(ClientError::Protocol(format!(
                "server returned an empty archive for `{locator}`"
            )));
        }
        if let Err(err) = tokio::fs::rename(&partial, &path).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(err.into());
        }
        info!(path = %path.display(), bytes = written, "artifact downloaded");
        Ok(path)
    }
}

/// Streams the response body into `path` and returns the byte count.
async fn write_body(response: reqwest::Response, path: &Path) -> Result<u64, ClientError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut body = response.bytes_stream();
    let mut written: u64 = 0;
    while let Some(chunk) = body.next().await {
        let chunk =
            chunk.map_err(|e| TransportError::transport(format!("artifact read failed: {e}")))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// Sibling path the archive is written to before it is complete.
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

/// Last path segment of the locator, or `<project>.zip` when it has none.
fn artifact_file_name(result: &SessionResult) -> String {
    let from_locator = result
        .artifact_locator
        .trim()
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty() && *name != "." && *name != "..");
    match from_locator {
        Some(name) => name.to_string(),
        None => {
            let project = result.project_name.trim();
            let project = if project.is_empty() { "project" } else { project };
            format!("{}.zip", project.replace(['/', '\\'], "_"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{HttpFixture, body_response};

    fn result(locator: &str, project: &str) -> SessionResult {
        SessionResult {
            artifact_locator: locator.to_string(),
            project_name: project.to_string(),
            raw: serde_json::json!({ "zip_path": locator, "repo_name": project }),
        }
    }

    #[test]
    fn file_name_comes_from_locator() {
        assert_eq!(artifact_file_name(&result("/tmp/demo.zip", "demo")), "demo.zip");
        assert_eq!(
            artifact_file_name(&result("C:\\out\\shop.zip", "shop")),
            "shop.zip"
        );
        assert_eq!(artifact_file_name(&result("/tmp/out/", "acme/shop")), "acme_shop.zip");
        assert_eq!(artifact_file_name(&result("..", "")), "project.zip");
    }

    #[tokio::test]
    async fn download_streams_archive_into_target_dir() {
        let fixture = HttpFixture::serve(body_response(
            "application/zip",
            [b"PK\x03\x04".to_vec(), b"rest-of-archive".to_vec()],
        ))
        .await;
        let fetcher = ArtifactFetcher::new(fixture.config()).expect("fetcher");
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("nested");

        let path = fetcher
            .download(&result("/tmp/demo.zip", "demo"), &target)
            .await
            .expect("downloaded");
        assert_eq!(path, target.join("demo.zip"));
        let bytes = tokio::fs::read(&path).await.expect("read archive");
        assert_eq!(bytes, b"PK\x03\x04rest-of-archive");

        let seen = fixture.request().await;
        assert!(seen.starts_with("POST /fetch-zip "));
        assert!(seen.contains("\"zip_path\":\"/tmp/demo.zip\""));
    }

    #[tokio::test]
    async fn download_maps_non_success_to_rejected() {
        let fixture = HttpFixture::serve(
            b"HTTP/1.1 404 Not Found\r\ncontent-type: application/json\r\ncontent-length: 28\r\nconnection: close\r\n\r\n{\"detail\":\"Zip not found\"}\r\n"
                .to_vec()
                .into(),
        )
        .await;
        let fetcher = ArtifactFetcher::new(fixture.config()).expect("fetcher");
        let dir = tempfile::tempdir().expect("tempdir");
        let err = fetcher
            .download(&result("/tmp/missing.zip", "missing"), dir.path())
            .await
            .expect_err("rejected");
        assert!(matches!(
            err,
            ClientError::Transport(TransportError::Rejected { status_code: 404, .. })
        ));
        assert!(!dir.path().join("missing.zip").exists());
    }

    #[tokio::test]
    async fn download_rejects_empty_locator_without_request() {
        let base = HttpFixture::unused_base_url().await;
        let fetcher =
            ArtifactFetcher::new(ClientConfig::new(base).without_system_proxy()).expect("fetcher");
        let dir = tempfile::tempdir().expect("tempdir");
        let err = fetcher
            .download(&result("  ", "demo"), dir.path())
            .await
            .expect_err("invalid");
        assert!(matches!(err, ClientError::Validation(_)));
    }

    #[tokio::test]
    async fn download_cut_short_leaves_no_file_behind() {
        let fixture = HttpFixture::serve(
            b"HTTP/1.1 200 OK\r\ncontent-type: application/zip\r\ncontent-length: 4096\r\nconnection: close\r\n\r\nPK\x03\x04truncated"
                .to_vec()
                .into(),
        )
        .await;
        let fetcher = ArtifactFetcher::new(fixture.config()).expect("fetcher");
        let dir = tempfile::tempdir().expect("tempdir");
        let err = fetcher
            .download(&result("/tmp/demo.zip", "demo"), dir.path())
            .await
            .expect_err("truncated body");
        assert!(matches!(
            err,
            ClientError::Transport(TransportError::Transport { .. })
        ));
        let leftovers = std::fs::read_dir(dir.path()).expect("read dir").count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn partial_path_is_a_sibling() {
        assert_eq!(
            partial_path(Path::new("/out/demo.zip")),
            PathBuf::from("/out/demo.zip.part")
        );
    }

    #[tokio::test]
    async fn download_rejects_empty_body() {
        let fixture = HttpFixture::serve(body_response("application/zip", Vec::<Vec<u8>>::new())).await;
        let fetcher = ArtifactFetcher::new(fixture.config()).expect("fetcher");
        let dir = tempfile::tempdir().expect("tempdir");
        let err = fetcher
            .download(&result("/tmp/empty.zip", "empty"), dir.path())
            .await
            .expect_err("empty");
        assert!(matches!(err, ClientError::Protocol(_)));
        assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 0);
    }
}

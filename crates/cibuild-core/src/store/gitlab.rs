//! GitLab generic package registry client.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::Deserialize;

use super::{RemoteStore, StoreEntry, StoreError};
use crate::env::GitLabConfig;

const PAGE_SIZE: &str = "100";

#[derive(Debug, Deserialize)]
struct GitLabPackage {
    id: u64,
    name: String,
    version: String,
}

/// Packages held in the generic package registry of a GitLab project.
#[derive(Debug, Clone)]
pub struct GitLabStore {
    client: Client,
    packages_url: Url,
    token: Option<String>,
}

impl GitLabStore {
    /// Create a client for `config.package_project` on `config.server`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: &GitLabConfig) -> Result<Self, StoreError> {
        let mut packages_url = Url::parse(&config.server)
            .map_err(|_| StoreError::InvalidUrl(config.server.clone()))?;
        packages_url
            .path_segments_mut()
            .map_err(|()| StoreError::InvalidUrl(config.server.clone()))?
            .pop_if_empty()
            // Pushed as one segment so the project path is sent as `group%2Fname`
            .extend(["api", "v4", "projects", config.package_project.as_str(), "packages"]);

        let client = Client::builder()
            .user_agent(crate::USER_AGENT)
            .gzip(config.compress_downloads)
            .deflate(config.compress_downloads)
            .build()?;

        Ok(Self {
            client,
            packages_url,
            token: config.token.clone(),
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.packages_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.header("PRIVATE-TOKEN", token),
            None => builder,
        }
    }

    fn generic_url(&self, name: &str, version: &str, file: &str) -> Url {
        self.url(&["generic", name, version, file])
    }
}

#[async_trait]
impl RemoteStore for GitLabStore {
    fn location(&self) -> String {
        self.packages_url.to_string()
    }

    async fn list(&self) -> Result<Vec<StoreEntry>, StoreError> {
        let mut listing = Vec::new();
        let mut page = "1".to_string();

        loop {
            let mut url = self.packages_url.clone();
            url.query_pairs_mut()
                .append_pair("per_page", PAGE_SIZE)
                .append_pair("page", &page);

            let resp = self
                .request(Method::GET, url)
                .send()
                .await?
                .error_for_status()?;
            let next = resp
                .headers()
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string);

            let packages: Vec<GitLabPackage> = resp.json().await?;
            tracing::debug!("Listed {} packages on page {page}", packages.len());
            listing.extend(packages.into_iter().map(|p| StoreEntry {
                name: p.name,
                version: p.version,
                handle: p.id.to_string(),
            }));

            match next {
                Some(next) => page = next,
                None => break,
            }
        }

        Ok(listing)
    }

    async fn download(&self, name: &str, version: &str, file: &str) -> Result<Vec<u8>, StoreError> {
        let resp = self
            .request(Method::GET, self.generic_url(name, version, file))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound {
                name: name.to_string(),
                version: version.to_string(),
                file: file.to_string(),
            });
        }
        Ok(resp.error_for_status()?.bytes().await?.to_vec())
    }

    async fn upload(
        &self,
        name: &str,
        version: &str,
        file: &str,
        content: Vec<u8>,
    ) -> Result<(), StoreError> {
        self.request(Method::PUT, self.generic_url(name, version, file))
            .body(content)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn delete(&self, entry: &StoreEntry) -> Result<(), StoreError> {
        self.request(Method::DELETE, self.url(&[entry.handle.as_str()]))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    const PACKAGES: &str = "/api/v4/projects/teams%2Fci-artifacts/packages";

    fn store(server: &Server, token: Option<&str>) -> GitLabStore {
        GitLabStore::new(&GitLabConfig {
            server: server.url(),
            token: token.map(str::to_string),
            package_project: "teams/ci-artifacts".to_string(),
            compress_downloads: false,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_list_follows_pagination() {
        let mut server = Server::new_async().await;

        let _page1 = server
            .mock("GET", PACKAGES)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("per_page".into(), "100".into()),
                Matcher::UrlEncoded("page".into(), "1".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header("x-next-page", "2")
            .with_body(r#"[{"id": 1, "name": "kio", "version": "master-10", "package_type": "generic"}]"#)
            .create_async()
            .await;
        let _page2 = server
            .mock("GET", PACKAGES)
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header("x-next-page", "")
            .with_body(r#"[{"id": 7, "name": "kio", "version": "5.3-20"}]"#)
            .create_async()
            .await;

        let listing = store(&server, None).list().await.unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[1].version, "5.3-20");
        assert_eq!(listing[1].handle, "7");
    }

    #[tokio::test]
    async fn test_download_and_missing_file() {
        let mut server = Server::new_async().await;
        let _found = server
            .mock("GET", format!("{PACKAGES}/generic/kio/master-10/metadata.json").as_str())
            .match_header("PRIVATE-TOKEN", "secret")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        let _missing = server
            .mock("GET", format!("{PACKAGES}/generic/kio/master-10/archive.tar").as_str())
            .with_status(404)
            .create_async()
            .await;

        let store = store(&server, Some("secret"));
        let bytes = store
            .download("kio", "master-10", "metadata.json")
            .await
            .unwrap();
        assert_eq!(bytes, b"{}");
        assert!(matches!(
            store.download("kio", "master-10", "archive.tar").await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_upload_and_delete() {
        let mut server = Server::new_async().await;
        let upload = server
            .mock("PUT", format!("{PACKAGES}/generic/kio/master-10/archive.tar").as_str())
            .match_header("PRIVATE-TOKEN", "secret")
            .match_body("payload")
            .with_status(201)
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", format!("{PACKAGES}/42").as_str())
            .with_status(204)
            .create_async()
            .await;

        let store = store(&server, Some("secret"));
        store
            .upload("kio", "master-10", "archive.tar", b"payload".to_vec())
            .await
            .unwrap();
        store
            .delete(&StoreEntry {
                name: "kio".into(),
                version: "master-10".into(),
                handle: "42".into(),
            })
            .await
            .unwrap();

        upload.assert_async().await;
        delete.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_propagates() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", Matcher::Any)
            .with_status(500)
            .create_async()
            .await;
        assert!(matches!(
            store(&server, None).list().await,
            Err(StoreError::Http(_))
        ));
    }
}

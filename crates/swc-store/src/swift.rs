//! Swift object store client over HTTP.
//!
//! # Design
//! - Authenticates once at construction; the token and storage URL are then
//!   immutable and shared by every worker through a cloned `reqwest::Client`.
//! - Object names are percent-encoded per `/`-separated segment so pseudo
//!   folders survive the round trip.
//! - Large uploads become static large objects: segments go to the segment
//!   container first, then a JSON manifest is written under the object name.

use std::collections::BTreeMap;
use std::io::SeekFrom;
use std::path::Path;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, ETAG, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Body, Client, Method, RequestBuilder, Response, StatusCode};
use swc_config::StoreCredentials;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use url::Url;

use crate::client::ObjectStore;
use crate::error::{StoreError, StoreResult};
use crate::model::{
    ListMode, ObjectEntry, ObjectHead, ObjectLayout, SloSegment, UploadOptions,
    segment_object_name,
};

const HEADER_AUTH_TOKEN: &str = "X-Auth-Token";
const HEADER_AUTH_USER: &str = "X-Auth-User";
const HEADER_AUTH_KEY: &str = "X-Auth-Key";
const HEADER_STORAGE_URL: &str = "X-Storage-Url";
const HEADER_SLO: &str = "X-Static-Large-Object";
const META_PREFIX: &str = "x-object-meta-";

/// Object store client speaking the Swift HTTP API.
#[derive(Clone)]
pub struct SwiftClient {
    http: Client,
    storage_url: Url,
    token: HeaderValue,
}

impl SwiftClient {
    /// Authenticate with `credentials` and build a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built, the auth endpoint
    /// rejects the credentials, or its response lacks a token or storage URL.
    pub async fn connect(credentials: &StoreCredentials) -> StoreResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("swc/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| StoreError::transport("build_client", source))?;

        match credentials {
            StoreCredentials::PreAuthorized { token, storage_url } => {
                Self::from_parts(http, storage_url.clone(), token)
            }
            StoreCredentials::TempAuth {
                auth_url,
                user,
                key,
            } => {
                let response = http
                    .get(auth_url.clone())
                    .header(HEADER_AUTH_USER, user)
                    .header(HEADER_AUTH_KEY, key)
                    .send()
                    .await
                    .map_err(|source| StoreError::transport("authenticate", source))?;
                if !response.status().is_success() {
                    return Err(StoreError::Authentication {
                        reason: "credentials rejected",
                    });
                }
                let headers = response.headers();
                let token = header_str(headers, HEADER_AUTH_TOKEN).ok_or(
                    StoreError::Authentication {
                        reason: "response missing auth token",
                    },
                )?;
                let storage_url = header_str(headers, HEADER_STORAGE_URL)
                    .and_then(|value| Url::parse(value).ok())
                    .ok_or(StoreError::Authentication {
                        reason: "response missing storage url",
                    })?;
                info!(storage_url = %storage_url, "authenticated with object store");
                Self::from_parts(http, storage_url, token)
            }
        }
    }

    fn from_parts(http: Client, storage_url: Url, token: &str) -> StoreResult<Self> {
        let token = HeaderValue::from_str(token).map_err(|_| StoreError::InvalidRequest {
            operation: "authenticate",
            reason: "token contains invalid characters",
        })?;
        Ok(Self {
            http,
            storage_url,
            token,
        })
    }

    fn container_url(&self, operation: &'static str, container: &str) -> StoreResult<Url> {
        self.url_for(operation, [container])
    }

    fn object_url(&self, operation: &'static str, container: &str, object: &str) -> StoreResult<Url> {
        self.url_for(operation, std::iter::once(container).chain(object.split('/')))
    }

    /// Storage URL extended by `segments`, each percent-encoded on its own.
    fn url_for<'a, I>(&self, operation: &'static str, segments: I) -> StoreResult<Url>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut url = self.storage_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| StoreError::InvalidRequest {
                operation,
                reason: "storage url cannot carry a path",
            })?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(HEADER_AUTH_TOKEN, self.token.clone())
    }

    async fn send(
        &self,
        operation: &'static str,
        builder: RequestBuilder,
        container: &str,
        object: Option<&str>,
    ) -> StoreResult<Response> {
        let response = builder
            .send()
            .await
            .map_err(|source| StoreError::transport(operation, source))?;
        check_status(operation, response, container, object)
    }

    async fn list_page(
        &self,
        container: &str,
        prefix: Option<&str>,
        marker: &str,
    ) -> StoreResult<Vec<ObjectEntry>> {
        let url = self.container_url("list", container)?;
        let mut query = vec![("format", "json"), ("marker", marker)];
        if let Some(prefix) = prefix {
            query.push(("prefix", prefix));
        }
        let response = self
            .send(
                "list",
                self.request(Method::GET, url).query(&query),
                container,
                None,
            )
            .await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        let body = response
            .bytes()
            .await
            .map_err(|source| StoreError::transport("list", source))?;
        if body.is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&body).map_err(|source| StoreError::Decode {
            operation: "list",
            source,
        })
    }

    async fn get_body(
        &self,
        operation: &'static str,
        container: &str,
        object: &str,
        manifest: bool,
    ) -> StoreResult<Bytes> {
        let url = self.object_url(operation, container, object)?;
        let mut builder = self.request(Method::GET, url);
        if manifest {
            builder = builder.query(&[("multipart-manifest", "get")]);
        }
        self.send(operation, builder, container, Some(object))
            .await?
            .bytes()
            .await
            .map_err(|source| StoreError::transport(operation, source))
    }

    async fn put_file_range(
        &self,
        container: &str,
        object: &str,
        path: &Path,
        range: (u64, u64),
        headers: &[(String, String)],
    ) -> StoreResult<Option<String>> {
        let (offset, length) = range;
        let mut file = File::open(path)
            .await
            .map_err(|source| StoreError::io("open_upload", path, source))?;
        if offset > 0 {
            file.seek(SeekFrom::Start(offset))
                .await
                .map_err(|source| StoreError::io("seek_upload", path, source))?;
        }
        let body = Body::wrap_stream(ReaderStream::new(file.take(length)));
        let url = self.object_url("upload", container, object)?;
        let builder = with_headers(
            self.request(Method::PUT, url)
                .header(CONTENT_LENGTH, length)
                .body(body),
            headers,
        )?;
        let response = self.send("upload", builder, container, Some(object)).await?;
        Ok(header_str(response.headers(), ETAG.as_str()).map(trim_etag))
    }

    async fn upload_segmented(
        &self,
        container: &str,
        object: &str,
        path: &Path,
        size: u64,
        mtime: &str,
        options: &UploadOptions,
    ) -> StoreResult<()> {
        self.ensure_container(&options.segment_container).await?;

        let mut segments = Vec::new();
        let mut offset = 0_u64;
        let mut index = 0_usize;
        while offset < size {
            let length = options.segment_size.min(size - offset);
            let name = segment_object_name(object, mtime, size, options.segment_size, index);
            let etag = self
                .put_file_range(
                    &options.segment_container,
                    &name,
                    path,
                    (offset, length),
                    &[],
                )
                .await?
                .unwrap_or_default();
            debug!(segment = %name, bytes = length, "uploaded segment");
            segments.push(SloSegment {
                path: format!("/{}/{name}", options.segment_container),
                etag,
                size_bytes: length,
            });
            offset += length;
            index += 1;
        }

        let manifest = serde_json::to_vec(&segments).map_err(|source| StoreError::Decode {
            operation: "upload_manifest",
            source,
        })?;
        let url = self.object_url("upload_manifest", container, object)?;
        let builder = with_headers(
            self.request(Method::PUT, url)
                .query(&[("multipart-manifest", "put")])
                .body(manifest),
            &options.headers,
        )?;
        self.send("upload_manifest", builder, container, Some(object))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for SwiftClient {
    async fn list(
        &self,
        container: &str,
        prefix: Option<&str>,
        mode: ListMode,
    ) -> StoreResult<Vec<ObjectEntry>> {
        let mut entries = self.list_page(container, prefix, "").await?;
        if mode == ListMode::FirstPage {
            return Ok(entries);
        }
        loop {
            let Some(marker) = entries.last().map(|entry| entry.name.clone()) else {
                break;
            };
            let page = self.list_page(container, prefix, &marker).await?;
            if page.is_empty() {
                break;
            }
            entries.extend(page);
        }
        Ok(entries)
    }

    async fn head(&self, container: &str, object: &str) -> StoreResult<ObjectHead> {
        let url = self.object_url("head", container, object)?;
        let response = self
            .send(
                "head",
                self.request(Method::HEAD, url),
                container,
                Some(object),
            )
            .await?;
        Ok(parse_head(response.headers()))
    }

    async fn get(&self, container: &str, object: &str) -> StoreResult<Bytes> {
        self.get_body("get", container, object, false).await
    }

    async fn get_manifest(&self, container: &str, object: &str) -> StoreResult<Bytes> {
        self.get_body("get_manifest", container, object, true).await
    }

    async fn download_to(&self, container: &str, object: &str, path: &Path) -> StoreResult<u64> {
        let url = self.object_url("download", container, object)?;
        let response = self
            .send(
                "download",
                self.request(Method::GET, url),
                container,
                Some(object),
            )
            .await?;

        let mut file = File::create(path)
            .await
            .map_err(|source| StoreError::io("create_download", path, source))?;
        let mut written = 0_u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| StoreError::transport("download", source))?;
            file.write_all(&chunk)
                .await
                .map_err(|source| StoreError::io("write_download", path, source))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|source| StoreError::io("flush_download", path, source))?;
        Ok(written)
    }

    async fn upload_file(
        &self,
        container: &str,
        object: &str,
        path: &Path,
        options: &UploadOptions,
    ) -> StoreResult<u64> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|source| StoreError::io("stat_upload", path, source))?;
        let size = metadata.len();

        if options.segment_size > 0 && size > options.segment_size {
            let mtime = metadata
                .modified()
                .ok()
                .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
                .map(|elapsed| format!("{}.{:06}", elapsed.as_secs(), elapsed.subsec_micros()))
                .unwrap_or_else(|| "0.000000".to_string());
            self.upload_segmented(container, object, path, size, &mtime, options)
                .await?;
        } else {
            self.put_file_range(container, object, path, (0, size), &options.headers)
                .await?;
        }
        info!(container, object, bytes = size, "uploaded object");
        Ok(size)
    }

    async fn delete_object(&self, container: &str, object: &str) -> StoreResult<()> {
        let url = self.object_url("delete_object", container, object)?;
        self.send(
            "delete_object",
            self.request(Method::DELETE, url),
            container,
            Some(object),
        )
        .await?;
        Ok(())
    }

    async fn delete_container(&self, container: &str) -> StoreResult<()> {
        let url = self.container_url("delete_container", container)?;
        self.send(
            "delete_container",
            self.request(Method::DELETE, url),
            container,
            None,
        )
        .await?;
        Ok(())
    }

    async fn ensure_container(&self, container: &str) -> StoreResult<()> {
        let url = self.container_url("ensure_container", container)?;
        self.send(
            "ensure_container",
            self.request(Method::PUT, url),
            container,
            None,
        )
        .await?;
        Ok(())
    }

    async fn post_container(
        &self,
        container: &str,
        headers: &[(String, String)],
    ) -> StoreResult<()> {
        let url = self.container_url("post_container", container)?;
        let builder = with_headers(self.request(Method::POST, url), headers)?;
        self.send("post_container", builder, container, None)
            .await?;
        Ok(())
    }
}

fn check_status(
    operation: &'static str,
    response: Response,
    container: &str,
    object: Option<&str>,
) -> StoreResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(StoreError::NotFound {
            container: container.to_string(),
            object: object.map(ToString::to_string),
        });
    }
    Err(StoreError::Status {
        operation,
        container: container.to_string(),
        object: object.map(ToString::to_string),
        status: status.as_u16(),
    })
}

fn with_headers(
    mut builder: RequestBuilder,
    headers: &[(String, String)],
) -> StoreResult<RequestBuilder> {
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            StoreError::InvalidRequest {
                operation: "headers",
                reason: "invalid header name",
            }
        })?;
        let value = HeaderValue::from_str(value).map_err(|_| StoreError::InvalidRequest {
            operation: "headers",
            reason: "invalid header value",
        })?;
        builder = builder.header(name, value);
    }
    Ok(builder)
}

fn parse_head(headers: &HeaderMap) -> ObjectHead {
    let layout = if header_str(headers, HEADER_SLO).is_some_and(|v| v.eq_ignore_ascii_case("true"))
    {
        ObjectLayout::Segmented
    } else {
        ObjectLayout::Single
    };
    let metadata: BTreeMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            let key = name.as_str().strip_prefix(META_PREFIX)?;
            Some((key.to_string(), value.to_str().ok()?.to_string()))
        })
        .collect();
    ObjectHead {
        content_length: header_str(headers, CONTENT_LENGTH.as_str())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        etag: header_str(headers, ETAG.as_str()).map(trim_etag),
        layout,
        metadata,
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn trim_etag(value: &str) -> String {
    value.trim_matches('"').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use httpmock::MockServer;
    use httpmock::prelude::*;
    use httpmock::Method::HEAD;
    use serde_json::json;
    use tempfile::TempDir;

    async fn client_for(server: &MockServer) -> Result<SwiftClient> {
        let creds = StoreCredentials::PreAuthorized {
            token: "tk".to_string(),
            storage_url: Url::parse(&format!("{}/v1/AUTH_test", server.base_url()))?,
        };
        Ok(SwiftClient::connect(&creds).await?)
    }

    fn options(segment_size: u64) -> UploadOptions {
        UploadOptions {
            segment_size,
            segment_container: ".segments_c".to_string(),
            headers: vec![("X-Object-Meta-Uploaded-by".to_string(), "alice".to_string())],
        }
    }

    #[test]
    fn object_urls_escape_each_segment() -> Result<()> {
        let client = SwiftClient::from_parts(
            Client::new(),
            Url::parse("https://swift.example/v1/AUTH_a/")?,
            "tk",
        )?;
        assert_eq!(
            client.object_url("head", "c", "dir/a b#c/é")?.as_str(),
            "https://swift.example/v1/AUTH_a/c/dir/a%20b%23c/%C3%A9"
        );
        assert_eq!(
            client.object_url("head", "c", "backup/data.root.tar.gz")?.as_str(),
            "https://swift.example/v1/AUTH_a/c/backup/data.root.tar.gz"
        );
        assert_eq!(
            client.object_url("head", "c", "50%?x")?.as_str(),
            "https://swift.example/v1/AUTH_a/c/50%25%3Fx"
        );
        assert_eq!(
            client.container_url("list", ".segments_c")?.as_str(),
            "https://swift.example/v1/AUTH_a/.segments_c"
        );
        Ok(())
    }

    #[tokio::test]
    async fn temp_auth_exchanges_credentials_for_token() -> Result<()> {
        let server = MockServer::start_async().await;
        let auth = server.mock(|when, then| {
            when.method(GET)
                .path("/auth/v1.0")
                .header("X-Auth-User", "acct:user")
                .header("X-Auth-Key", "secret");
            then.status(200)
                .header("X-Auth-Token", "issued")
                .header("X-Storage-Url", format!("{}/v1/AUTH_acct", server.base_url()));
        });
        let head = server.mock(|when, then| {
            when.method(HEAD)
                .path("/v1/AUTH_acct/c/obj")
                .header("X-Auth-Token", "issued");
            then.status(200);
        });

        let creds = StoreCredentials::TempAuth {
            auth_url: Url::parse(&format!("{}/auth/v1.0", server.base_url()))?,
            user: "acct:user".to_string(),
            key: "secret".to_string(),
        };
        let client = SwiftClient::connect(&creds).await?;
        client.head("c", "obj").await?;

        auth.assert();
        head.assert();
        Ok(())
    }

    #[tokio::test]
    async fn rejected_temp_auth_is_reported() -> Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/auth/v1.0");
            then.status(401);
        });
        let creds = StoreCredentials::TempAuth {
            auth_url: Url::parse(&format!("{}/auth/v1.0", server.base_url()))?,
            user: "u".to_string(),
            key: "k".to_string(),
        };
        let result = SwiftClient::connect(&creds).await;
        assert!(matches!(result, Err(StoreError::Authentication { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn full_listing_follows_markers() -> Result<()> {
        let server = MockServer::start_async().await;
        let first = server.mock(|when, then| {
            when.method(GET)
                .path("/v1/AUTH_test/c")
                .query_param("format", "json")
                .query_param("prefix", "backup")
                .query_param("marker", "");
            then.status(200).json_body(json!([
                {"name": "backup/a.tar.gz", "bytes": 10},
                {"name": "backup/b.tar.gz", "bytes": 20}
            ]));
        });
        let second = server.mock(|when, then| {
            when.method(GET)
                .path("/v1/AUTH_test/c")
                .query_param("marker", "backup/b.tar.gz");
            then.status(200)
                .json_body(json!([{"name": "backup/c.tar.gz", "bytes": 30}]));
        });
        let last = server.mock(|when, then| {
            when.method(GET)
                .path("/v1/AUTH_test/c")
                .query_param("marker", "backup/c.tar.gz");
            then.status(204);
        });

        let client = client_for(&server).await?;
        let entries = client.list("c", Some("backup"), ListMode::Full).await?;
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["backup/a.tar.gz", "backup/b.tar.gz", "backup/c.tar.gz"]);
        first.assert();
        second.assert();
        last.assert();

        let page = client.list("c", Some("backup"), ListMode::FirstPage).await?;
        assert_eq!(page.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn head_decides_layout_once() -> Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(HEAD).path("/v1/AUTH_test/c/big");
            then.status(200)
                .header("X-Static-Large-Object", "True")
                .header("Etag", "\"abc\"")
                .header("X-Object-Meta-Uploaded-by", "alice");
        });
        server.mock(|when, then| {
            when.method(HEAD).path("/v1/AUTH_test/c/small");
            then.status(200);
        });
        server.mock(|when, then| {
            when.method(HEAD).path("/v1/AUTH_test/c/missing");
            then.status(404);
        });

        let client = client_for(&server).await?;
        let big = client.head("c", "big").await?;
        assert_eq!(big.layout, ObjectLayout::Segmented);
        assert_eq!(big.etag.as_deref(), Some("abc"));
        assert_eq!(big.metadata.get("uploaded-by").map(String::as_str), Some("alice"));

        let small = client.head("c", "small").await?;
        assert_eq!(small.layout, ObjectLayout::Single);

        let missing = client.head("c", "missing").await;
        assert!(missing.is_err_and(|err| err.is_not_found()));
        Ok(())
    }

    #[tokio::test]
    async fn object_paths_are_encoded_per_segment() -> Result<()> {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/v1/AUTH_test/c/dir%20one/file%231.txt");
            then.status(200).body("hello");
        });
        let client = client_for(&server).await?;
        let body = client.get("c", "dir one/file#1.txt").await?;
        assert_eq!(body.as_ref(), b"hello");
        mock.assert();
        Ok(())
    }

    #[tokio::test]
    async fn manifest_request_sets_query() -> Result<()> {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/v1/AUTH_test/c/big")
                .query_param("multipart-manifest", "get");
            then.status(200)
                .json_body(json!([{"name": "/.segments_c/big/0", "bytes": 5}]));
        });
        let client = client_for(&server).await?;
        let body = client.get_manifest("c", "big").await?;
        assert!(String::from_utf8_lossy(&body).contains(".segments_c"));
        mock.assert();
        Ok(())
    }

    #[tokio::test]
    async fn download_to_writes_body() -> Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/v1/AUTH_test/c/a.tar.gz");
            then.status(200).body("archive-bytes");
        });
        let temp = TempDir::new()?;
        let target = temp.path().join("out");
        let client = client_for(&server).await?;
        let written = client.download_to("c", "a.tar.gz", &target).await?;
        assert_eq!(written, 13);
        assert_eq!(tokio::fs::read(&target).await?, b"archive-bytes");
        Ok(())
    }

    #[tokio::test]
    async fn small_upload_is_a_single_put() -> Result<()> {
        let server = MockServer::start_async().await;
        let put = server.mock(|when, then| {
            when.method(PUT)
                .path("/v1/AUTH_test/c/backup/a.tar.gz")
                .header("X-Object-Meta-Uploaded-by", "alice")
                .body("0123456789");
            then.status(201).header("Etag", "\"e\"");
        });
        let temp = TempDir::new()?;
        let file = temp.path().join("a");
        tokio::fs::write(&file, b"0123456789").await?;

        let client = client_for(&server).await?;
        let sent = client
            .upload_file("c", "backup/a.tar.gz", &file, &options(100))
            .await?;
        assert_eq!(sent, 10);
        put.assert();
        Ok(())
    }

    #[tokio::test]
    async fn large_upload_writes_segments_then_manifest() -> Result<()> {
        let server = MockServer::start_async().await;
        let segment_container = server.mock(|when, then| {
            when.method(PUT).path("/v1/AUTH_test/.segments_c");
            then.status(202);
        });
        let segments = server.mock(|when, then| {
            when.method(PUT)
                .path_includes("/v1/AUTH_test/.segments_c/big/slo/");
            then.status(201).header("Etag", "\"seg\"");
        });
        let manifest = server.mock(|when, then| {
            when.method(PUT)
                .path("/v1/AUTH_test/c/big")
                .query_param("multipart-manifest", "put")
                .header("X-Object-Meta-Uploaded-by", "alice")
                .body_includes("\"size_bytes\":2");
            then.status(201);
        });

        let temp = TempDir::new()?;
        let file = temp.path().join("big");
        tokio::fs::write(&file, b"0123456789").await?;

        let client = client_for(&server).await?;
        let sent = client.upload_file("c", "big", &file, &options(4)).await?;
        assert_eq!(sent, 10);
        segment_container.assert();
        segments.assert_hits(3);
        manifest.assert();
        Ok(())
    }

    #[tokio::test]
    async fn delete_reports_missing_objects() -> Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(DELETE).path("/v1/AUTH_test/c/gone");
            then.status(404);
        });
        server.mock(|when, then| {
            when.method(DELETE).path("/v1/AUTH_test/c");
            then.status(409);
        });
        let client = client_for(&server).await?;
        assert!(client.delete_object("c", "gone").await.is_err_and(|e| e.is_not_found()));
        assert!(matches!(
            client.delete_container("c").await,
            Err(StoreError::Status { status: 409, .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn post_container_sends_headers() -> Result<()> {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/AUTH_test/c")
                .header("X-Container-Meta-Owner", "alice");
            then.status(204);
        });
        let client = client_for(&server).await?;
        client
            .post_container(
                "c",
                &[("X-Container-Meta-Owner".to_string(), "alice".to_string())],
            )
            .await?;
        mock.assert();
        Ok(())
    }
}

use bytes::Bytes;
use futures::TryStreamExt;
use reqwest::{header, Client, StatusCode};
use tracing::debug;
use url::Url;

use crate::{
    error::{NetError, NetResult},
    types::{NetOptions, RangeSpec},
    ByteStream,
};

/// Result of opening a streaming GET.
pub struct StreamResponse {
    /// True when the origin honored a requested `Range` with 206. A plain
    /// 200 answer means the body restarts from byte zero.
    pub resumed: bool,
    /// `ETag` of the response, used to validate resume tokens across runs.
    pub etag: Option<String>,
    pub stream: ByteStream,
}

/// HTTP client shared by metadata loading and segment fetching.
///
/// All policy lives in [`NetOptions`]: the configured user-agent rides on
/// every request via the underlying client, and each request carries the
/// configured timeout. `Range` headers are only emitted when the caller
/// passes a resume point.
#[derive(Clone, Debug)]
pub struct HttpClient {
    inner: Client,
    options: NetOptions,
}

impl HttpClient {
    pub fn new(options: NetOptions) -> Self {
        let inner = Client::builder()
            .user_agent(options.user_agent.clone())
            .pool_max_idle_per_host(options.pool_max_idle_per_host)
            .build()
            .expect("failed to build reqwest client");
        Self { inner, options }
    }

    pub fn options(&self) -> &NetOptions {
        &self.options
    }

    /// Whole-body GET for small resources (playlists, encryption keys).
    pub async fn get_bytes(&self, url: &Url) -> NetResult<Bytes> {
        let resp = self
            .inner
            .get(url.clone())
            .timeout(self.options.request_timeout)
            .send()
            .await
            .map_err(|e| NetError::from_reqwest(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(NetError::HttpStatus {
                status: status.as_u16(),
                url: url.clone(),
            });
        }

        resp.bytes()
            .await
            .map_err(|e| NetError::from_reqwest(url, e))
    }

    /// Streaming GET for media files.
    ///
    /// With `resume` set, a `Range: bytes=<offset>-` header is added and the
    /// response reports whether the origin honored it.
    pub async fn stream(
        &self,
        url: &Url,
        resume: Option<RangeSpec>,
    ) -> NetResult<StreamResponse> {
        let mut req = self
            .inner
            .get(url.clone())
            .timeout(self.options.request_timeout);

        let range_requested = resume.is_some();
        if let Some(range) = resume {
            req = req.header(header::RANGE, range.to_header_value());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| NetError::from_reqwest(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(NetError::HttpStatus {
                status: status.as_u16(),
                url: url.clone(),
            });
        }

        let resumed = range_requested && status == StatusCode::PARTIAL_CONTENT;
        if range_requested && !resumed {
            debug!(url = %url, %status, "origin ignored range request, restarting from zero");
        }

        let etag = resp
            .headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let url = url.clone();
        let stream = resp
            .bytes_stream()
            .map_err(move |e| NetError::from_reqwest(&url, e));

        Ok(StreamResponse {
            resumed,
            etag,
            stream: Box::pin(stream),
        })
    }
}

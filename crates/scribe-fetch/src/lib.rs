//! Downloads the current file of a source and records it as a snapshot.
//!
//! The fetcher only touches the store through
//! [`scribe_core::store::SnapshotStore`]; nothing is recorded unless the
//! server answers `200 OK`.

pub mod error;

use std::{fmt::Display, time::Duration};

use chrono::{DateTime, Local, TimeZone};
use reqwest::{Client, StatusCode};
use scribe_core::{
  snapshot::{NewSnapshot, Snapshot},
  source::SourceDescriptor,
  store::SnapshotStore,
};
use tracing::{info, warn};

pub use self::error::{Error, Result};

/// HTTP client for pulling source files.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Debug, Clone)]
pub struct SnapshotFetcher {
  client: Client,
}

impl SnapshotFetcher {
  pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

  pub fn new(timeout: Duration) -> Result<Self> {
    let client = Client::builder()
      .timeout(timeout)
      .user_agent(concat!("scribe/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(Error::Client)?;
    Ok(Self { client })
  }

  /// Download the source's URL as of now (local time) and record the body
  /// as a `Downloaded` snapshot.
  pub async fn fetch<S: SnapshotStore>(
    &self,
    store: &S,
    source: &SourceDescriptor,
  ) -> Result<Snapshot> {
    self.fetch_at(store, source, &Local::now()).await
  }

  /// Like [`Self::fetch`], with the URL template resolved against `at`.
  pub async fn fetch_at<S, Tz>(
    &self,
    store: &S,
    source: &SourceDescriptor,
    at: &DateTime<Tz>,
  ) -> Result<Snapshot>
  where
    S: SnapshotStore,
    Tz: TimeZone,
    Tz::Offset: Display,
  {
    let url = source.url_at(at)?;
    let content = self.download(&url).await?;

    let snapshot = store
      .record_snapshot(NewSnapshot {
        source_slug: source.slug.clone(),
        slug: None,
        url,
        content,
      })
      .await
      .map_err(|e| Error::Store(Box::new(e)))?;

    info!(
      source = %source.slug,
      snapshot = %snapshot.slug,
      url = %snapshot.url,
      size = snapshot.size,
      "snapshot downloaded"
    );
    Ok(snapshot)
  }

  /// `GET url`, returning the body of a `200 OK` response.
  pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
    let http_err = |source| Error::Http { url: url.to_owned(), source };

    let resp = self.client.get(url).send().await.map_err(http_err)?;
    let status = resp.status();
    if status != StatusCode::OK {
      warn!(%url, status = status.as_u16(), "download refused");
      return Err(Error::BadHttpStatus {
        url:    url.to_owned(),
        status: status.as_u16(),
      });
    }

    let body = resp.bytes().await.map_err(http_err)?;
    Ok(body.to_vec())
  }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The server answered with anything other than `200 OK`.
  #[error("{url} answered with HTTP {status}")]
  BadHttpStatus { url: String, status: u16 },

  #[error("request to {url} failed: {source}")]
  Http {
    url:    String,
    #[source]
    source: reqwest::Error,
  },

  #[error("could not build HTTP client: {0}")]
  Client(#[source] reqwest::Error),

  #[error(transparent)]
  Core(#[from] scribe_core::Error),

  #[error("snapshot store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// The HTTP status, if the request got as far as a response.
  pub fn status(&self) -> Option<u16> {
    match self {
      Self::BadHttpStatus { status, .. } => Some(*status),
      Self::Http { source, .. } => source.status().map(|s| s.as_u16()),
      _ => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

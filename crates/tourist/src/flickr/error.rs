use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("there was an error with your request: {0}")]
    Network(#[from] reqwest::Error),

    #[error("your request returned status code {0}, expected 2xx")]
    HttpStatus(u16),

    #[error("no data was returned by the request")]
    EmptyResponse,

    #[error("could not parse the response: {0}")]
    Parse(String),

    #[error("photo search API returned an error: {message}")]
    RemoteApi { code: Option<i64>, message: String },

    #[error("not able to download photo {url}: {reason}")]
    Download { url: String, reason: String },
}

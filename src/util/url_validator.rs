use thiserror::Error;
use url::Url;

/// Errors from checking that a string is a fetchable article or feed URL.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
}

/// Validates that `url_str` is a syntactically valid HTTP(S) URL with a host.
///
/// Reachability is not checked; that is left to the request itself.
///
/// # Examples
///
/// ```
/// use newsreel::util::validate_url;
///
/// let url = validate_url("https://News.Example.com/a/1").unwrap();
/// assert_eq!(url.host_str(), Some("news.example.com"));
///
/// assert!(validate_url("file:///etc/passwd").is_err());
/// assert!(validate_url("not a url").is_err());
/// ```
pub fn validate_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if matches!(url.host_str(), None | Some("")) {
        return Err(UrlValidationError::MissingHost);
    }

    Ok(url)
}

/// Lowercase host of a URL, the key used by the site selector catalog.
pub fn host_key(url: &Url) -> Option<String> {
    url.host_str().map(str::to_ascii_lowercase)
}

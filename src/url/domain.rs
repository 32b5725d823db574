use url::Url;

/// Returns the base URL (`scheme://host[:port]`) of a URL
///
/// This is the ASCII serialization of the URL's origin, so default ports are
/// omitted and there is no trailing slash.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use driftnet::url::base_url;
///
/// let url = Url::parse("https://example.com/path?q=1").unwrap();
/// assert_eq!(base_url(&url), "https://example.com");
///
/// let url = Url::parse("http://localhost:8080/a/b").unwrap();
/// assert_eq!(base_url(&url), "http://localhost:8080");
/// ```
pub fn base_url(url: &Url) -> String {
    url.origin().ascii_serialization()
}

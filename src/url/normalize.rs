use crate::UrlError;
use url::Url;

/// Query parameters that never identify an item
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "mc_eid", "ref", "source", "from", "trk", "sid",
];

/// Reduces a URL to the canonical form used as the dedup key
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or not HTTP(S)
/// 2. Lowercase the host and drop a `www.` prefix
/// 3. Collapse empty and dot segments, drop the trailing slash (root stays `/`)
/// 4. Drop the fragment
/// 5. Drop tracking parameters (`utm_*` and [`TRACKING_PARAMS`])
/// 6. Sort the remaining query parameters and re-encode them in
///    `application/x-www-form-urlencoded` form; drop an empty query
///
/// The scheme is kept as-is: listing sources served over plain HTTP keep
/// their scheme so that URLs found on them resolve to the same key.
///
/// # Examples
///
/// ```
/// use sumi_harvest::url::normalize_url;
///
/// let url = normalize_url("https://WWW.EXAMPLE.COM/job/7/?utm_source=x").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/job/7");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .map(|h| h.to_lowercase())
        .ok_or(UrlError::MissingDomain)?;
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;

    let path = canonical_path(url.path());
    url.set_path(&path);
    url.set_fragment(None);

    if url.query().is_some() {
        let params = retained_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(&params);
        }
    }

    Ok(url)
}

fn canonical_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    format!("/{}", segments.join("/"))
}

fn retained_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.sort();
    params
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_is_preserved() {
        let result = normalize_url("http://example.com/job/1").unwrap();
        assert_eq!(result.as_str(), "http://example.com/job/1");
    }

    #[test]
    fn test_remove_www() {
        let result = normalize_url("https://www.example.com/").unwrap();
        assert_eq!(result.as_str(), "https://example.com/");
    }

    #[test]
    fn test_remove_trailing_slash() {
        let result = normalize_url("https://example.com/job/1/").unwrap();
        assert_eq!(result.as_str(), "https://example.com/job/1");
    }

    #[test]
    fn test_empty_path_becomes_root() {
        let result = normalize_url("https://example.com").unwrap();
        assert_eq!(result.as_str(), "https://example.com/");
    }

    #[test]
    fn test_remove_fragment() {
        let result = normalize_url("https://example.com/job/1#apply").unwrap();
        assert_eq!(result.as_str(), "https://example.com/job/1");
    }

    #[test]
    fn test_identity_params_survive_sorted() {
        let result =
            normalize_url("https://example.com/view?utm_medium=mail&id=9&cat=2&fbclid=x").unwrap();
        assert_eq!(result.as_str(), "https://example.com/view?cat=2&id=9");
    }

    #[test]
    fn test_encoded_query_values_keep_their_meaning() {
        let result = normalize_url("https://example.com/view?q=a%26b&id=9").unwrap();
        assert_eq!(result.as_str(), "https://example.com/view?id=9&q=a%26b");

        let pairs: Vec<(String, String)> = result
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("id".to_string(), "9".to_string()),
                ("q".to_string(), "a&b".to_string())
            ]
        );

        let again = normalize_url(result.as_str()).unwrap();
        assert_eq!(again, result);
    }

    #[test]
    fn test_encoded_space_and_equals_survive() {
        let result = normalize_url("https://example.com/search?k=x%3Dy&t=senior%20rust").unwrap();
        assert_eq!(result.as_str(), "https://example.com/search?k=x%3Dy&t=senior+rust");
        assert_eq!(normalize_url(result.as_str()).unwrap(), result);
    }

    #[test]
    fn test_dot_segments_and_slashes() {
        let result = normalize_url("https://example.com//a/../b/./c//").unwrap();
        assert_eq!(result.as_str(), "https://example.com/b/c");
    }

    #[test]
    fn test_lowercase_host_keeps_path_case() {
        let result = normalize_url("https://EXAMPLE.COM/Job/ABC").unwrap();
        assert_eq!(result.as_str(), "https://example.com/Job/ABC");
    }

    #[test]
    fn test_invalid_scheme() {
        let result = normalize_url("ftp://example.com/file");
        assert!(matches!(result.unwrap_err(), UrlError::InvalidScheme(_)));
    }

    #[test]
    fn test_malformed_url() {
        assert!(normalize_url("not a url").is_err());
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let once = normalize_url("http://WWW.Example.com/a/./b/?z=1&utm_x=2&a=3#f").unwrap();
        let twice = normalize_url(once.as_str()).unwrap();
        assert_eq!(once, twice);
    }
}

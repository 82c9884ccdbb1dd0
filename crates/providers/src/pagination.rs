//! "Latest by pagination": fetch the newest element of an ascending listing
//! with at most two requests.

use reqwest::Url;
use serde_json::Value;

use crate::ProviderError;
use crate::client::SourceClient;

/// Page-size parameter understood by GitHub listings.
pub const PAGE_SIZE_PARAM: &str = "per_page";

/// Return the newest element of an oldest-first listing.
///
/// Requests `url` with a page size of one. When the response carries a
/// `rel="last"` hint, the sole element of that page is returned; otherwise the
/// sole element of the first page is.
pub async fn latest_by_pagination(
    client: &dyn SourceClient,
    url: Url,
) -> Result<Option<Value>, ProviderError> {
    let first_url = with_query_param(url, PAGE_SIZE_PARAM, "1");
    let first = client.get_json(&first_url).await?;

    let page = match first.last_page {
        Some(last) if last != first_url => {
            tracing::trace!(url = %last, "Following last-page link");
            client.get_json(&last).await?
        }
        _ => first,
    };

    Ok(sole_element(page.body))
}

/// First element of a JSON array body, if any.
pub fn sole_element(body: Value) -> Option<Value> {
    match body {
        Value::Array(items) => items.into_iter().next(),
        _ => None,
    }
}

/// Set `key=value` on `url`, replacing any existing values for `key`.
pub fn with_query_param(mut url: Url, key: &str, value: &str) -> Url {
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair(key, value);
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_query_param_replaces_existing_value() {
        let url = Url::parse("https://api.github.com/x?per_page=30&state=all").unwrap();
        let url = with_query_param(url, "per_page", "1");
        assert_eq!(url.query(), Some("state=all&per_page=1"));
    }

    #[test]
    fn test_sole_element_of_non_array_is_none() {
        assert!(sole_element(serde_json::json!({"message": "x"})).is_none());
        assert!(sole_element(serde_json::json!([])).is_none());
        assert_eq!(
            sole_element(serde_json::json!([{"id": 1}, {"id": 2}])),
            Some(serde_json::json!({"id": 1}))
        );
    }
}

//! Query-string helpers for the handshake and poll protocol.

use std::collections::HashMap;

/// Parse the query portion of a request URI into a map.
///
/// Duplicate keys keep the last value; a URI without a query yields an
/// empty map.
#[must_use]
pub fn parse_uri_query(uri: &str) -> HashMap<String, String> {
    let query = uri.split_once('?').map_or("", |(_, q)| q);
    parse_form(query)
}

/// Parse a `application/x-www-form-urlencoded` body into a map.
#[must_use]
pub fn parse_form(body: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(body.as_bytes())
        .into_owned()
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

/// Encode key/value pairs as a query string, preserving pair order.
#[must_use]
pub fn format_query(params: &[(&str, String)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_uri_query() {
        let params = parse_uri_query("/evsock?when=open&transport=longpoll&jsonp=");
        assert_eq!(params.get("when").map(String::as_str), Some("open"));
        assert_eq!(
            params.get("transport").map(String::as_str),
            Some("longpoll")
        );
        assert_eq!(params.get("jsonp").map(String::as_str), Some(""));
    }

    #[test]
    fn uri_without_query_yields_empty_map() {
        assert!(parse_uri_query("/evsock").is_empty());
    }

    #[test]
    fn round_trips_urlencoded_values() {
        let encoded = format_query(&[("data", "a b&c=d".to_string())]);
        let decoded = parse_form(&encoded);
        assert_eq!(decoded.get("data").map(String::as_str), Some("a b&c=d"));
    }
}

//! Property tests over the request parser and cache.

use bytes::Bytes;
use proptest::prelude::*;
use quickcheck_macros::quickcheck;
use ronin_proxy::cache::ProxyCache;
use ronin_proxy::request::ParsedRequest;

proptest! {
    /// Any absolute-URI GET request with a bare host and path round-trips
    /// through the parser into the same host/path it was built from.
    #[test]
    fn prop_absolute_uri_round_trips(
        host in "[a-z]{3,10}\\.(com|org|net)",
        path in "/[a-z0-9/]{0,40}",
    ) {
        let raw = format!("GET http://{host}{path} HTTP/1.1\r\nHost: {host}\r\n\r\n");
        let mut req = ParsedRequest::create();
        req.parse(raw.as_bytes()).unwrap();

        prop_assert_eq!(req.host.as_deref(), Some(host.as_str()));
        let expected_path = if path.is_empty() { "/".to_string() } else { path.clone() };
        prop_assert_eq!(req.path, expected_path);
        prop_assert_eq!(req.version, "HTTP/1.1");
    }

    /// header_set is idempotent: setting the same name/value twice leaves
    /// exactly one header with that name.
    #[test]
    fn prop_header_set_idempotent(
        name in "[A-Za-z-]{1,20}",
        value in "[a-zA-Z0-9 ]{0,30}",
    ) {
        let mut req = ParsedRequest::create();
        req.parse(b"GET http://x/ HTTP/1.1\r\n\r\n").unwrap();

        req.header_set(&name, &value).unwrap();
        req.header_set(&name, &value).unwrap();

        prop_assert_eq!(req.header_get(&name), Some(value.as_str()));
    }

    /// Non-GET methods are parsed (the parser doesn't reject them) but are
    /// never confused for GET.
    #[test]
    fn prop_method_is_preserved_verbatim(
        method in "[A-Z]{3,7}",
    ) {
        let raw = format!("{method} http://x/ HTTP/1.1\r\n\r\n");
        let mut req = ParsedRequest::create();
        if req.parse(raw.as_bytes()).is_ok() {
            prop_assert_eq!(req.method, method);
        }
    }
}

proptest! {
    /// Cache keys are content-addressed: inserting under key `k` and
    /// looking it up under the exact same bytes always hits.
    #[test]
    fn prop_cache_round_trips_arbitrary_keys(
        key_bytes in prop::collection::vec(any::<u8>(), 1..200),
        body_bytes in prop::collection::vec(any::<u8>(), 0..4096),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let cache = ProxyCache::new();
            let key = Bytes::from(key_bytes);
            let body = Bytes::from(body_bytes);

            cache.insert(key.clone(), body.clone()).await;
            let found = cache.find(&key).await;
            prop_assert_eq!(found, Some(body));
            Ok(())
        })?;
    }
}

/// Re-parsing the exact same bytes always yields the same method, mirroring
/// the teacher's `qc_cacheable_deterministic`/`qc_ttl_calculation_stable`
/// shape (same input, same derived output) but over this crate's parser.
#[quickcheck]
fn qc_parse_is_deterministic(method: String, host: String, path: String) -> bool {
    let method: String = method.chars().filter(|c| c.is_ascii_alphabetic()).take(7).collect();
    let host: String = host.chars().filter(|c| c.is_ascii_alphanumeric()).take(20).collect();
    let path: String = path.chars().filter(|c| c.is_ascii_alphanumeric()).take(20).collect();
    if method.is_empty() || host.is_empty() {
        return true;
    }

    let raw = format!("{method} http://{host}/{path} HTTP/1.1\r\nHost: {host}\r\n\r\n");

    let mut first = ParsedRequest::create();
    let mut second = ParsedRequest::create();
    let first_ok = first.parse(raw.as_bytes()).is_ok();
    let second_ok = second.parse(raw.as_bytes()).is_ok();

    first_ok == second_ok && (!first_ok || (first.method == second.method && first.host == second.host))
}

/// The raw request bytes double as the cache key (§3, §9 "Raw-request
/// key"), so inserting under them and looking them back up always hits —
/// the key is never degenerate. Mirrors the teacher's
/// `qc_cache_key_never_zero` guarding against a collapsed derived key.
#[quickcheck]
fn qc_cache_key_round_trip_always_hits(path: String, body: Vec<u8>) -> bool {
    let path: String = path.chars().filter(|c| c.is_ascii_alphanumeric()).take(40).collect();
    let raw = format!("GET /{path} HTTP/1.1\r\n\r\n");
    let key = Bytes::from(raw.into_bytes());
    let body = Bytes::from(body);

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let cache = ProxyCache::new();
        cache.insert(key.clone(), body.clone()).await;
        cache.find(&key).await == Some(body)
    })
}

use std::fmt;

use http::{Method, Uri};
use sha2::{Digest, Sha256};
use url::form_urlencoded;

/// Fingerprint of a request for caching purposes.
///
/// SHA-256 over `"<METHOD>_<PATH>?<sorted query>"`. Two requests with the same
/// method, path and query parameters (in any order) share a key. Headers and
/// body are never looked at.
#[derive(Clone, Copy, Hash, Eq, PartialEq)]
pub struct CacheKey {
    digest: [u8; 32],
}

impl CacheKey {
    /// `query` is the raw query string without the leading `?`.
    pub fn new(method: &str, path: &str, query: Option<&str>) -> Self {
        let raw = raw_key(method, path, query);
        let digest: [u8; 32] = Sha256::digest(raw.as_bytes()).into();
        Self { digest }
    }

    pub fn from_request(method: &Method, uri: &Uri) -> Self {
        Self::new(method.as_str(), uri.path(), uri.query())
    }

    /// 64 lowercase hex chars; this is the key used in the backing store.
    pub fn to_hex(&self) -> String {
        hex::encode(self.digest)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", self.to_hex())
    }
}

/// Composite string hashed into the key.
///
/// Every value becomes its own `name=value` token (repeated names included),
/// tokens are sorted byte-wise and joined with `&`.
fn raw_key(method: &str, path: &str, query: Option<&str>) -> String {
    let mut params: Vec<String> = query
        .map(|q| {
            form_urlencoded::parse(q.as_bytes())
                .map(|(name, value)| format!("{name}={value}"))
                .collect()
        })
        .unwrap_or_default();
    params.sort_unstable();

    format!("{method}_{path}?{}", params.join("&"))
}

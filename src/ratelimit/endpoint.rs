//! Endpoint normalization and bucket key generation.

use std::fmt;

use super::tier::LimitType;

/// Replacement for id-like path segments.
pub const ID_PLACEHOLDER: &str = "id";
/// Joins the segments of a normalized endpoint.
pub const SEGMENT_SEPARATOR: &str = "_";
/// Normalized form of an endpoint with no path segments.
pub const ROOT_ENDPOINT: &str = "root";

/// Minimum length of a segment treated as a UUID.
const UUID_MIN_LEN: usize = 36;

/// Canonicalize a request path so that all requests against the same
/// resource type share one quota.
///
/// Query strings and fragments are dropped, numeric and UUID-like segments
/// become [`ID_PLACEHOLDER`], and the remaining segments are joined with
/// [`SEGMENT_SEPARATOR`]:
///
/// ```
/// use lexware_ratelimit::ratelimit::normalize_endpoint;
///
/// assert_eq!(normalize_endpoint("/contacts/12345"), "contacts_id");
/// assert_eq!(normalize_endpoint("/contacts?page=2"), "contacts");
/// assert_eq!(
///     normalize_endpoint("/vouchers/66196c43-baf3-4335-bfee-d610367059db/files"),
///     "vouchers_id_files"
/// );
/// ```
pub fn normalize_endpoint(endpoint: &str) -> String {
    let path = strip_origin(endpoint);
    let path = path
        .split(|c: char| c == '?' || c == '#')
        .next()
        .unwrap_or_default();

    let segments: Vec<&str> = path
        .trim_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            if is_id_segment(segment) {
                ID_PLACEHOLDER
            } else {
                segment
            }
        })
        .collect();

    if segments.is_empty() {
        return ROOT_ENDPOINT.to_string();
    }
    segments.join(SEGMENT_SEPARATOR)
}

/// Drop `scheme://authority` from absolute URLs.
fn strip_origin(endpoint: &str) -> &str {
    match endpoint.split_once("://") {
        Some((scheme, rest)) if is_scheme(scheme) => rest.find('/').map_or("", |i| &rest[i..]),
        _ => endpoint,
    }
}

fn is_scheme(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.'))
}

fn is_id_segment(segment: &str) -> bool {
    let numeric = segment.bytes().all(|b| b.is_ascii_digit());
    let uuid_like = segment.len() >= UUID_MIN_LEN
        && segment.bytes().all(|b| b.is_ascii_hexdigit() || b == b'-');
    numeric || uuid_like
}

/// The store key addressing one tier's bucket for one endpoint.
///
/// The key is composed of the prefix, the tier name, the scope identifier
/// (connection id or client id) and the normalized endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    /// Namespace shared by all keys of one deployment
    pub prefix: String,
    /// Which tier the bucket belongs to
    pub limit_type: LimitType,
    /// Connection id or client id, depending on the tier
    pub scope_id: String,
    /// Normalized endpoint
    pub endpoint: String,
}

impl BucketKey {
    /// Create a bucket key, normalizing `endpoint`.
    pub fn new(prefix: &str, limit_type: LimitType, scope_id: &str, endpoint: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            limit_type,
            scope_id: scope_id.to_string(),
            endpoint: normalize_endpoint(endpoint),
        }
    }

    /// Convert to the string used to address the store.
    /// Format: "{prefix}:{tier}:{scope_id}:{endpoint}"
    pub fn to_store_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.prefix,
            self.limit_type.as_str(),
            self.scope_id,
            self.endpoint
        )
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_store_key())
    }
}

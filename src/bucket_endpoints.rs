//! URL templates for the bucket management endpoints callers build requests
//! against. The core doesn't implement bucket CRUD itself; it only knows the
//! paths and escapes the bucket name a caller supplies.

use url::Url;

/// `/pools/default/buckets` and its bucket-scoped children.
pub struct BucketEndpoints;

impl BucketEndpoints {
    pub const LIST: &'static str = "/pools/default/buckets";

    /// `/pools/default/buckets/{bucket}`, with `bucket` percent-escaped.
    pub fn bucket(bucket: &str) -> String {
        format!("{}/{}", Self::LIST, escape_segment(bucket))
    }

    /// `/pools/default/buckets/{bucket}/scopes`.
    pub fn scopes(bucket: &str) -> String {
        format!("{}/scopes", Self::bucket(bucket))
    }
}

/// Percent-encodes a single path segment the way a bucket/scope name needs
/// to appear in a URL, using `url`'s own path-segment encode set rather than
/// hand-rolling one.
fn escape_segment(segment: &str) -> String {
    let mut url = Url::parse("http://placeholder.invalid").expect("static base url is valid");
    url.path_segments_mut().expect("http urls can be a base").push(segment);
    url.path().rsplit('/').next().unwrap_or_default().to_string()
}

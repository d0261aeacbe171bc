//! Object storage endpoints and addressing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::StorageConfig;
use crate::error::ControlError;

/// One of the two object storage front ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    /// GPU-cluster-local cache, reachable only from inside a GPU cluster.
    Lota,
    /// The primary object storage service.
    Caios,
}

impl Endpoint {
    /// Short display name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Lota => "LOTA",
            Self::Caios => "CAIOS",
        }
    }

    /// Endpoint URL from configuration.
    #[must_use]
    pub fn url(self, config: &StorageConfig) -> &str {
        match self {
            Self::Lota => &config.lota_url,
            Self::Caios => &config.caios_url,
        }
    }

    /// Endpoints to try in order.
    ///
    /// LOTA first with CAIOS as the fallback when LOTA is preferred, otherwise
    /// CAIOS alone.
    #[must_use]
    pub fn candidates(prefer_lota: bool) -> &'static [Self] {
        if prefer_lota {
            &[Self::Lota, Self::Caios]
        } else {
            &[Self::Caios]
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Endpoint {
    type Err = ControlError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "lota" => Ok(Self::Lota),
            "caios" => Ok(Self::Caios),
            other => Err(ControlError::Config(format!(
                "unknown endpoint {other:?}, expected lota or caios"
            ))),
        }
    }
}

/// S3 request addressing.
///
/// Unknown values fall back to [`AddressingStyle::Virtual`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum AddressingStyle {
    /// `https://host/bucket/key`.
    Path,
    /// `https://bucket.host/key`.
    #[default]
    Virtual,
    /// Virtual when the bucket name is DNS compatible, path otherwise.
    Auto,
}

impl AddressingStyle {
    /// Parse a style name, falling back to virtual for anything unrecognised.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "path" => Self::Path,
            "auto" => Self::Auto,
            _ => Self::Virtual,
        }
    }

    /// Whether requests for `bucket` use virtual-hosted addressing.
    #[must_use]
    pub fn is_virtual_for(self, bucket: &str) -> bool {
        match self {
            Self::Path => false,
            Self::Virtual => true,
            Self::Auto => is_dns_compatible(bucket),
        }
    }

    /// Style name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Virtual => "virtual",
            Self::Auto => "auto",
        }
    }
}

impl From<String> for AddressingStyle {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl fmt::Display for AddressingStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host part of an endpoint URL, without scheme or trailing slash.
#[must_use]
pub fn endpoint_host(url: &str) -> &str {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    rest.trim_end_matches('/')
}

/// Endpoint URL with the bucket prepended to the host.
#[must_use]
pub fn virtual_hosted_url(url: &str, bucket: &str) -> String {
    let scheme = if url.starts_with("http://") {
        "http"
    } else {
        "https"
    };
    format!("{scheme}://{bucket}.{}", endpoint_host(url))
}

fn is_dns_compatible(bucket: &str) -> bool {
    (3..=63).contains(&bucket.len())
        && !bucket.contains("..")
        && bucket
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
        && bucket.starts_with(|c: char| c.is_ascii_alphanumeric())
        && bucket.ends_with(|c: char| c.is_ascii_alphanumeric())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("path", AddressingStyle::Path)]
    #[case("virtual", AddressingStyle::Virtual)]
    #[case("auto", AddressingStyle::Auto)]
    #[case("", AddressingStyle::Virtual)]
    #[case("PATH", AddressingStyle::Virtual)]
    #[case("sideways", AddressingStyle::Virtual)]
    fn addressing_style_parsing(#[case] input: &str, #[case] expected: AddressingStyle) {
        assert_eq!(AddressingStyle::parse(input), expected);
    }

    #[rstest]
    #[case("lota", Endpoint::Lota)]
    #[case("LOTA", Endpoint::Lota)]
    #[case(" caios ", Endpoint::Caios)]
    fn endpoint_parsing(#[case] input: &str, #[case] expected: Endpoint) {
        assert_eq!(input.parse::<Endpoint>().unwrap(), expected);
    }

    #[test]
    fn unknown_endpoint_is_rejected() {
        assert!("s3".parse::<Endpoint>().is_err());
    }

    #[rstest]
    #[case("http://cwlota.com", "cwlota.com")]
    #[case("https://cwobject.com/", "cwobject.com")]
    #[case("hpc.example.com", "hpc.example.com")]
    #[case("https://storage.example:9000", "storage.example:9000")]
    fn host_strips_scheme(#[case] url: &str, #[case] host: &str) {
        assert_eq!(endpoint_host(url), host);
    }

    #[test]
    fn host_keeps_leading_letters() {
        // Hosts starting with scheme letters must survive intact.
        assert_eq!(endpoint_host("https://tps.example"), "tps.example");
        assert_eq!(endpoint_host("http://hpt.example"), "hpt.example");
    }

    #[test]
    fn virtual_hosted() {
        assert_eq!(
            virtual_hosted_url("http://cwlota.com", "data"),
            "http://data.cwlota.com"
        );
        assert_eq!(
            virtual_hosted_url("https://cwobject.com", "data"),
            "https://data.cwobject.com"
        );
    }

    #[test]
    fn auto_depends_on_bucket_name() {
        assert!(AddressingStyle::Auto.is_virtual_for("my-bucket"));
        assert!(!AddressingStyle::Auto.is_virtual_for("My_Bucket"));
        assert!(!AddressingStyle::Path.is_virtual_for("my-bucket"));
    }

    #[test]
    fn candidate_order() {
        assert_eq!(Endpoint::candidates(true), &[Endpoint::Lota, Endpoint::Caios]);
        assert_eq!(Endpoint::candidates(false), &[Endpoint::Caios]);
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// Root prefix of every recording artifact
pub const KEY_PREFIX: &str = "recordings";

/// Provider segment used when a call never authenticated
pub const UNAUTHENTICATED_PROVIDER: &str = "unauthenticated";

/// Employee segment used when a call never authenticated
pub const UNKNOWN_EMPLOYEE: &str = "unknown";

/// Files produced for every finished recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Mixed recording of both parties
    Recording,
    Inbound,
    Outbound,
    Metadata,
}

impl ArtifactKind {
    pub fn filename(&self) -> &'static str {
        match self {
            ArtifactKind::Recording => "recording.wav",
            ArtifactKind::Inbound => "inbound.wav",
            ArtifactKind::Outbound => "outbound.wav",
            ArtifactKind::Metadata => "metadata.json",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ArtifactKind::Recording | ArtifactKind::Inbound | ArtifactKind::Outbound => {
                "audio/wav"
            }
            ArtifactKind::Metadata => "application/json",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Recording => "recording",
            ArtifactKind::Inbound => "inbound",
            ArtifactKind::Outbound => "outbound",
            ArtifactKind::Metadata => "metadata",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Replace everything but ASCII letters and digits with `_` and lower-case
pub fn sanitize_segment(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        UNKNOWN_EMPLOYEE.to_string()
    } else {
        cleaned
    }
}

/// Object store keys for one call's artifacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputKeys {
    pub prefix: String,
    pub mixed: String,
    pub inbound: String,
    pub outbound: String,
    pub metadata: String,
}

impl OutputKeys {
    /// `recordings/<provider>/<employee>/<call-id>/...`
    pub fn new(provider: &str, employee: &str, call_id: &str) -> Self {
        let prefix = format!(
            "{}/{}/{}/{}",
            KEY_PREFIX,
            sanitize_segment(provider),
            sanitize_segment(employee),
            sanitize_segment(call_id)
        );

        let key = |kind: ArtifactKind| format!("{}/{}", prefix, kind.filename());

        Self {
            mixed: key(ArtifactKind::Recording),
            inbound: key(ArtifactKind::Inbound),
            outbound: key(ArtifactKind::Outbound),
            metadata: key(ArtifactKind::Metadata),
            prefix,
        }
    }

    /// Keys for a call that ended before authentication was bound
    pub fn unauthenticated(call_id: &str) -> Self {
        Self::new(UNAUTHENTICATED_PROVIDER, UNKNOWN_EMPLOYEE, call_id)
    }

    pub fn key_for(&self, kind: ArtifactKind) -> &str {
        match kind {
            ArtifactKind::Recording => &self.mixed,
            ArtifactKind::Inbound => &self.inbound,
            ArtifactKind::Outbound => &self.outbound,
            ArtifactKind::Metadata => &self.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_segment() {
        assert_eq!(sanitize_segment("Acme Staffing, Inc."), "acme_staffing__inc_");
        assert_eq!(sanitize_segment("EMP-042"), "emp_042");
        assert_eq!(sanitize_segment("../etc"), "___etc");
        assert_eq!(sanitize_segment("  "), "unknown");
    }

    #[test]
    fn test_output_keys() {
        let keys = OutputKeys::new("Acme", "E 7", "CA1");
        assert_eq!(keys.prefix, "recordings/acme/e_7/ca1");
        assert_eq!(keys.mixed, "recordings/acme/e_7/ca1/recording.wav");
        assert_eq!(keys.inbound, "recordings/acme/e_7/ca1/inbound.wav");
        assert_eq!(keys.outbound, "recordings/acme/e_7/ca1/outbound.wav");
        assert_eq!(keys.metadata, "recordings/acme/e_7/ca1/metadata.json");
        assert_eq!(keys.key_for(ArtifactKind::Metadata), keys.metadata);
    }

    #[test]
    fn test_unauthenticated_keys() {
        let keys = OutputKeys::unauthenticated("CA1");
        assert_eq!(keys.prefix, "recordings/unauthenticated/unknown/ca1");
    }
}

//! Declarative Kubernetes resources parsed from manifest text.

use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ControlError, ControlResult};

/// Kinds of resource the applier knows how to create and patch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// `v1/ServiceAccount`.
    ServiceAccount,
    /// `v1/ConfigMap`.
    ConfigMap,
    /// `v1/Service`.
    Service,
    /// `apps/v1/StatefulSet`.
    StatefulSet,
    /// `batch/v1/Job`. Immutable once created.
    Job,
    /// Anything else. Skipped by the applier.
    Other(String),
}

impl ResourceKind {
    /// Map a manifest `kind` field to a resource kind.
    #[must_use]
    pub fn from_kind(kind: &str) -> Self {
        match kind {
            "ServiceAccount" => Self::ServiceAccount,
            "ConfigMap" => Self::ConfigMap,
            "Service" => Self::Service,
            "StatefulSet" => Self::StatefulSet,
            "Job" => Self::Job,
            other => Self::Other(other.to_owned()),
        }
    }

    /// The manifest `kind` field.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::ServiceAccount => "ServiceAccount",
            Self::ConfigMap => "ConfigMap",
            Self::Service => "Service",
            Self::StatefulSet => "StatefulSet",
            Self::Job => "Job",
            Self::Other(kind) => kind,
        }
    }

    /// Returns true if the applier can create and patch this kind.
    #[must_use]
    pub const fn is_supported(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name recorded for unsupported documents without `metadata.name`.
pub const UNNAMED: &str = "<unnamed>";

/// A single resource ready to be applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDescriptor {
    /// Resource kind.
    pub kind: ResourceKind,
    /// `metadata.name`.
    pub name: String,
    /// Target namespace.
    pub namespace: String,
    /// Full resource document.
    pub body: Value,
}

impl ResourceDescriptor {
    /// Build a descriptor from a parsed document.
    ///
    /// The document's own `metadata.namespace` wins over `default_namespace`.
    pub fn from_value(body: Value, default_namespace: &str) -> ControlResult<Self> {
        let kind = body
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| ControlError::manifest("document has no kind"))?;
        let kind = ResourceKind::from_kind(kind);

        let metadata = body.get("metadata");
        let name = match metadata
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
        {
            Some(name) => name.to_owned(),
            // Skipped by the applier, only named in its result.
            None if !kind.is_supported() => UNNAMED.to_owned(),
            None => {
                return Err(ControlError::manifest(format!(
                    "{kind} document has no metadata.name"
                )))
            }
        };
        let namespace = metadata
            .and_then(|m| m.get("namespace"))
            .and_then(Value::as_str)
            .filter(|ns| !ns.is_empty())
            .unwrap_or(default_namespace)
            .to_owned();

        Ok(Self {
            kind,
            name,
            namespace,
            body,
        })
    }

    /// `Kind/name`, as used in apply results.
    #[must_use]
    pub fn id(&self) -> String {
        resource_id(&self.kind, &self.name)
    }
}

/// Format a `Kind/name` identifier.
#[must_use]
pub fn resource_id(kind: &ResourceKind, name: &str) -> String {
    format!("{kind}/{name}")
}

/// Parse multi-document YAML into descriptors, in document order.
///
/// Empty documents are skipped.
pub fn parse_manifests(text: &str, namespace: &str) -> ControlResult<Vec<ResourceDescriptor>> {
    let mut resources = Vec::new();

    for (index, document) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let value = Value::deserialize(document)
            .map_err(|e| ControlError::manifest(format!("document {index}: {e}")))?;
        if value.is_null() {
            continue;
        }
        resources.push(ResourceDescriptor::from_value(value, namespace)?);
    }

    Ok(resources)
}

/// Render descriptors back to multi-document YAML.
pub fn to_yaml(resources: &[ResourceDescriptor]) -> ControlResult<String> {
    let mut out = String::new();
    for resource in resources {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(&resource.body)?);
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const MANIFEST: &str = r"
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: warp-config
data:
  key: value
---
---
apiVersion: v1
kind: Service
metadata:
  name: warp
  namespace: elsewhere
spec:
  clusterIP: None
---
apiVersion: networking.k8s.io/v1
kind: Ingress
metadata:
  name: web
";

    #[test]
    fn parses_documents_in_order() {
        let resources = parse_manifests(MANIFEST, "tenant-slurm").unwrap();
        let ids: Vec<_> = resources.iter().map(ResourceDescriptor::id).collect();
        assert_eq!(ids, ["ConfigMap/warp-config", "Service/warp", "Ingress/web"]);
    }

    #[test]
    fn namespace_defaults_and_overrides() {
        let resources = parse_manifests(MANIFEST, "tenant-slurm").unwrap();
        assert_eq!(resources[0].namespace, "tenant-slurm");
        assert_eq!(resources[1].namespace, "elsewhere");
    }

    #[test]
    fn unknown_kinds_are_other() {
        let resources = parse_manifests(MANIFEST, "ns").unwrap();
        assert_eq!(resources[2].kind, ResourceKind::Other("Ingress".to_owned()));
        assert!(!resources[2].kind.is_supported());
        assert!(resources[1].kind.is_supported());
    }

    #[test]
    fn missing_kind_is_an_error() {
        let err = parse_manifests("metadata:\n  name: x\n", "ns").unwrap_err();
        assert!(matches!(err, ControlError::Manifest(_)));
    }

    #[test]
    fn missing_name_is_an_error() {
        let err = parse_manifests("kind: Job\nmetadata: {}\n", "ns").unwrap_err();
        assert!(err.to_string().contains("metadata.name"));
    }

    #[test]
    fn unsupported_kind_without_name_is_kept() {
        let resources = parse_manifests("kind: Widget\nmetadata: {}\n---\nkind: Gadget\n", "ns").unwrap();
        let ids: Vec<_> = resources.iter().map(ResourceDescriptor::id).collect();
        assert_eq!(ids, ["Widget/<unnamed>", "Gadget/<unnamed>"]);
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(parse_manifests("", "ns").unwrap().is_empty());
    }
}

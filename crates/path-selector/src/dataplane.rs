//! Dataplane handles and the selected-path adapter
//!
//! A ranker only ever picks one of the supplied paths. When the objective
//! needs a capability dataplane (EPIC or FABRID), the builder produces a new
//! handle and the selection is wrapped in a [`SelectedPath`] that overrides
//! the base path's dataplane while forwarding everything else.

use crate::hops::{build_hop_chain, HopRecord};
use crate::{IsdAs, Path, PathId, PathInterface, PathMetadata, PolicyId, Result, SelectorError};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use tracing::debug;

/// Dataplane flavour carried by a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataplaneKind {
    #[default]
    Standard,
    Epic,
    Fabrid,
}

/// Opaque dataplane description
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataplaneHandle {
    pub kind: DataplaneKind,
    /// Per-hop policies in hop order (FABRID only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<PolicyId>,
    /// Raw encoded dataplane path as handed out by the supplier
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub raw: Vec<u8>,
}

impl DataplaneHandle {
    pub fn new(kind: DataplaneKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }
}

/// What the builder is asked to construct
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityRequest {
    Epic,
    Fabrid {
        /// Hop chain the policies were selected against
        hops: Vec<HopRecord>,
        /// Selected policy per hop, `None` where no policy applies
        selections: Vec<Option<PolicyId>>,
    },
}

impl CapabilityRequest {
    pub fn kind(&self) -> DataplaneKind {
        match self {
            CapabilityRequest::Epic => DataplaneKind::Epic,
            CapabilityRequest::Fabrid { .. } => DataplaneKind::Fabrid,
        }
    }
}

/// Endpoint addressing handed to the dataplane builder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub local_ia: IsdAs,
    pub remote_ia: IsdAs,
    #[serde(default)]
    pub local_host: Option<IpAddr>,
    #[serde(default)]
    pub remote_host: Option<IpAddr>,
}

/// Builds capability dataplanes for selected paths
pub trait DataplaneBuilder {
    /// Build a dataplane of the requested kind for `path`.
    ///
    /// Fails with [`SelectorError::IncompatibleDataplane`] when the path cannot
    /// carry the capability and [`SelectorError::DataplaneConstruction`] for any
    /// other construction failure.
    fn build(
        &self,
        path: &Path,
        request: &CapabilityRequest,
        endpoints: &EndpointConfig,
    ) -> Result<DataplaneHandle>;
}

/// Builder that declares the capability on the handle without key material
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredDataplaneBuilder;

impl DataplaneBuilder for DeclaredDataplaneBuilder {
    fn build(
        &self,
        path: &Path,
        request: &CapabilityRequest,
        _endpoints: &EndpointConfig,
    ) -> Result<DataplaneHandle> {
        match request {
            CapabilityRequest::Epic => {
                if !path.metadata.epic_capable {
                    return Err(SelectorError::IncompatibleDataplane {
                        path: path.id.clone(),
                        required: DataplaneKind::Epic,
                    });
                }
                Ok(DataplaneHandle {
                    kind: DataplaneKind::Epic,
                    policies: Vec::new(),
                    raw: path.dataplane.raw.clone(),
                })
            }
            CapabilityRequest::Fabrid { hops, selections } => {
                if !path.metadata.has_fabrid_hop() {
                    return Err(SelectorError::IncompatibleDataplane {
                        path: path.id.clone(),
                        required: DataplaneKind::Fabrid,
                    });
                }
                let expected = build_hop_chain(path);
                if *hops != expected || selections.len() != hops.len() {
                    return Err(SelectorError::DataplaneConstruction(format!(
                        "hop chain of {} does not match the path",
                        path.id
                    )));
                }
                let policies: Vec<PolicyId> = selections.iter().flatten().copied().collect();
                debug!("Declared FABRID dataplane on {} with {:?}", path.id, policies);
                Ok(DataplaneHandle {
                    kind: DataplaneKind::Fabrid,
                    policies,
                    raw: path.dataplane.raw.clone(),
                })
            }
        }
    }
}

/// A supplied path, optionally carrying a replacement dataplane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedPath {
    pub base: Path,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_dataplane: Option<DataplaneHandle>,
}

impl SelectedPath {
    pub fn plain(base: Path) -> Self {
        Self {
            base,
            override_dataplane: None,
        }
    }

    pub fn with_dataplane(base: Path, dataplane: DataplaneHandle) -> Self {
        Self {
            base,
            override_dataplane: Some(dataplane),
        }
    }

    /// Override if present, else the base path's own dataplane
    pub fn dataplane(&self) -> &DataplaneHandle {
        self.override_dataplane
            .as_ref()
            .unwrap_or(&self.base.dataplane)
    }

    pub fn id(&self) -> &PathId {
        &self.base.id
    }

    pub fn source(&self) -> IsdAs {
        self.base.source
    }

    pub fn destination(&self) -> IsdAs {
        self.base.destination
    }

    pub fn interfaces(&self) -> &[PathInterface] {
        &self.base.interfaces
    }

    pub fn metadata(&self) -> &PathMetadata {
        &self.base.metadata
    }

    pub fn underlay_next_hop(&self) -> Option<SocketAddr> {
        self.base.underlay_next_hop
    }
}

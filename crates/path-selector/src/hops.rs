//! Hop chain construction
//!
//! The daemon describes a path as a flat list of interface crossings: the
//! egress of the source AS, then an ingress/egress pair for every transit AS,
//! then the ingress of the destination AS. FABRID works per AS, so the list
//! is folded into one [`HopRecord`] per traversed AS.
//!
//! ```text
//! (AS1,10) (AS2,20) (AS2,21) (AS3,30)
//!    │        └──┬───┘          │
//!  {0,10}     {20,21}        {30,0}
//! ```

use crate::{InterfaceId, IsdAs, Path, PolicyId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// One AS traversal on a path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HopRecord {
    /// Ingress interface (0 on the first hop)
    pub ingress: InterfaceId,
    /// Egress interface (0 on the last hop)
    pub egress: InterfaceId,
    pub isd_as: IsdAs,
    pub fabrid_enabled: bool,
    pub policies: BTreeSet<PolicyId>,
}

impl HopRecord {
    /// Hop without FABRID annotation
    pub fn new(ingress: InterfaceId, egress: InterfaceId, isd_as: IsdAs) -> Self {
        Self {
            ingress,
            egress,
            isd_as,
            fabrid_enabled: false,
            policies: BTreeSet::new(),
        }
    }

    pub fn offers(&self, policy: &PolicyId) -> bool {
        self.fabrid_enabled && self.policies.contains(policy)
    }
}

/// Fold a path's interface list into one hop per traversed AS
///
/// Each hop is annotated with the FABRID info at its ordinal position; hops
/// past the end of the FABRID array are treated as not enabled.
pub fn build_hop_chain(path: &Path) -> Vec<HopRecord> {
    let interfaces = &path.interfaces;
    let fabrid_info = &path.metadata.fabrid_info;
    let last = interfaces.len().saturating_sub(1);

    let mut hops: Vec<HopRecord> = Vec::with_capacity(interfaces.len() / 2 + 1);
    let mut i = 0;

    while i < interfaces.len() {
        let current = interfaces[i];
        let mut hop = if i == 0 {
            i += 1;
            HopRecord::new(0, current.id, current.isd_as)
        } else if i == last {
            i += 1;
            HopRecord::new(current.id, 0, current.isd_as)
        } else if current.isd_as == interfaces[i + 1].isd_as {
            // Ingress and egress of the same AS
            let egress = interfaces[i + 1].id;
            i += 2;
            HopRecord::new(current.id, egress, current.isd_as)
        } else {
            // Only one interface recorded for this AS
            i += 1;
            HopRecord::new(current.id, 0, current.isd_as)
        };

        if let Some(info) = fabrid_info.get(hops.len()) {
            hop.fabrid_enabled = info.enabled;
            hop.policies = info.policies.iter().copied().collect();
        }

        hops.push(hop);
    }

    debug!("Built {} hops for path {}", hops.len(), path.id);

    hops
}

/// ASes on the reverse path, from `remote` back to `local`, each listed once
pub fn as_trail(path: &Path, local: IsdAs, remote: IsdAs) -> Vec<IsdAs> {
    let mut trail = vec![remote];

    for iface in path.interfaces.iter().rev() {
        if !trail.contains(&iface.isd_as) {
            trail.push(iface.isd_as);
        }
    }

    if !trail.contains(&local) {
        trail.push(local);
    }

    trail
}

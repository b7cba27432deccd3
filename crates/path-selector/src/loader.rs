//! Path sets from JSON files

use crate::dataplane::DataplaneHandle;
use crate::orchestrator::{PathQueryFlags, PathSupplier};
use crate::{IsdAs, Path, PathId, PathInterface, PathMetadata, Result, SelectorError};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use tracing::{debug, info};

/// Sanitize path ID (alphanumeric, dash, underscore, dot only)
fn sanitize_id(id: String) -> String {
    id.chars()
        .filter(|c| c.is_alphanumeric() || "-_.".contains(*c))
        .take(128)
        .collect()
}

/// Raw path from JSON
#[derive(Debug, Deserialize)]
struct RawPath {
    id: Option<String>,
    source: Option<IsdAs>,
    destination: Option<IsdAs>,
    #[serde(default)]
    interfaces: Vec<PathInterface>,
    #[serde(default)]
    metadata: PathMetadata,
    #[serde(default)]
    dataplane: DataplaneHandle,
    underlay_next_hop: Option<SocketAddr>,
    #[serde(default)]
    hidden: bool,
}

/// Container for path set JSON
#[derive(Debug, Deserialize)]
struct RawPathSet {
    local: Option<IsdAs>,
    remote: Option<IsdAs>,
    paths: Vec<RawPath>,
}

/// Paths between one local and one remote AS, loaded from a file
#[derive(Debug, Clone, PartialEq)]
pub struct PathSetFile {
    pub local: IsdAs,
    pub remote: IsdAs,
    pub paths: Vec<Path>,
}

impl PathSetFile {
    /// Load either `{"local", "remote", "paths": [...]}` or a bare array of paths
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading path set from {:?}", path);

        let file = File::open(path)?;
        let raw: serde_json::Value = serde_json::from_reader(BufReader::new(file))?;

        let set: RawPathSet = if raw.get("paths").is_some() {
            serde_json::from_value(raw)?
        } else if raw.is_array() {
            RawPathSet {
                local: None,
                remote: None,
                paths: serde_json::from_value(raw)?,
            }
        } else {
            return Err(SelectorError::PathQueryFailed(format!(
                "{:?} contains no path list",
                path
            )));
        };

        let paths: Vec<Path> = set
            .paths
            .into_iter()
            .enumerate()
            .map(|(i, raw)| {
                let id = sanitize_id(raw.id.unwrap_or_else(|| format!("path-{}", i)));
                let mut path = Path::new(id, raw.interfaces);
                path.source = raw.source.unwrap_or(path.source);
                path.destination = raw.destination.unwrap_or(path.destination);
                path.metadata = raw.metadata;
                path.dataplane = raw.dataplane;
                path.underlay_next_hop = raw.underlay_next_hop;
                path.hidden = raw.hidden;
                path
            })
            .collect();

        let local = set
            .local
            .or_else(|| paths.first().map(|p| p.source))
            .unwrap_or_default();
        let remote = set
            .remote
            .or_else(|| paths.first().map(|p| p.destination))
            .unwrap_or_default();

        info!(
            "Loaded {} paths from {} to {} ({} hidden)",
            paths.len(),
            local,
            remote,
            paths.iter().filter(|p| p.hidden).count()
        );

        Ok(Self {
            local,
            remote,
            paths,
        })
    }

    pub fn get(&self, id: &PathId) -> Option<&Path> {
        self.paths.iter().find(|p| &p.id == id)
    }
}

impl PathSupplier for PathSetFile {
    /// Paths from `src` to `dst`, in file order
    ///
    /// Hidden paths are only returned with `flags.hidden`; FABRID info is
    /// stripped unless `flags.fabrid_maps` is set.
    fn query(&self, src: IsdAs, dst: IsdAs, flags: PathQueryFlags) -> Result<Vec<Path>> {
        if src != self.local || dst != self.remote {
            return Err(SelectorError::PathQueryFailed(format!(
                "path set covers {} -> {}, not {} -> {}",
                self.local, self.remote, src, dst
            )));
        }

        let paths: Vec<Path> = self
            .paths
            .iter()
            .filter(|p| flags.hidden || !p.hidden)
            .map(|p| {
                let mut path = p.clone();
                if !flags.fabrid_maps {
                    path.metadata.fabrid_info.clear();
                }
                path
            })
            .collect();

        debug!(
            "Path query {} -> {} ({:?}): {} of {} paths",
            src,
            dst,
            flags,
            paths.len(),
            self.paths.len()
        );

        Ok(paths)
    }
}

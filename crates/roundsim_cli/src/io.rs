//! Graph and statistics files.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use roundsim_core::{GraphDocument, SimulationStats, Topology};

pub fn read_graph(path: &Path) -> Result<Topology> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("reading graph file {}", path.display()))?;
    let document = GraphDocument::from_json(&json)
        .with_context(|| format!("decoding graph file {}", path.display()))?;
    let topology = Topology::from_document(&document)
        .with_context(|| format!("building topology from {}", path.display()))?;
    Ok(topology)
}

/// Write the current edge set of `topology`.
pub fn save_graph(path: &Path, topology: &Topology) -> Result<()> {
    let json = topology.to_document().to_json()?;
    write(path, &json)
}

pub fn save_stats(path: &Path, stats: &SimulationStats) -> Result<()> {
    let json = stats.to_json()?;
    write(path, &json)
}

fn write(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("writing {}", path.display()))
}

//! Batch experiments: size sweeps with repeated runs, one statistics file per
//! run.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Result;
use roundsim_core::{
    Coordinator, GraphSpec, ProtocolKind, SimError, SimResult, SimulationConfig, Topology,
};
use tracing::info;

use crate::io::save_stats;

/// `MIN,MAX,STEP,REPS` parameters of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sweep {
    pub min: usize,
    pub max: usize,
    pub step: usize,
    pub repetitions: usize,
}

impl Sweep {
    pub fn sizes(&self) -> impl Iterator<Item = usize> {
        (self.min..=self.max).step_by(self.step)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Experiment {
    /// Min-propagation on paths of `i` vertices.
    ExtremaPropagation(Sweep),
    /// HyperLogLog counting on `i × i` grids.
    CountDistinct(Sweep),
}

impl Experiment {
    pub fn sweep(&self) -> Sweep {
        match *self {
            Experiment::ExtremaPropagation(sweep) | Experiment::CountDistinct(sweep) => sweep,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Experiment::ExtremaPropagation(_) => "extremaPropagation",
            Experiment::CountDistinct(_) => "countDistinct",
        }
    }

    fn protocol(&self) -> ProtocolKind {
        match self {
            Experiment::ExtremaPropagation(_) => ProtocolKind::MinPropagation,
            Experiment::CountDistinct(_) => ProtocolKind::Hll,
        }
    }

    fn file_prefix(&self) -> &'static str {
        match self {
            Experiment::ExtremaPropagation(_) => "min_propagation",
            Experiment::CountDistinct(_) => "hll",
        }
    }

    /// Topology for size `i`, with its closed-form diameter.
    fn topology(&self, i: usize) -> SimResult<Topology> {
        let (spec, diameter) = match self {
            Experiment::ExtremaPropagation(_) => (GraphSpec::Path { vertices: i }, i - 1),
            Experiment::CountDistinct(_) => (
                GraphSpec::Grid {
                    height: i,
                    width: i,
                },
                2 * (i - 1),
            ),
        };
        let mut topology = spec.build(0.0)?;
        topology.set_diameter(diameter);
        Ok(topology)
    }

    /// Statistics file of repetition `j` at size `i`.
    pub fn output_path(&self, dir: &Path, i: usize, j: usize) -> PathBuf {
        dir.join(self.name())
            .join(format!("{}_{i}_{j}.json", self.file_prefix()))
    }

    /// Run every size and repetition, returning the files written.
    pub fn run(&self, dir: &Path, seed: Option<u64>) -> Result<Vec<PathBuf>> {
        let sweep = self.sweep();
        let mut written = Vec::new();
        for i in sweep.sizes() {
            let topology = self.topology(i)?;
            for j in 0..sweep.repetitions {
                let mut config = SimulationConfig::default();
                config.seed = seed.map(|s| s.wrapping_add((i * sweep.repetitions + j) as u64));
                let mut coordinator = Coordinator::new(topology.clone(), config)?;
                let stats = coordinator.run_simulation(self.protocol())?;

                let path = self.output_path(dir, i, j);
                save_stats(&path, &stats)?;
                info!(
                    experiment = self.name(),
                    size = i,
                    repetition = j,
                    result = stats.result,
                    rounds = stats.nof_rounds,
                    path = %path.display(),
                    "experiment run saved"
                );
                written.push(path);
            }
        }
        Ok(written)
    }
}

impl fmt::Display for Experiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.sweep();
        write!(
            f,
            "{},{},{},{},{}",
            self.name(),
            s.min,
            s.max,
            s.step,
            s.repetitions
        )
    }
}

impl FromStr for Experiment {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let [name, min, max, step, reps] = parts.as_slice() else {
            return Err(SimError::Configuration(format!(
                "experiment '{s}' must look like NAME,MIN,MAX,STEP,REPETITIONS"
            )));
        };
        let number = |raw: &str| -> SimResult<usize> {
            match raw.parse::<usize>() {
                Ok(v) if v > 0 => Ok(v),
                _ => Err(SimError::Configuration(format!(
                    "experiment '{s}' expects positive integers, got '{raw}'"
                ))),
            }
        };
        let sweep = Sweep {
            min: number(*min)?,
            max: number(*max)?,
            step: number(*step)?,
            repetitions: number(*reps)?,
        };
        if sweep.min > sweep.max {
            return Err(SimError::Configuration(format!(
                "experiment '{s}' has MIN greater than MAX"
            )));
        }
        match *name {
            "extremaPropagation" => Ok(Experiment::ExtremaPropagation(sweep)),
            "countDistinct" => Ok(Experiment::CountDistinct(sweep)),
            other => Err(SimError::Configuration(format!(
                "unknown experiment '{other}' (expected 'extremaPropagation' or 'countDistinct')"
            ))),
        }
    }
}

//! Topology generators selected by a generator spec string such as
//! `grid,4,5` or `regular,10,3`.

use std::fmt;
use std::str::FromStr;

use super::Topology;
use crate::error::{SimError, SimResult};

/// Largest hypercube dimension accepted by the parser.
const MAX_HYPERCUBE_DIMENSION: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphSpec {
    Path { vertices: usize },
    Clique { vertices: usize },
    Grid { height: usize, width: usize },
    Hypercube { dimension: usize },
    /// D-ary tree truncated to `vertices` vertices (breadth-first numbering).
    Tree { vertices: usize, degree: usize },
    /// Circulant `degree`-regular graph.
    Regular { vertices: usize, degree: usize },
    /// `height × width` grid of `clique`-cliques; vertex 0 of every clique is
    /// linked to vertex 0 of its grid neighbors.
    GridOfCliques {
        height: usize,
        width: usize,
        clique: usize,
    },
}

impl GraphSpec {
    /// Vertex count of the graph this spec builds.
    ///
    /// Fails with a configuration error when the count does not fit in a
    /// `usize`.
    pub fn vertex_count(&self) -> SimResult<usize> {
        let count = match *self {
            GraphSpec::Path { vertices }
            | GraphSpec::Clique { vertices }
            | GraphSpec::Tree { vertices, .. }
            | GraphSpec::Regular { vertices, .. } => Some(vertices),
            GraphSpec::Grid { height, width } => height.checked_mul(width),
            GraphSpec::Hypercube { dimension } => u32::try_from(dimension)
                .ok()
                .and_then(|d| 1usize.checked_shl(d)),
            GraphSpec::GridOfCliques {
                height,
                width,
                clique,
            } => height
                .checked_mul(width)
                .and_then(|cells| cells.checked_mul(clique)),
        };
        count.ok_or_else(|| SimError::Configuration(format!("graph type '{self}' is too large")))
    }

    /// Build the topology, assigning reliability `p` to every edge.
    pub fn build(&self, p: f64) -> SimResult<Topology> {
        if !(0.0..=1.0).contains(&p) {
            return Err(SimError::Validation(format!(
                "edge probability {p} is outside [0, 1]"
            )));
        }
        let n = self.vertex_count()?;
        let edges: Vec<(usize, usize)> = match *self {
            GraphSpec::Path { vertices } => (1..vertices).map(|v| (v - 1, v)).collect(),
            GraphSpec::Clique { vertices } => (0..vertices)
                .flat_map(|v| (v + 1..vertices).map(move |w| (v, w)))
                .collect(),
            GraphSpec::Grid { height, width } => grid_edges(height, width),
            GraphSpec::Hypercube { dimension } => (0..n)
                .flat_map(|v| {
                    (0..dimension)
                        .map(move |bit| (v, v ^ (1 << bit)))
                        .filter(|&(v, w)| v < w)
                })
                .collect(),
            GraphSpec::Tree { vertices, degree } => {
                (1..vertices).map(|v| ((v - 1) / degree, v)).collect()
            }
            GraphSpec::Regular { vertices, degree } => regular_edges(vertices, degree)?,
            GraphSpec::GridOfCliques {
                height,
                width,
                clique,
            } => {
                let mut edges = Vec::new();
                for cell in 0..height * width {
                    let base = cell * clique;
                    for v in 0..clique {
                        for w in v + 1..clique {
                            edges.push((base + v, base + w));
                        }
                    }
                }
                edges.extend(
                    grid_edges(height, width)
                        .into_iter()
                        .map(|(a, b)| (a * clique, b * clique)),
                );
                edges
            }
        };
        Topology::from_edges(n, edges, p)
    }
}

fn grid_edges(height: usize, width: usize) -> Vec<(usize, usize)> {
    let mut edges = Vec::new();
    for r in 0..height {
        for c in 0..width {
            let v = r * width + c;
            if c + 1 < width {
                edges.push((v, v + 1));
            }
            if r + 1 < height {
                edges.push((v, v + width));
            }
        }
    }
    edges
}

fn regular_edges(n: usize, degree: usize) -> SimResult<Vec<(usize, usize)>> {
    if !(degree < n && (n % 2 == 0 || degree % 2 == 0)) {
        return Err(SimError::Validation(format!(
            "no {degree}-regular graph on {n} vertices"
        )));
    }
    let mut offsets: Vec<usize> = (1..=degree / 2).collect();
    if degree % 2 == 1 {
        offsets.push(n / 2);
    }
    Ok((0..n)
        .flat_map(|v| offsets.iter().map(move |&d| (v, (v + d) % n)))
        .collect())
}

fn positive(name: &str, raw: Option<&str>) -> SimResult<usize> {
    let raw = raw.ok_or_else(|| {
        SimError::Configuration(format!("graph type '{name}' is missing a parameter"))
    })?;
    match raw.trim().parse::<usize>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(SimError::Configuration(format!(
            "graph type '{name}' expects positive integers, got '{raw}'"
        ))),
    }
}

impl FromStr for GraphSpec {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(',');
        let name = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
        let mut next = || positive(&name, parts.next());

        let spec = match name.as_str() {
            "path" => GraphSpec::Path { vertices: next()? },
            "clique" => GraphSpec::Clique { vertices: next()? },
            "grid" => GraphSpec::Grid {
                height: next()?,
                width: next()?,
            },
            "hypercube" => {
                let dimension = next()?;
                if dimension > MAX_HYPERCUBE_DIMENSION {
                    return Err(SimError::Configuration(format!(
                        "hypercube dimension {dimension} exceeds {MAX_HYPERCUBE_DIMENSION}"
                    )));
                }
                GraphSpec::Hypercube { dimension }
            }
            "tree" => GraphSpec::Tree {
                vertices: next()?,
                degree: next()?,
            },
            "regular" => GraphSpec::Regular {
                vertices: next()?,
                degree: next()?,
            },
            "gridofcliques" => GraphSpec::GridOfCliques {
                height: next()?,
                width: next()?,
                clique: next()?,
            },
            other => {
                return Err(SimError::Configuration(format!(
                    "unknown graph type '{other}'"
                )))
            }
        };
        spec.vertex_count()?;
        Ok(spec)
    }
}

impl fmt::Display for GraphSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphSpec::Path { vertices } => write!(f, "path,{vertices}"),
            GraphSpec::Clique { vertices } => write!(f, "clique,{vertices}"),
            GraphSpec::Grid { height, width } => write!(f, "grid,{height},{width}"),
            GraphSpec::Hypercube { dimension } => write!(f, "hypercube,{dimension}"),
            GraphSpec::Tree { vertices, degree } => write!(f, "tree,{vertices},{degree}"),
            GraphSpec::Regular { vertices, degree } => write!(f, "regular,{vertices},{degree}"),
            GraphSpec::GridOfCliques {
                height,
                width,
                clique,
            } => write!(f, "gridOfCliques,{height},{width},{clique}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(spec: &str) -> Topology {
        spec.parse::<GraphSpec>().unwrap().build(0.1).unwrap()
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(
            "GridOfCliques,2,3,4".parse::<GraphSpec>().unwrap(),
            GraphSpec::GridOfCliques {
                height: 2,
                width: 3,
                clique: 4
            }
        );
    }

    #[test]
    fn test_parse_rejects_unknown_and_malformed() {
        assert!(matches!("star,4".parse::<GraphSpec>(), Err(SimError::Configuration(_))));
        assert!(matches!("grid,4".parse::<GraphSpec>(), Err(SimError::Configuration(_))));
        assert!(matches!("path,0".parse::<GraphSpec>(), Err(SimError::Configuration(_))));
        assert!(matches!("path,x".parse::<GraphSpec>(), Err(SimError::Configuration(_))));
    }

    #[test]
    fn test_oversized_specs_are_rejected() {
        for spec in [
            "grid,4294967296,4294967296",
            "gridOfCliques,4294967296,4294967296,2",
            "gridOfCliques,65536,65536,4294967296",
        ] {
            assert!(
                matches!(spec.parse::<GraphSpec>(), Err(SimError::Configuration(_))),
                "{spec} should be rejected"
            );
        }

        let grid = GraphSpec::Grid {
            height: usize::MAX,
            width: 2,
        };
        assert!(matches!(grid.vertex_count(), Err(SimError::Configuration(_))));
        assert!(matches!(grid.build(0.5), Err(SimError::Configuration(_))));
        let cube = GraphSpec::Hypercube { dimension: 200 };
        assert!(matches!(cube.vertex_count(), Err(SimError::Configuration(_))));

        assert_eq!("hypercube,24".parse::<GraphSpec>().unwrap().vertex_count(), Ok(1 << 24));
    }

    #[test]
    fn test_clique_and_path_shapes() {
        let k = build("clique,6");
        assert_eq!(k.edge_count(), 15);
        assert!((0..6).all(|v| k.degree(v) == 5));
        assert_eq!(k.diameter(), 1);

        let p = build("path,5");
        assert_eq!(p.edge_count(), 4);
        assert_eq!(p.diameter(), 4);
    }

    #[test]
    fn test_grid_and_hypercube_diameters() {
        let g = build("grid,3,4");
        assert_eq!(g.order(), 12);
        assert_eq!(g.edge_count(), 3 * 3 + 2 * 4);
        assert_eq!(g.diameter(), 5);

        let h = build("hypercube,4");
        assert_eq!(h.order(), 16);
        assert!((0..16).all(|v| h.degree(v) == 4));
        assert_eq!(h.diameter(), 4);
    }

    #[test]
    fn test_tree_is_connected_with_n_minus_one_edges() {
        let t = build("tree,10,3");
        assert_eq!(t.edge_count(), 9);
        assert_eq!(t.degree(0), 3);
        assert_eq!(t.diameter(), 4);
    }

    #[test]
    fn test_regular_degrees() {
        let even = build("regular,8,3");
        assert!((0..8).all(|v| even.degree(v) == 3));
        let odd_n = build("regular,7,4");
        assert!((0..7).all(|v| odd_n.degree(v) == 4));
    }

    #[test]
    fn test_infeasible_regular_is_validation_error() {
        let odd = "regular,7,3".parse::<GraphSpec>().unwrap();
        assert!(matches!(odd.build(0.0), Err(SimError::Validation(_))));
        let too_dense = "regular,4,4".parse::<GraphSpec>().unwrap();
        assert!(matches!(too_dense.build(0.0), Err(SimError::Validation(_))));
    }

    #[test]
    fn test_grid_of_cliques_links_clique_heads() {
        let g = build("gridOfCliques,2,2,3");
        assert_eq!(g.order(), 12);
        assert_eq!(g.edge_count(), 4 * 3 + 4);
        assert!(g.edge_exists(0, 3));
        assert!(g.edge_exists(0, 6));
        assert!(!g.edge_exists(1, 4));
    }

    #[test]
    fn test_probability_out_of_range() {
        let spec = GraphSpec::Path { vertices: 3 };
        assert!(matches!(spec.build(1.5), Err(SimError::Validation(_))));
        assert_eq!(spec.build(0.3).unwrap().reliability(0, 1), 0.3);
    }

    #[test]
    fn test_display_parses_back() {
        let spec = GraphSpec::Regular {
            vertices: 10,
            degree: 4,
        };
        assert_eq!(spec.to_string().parse::<GraphSpec>().unwrap(), spec);
    }
}

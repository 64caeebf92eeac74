//! Indexed triangle mesh produced by surface extraction.
//!
//! Cells are triangles; cell ids handed out to picking refer to positions in
//! [`Mesh::triangles`]. Strips are a rendering aid and carry no extra meaning.

use std::collections::HashMap;

pub type Point3 = [f64; 3];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    /// Vertex positions in physical units
    pub vertices: Vec<Point3>,
    pub triangles: Vec<[u32; 3]>,
    pub strips: Vec<Vec<u32>>,
}

impl Mesh {
    pub fn new(vertices: Vec<Point3>, triangles: Vec<[u32; 3]>) -> Self {
        Self {
            vertices,
            triangles,
            strips: Vec::new(),
        }
    }

    pub fn cell_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Position of the first vertex of a cell
    pub fn cell_anchor(&self, cell: usize) -> Option<Point3> {
        let triangle = self.triangles.get(cell)?;
        self.vertices.get(triangle[0] as usize).copied()
    }

    pub fn bounds(&self) -> Option<(Point3, Point3)> {
        let first = *self.vertices.first()?;
        Some(self.vertices.iter().fold((first, first), |(lo, hi), v| {
            (
                [lo[0].min(v[0]), lo[1].min(v[1]), lo[2].min(v[2])],
                [hi[0].max(v[0]), hi[1].max(v[1]), hi[2].max(v[2])],
            )
        }))
    }

    /// Connected component label per triangle, plus the number of components.
    ///
    /// Triangles are connected when they share a vertex.
    pub fn component_labels(&self) -> (Vec<usize>, usize) {
        let mut sets = DisjointSet::new(self.vertices.len());
        for &[a, b, c] in &self.triangles {
            sets.union(a as usize, b as usize);
            sets.union(a as usize, c as usize);
        }

        let mut label_of_root: HashMap<usize, usize> = HashMap::new();
        let labels = self
            .triangles
            .iter()
            .map(|t| {
                let root = sets.find(t[0] as usize);
                let next = label_of_root.len();
                *label_of_root.entry(root).or_insert(next)
            })
            .collect();
        (labels, label_of_root.len())
    }

    /// Keep only the triangles for which `keep` returns true, dropping unused vertices.
    pub fn retain_cells(&self, mut keep: impl FnMut(usize) -> bool) -> Mesh {
        let mut remap = vec![u32::MAX; self.vertices.len()];
        let mut vertices = Vec::new();
        let mut triangles = Vec::new();
        for (cell, triangle) in self.triangles.iter().enumerate() {
            if !keep(cell) {
                continue;
            }
            let mut mapped = [0u32; 3];
            for (slot, &v) in mapped.iter_mut().zip(triangle) {
                let v = v as usize;
                if remap[v] == u32::MAX {
                    remap[v] = vertices.len() as u32;
                    vertices.push(self.vertices[v]);
                }
                *slot = remap[v];
            }
            triangles.push(mapped);
        }
        Mesh::new(vertices, triangles)
    }

    /// Vertex adjacency derived from triangle edges
    pub fn vertex_neighbors(&self) -> Vec<Vec<u32>> {
        let mut neighbors: Vec<Vec<u32>> = vec![Vec::new(); self.vertices.len()];
        for &[a, b, c] in &self.triangles {
            for (from, to) in [(a, b), (b, c), (c, a)] {
                if from == to {
                    continue;
                }
                neighbors[from as usize].push(to);
                neighbors[to as usize].push(from);
            }
        }
        for list in &mut neighbors {
            list.sort_unstable();
            list.dedup();
        }
        neighbors
    }

    /// Greedy triangle strips covering every triangle exactly once.
    pub fn build_strips(&mut self) {
        let mut edge_cells: HashMap<(u32, u32), Vec<usize>> = HashMap::new();
        for (cell, &[a, b, c]) in self.triangles.iter().enumerate() {
            for (u, v) in [(a, b), (b, c), (c, a)] {
                edge_cells.entry(edge_key(u, v)).or_default().push(cell);
            }
        }

        let mut used = vec![false; self.triangles.len()];
        let mut strips = Vec::new();
        for start in 0..self.triangles.len() {
            if used[start] {
                continue;
            }
            used[start] = true;
            let mut strip = self.triangles[start].to_vec();
            loop {
                let n = strip.len();
                let (u, v) = (strip[n - 2], strip[n - 1]);
                let next = edge_cells
                    .get(&edge_key(u, v))
                    .and_then(|cells| cells.iter().copied().find(|&c| !used[c]));
                let Some(cell) = next else { break };
                let Some(&apex) = self.triangles[cell].iter().find(|&&w| w != u && w != v)
                else {
                    break;
                };
                used[cell] = true;
                strip.push(apex);
            }
            strips.push(strip);
        }
        self.strips = strips;
    }
}

fn edge_key(u: u32, v: u32) -> (u32, u32) {
    if u < v { (u, v) } else { (v, u) }
}

struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

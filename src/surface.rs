//! Isosurface extraction and mesh post-processing.
//!
//! The surface is traced with marching tetrahedra: every cube of the voxel
//! lattice is split into the six Kuhn tetrahedra around its main diagonal,
//! which gives a conforming triangulation without the ambiguous cases of the
//! classic cube table. The lattice is padded with one layer of virtual
//! samples that are always outside, so surfaces touching the volume border
//! are closed.

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::debug;

use crate::mesh::{Mesh, Point3};
use crate::volume::VoxelVolume;

/// Corner offsets, indexed `x | y << 1 | z << 2`
const CORNERS: [(isize, isize, isize); 8] = [
    (0, 0, 0),
    (1, 0, 0),
    (0, 1, 0),
    (1, 1, 0),
    (0, 0, 1),
    (1, 0, 1),
    (0, 1, 1),
    (1, 1, 1),
];

/// The six monotone paths from corner 0 to corner 7
const TETRAHEDRA: [[usize; 4]; 6] = [
    [0, 1, 3, 7],
    [0, 1, 5, 7],
    [0, 2, 3, 7],
    [0, 2, 6, 7],
    [0, 4, 5, 7],
    [0, 4, 6, 7],
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Smoothing {
    pub iterations: usize,
    pub relaxation: f64,
}

impl Default for Smoothing {
    fn default() -> Self {
        Self {
            iterations: 15,
            relaxation: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SurfaceExtractor {
    smoothing: Smoothing,
}

impl SurfaceExtractor {
    pub fn new(smoothing: Smoothing) -> Self {
        Self { smoothing }
    }

    /// Extract the surface where `volume` crosses `isovalue`.
    ///
    /// Unless `skip_largest_component_filter` is set, only the largest
    /// connected component is kept and then smoothed. The unfiltered path
    /// returns the raw triangulation, which keeps small or scattered regions
    /// intact. An empty mesh is a valid result.
    pub fn extract(
        &self,
        volume: &VoxelVolume,
        isovalue: i32,
        skip_largest_component_filter: bool,
    ) -> Mesh {
        let mut mesh = march_tetrahedra(volume, f64::from(isovalue));
        debug!(
            isovalue,
            cells = mesh.cell_count(),
            vertices = mesh.vertex_count(),
            "Extracted isosurface"
        );

        if skip_largest_component_filter {
            mesh.build_strips();
            return mesh;
        }

        let filtered = largest_component(&mesh);
        if filtered.is_empty() {
            return filtered;
        }

        let mut smoothed = laplacian_smooth(filtered, self.smoothing);
        smoothed.build_strips();
        smoothed
    }
}

/// Keep the connected component with the most cells
pub fn largest_component(mesh: &Mesh) -> Mesh {
    let (labels, count) = mesh.component_labels();
    if count <= 1 {
        return mesh.clone();
    }

    let mut sizes = vec![0usize; count];
    for &label in &labels {
        sizes[label] += 1;
    }
    // First label wins ties
    let largest = sizes
        .iter()
        .enumerate()
        .fold((0, 0), |best, (label, &size)| {
            if size > best.1 { (label, size) } else { best }
        })
        .0;

    debug!(
        components = count,
        kept_cells = sizes[largest],
        "Filtered to largest component"
    );
    mesh.retain_cells(|cell| labels[cell] == largest)
}

/// Move every vertex towards the mean of its neighbours.
pub fn laplacian_smooth(mut mesh: Mesh, smoothing: Smoothing) -> Mesh {
    let neighbors = mesh.vertex_neighbors();
    for _ in 0..smoothing.iterations {
        let current = &mesh.vertices;
        let next: Vec<Point3> = current
            .par_iter()
            .zip(neighbors.par_iter())
            .map(|(vertex, adjacent)| {
                if adjacent.is_empty() {
                    return *vertex;
                }
                let mut mean = [0.0; 3];
                for &n in adjacent {
                    let p = current[n as usize];
                    mean[0] += p[0];
                    mean[1] += p[1];
                    mean[2] += p[2];
                }
                let count = adjacent.len() as f64;
                [
                    vertex[0] + smoothing.relaxation * (mean[0] / count - vertex[0]),
                    vertex[1] + smoothing.relaxation * (mean[1] / count - vertex[1]),
                    vertex[2] + smoothing.relaxation * (mean[2] / count - vertex[2]),
                ]
            })
            .collect();
        mesh.vertices = next;
    }
    mesh
}

#[derive(Clone, Copy)]
struct Corner {
    id: usize,
    position: Point3,
    value: Option<f64>,
    inside: bool,
}

struct Triangulator {
    vertices: Vec<Point3>,
    triangles: Vec<[u32; 3]>,
    edge_vertices: HashMap<(usize, usize), u32>,
    isovalue: f64,
}

impl Triangulator {
    fn edge_vertex(&mut self, a: &Corner, b: &Corner) -> u32 {
        let key = if a.id < b.id { (a.id, b.id) } else { (b.id, a.id) };
        if let Some(&index) = self.edge_vertices.get(&key) {
            return index;
        }
        let t = match (a.value, b.value) {
            (Some(va), Some(vb)) if va != vb => (self.isovalue - va) / (vb - va),
            // Edges reaching into the padding cross halfway
            _ => 0.5,
        };
        let position = [
            a.position[0] + t * (b.position[0] - a.position[0]),
            a.position[1] + t * (b.position[1] - a.position[1]),
            a.position[2] + t * (b.position[2] - a.position[2]),
        ];
        let index = self.vertices.len() as u32;
        self.vertices.push(position);
        self.edge_vertices.insert(key, index);
        index
    }

    /// Push a triangle whose normal points from `inner` towards `outer`
    fn push_oriented(&mut self, mut triangle: [u32; 3], inner: Point3, outer: Point3) {
        let [a, b, c] = triangle.map(|v| self.vertices[v as usize]);
        let u = sub(b, a);
        let v = sub(c, a);
        let normal = [
            u[1] * v[2] - u[2] * v[1],
            u[2] * v[0] - u[0] * v[2],
            u[0] * v[1] - u[1] * v[0],
        ];
        let direction = sub(outer, inner);
        if dot(normal, direction) < 0.0 {
            triangle.swap(1, 2);
        }
        self.triangles.push(triangle);
    }

    fn tetrahedron(&mut self, corners: [Corner; 4]) {
        let (inside, outside): (Vec<Corner>, Vec<Corner>) =
            corners.iter().partition(|corner| corner.inside);
        if inside.is_empty() || outside.is_empty() {
            return;
        }
        let inner = centroid(&inside);
        let outer = centroid(&outside);

        match (inside.as_slice(), outside.as_slice()) {
            ([p], [q, r, s]) => {
                let t = [
                    self.edge_vertex(p, q),
                    self.edge_vertex(p, r),
                    self.edge_vertex(p, s),
                ];
                self.push_oriented(t, inner, outer);
            }
            ([p, q, r], [s]) => {
                let t = [
                    self.edge_vertex(p, s),
                    self.edge_vertex(q, s),
                    self.edge_vertex(r, s),
                ];
                self.push_oriented(t, inner, outer);
            }
            ([p, q], [r, s]) => {
                let a = self.edge_vertex(p, r);
                let b = self.edge_vertex(p, s);
                let c = self.edge_vertex(q, s);
                let d = self.edge_vertex(q, r);
                self.push_oriented([a, b, c], inner, outer);
                self.push_oriented([a, c, d], inner, outer);
            }
            _ => {}
        }
    }
}

fn march_tetrahedra(volume: &VoxelVolume, isovalue: f64) -> Mesh {
    let (nx, ny, nz) = volume.dim();
    let (dx, dy, dz) = volume.spacing();
    let data = volume.view();
    let (px, py) = (nx + 2, ny + 2);

    let corner = |i: isize, j: isize, k: isize| -> Corner {
        let value = if i >= 0 && j >= 0 && k >= 0 {
            data.get([k as usize, j as usize, i as usize])
                .map(|&v| f64::from(v))
        } else {
            None
        };
        Corner {
            id: (((k + 1) as usize * py) + (j + 1) as usize) * px + (i + 1) as usize,
            position: [i as f64 * dx, j as f64 * dy, k as f64 * dz],
            value,
            inside: value.is_some_and(|v| v >= isovalue),
        }
    };

    let mut triangulator = Triangulator {
        vertices: Vec::new(),
        triangles: Vec::new(),
        edge_vertices: HashMap::new(),
        isovalue,
    };

    for k in -1..nz as isize {
        for j in -1..ny as isize {
            for i in -1..nx as isize {
                let cube = CORNERS.map(|(oi, oj, ok)| corner(i + oi, j + oj, k + ok));
                let inside = cube.iter().filter(|c| c.inside).count();
                if inside == 0 || inside == 8 {
                    continue;
                }
                for tetrahedron in TETRAHEDRA {
                    triangulator.tetrahedron(tetrahedron.map(|c| cube[c]));
                }
            }
        }
    }

    Mesh::new(triangulator.vertices, triangulator.triangles)
}

fn sub(a: Point3, b: Point3) -> Point3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: Point3, b: Point3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn centroid(corners: &[Corner]) -> Point3 {
    let n = corners.len() as f64;
    let sum = corners.iter().fold([0.0; 3], |acc, c| {
        [
            acc[0] + c.position[0],
            acc[1] + c.position[1],
            acc[2] + c.position[2],
        ]
    });
    [sum[0] / n, sum[1] / n, sum[2] / n]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::DecodedVolume;
    use approx::assert_relative_eq;

    fn volume_from_fn(
        (nx, ny, nz): (usize, usize, usize),
        f: impl Fn(usize, usize, usize) -> i16,
    ) -> VoxelVolume {
        let mut data = Vec::with_capacity(nx * ny * nz);
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    data.push(f(i, j, k));
                }
            }
        }
        VoxelVolume::from_decoded(DecodedVolume {
            nx,
            ny,
            nz,
            dx: 1.0,
            dy: 1.0,
            dz: 1.0,
            data,
        })
        .unwrap()
    }

    fn edge_use_counts(mesh: &Mesh) -> HashMap<(u32, u32), usize> {
        let mut counts = HashMap::new();
        for &[a, b, c] in &mesh.triangles {
            for (u, v) in [(a, b), (b, c), (c, a)] {
                let key = if u < v { (u, v) } else { (v, u) };
                *counts.entry(key).or_insert(0) += 1;
            }
        }
        counts
    }

    #[test]
    fn test_single_voxel_gives_closed_surface() {
        let volume = volume_from_fn((3, 3, 3), |i, j, k| {
            if (i, j, k) == (1, 1, 1) { 1000 } else { 0 }
        });
        let mesh = SurfaceExtractor::default().extract(&volume, 100, true);

        assert!(mesh.cell_count() > 0);
        assert!(edge_use_counts(&mesh).values().all(|&n| n == 2));
        for v in &mesh.vertices {
            for c in v {
                assert!(*c > 0.0 && *c < 2.0);
            }
        }
    }

    #[test]
    fn test_isovalue_at_minimum_wraps_whole_volume() {
        let volume = volume_from_fn((2, 2, 2), |_, _, _| 5);
        let mesh = SurfaceExtractor::default().extract(&volume, 5, true);

        let (lo, hi) = mesh.bounds().unwrap();
        for axis in 0..3 {
            assert_relative_eq!(lo[axis], -0.5);
            assert_relative_eq!(hi[axis], 1.5);
        }
        assert!(edge_use_counts(&mesh).values().all(|&n| n == 2));
    }

    #[test]
    fn test_isovalue_above_maximum_is_empty() {
        let volume = volume_from_fn((4, 4, 4), |i, _, _| i as i16 * 10);
        let extractor = SurfaceExtractor::default();
        assert!(extractor.extract(&volume, 500, false).is_empty());
        assert!(extractor.extract(&volume, 500, true).is_empty());
    }

    #[test]
    fn test_component_filter_keeps_largest_region() {
        let volume = volume_from_fn((10, 4, 4), |i, j, k| {
            let small = i == 1 && j == 1 && k == 1;
            let large = (5..=7).contains(&i) && (1..=2).contains(&j) && (1..=2).contains(&k);
            if small || large { 1000 } else { 0 }
        });
        let extractor = SurfaceExtractor::default();

        let raw = extractor.extract(&volume, 200, true);
        assert_eq!(raw.component_labels().1, 2);

        let filtered = extractor.extract(&volume, 200, false);
        assert_eq!(filtered.component_labels().1, 1);
        assert!(filtered.vertices.iter().all(|v| v[0] > 3.0));
    }

    #[test]
    fn test_smoothing_contracts_towards_centre() {
        let volume = volume_from_fn((5, 5, 5), |i, j, k| {
            if (1..=3).contains(&i) && (1..=3).contains(&j) && (1..=3).contains(&k) {
                1000
            } else {
                0
            }
        });
        let raw = largest_component(&march_tetrahedra(&volume, 200.0));
        let smoothed = laplacian_smooth(raw.clone(), Smoothing::default());
        let unchanged = laplacian_smooth(
            raw.clone(),
            Smoothing {
                iterations: 0,
                relaxation: 0.1,
            },
        );

        let spread = |mesh: &Mesh| {
            mesh.vertices
                .iter()
                .map(|v| dot(sub(*v, [2.0; 3]), sub(*v, [2.0; 3])))
                .fold(0.0, f64::max)
        };
        assert_eq!(unchanged, raw);
        assert_eq!(smoothed.cell_count(), raw.cell_count());
        assert!(spread(&smoothed) < spread(&raw));
    }

    #[test]
    fn test_spacing_scales_vertices() {
        let mut volume = volume_from_fn((3, 3, 3), |i, j, k| {
            if (i, j, k) == (1, 1, 1) { 1000 } else { 0 }
        });
        volume = VoxelVolume::new(volume.data().clone(), (2.0, 1.0, 1.0)).unwrap();
        let mesh = SurfaceExtractor::default().extract(&volume, 500, true);
        let (lo, hi) = mesh.bounds().unwrap();
        assert_relative_eq!(lo[0], 1.0);
        assert_relative_eq!(hi[0], 3.0);
    }
}

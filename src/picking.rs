//! Brush picking: selected mesh cells are mapped back onto voxels of a mask layer.
//!
//! A session accumulates cell ids while the pointer is down and commits them
//! on release. Committing scans every voxel of the target (mask) layer and
//! claims or releases those whose physical position lies within the squared
//! distance threshold of the first vertex of any picked cell. The mask mesh
//! is then re-triangulated without the largest-component filter, since a
//! fresh selection is often fragmented.

use std::collections::HashMap;

use ndarray::Zip;
use tracing::{debug, info, warn};

use crate::config::ViewerConfig;
use crate::enums::PickMode;
use crate::error::{Result, ViewerError};
use crate::layers::{LayerId, LayerStack};
use crate::mesh::Point3;
use crate::volume::VoxelVolume;

#[derive(Debug, Clone, PartialEq)]
pub struct PickingSession {
    pub mode: PickMode,
    pub cells: Vec<usize>,
}

/// What a commit changed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommitSummary {
    pub mode: PickMode,
    pub cells: usize,
    pub changed_voxels: usize,
}

#[derive(Debug, Clone)]
pub struct PickingEngine {
    source: Option<LayerId>,
    target: Option<LayerId>,
    session: Option<PickingSession>,
    max_picking_distance: f64,
    max_unpicking_distance: f64,
    picked_value: i16,
}

impl PickingEngine {
    pub fn new(config: &ViewerConfig) -> Self {
        Self {
            source: None,
            target: None,
            session: None,
            max_picking_distance: config.max_picking_distance,
            max_unpicking_distance: config.max_unpicking_distance,
            picked_value: config.picked_value,
        }
    }

    pub fn select_add(&self) -> PickMode {
        PickMode::SelectAdd {
            max_distance: self.max_picking_distance,
        }
    }

    pub fn select_remove(&self) -> PickMode {
        PickMode::SelectRemove {
            max_distance: self.max_unpicking_distance,
        }
    }

    pub fn source(&self) -> Option<LayerId> {
        self.source
    }

    pub fn target(&self) -> Option<LayerId> {
        self.target
    }

    /// Use `source` as the candidate volume and `target` as the mask.
    pub fn bind(&mut self, source: LayerId, target: LayerId) {
        self.source = Some(source);
        self.target = Some(target);
        self.session = None;
    }

    /// Add an empty green mask shaped like `source` and bind both layers.
    pub fn create_mask_layer(&mut self, stack: &mut LayerStack, source: LayerId) -> Result<LayerId> {
        let mask = VoxelVolume::zeros_like(stack.get(source)?.volume());
        let title = format!("Image {}", stack.len() + 1);
        let target = stack.add(mask, title);

        let mut color = stack.get(target)?.color();
        color[0] = 0;
        color[2] = 0;
        stack.set_color(target, color)?;

        self.bind(source, target);
        Ok(target)
    }

    pub fn session(&self) -> Option<&PickingSession> {
        self.session.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Start picking in `mode`, hiding layers that do not take part.
    pub fn enter(&mut self, stack: &mut LayerStack, mode: PickMode) -> Result<()> {
        let (source, target) = self.bound()?;
        stack.get(target)?;
        match mode {
            PickMode::SelectAdd { .. } => {
                stack.get(source)?;
                stack.show_only(&[source, target]);
            }
            PickMode::SelectRemove { .. } => stack.show_only(&[target]),
        }
        debug!(?mode, "Entered picking mode");
        self.session = Some(PickingSession {
            mode,
            cells: Vec::new(),
        });
        Ok(())
    }

    pub fn exit(&mut self) {
        self.session = None;
    }

    /// Leave picking when a session is active, otherwise enter `mode`.
    ///
    /// Returns whether picking is active afterwards.
    pub fn toggle(&mut self, stack: &mut LayerStack, mode: PickMode) -> Result<bool> {
        if self.is_active() {
            debug!("Left picking mode");
            self.exit();
            return Ok(false);
        }
        self.enter(stack, mode)?;
        Ok(true)
    }

    /// Pointer pressed: forget cells from a previous stroke.
    pub fn begin_stroke(&mut self) {
        if let Some(session) = &mut self.session {
            session.cells.clear();
        }
    }

    /// Record a picked cell; ignored outside a session.
    pub fn pick_cell(&mut self, cell: usize) -> bool {
        match &mut self.session {
            Some(session) => {
                session.cells.push(cell);
                true
            }
            None => false,
        }
    }

    pub fn picked_cells(&self) -> &[usize] {
        self.session
            .as_ref()
            .map_or(&[], |session| session.cells.as_slice())
    }

    /// Apply the accumulated cells to the mask and re-triangulate it.
    ///
    /// The cell list is consumed even when the commit is rejected.
    pub fn commit(&mut self, stack: &mut LayerStack) -> Result<CommitSummary> {
        let session = self.session.as_mut().ok_or(ViewerError::NotPicking)?;
        let mode = session.mode;
        let cells = std::mem::take(&mut session.cells);
        let (source, target) = self.bound()?;

        Self::check_sizes(stack, source, target)?;

        let mesh_owner = match mode {
            PickMode::SelectAdd { .. } => source,
            PickMode::SelectRemove { .. } => target,
        };
        let mesh = stack.get(mesh_owner)?.mesh();
        let anchors = cells
            .iter()
            .map(|&cell| {
                mesh.cell_anchor(cell).ok_or(ViewerError::CellOutOfRange {
                    cell,
                    cells: mesh.cell_count(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let grid = PointGrid::new(&anchors, mode.max_distance());
        let picked_value = self.picked_value;

        let changed_voxels = stack.edit_mask(source, target, |source_layer, mask| {
            let candidates = source_layer.volume();
            let hits = Zip::indexed(mask.view()).par_map_collect(|(k, j, i), &current| {
                let eligible = match mode {
                    PickMode::SelectAdd { .. } => {
                        let index = mask.flat_index(i, j, k).ok();
                        let candidate = index.and_then(|index| candidates.value_at(index));
                        current == 0 && candidate.is_some_and(|v| v > 0)
                    }
                    PickMode::SelectRemove { .. } => current > 0,
                };
                eligible && grid.any_within(mask.voxel_to_physical(i, j, k))
            });

            let value = match mode {
                PickMode::SelectAdd { .. } => picked_value,
                PickMode::SelectRemove { .. } => 0,
            };
            let mut changed = 0;
            Zip::from(mask.data_mut()).and(&hits).for_each(|voxel, &hit| {
                if hit {
                    *voxel = value;
                    changed += 1;
                }
            });
            changed
        })?;

        info!(?mode, cells = cells.len(), changed_voxels, "Committed picking stroke");
        Ok(CommitSummary {
            mode,
            cells: cells.len(),
            changed_voxels,
        })
    }

    /// Copy every source voxel into the mask verbatim.
    pub fn pick_all(&mut self, stack: &mut LayerStack) -> Result<()> {
        let (source, target) = self.bound()?;
        Self::check_sizes(stack, source, target)?;

        stack.edit_mask(source, target, |source_layer, mask| {
            let values = source_layer.volume().data().iter();
            for (voxel, &value) in mask.data_mut().iter_mut().zip(values) {
                *voxel = value;
            }
        })?;
        info!(?source, ?target, "Copied source volume into mask");
        Ok(())
    }

    fn bound(&self) -> Result<(LayerId, LayerId)> {
        match (self.source, self.target) {
            (Some(source), Some(target)) => Ok((source, target)),
            _ => Err(ViewerError::NoPickingTarget),
        }
    }

    fn check_sizes(stack: &LayerStack, source: LayerId, target: LayerId) -> Result<()> {
        let source_count = stack.get(source)?.volume().voxel_count();
        let target_count = stack.get(target)?.volume().voxel_count();
        if source_count != target_count {
            warn!(source_count, target_count, "Picking skipped, voxel counts differ");
            return Err(ViewerError::SizeMismatch {
                source_count,
                target_count,
            });
        }
        Ok(())
    }
}

/// Uniform hash grid over picked-cell anchors.
///
/// Buckets are as wide as the match radius, so any point closer than the
/// radius sits in the same or an adjacent bucket.
struct PointGrid {
    bucket_size: f64,
    max_distance: f64,
    buckets: HashMap<(i64, i64, i64), Vec<Point3>>,
}

impl PointGrid {
    fn new(points: &[Point3], max_distance: f64) -> Self {
        let bucket_size = max_distance.sqrt().max(f64::MIN_POSITIVE);
        let mut grid = Self {
            bucket_size,
            max_distance,
            buckets: HashMap::new(),
        };
        if max_distance > 0.0 {
            for &point in points {
                let key = grid.key(point);
                grid.buckets.entry(key).or_default().push(point);
            }
        }
        grid
    }

    fn key(&self, p: Point3) -> (i64, i64, i64) {
        let cell = |c: f64| (c / self.bucket_size).floor() as i64;
        (cell(p[0]), cell(p[1]), cell(p[2]))
    }

    /// True if some anchor lies strictly closer than the squared threshold
    fn any_within(&self, (x, y, z): (f64, f64, f64)) -> bool {
        if self.buckets.is_empty() {
            return false;
        }
        let (bx, by, bz) = self.key([x, y, z]);
        for ox in -1..=1 {
            for oy in -1..=1 {
                for oz in -1..=1 {
                    // Keys saturate for tiny buckets; neighbours past the end do not exist
                    let neighbour = bx
                        .checked_add(ox)
                        .zip(by.checked_add(oy))
                        .zip(bz.checked_add(oz))
                        .map(|((kx, ky), kz)| (kx, ky, kz));
                    let Some(points) = neighbour.and_then(|key| self.buckets.get(&key)) else {
                        continue;
                    };
                    let hit = points.iter().any(|p| {
                        let d = [p[0] - x, p[1] - y, p[2] - z];
                        d[0] * d[0] + d[1] * d[1] + d[2] * d[2] < self.max_distance
                    });
                    if hit {
                        return true;
                    }
                }
            }
        }
        false
    }
}

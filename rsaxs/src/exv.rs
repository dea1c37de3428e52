//! Excluded-volume detection on the voxel grid.
//!
//! Volume cells are split into interior and surface by a radial probe:
//! template directions are walked outwards at increasing distances, and
//! reaching solvent-accessible space raises the cell's openness score.
//! Cells open enough are surface; the rest are interior. Enclosed empty
//! cavities can additionally be relabeled as vacuum and counted as
//! displaced volume.

use crate::body::PointFF;
use crate::config::Settings;
use crate::form_factor::FormFactorType;
use crate::grid::{CellState, Grid};
use arrayvec::ArrayVec;
use nalgebra::Vector3;
use std::collections::VecDeque;

/// The dummy-atom sets encoding the displaced solvent volume.
#[derive(Clone, Debug, Default)]
pub struct ExvAtomSet {
    /// Dummies for fully enclosed volume cells.
    pub interior: Vec<PointFF>,
    /// Dummies for solvent-adjacent volume cells.
    pub surface: Vec<PointFF>,
}

impl ExvAtomSet {
    /// Total number of dummy atoms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.interior.len() + self.surface.len()
    }

    /// Whether no dummies were produced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interior.is_empty() && self.surface.is_empty()
    }

    /// Iterate over interior and surface dummies together.
    pub fn iter(&self) -> impl Iterator<Item = &PointFF> {
        self.interior.iter().chain(&self.surface)
    }
}

// openness contributions per probe shell, and the surface cutoff
const SCORE_NEAR: i32 = 3;
const SCORE_MID: i32 = 5;
const SCORE_OPEN: i32 = 7;
const SURFACE_THRESHOLD: i32 = 42;

fn probe_directions() -> ArrayVec<Vector3<f64>, 26> {
    let mut directions = ArrayVec::new();
    for x in -1..=1 {
        for y in -1..=1 {
            for z in -1..=1 {
                if (x, y, z) == (0, 0, 0) {
                    continue;
                }
                directions.push(Vector3::new(f64::from(x), f64::from(y), f64::from(z)).normalize());
            }
        }
    }
    directions
}

/// Classifies volume cells by a radial openness probe.
pub struct SurfaceDetector {
    offsets: [Vec<[isize; 3]>; 3],
}

impl SurfaceDetector {
    /// Precompute the probe offsets for a grid of voxel width `width`.
    #[must_use]
    pub fn new(width: f64) -> Self {
        let radii = [width.sqrt() + 1e-3, 2.0 * width, 3.0 * width];
        let offsets = radii.map(|radius| {
            probe_directions()
                .iter()
                .map(|direction| {
                    let probe = direction * (radius / width);
                    [
                        probe.x.round() as isize,
                        probe.y.round() as isize,
                        probe.z.round() as isize,
                    ]
                })
                .collect()
        });
        Self { offsets }
    }

    fn probe_state(grid: &Grid, cell: [usize; 3], offset: [isize; 3]) -> Option<CellState> {
        let dims = grid.dims();
        let mut index = [0_usize; 3];
        for axis in 0..3 {
            let probed = cell[axis] as isize + offset[axis];
            if probed < 0 || probed as usize >= dims[axis] {
                return None;
            }
            index[axis] = probed as usize;
        }
        Some(grid.state(index))
    }

    /// The openness score of `cell`: how much solvent-accessible space the
    /// probe template reaches.
    #[must_use]
    pub fn openness(&self, grid: &Grid, cell: [usize; 3]) -> i32 {
        let mut score = 0;
        for direction in 0..self.offsets[0].len() {
            // the first blocked shell caps this direction's contribution;
            // leaving the grid counts as fully open
            let near = Self::probe_state(grid, cell, self.offsets[0][direction]);
            match near {
                None => {
                    score += SCORE_OPEN;
                    continue;
                }
                Some(state) if !state.is_empty_or_water() => continue,
                Some(_) => {}
            }
            let mid = Self::probe_state(grid, cell, self.offsets[1][direction]);
            match mid {
                None => {
                    score += SCORE_OPEN;
                    continue;
                }
                Some(state) if !state.is_empty_or_water() => {
                    score += SCORE_NEAR;
                    continue;
                }
                Some(_) => {}
            }
            let far = Self::probe_state(grid, cell, self.offsets[2][direction]);
            match far {
                None => score += SCORE_OPEN,
                Some(state) if !state.is_empty_or_water() => score += SCORE_MID,
                Some(_) => score += SCORE_OPEN,
            }
        }
        score
    }

    /// Whether `cell` is open enough to count as surface.
    #[must_use]
    pub fn is_surface(&self, grid: &Grid, cell: [usize; 3]) -> bool {
        self.openness(grid, cell) >= SURFACE_THRESHOLD
    }
}

/// Relabel enclosed empty cavities as vacuum. Solvent accessibility is
/// decided by a flood fill from the grid boundary; anything empty the fill
/// cannot reach is vacuum. Returns the number of relabeled cells.
pub fn detect_vacuum(grid: &mut Grid) -> usize {
    let dims = grid.dims();
    let mut queue: VecDeque<[usize; 3]> = VecDeque::new();

    // seed the fill with all accessible boundary cells, marked with the
    // first scratch bit
    for ([x, y, z], state) in grid.iter() {
        let boundary = x == 0
            || y == 0
            || z == 0
            || x == dims[0] - 1
            || y == dims[1] - 1
            || z == dims[2] - 1;
        if boundary && state.is_empty_or_water() {
            queue.push_back([x, y, z]);
        }
    }
    for &cell in &queue {
        grid.mark(cell, CellState::RESERVED_1);
    }

    while let Some(cell) = queue.pop_front() {
        for axis in 0..3 {
            for step in [-1_isize, 1] {
                let probed = cell[axis] as isize + step;
                if probed < 0 || probed as usize >= dims[axis] {
                    continue;
                }
                let mut neighbor = cell;
                neighbor[axis] = probed as usize;
                let state = grid.state(neighbor);
                if state.is_empty_or_water() && !state.contains(CellState::RESERVED_1) {
                    grid.mark(neighbor, CellState::RESERVED_1);
                    queue.push_back(neighbor);
                }
            }
        }
    }

    let unreached: Vec<[usize; 3]> = grid
        .iter()
        .filter(|&(_, state)| state.is_empty_or_water() && !state.contains(CellState::RESERVED_1))
        .map(|(cell, _)| cell)
        .collect();
    for &cell in &unreached {
        grid.mark(cell, CellState::VACUUM | CellState::VOLUME);
    }
    grid.clear_transient();
    unreached.len()
}

/// Produce the dummy-atom sets for `grid`. With `classify` set, volume
/// cells are split into interior and surface and the surface layer is
/// dilated by `settings.surface_thickness`; otherwise every cell lands in
/// the interior list.
pub fn exv_atoms(grid: &mut Grid, settings: &Settings, classify: bool) -> ExvAtomSet {
    if settings.vacuum_detection {
        detect_vacuum(grid);
    }

    let detector = SurfaceDetector::new(grid.width());
    let volume_cells: Vec<[usize; 3]> = grid
        .iter()
        .filter(|&(_, state)| state.is_volume())
        .map(|(cell, _)| cell)
        .collect();

    let mut surface_flags: Vec<bool> = volume_cells
        .iter()
        .map(|&cell| classify && detector.is_surface(grid, cell))
        .collect();

    // dilate the surface layer inward by the configured thickness
    if classify && settings.surface_thickness > 0.0 {
        let reach = (settings.surface_thickness / grid.width()).ceil();
        let reach_sq = (reach * reach) as isize;
        let reach = reach as isize;
        let surface_cells: Vec<[usize; 3]> = volume_cells
            .iter()
            .zip(&surface_flags)
            .filter(|&(_, &surface)| surface)
            .map(|(&cell, _)| cell)
            .collect();
        for (cell, flag) in volume_cells.iter().zip(&mut surface_flags) {
            if *flag {
                continue;
            }
            *flag = surface_cells.iter().any(|other| {
                let mut distance_sq = 0;
                for axis in 0..3 {
                    let delta = cell[axis] as isize - other[axis] as isize;
                    if delta.abs() > reach {
                        return false;
                    }
                    distance_sq += delta * delta;
                }
                distance_sq <= reach_sq
            });
        }
    }

    let mut set = ExvAtomSet::default();
    for (&cell, &surface) in volume_cells.iter().zip(&surface_flags) {
        let center = grid.cell_center(cell);
        let dummy = PointFF {
            pos: center,
            weight: 1.0,
            kind: FormFactorType::Exv,
        };
        if surface {
            set.surface.push(dummy);
        } else {
            set.interior.push(dummy);
        }
    }
    set
}

/// The displaced volume represented by one grid dummy atom: the voxel
/// volume, in Å³.
#[must_use]
pub fn dummy_volume(grid: &Grid) -> f64 {
    grid.width().powi(3)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::body::{Body, Molecule};

    fn blob(radius: f64) -> Molecule {
        // a close-packed ball of carbons, enough to develop an interior
        let mut atoms = Vec::new();
        let steps = radius as isize;
        for x in -steps..=steps {
            for y in -steps..=steps {
                for z in -steps..=steps {
                    let pos = Vector3::new(x as f64, y as f64, z as f64) * 2.0;
                    if pos.norm() <= radius {
                        atoms.push(PointFF::new(pos.x, pos.y, pos.z, 1.0, FormFactorType::C));
                    }
                }
            }
        }
        Molecule::new(vec![Body::new(atoms)])
    }

    #[test]
    fn probe_template_covers_all_directions() {
        assert_eq!(probe_directions().len(), 26);
        let detector = SurfaceDetector::new(1.0);
        assert_eq!(detector.offsets[0].len(), 26);
    }

    #[test]
    fn single_atom_is_all_surface() {
        let molecule = blob(0.5);
        let mut grid = Grid::from_molecule(&molecule, &Settings::default()).unwrap();
        let set = exv_atoms(&mut grid, &Settings::default(), true);
        assert!(!set.is_empty());
        assert!(set.interior.is_empty());
        assert_eq!(set.len(), set.surface.len());
        assert!(set.iter().all(|dummy| dummy.kind == FormFactorType::Exv));
    }

    #[test]
    fn large_blob_develops_an_interior() {
        let molecule = blob(8.0);
        let mut grid = Grid::from_molecule(&molecule, &Settings::default()).unwrap();
        let set = exv_atoms(&mut grid, &Settings::default(), true);
        assert!(!set.interior.is_empty());
        assert!(!set.surface.is_empty());
        assert_eq!(set.len(), grid.volume_cells());
    }

    #[test]
    fn vacuum_fill_finds_enclosed_cavities() {
        // an 11³ hollow box of volume cells with a sealed empty core
        let mut grid = Grid::new(Vector3::zeros(), [11, 11, 11], 1.0);
        for x in 2..9 {
            for y in 2..9 {
                for z in 2..9 {
                    let shell = x == 2 || x == 8 || y == 2 || y == 8 || z == 2 || z == 8;
                    if shell {
                        grid.mark([x, y, z], CellState::A_AREA);
                    }
                }
            }
        }
        let cavity = 5 * 5 * 5;
        let relabeled = detect_vacuum(&mut grid);
        assert_eq!(relabeled, cavity);
        assert!(grid.state([5, 5, 5]).contains(CellState::VACUUM));
        // outside cells stay untouched
        assert!(grid.state([0, 5, 5]).is_empty_or_water());
        assert!(!grid.state([0, 5, 5]).contains(CellState::RESERVED_1));
    }

    #[test]
    fn dummy_volume_is_the_voxel_volume() {
        let grid = Grid::new(Vector3::zeros(), [4, 4, 4], 0.5);
        assert!((dummy_volume(&grid) - 0.125).abs() < 1e-12);
    }
}

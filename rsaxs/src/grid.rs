//! The excluded-volume voxel grid.
//!
//! Atoms mark a center cell plus every cell within their van-der-Waals
//! radius; waters do the same with the fixed hydration radius. A running
//! counter tracks the number of displaced-volume cells, so the grid volume
//! is available without a scan.

use crate::body::Molecule;
use crate::config::Settings;
use crate::constants::{vdw_radius, HYDRATION_RADIUS};
use crate::error::{Error, Result};
use crate::form_factor::FormFactorType;
use bitflags::bitflags;
use nalgebra::Vector3;
use ndarray::Array3;
use std::sync::atomic::{AtomicBool, Ordering};

bitflags! {
    /// Per-cell state flags. A cell may carry any combination; a cell with
    /// no flags set is empty solvent.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct CellState: u8 {
        /// Displaced volume outside any atomic radius.
        const VOLUME = 1 << 0;
        /// An enclosed cavity with no solvent access.
        const VACUUM = 1 << 1;
        /// The cell nearest to an atom center.
        const A_CENTER = 1 << 2;
        /// Within the van-der-Waals radius of an atom.
        const A_AREA = 1 << 3;
        /// The cell nearest to a water center.
        const W_CENTER = 1 << 4;
        /// Within the hydration radius of a water.
        const W_AREA = 1 << 5;
        /// Scratch bit for transient marking passes.
        const RESERVED_1 = 1 << 6;
        /// Scratch bit for transient marking passes.
        const RESERVED_2 = 1 << 7;
    }
}

impl CellState {
    /// Whether the cell counts towards the displaced volume.
    #[must_use]
    pub fn is_volume(self) -> bool {
        self.intersects(Self::A_AREA | Self::VOLUME)
    }

    /// Whether the cell is solvent-accessible: empty or water-flagged
    /// only.
    #[must_use]
    pub fn is_empty_or_water(self) -> bool {
        !self.intersects(Self::VOLUME | Self::VACUUM | Self::A_CENTER | Self::A_AREA)
    }
}

/// A regular 3-D voxel grid over the molecule.
#[derive(Clone, Debug)]
pub struct Grid {
    origin: Vector3<f64>,
    width: f64,
    cells: Array3<CellState>,
    volume: usize,
}

impl Grid {
    /// An empty grid covering `[origin, origin + width·dims]`.
    ///
    /// # Panics
    ///
    /// Panics if `width` is not positive or any dimension is zero.
    #[must_use]
    pub fn new(origin: Vector3<f64>, dims: [usize; 3], width: f64) -> Self {
        assert!(width > 0.0);
        assert!(dims.iter().all(|&dim| dim > 0));
        Self {
            origin,
            width,
            cells: Array3::default(dims),
            volume: 0,
        }
    }

    /// Build a grid sized to `molecule` and mark every atom and water.
    ///
    /// A first-build extent mismatch cannot happen since the extent is
    /// derived from the same coordinates; a cached grid that went stale
    /// through body movement reports [`Error::Geometry`] instead, and the
    /// caller rebuilds through here again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Geometry`] if the molecule has no points.
    pub fn from_molecule(molecule: &Molecule, settings: &Settings) -> Result<Self> {
        let mut min = Vector3::repeat(f64::INFINITY);
        let mut max = Vector3::repeat(f64::NEG_INFINITY);
        for point in molecule.atoms().chain(molecule.waters()) {
            min = min.inf(&point.pos);
            max = max.sup(&point.pos);
        }
        if min.x > max.x {
            return Err(Error::Geometry("cannot grid an empty molecule".into()));
        }

        // pad by the largest marking radius plus one probe layer
        let atom_radius = if settings.exv_radius > 0.0 {
            settings.exv_radius
        } else {
            FormFactorType::iter_atomic()
                .map(vdw_radius)
                .fold(0.0, f64::max)
        };
        let padding = atom_radius.max(settings.min_exv_radius).max(HYDRATION_RADIUS)
            + settings.surface_thickness
            + 2.0 * settings.grid_width;
        let origin = min.map(|value| value - padding);
        let extent = max.map(|value| value + padding) - origin;
        let dims = [
            (extent.x / settings.grid_width).ceil() as usize + 1,
            (extent.y / settings.grid_width).ceil() as usize + 1,
            (extent.z / settings.grid_width).ceil() as usize + 1,
        ];

        let mut grid = Self::new(origin, dims, settings.grid_width);
        for point in molecule.atoms() {
            let radius = if settings.exv_radius > 0.0 {
                settings.exv_radius
            } else {
                vdw_radius(point.kind)
            };
            grid.add_atom(point.pos, radius, settings.min_exv_radius)?;
        }
        for point in molecule.waters() {
            grid.add_water(point.pos)?;
        }
        Ok(grid)
    }

    /// Grid dimensions in cells.
    #[must_use]
    pub fn dims(&self) -> [usize; 3] {
        let (x, y, z) = self.cells.dim();
        [x, y, z]
    }

    /// Voxel edge length in Å.
    #[must_use]
    pub const fn width(&self) -> f64 {
        self.width
    }

    /// The cell containing `pos`, or `None` outside the extent.
    #[must_use]
    pub fn to_cell(&self, pos: Vector3<f64>) -> Option<[usize; 3]> {
        let relative = (pos - self.origin) / self.width;
        if relative.iter().any(|&value| value < 0.0) {
            return None;
        }
        let index = [
            relative.x as usize,
            relative.y as usize,
            relative.z as usize,
        ];
        let dims = self.dims();
        index
            .iter()
            .zip(&dims)
            .all(|(&index, &dim)| index < dim)
            .then_some(index)
    }

    /// The center position of cell `index`.
    #[must_use]
    pub fn cell_center(&self, index: [usize; 3]) -> Vector3<f64> {
        self.origin
            + Vector3::new(
                (index[0] as f64 + 0.5) * self.width,
                (index[1] as f64 + 0.5) * self.width,
                (index[2] as f64 + 0.5) * self.width,
            )
    }

    /// State of cell `index`.
    #[must_use]
    pub fn state(&self, index: [usize; 3]) -> CellState {
        self.cells[index]
    }

    /// Set flags on a cell, keeping the volume counter in step.
    pub fn mark(&mut self, index: [usize; 3], flags: CellState) {
        let before = self.cells[index];
        let after = before | flags;
        if after.is_volume() && !before.is_volume() {
            self.volume += 1;
        }
        self.cells[index] = after;
    }

    /// Clear flags on a cell, keeping the volume counter in step.
    pub fn unmark(&mut self, index: [usize; 3], flags: CellState) {
        let before = self.cells[index];
        let after = before - flags;
        if before.is_volume() && !after.is_volume() {
            self.volume -= 1;
        }
        self.cells[index] = after;
    }

    /// Number of cells currently counted as displaced volume.
    #[must_use]
    pub const fn volume_cells(&self) -> usize {
        self.volume
    }

    /// Displaced volume in Å³.
    #[must_use]
    pub fn volume(&self) -> f64 {
        self.volume as f64 * self.width.powi(3)
    }

    fn mark_sphere(
        &mut self,
        pos: Vector3<f64>,
        inner_radius: f64,
        outer_radius: f64,
        center_flag: CellState,
        inner_flag: CellState,
        outer_flag: CellState,
    ) -> Result<()> {
        let center = self.to_cell(pos).ok_or_else(|| {
            Error::Geometry(format!(
                "point at ({:.2}, {:.2}, {:.2}) lies outside the grid extent",
                pos.x, pos.y, pos.z
            ))
        })?;
        self.mark(center, center_flag);

        let radius = inner_radius.max(outer_radius);
        let reach = (radius / self.width).ceil() as isize;
        let dims = self.dims();
        for dx in -reach..=reach {
            for dy in -reach..=reach {
                for dz in -reach..=reach {
                    let index = [
                        center[0] as isize + dx,
                        center[1] as isize + dy,
                        center[2] as isize + dz,
                    ];
                    if index
                        .iter()
                        .zip(&dims)
                        .any(|(&index, &dim)| index < 0 || index as usize >= dim)
                    {
                        continue;
                    }
                    let index = [index[0] as usize, index[1] as usize, index[2] as usize];
                    let distance = (self.cell_center(index) - pos).norm();
                    if distance <= inner_radius {
                        self.mark(index, inner_flag);
                    } else if distance <= outer_radius {
                        self.mark(index, outer_flag);
                    }
                }
            }
        }
        Ok(())
    }

    /// Mark an atom: the nearest cell as center, cells within
    /// `radius` as atomic area, and cells out to `min_exv_radius` as
    /// displaced volume.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Geometry`] if `pos` lies outside the grid extent.
    pub fn add_atom(&mut self, pos: Vector3<f64>, radius: f64, min_exv_radius: f64) -> Result<()> {
        self.mark_sphere(
            pos,
            radius,
            min_exv_radius,
            CellState::A_CENTER | CellState::A_AREA,
            CellState::A_AREA,
            CellState::VOLUME,
        )
    }

    /// Mark a water: the nearest cell as center plus its hydration
    /// sphere.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Geometry`] if `pos` lies outside the grid extent.
    pub fn add_water(&mut self, pos: Vector3<f64>) -> Result<()> {
        self.mark_sphere(
            pos,
            HYDRATION_RADIUS,
            0.0,
            CellState::W_CENTER | CellState::W_AREA,
            CellState::W_AREA,
            CellState::empty(),
        )
    }

    /// Clear the transient scratch bits everywhere.
    pub fn clear_transient(&mut self) {
        for cell in &mut self.cells {
            *cell -= CellState::RESERVED_1 | CellState::RESERVED_2;
        }
    }

    /// Iterate over all (index, state) cells.
    pub fn iter(&self) -> impl Iterator<Item = ([usize; 3], CellState)> + '_ {
        self.cells
            .indexed_iter()
            .map(|((x, y, z), &state)| ([x, y, z], state))
    }
}

/// The cached grid of `molecule`, rebuilding when absent or stale. A stale
/// cache (atoms moved beyond the extent) is rebuilt once with a warning.
///
/// # Errors
///
/// Propagates [`Error::Geometry`] from the rebuild.
pub fn ensure_grid<'m>(molecule: &'m mut Molecule, settings: &Settings) -> Result<&'m Grid> {
    static WARNED_STALE: AtomicBool = AtomicBool::new(false);
    if molecule.grid().is_none() {
        let grid = Grid::from_molecule(molecule, settings)?;
        molecule.set_grid(grid);
    } else {
        // verify the cached extent still covers every point
        let stale = {
            let grid = molecule.grid().unwrap();
            molecule
                .atoms()
                .chain(molecule.waters())
                .any(|point| grid.to_cell(point.pos).is_none())
        };
        if stale {
            if !WARNED_STALE.swap(true, Ordering::Relaxed) {
                log::warn!("atom coordinates moved beyond the grid extent; rebuilding larger");
            }
            let grid = Grid::from_molecule(molecule, settings)?;
            molecule.set_grid(grid);
        }
    }
    Ok(molecule.grid().unwrap())
}

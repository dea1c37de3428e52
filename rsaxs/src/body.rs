//! Scattering points, movable bodies and the molecule that owns them.

use crate::constants::group_mass;
use crate::form_factor::FormFactorType;
use crate::grid::Grid;
use crate::state::{Signaller, UnboundSignaller};
use nalgebra::{Rotation3, Unit, Vector3};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A single scattering point: position, scattering weight and form-factor
/// type.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointFF {
    /// Position in Å.
    pub pos: Vector3<f64>,
    /// Scattering weight, usually the occupancy-scaled electron count
    /// excess.
    pub weight: f64,
    /// Form-factor type.
    pub kind: FormFactorType,
}

impl PointFF {
    /// Construct a point from coordinates.
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64, weight: f64, kind: FormFactorType) -> Self {
        Self {
            pos: Vector3::new(x, y, z),
            weight,
            kind,
        }
    }
}

/// A rotational replication rule attached to a body.
///
/// Repetition `k` (1-based) places a copy of the body rotated by `k·angle`
/// about `axis` through the origin, then translated by `k·translation`.
#[derive(Clone, Debug, PartialEq)]
pub struct Symmetry {
    /// Rotation axis.
    pub axis: Unit<Vector3<f64>>,
    /// Rotation angle per repetition, in radians.
    pub angle: f64,
    /// Translation per repetition, in Å.
    pub translation: Vector3<f64>,
    /// Number of repetitions beyond the original.
    pub repetitions: usize,
}

impl Symmetry {
    /// Whether the orbit closes: the last repetition lands back on the
    /// original body. Only meaningful for pure rotations.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.angle.abs() > 1e-9
            && self.translation.norm() == 0.0
            && (self.angle * self.repetitions as f64 - std::f64::consts::TAU).abs() < 1e-9
    }

    /// The transform of repetition `k` (1-based) applied to `pos`.
    #[must_use]
    pub fn apply(&self, pos: &Vector3<f64>, k: usize) -> Vector3<f64> {
        let rotation = Rotation3::from_axis_angle(&self.axis, self.angle * k as f64);
        rotation * pos + self.translation * k as f64
    }
}

fn next_body_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// An independently movable substructure: atoms, an optional hydration
/// shell and optional symmetry descriptors.
#[derive(Clone, Debug)]
pub struct Body {
    id: u64,
    atoms: Vec<PointFF>,
    waters: Vec<PointFF>,
    symmetry: Vec<Symmetry>,
    signaller: Arc<dyn Signaller>,
}

impl Body {
    /// A body from atomic points only.
    #[must_use]
    pub fn new(atoms: Vec<PointFF>) -> Self {
        Self::with_waters(atoms, Vec::new())
    }

    /// A body from atomic points and hydration waters.
    #[must_use]
    pub fn with_waters(atoms: Vec<PointFF>, waters: Vec<PointFF>) -> Self {
        Self {
            id: next_body_id(),
            atoms,
            waters,
            symmetry: Vec::new(),
            signaller: Arc::new(UnboundSignaller),
        }
    }

    /// The process-unique id of this body.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// The atomic points.
    #[must_use]
    pub fn atoms(&self) -> &[PointFF] {
        &self.atoms
    }

    /// The hydration-shell points.
    #[must_use]
    pub fn waters(&self) -> &[PointFF] {
        &self.waters
    }

    /// The symmetry descriptors.
    #[must_use]
    pub fn symmetry(&self) -> &[Symmetry] {
        &self.symmetry
    }

    /// Attach a symmetry descriptor. Raises an internal-change signal
    /// since the replicated structure changes.
    pub fn add_symmetry(&mut self, symmetry: Symmetry) {
        self.symmetry.push(symmetry);
        self.signaller.modified_internal();
    }

    /// Replace the atomic points. Raises an internal-change signal.
    pub fn set_atoms(&mut self, atoms: Vec<PointFF>) {
        self.atoms = atoms;
        self.signaller.modified_internal();
    }

    /// Replace the hydration shell. Raises a hydration signal.
    pub fn set_waters(&mut self, waters: Vec<PointFF>) {
        self.waters = waters;
        self.signaller.modified_hydration();
    }

    /// Translate every contained coordinate by `shift`. Raises an
    /// external-change signal.
    pub fn translate(&mut self, shift: Vector3<f64>) {
        for point in self.atoms.iter_mut().chain(&mut self.waters) {
            point.pos += shift;
        }
        self.signaller.modified_external();
    }

    /// Rotate every contained coordinate about the origin. Raises an
    /// external-change signal.
    pub fn rotate(&mut self, rotation: &Rotation3<f64>) {
        for point in self.atoms.iter_mut().chain(&mut self.waters) {
            point.pos = rotation * point.pos;
        }
        self.signaller.modified_external();
    }

    /// Replace this body's signaller with one bound to a manager's state
    /// table.
    pub fn bind_signaller(&mut self, signaller: Arc<dyn Signaller>) {
        self.signaller = signaller;
    }

    /// Total mass of the atomic points, in amu.
    #[must_use]
    pub fn mass(&self) -> f64 {
        self.atoms.iter().map(|point| group_mass(point.kind)).sum()
    }
}

/// An ordered set of bodies with a cached excluded-volume grid.
///
/// The cached grid always reflects the current atom positions: any
/// mutation access drops it.
#[derive(Clone, Debug, Default)]
pub struct Molecule {
    bodies: Vec<Body>,
    grid: Option<Grid>,
}

impl Molecule {
    /// A molecule from its bodies.
    #[must_use]
    pub fn new(bodies: Vec<Body>) -> Self {
        Self { bodies, grid: None }
    }

    /// The contained bodies.
    #[must_use]
    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    /// Number of bodies.
    #[must_use]
    pub fn size(&self) -> usize {
        self.bodies.len()
    }

    /// Mutable access to body `index`. Drops the cached grid, since the
    /// caller may move atoms.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn body_mut(&mut self, index: usize) -> &mut Body {
        self.grid = None;
        &mut self.bodies[index]
    }

    /// Iterate over all atomic points of all bodies.
    pub fn atoms(&self) -> impl Iterator<Item = &PointFF> {
        self.bodies.iter().flat_map(|body| body.atoms().iter())
    }

    /// Iterate over all hydration points of all bodies.
    pub fn waters(&self) -> impl Iterator<Item = &PointFF> {
        self.bodies.iter().flat_map(|body| body.waters().iter())
    }

    /// Total number of atomic points.
    #[must_use]
    pub fn atom_count(&self) -> usize {
        self.bodies.iter().map(|body| body.atoms().len()).sum()
    }

    /// Total number of hydration points.
    #[must_use]
    pub fn water_count(&self) -> usize {
        self.bodies.iter().map(|body| body.waters().len()).sum()
    }

    /// Translate the molecule so its center of mass sits at the origin.
    pub fn center(&mut self) {
        let mut total_mass = 0.0;
        let mut weighted = Vector3::zeros();
        for body in &self.bodies {
            for point in body.atoms() {
                let mass = group_mass(point.kind);
                total_mass += mass;
                weighted += point.pos * mass;
            }
        }
        if total_mass == 0.0 {
            return;
        }
        let shift = -weighted / total_mass;
        self.grid = None;
        for body in &mut self.bodies {
            body.translate(shift);
        }
    }

    /// An upper bound on the largest interatomic distance, from the
    /// bounding box diagonal. Used to size the distance axis.
    #[must_use]
    pub fn diameter_bound(&self) -> f64 {
        let mut min = Vector3::repeat(f64::INFINITY);
        let mut max = Vector3::repeat(f64::NEG_INFINITY);
        for point in self.atoms().chain(self.waters()) {
            min = min.inf(&point.pos);
            max = max.sup(&point.pos);
        }
        if min.x > max.x {
            return 0.0;
        }
        (max - min).norm()
    }

    /// The cached grid, if a build populated it and no mutation dropped
    /// it since.
    #[must_use]
    pub const fn grid(&self) -> Option<&Grid> {
        self.grid.as_ref()
    }

    /// Install a freshly built grid as the cache.
    pub fn set_grid(&mut self, grid: Grid) {
        self.grid = Some(grid);
    }

    /// Mutable access to the cached grid, for in-place classification
    /// passes.
    pub fn grid_mut(&mut self) -> Option<&mut Grid> {
        self.grid.as_mut()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use float_cmp::assert_approx_eq;

    fn carbon(x: f64, y: f64, z: f64) -> PointFF {
        PointFF::new(x, y, z, 1.0, FormFactorType::C)
    }

    #[test]
    fn body_ids_are_unique() {
        let a = Body::new(vec![carbon(0.0, 0.0, 0.0)]);
        let b = Body::new(vec![carbon(1.0, 0.0, 0.0)]);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn translate_then_undo_restores_coordinates() {
        let mut body = Body::new(vec![carbon(1.0, 2.0, 3.0)]);
        let original = body.atoms()[0].pos;
        let shift = Vector3::new(0.5, -1.5, 2.0);
        body.translate(shift);
        body.translate(-shift);
        assert_eq!(body.atoms()[0].pos, original);
    }

    #[test]
    fn centering_moves_center_of_mass_to_origin() {
        let mut molecule = Molecule::new(vec![Body::new(vec![
            carbon(2.0, 0.0, 0.0),
            carbon(4.0, 0.0, 0.0),
        ])]);
        molecule.center();
        let center: Vector3<f64> =
            molecule.atoms().map(|point| point.pos).sum::<Vector3<f64>>() / 2.0;
        assert_approx_eq!(f64, center.norm(), 0.0, epsilon = 1e-12);
        assert_approx_eq!(f64, molecule.atoms().next().unwrap().pos.x, -1.0);
    }

    #[test]
    fn diameter_bound_covers_extremes() {
        let molecule = Molecule::new(vec![Body::new(vec![
            carbon(-1.0, -1.0, -1.0),
            carbon(1.0, 1.0, 1.0),
        ])]);
        assert_approx_eq!(f64, molecule.diameter_bound(), 12.0_f64.sqrt());
        assert_approx_eq!(f64, Molecule::default().diameter_bound(), 0.0);
    }

    #[test]
    fn closed_symmetry_detection() {
        let threefold = Symmetry {
            axis: Vector3::z_axis(),
            angle: std::f64::consts::TAU / 3.0,
            translation: Vector3::zeros(),
            repetitions: 3,
        };
        assert!(threefold.is_closed());

        let open = Symmetry {
            repetitions: 2,
            ..threefold.clone()
        };
        assert!(!open.is_closed());

        let screw = Symmetry {
            translation: Vector3::new(0.0, 0.0, 5.0),
            ..threefold
        };
        assert!(!screw.is_closed());
    }

    #[test]
    fn symmetry_transform_rotates_and_shifts() {
        let symmetry = Symmetry {
            axis: Vector3::z_axis(),
            angle: std::f64::consts::FRAC_PI_2,
            translation: Vector3::new(0.0, 0.0, 1.0),
            repetitions: 2,
        };
        let moved = symmetry.apply(&Vector3::new(1.0, 0.0, 0.0), 1);
        assert_approx_eq!(f64, moved.x, 0.0, epsilon = 1e-12);
        assert_approx_eq!(f64, moved.y, 1.0, epsilon = 1e-12);
        assert_approx_eq!(f64, moved.z, 1.0, epsilon = 1e-12);

        let twice = symmetry.apply(&Vector3::new(1.0, 0.0, 0.0), 2);
        assert_approx_eq!(f64, twice.x, -1.0, epsilon = 1e-12);
        assert_approx_eq!(f64, twice.z, 2.0, epsilon = 1e-12);
    }
}

//! Atomic form factors and their precomputed products.
//!
//! Atomic and implicit-hydrogen group amplitudes use the standard
//! five-Gaussian parameterization f(q) = Σₖ aₖ·exp(−bₖ·q²) + c. Excluded
//! volume dummies use a single Gaussian parameterized by the displaced
//! volume.

use crate::constants::SOLVENT_ELECTRON_DENSITY;
use ndarray::{Array1, Array2, Array3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// The number of distinct scattering types, including the excluded-volume
/// dummy type. Usable to dimension per-type arrays.
pub const COUNT: usize = 15;

/// The number of distinct scattering types excluding the excluded-volume
/// dummy type.
pub const COUNT_WITHOUT_EXV: usize = 14;

/// The scattering type assigned to hydration-shell waters.
pub const WATER: FormFactorType = FormFactorType::OH;

/// The scattering type of an atom or atomic group.
///
/// Implicit-hydrogen groups (`CH`, `NH2`, ...) carry the combined amplitude
/// of the heavy atom and its bound hydrogens. `Exv` is reserved for
/// excluded-volume dummy atoms. Variants are indexable via
/// [`Self::as_index`] for table lookups.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[allow(missing_docs)]
pub enum FormFactorType {
    H,
    C,
    CH,
    CH2,
    CH3,
    N,
    NH,
    NH2,
    NH3,
    O,
    OH,
    S,
    SH,
    Other,
    Exv,
}

impl FormFactorType {
    /// Returns the table index of this type, in `0..COUNT`.
    #[must_use]
    pub const fn as_index(self) -> usize {
        self as usize
    }

    /// Returns the type with table index `index`, or `None` when out of
    /// range.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::H),
            1 => Some(Self::C),
            2 => Some(Self::CH),
            3 => Some(Self::CH2),
            4 => Some(Self::CH3),
            5 => Some(Self::N),
            6 => Some(Self::NH),
            7 => Some(Self::NH2),
            8 => Some(Self::NH3),
            9 => Some(Self::O),
            10 => Some(Self::OH),
            11 => Some(Self::S),
            12 => Some(Self::SH),
            13 => Some(Self::Other),
            14 => Some(Self::Exv),
            _ => None,
        }
    }

    /// Iterate over all types except the excluded-volume dummy type.
    pub fn iter_atomic() -> impl Iterator<Item = Self> {
        (0..COUNT_WITHOUT_EXV).map(|index| Self::from_index(index).unwrap())
    }

    /// Returns the type of a bare element.
    #[must_use]
    pub const fn from_element(element: crate::constants::Element) -> Self {
        use crate::constants::Element;
        match element {
            Element::H => Self::H,
            Element::C => Self::C,
            Element::N => Self::N,
            Element::O => Self::O,
            Element::S => Self::S,
            _ => Self::Other,
        }
    }

    /// Returns the group type of an element with `hydrogens` implicit
    /// hydrogens attached. Unsupported combinations keep the bare element
    /// type.
    #[must_use]
    pub const fn with_hydrogens(element: crate::constants::Element, hydrogens: u32) -> Self {
        use crate::constants::Element;
        match (element, hydrogens) {
            (Element::C, 1) => Self::CH,
            (Element::C, 2) => Self::CH2,
            (Element::C, 3) => Self::CH3,
            (Element::N, 1) => Self::NH,
            (Element::N, 2) => Self::NH2,
            (Element::N, 3) => Self::NH3,
            (Element::O, 1) => Self::OH,
            (Element::S, 1) => Self::SH,
            _ => Self::from_element(element),
        }
    }
}

impl fmt::Display for FormFactorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::H => "H",
            Self::C => "C",
            Self::CH => "CH",
            Self::CH2 => "CH2",
            Self::CH3 => "CH3",
            Self::N => "N",
            Self::NH => "NH",
            Self::NH2 => "NH2",
            Self::NH3 => "NH3",
            Self::O => "O",
            Self::OH => "OH",
            Self::S => "S",
            Self::SH => "SH",
            Self::Other => "OTH",
            Self::Exv => "EXV",
        };
        f.write_str(name)
    }
}

/// A five-Gaussian form factor f(q) = Σₖ aₖ·exp(−bₖ·q²) + c, with the bₖ
/// already converted from the tabulated s = q/4π convention.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FormFactor {
    a: [f64; 5],
    b: [f64; 5],
    c: f64,
}

// q = 4πs, so tabulated exponents shrink by (4π)².
const S_TO_Q: f64 = 1.0 / (16.0 * std::f64::consts::PI * std::f64::consts::PI);

impl FormFactor {
    fn from_s_units(a: [f64; 5], b: [f64; 5], c: f64) -> Self {
        Self {
            a,
            b: b.map(|value| value * S_TO_Q),
            c,
        }
    }

    /// Evaluate the form factor at momentum transfer `q` (Å⁻¹).
    #[must_use]
    pub fn evaluate(&self, q: f64) -> f64 {
        self.a
            .iter()
            .zip(&self.b)
            .map(|(a, b)| a * (-b * q * q).exp())
            .sum::<f64>()
            + self.c
    }

    /// The forward amplitude f(0), the number of electrons of the group.
    #[must_use]
    pub fn at_zero(&self) -> f64 {
        self.a.iter().sum::<f64>() + self.c
    }
}

/// Look up the form factor for an atomic scattering type.
///
/// # Panics
///
/// Panics when called with [`FormFactorType::Exv`]; excluded-volume dummies
/// are described by [`ExvFormFactor`] instead.
#[must_use]
pub fn form_factor(kind: FormFactorType) -> &'static FormFactor {
    assert!(kind != FormFactorType::Exv);
    &atomic_table()[kind.as_index()]
}

fn atomic_table() -> &'static [FormFactor; COUNT_WITHOUT_EXV] {
    static TABLE: OnceLock<[FormFactor; COUNT_WITHOUT_EXV]> = OnceLock::new();
    TABLE.get_or_init(|| {
        [
            // H: International Tables for Crystallography
            FormFactor::from_s_units(
                [0.489918, 0.262003, 0.196767, 0.049879, 0.0],
                [20.6593, 7.74039, 49.5519, 2.20159, 0.0],
                0.001305,
            ),
            // C: Waasmaier & Kirfel
            FormFactor::from_s_units(
                [2.657506, 1.078079, 1.490909, -4.241070, 0.713791],
                [14.780758, 0.776775, 42.086843, -0.000294, 0.239535],
                4.297983,
            ),
            // CH, CH2, CH3 (sp3): Grudinin, Garkavenko & Kazennov
            FormFactor::from_s_units(
                [2.909530, 0.485267, 1.516151, 0.206905, 1.541626],
                [13.933084, 23.221524, 41.990403, 4.974183, 0.679266],
                0.337670,
            ),
            FormFactor::from_s_units(
                [3.275723, 0.870037, 1.534606, 0.395078, 1.544562],
                [13.408502, 23.785175, 41.922444, 5.019072, 0.724439],
                0.377096,
            ),
            FormFactor::from_s_units(
                [3.681341, 1.228691, 1.549320, 0.574033, 1.554377],
                [13.026207, 24.131974, 41.869426, 4.984373, 0.765769],
                0.409294,
            ),
            // N: Waasmaier & Kirfel
            FormFactor::from_s_units(
                [11.893780, 3.277479, 1.858092, 0.858927, 0.912985],
                [0.000158, 10.232723, 30.344690, 0.656065, 0.217287],
                -11.804902,
            ),
            // NH, NH2, NH3: Grudinin, Garkavenko & Kazennov
            FormFactor::from_s_units(
                [1.650531, 0.429639, 2.144736, 1.851894, 1.408921],
                [10.603730, 6.987283, 29.939901, 10.573859, 0.611678],
                0.510589,
            ),
            FormFactor::from_s_units(
                [1.904157, 1.942536, 2.435585, 0.730512, 1.379728],
                [10.803702, 10.792421, 29.610479, 6.847755, 0.709687],
                0.603738,
            ),
            FormFactor::from_s_units(
                [1.882162, 1.933200, 2.465843, 0.927311, 1.190889],
                [10.975157, 10.956008, 29.208572, 6.663555, 0.843650],
                0.597322,
            ),
            // O: Waasmaier & Kirfel
            FormFactor::from_s_units(
                [2.960427, 2.508818, 0.637853, 0.722838, 1.142756],
                [14.182259, 5.936858, 0.112726, 34.958481, 0.390240],
                0.027014,
            ),
            // OH (alcohol): Grudinin, Garkavenko & Kazennov
            FormFactor::from_s_units(
                [0.456221, 3.219608, 0.812773, 2.666928, 1.380927],
                [21.503498, 13.397134, 34.547137, 5.826620, 0.412902],
                0.463202,
            ),
            // S: Waasmaier & Kirfel
            FormFactor::from_s_units(
                [6.362157, 5.154568, 1.473732, 1.635073, 1.209372],
                [1.514347, 22.092528, 0.061373, 55.445176, 0.646925],
                0.154722,
            ),
            // SH: Grudinin, Garkavenko & Kazennov
            FormFactor::from_s_units(
                [0.570042, 6.337416, 1.641643, 5.398549, 1.527982],
                [11.447986, 1.197657, 55.401032, 22.420955, 2.356552],
                1.523944,
            ),
            // Other: argon, Waasmaier & Kirfel
            FormFactor::from_s_units(
                [7.188004, 6.638454, 0.454180, 1.929593, 1.523654],
                [0.956221, 15.339877, 15.339862, 39.043824, 0.062409],
                0.265954,
            ),
        ]
    })
}

/// The single-Gaussian form factor of an excluded-volume dummy atom,
/// parameterized by the displaced volume V:
/// `f(q) = ρ_w·V·exp(−(V^{2/3}/4π)·q²)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExvFormFactor {
    volume: f64,
    exponent: f64,
}

impl ExvFormFactor {
    /// Construct the dummy-atom form factor for displaced volume `volume`
    /// in Å³.
    ///
    /// # Panics
    ///
    /// Panics if `volume` is not positive.
    #[must_use]
    pub fn new(volume: f64) -> Self {
        assert!(volume > 0.0);
        Self {
            volume,
            exponent: volume.powf(2.0 / 3.0) / (4.0 * std::f64::consts::PI),
        }
    }

    /// The displaced volume in Å³.
    #[must_use]
    pub const fn volume(&self) -> f64 {
        self.volume
    }

    /// Evaluate the form factor at momentum transfer `q` (Å⁻¹).
    #[must_use]
    pub fn evaluate(&self, q: f64) -> f64 {
        SOLVENT_ELECTRON_DENSITY * self.volume * (-self.exponent * q * q).exp()
    }
}

/// Precomputed form-factor products on a fixed q sampling.
///
/// Lookups are O(1) by (type, type, q-bin); the tables are built once per
/// (q-axis, exv-volume) pair and shared read-only afterwards.
pub struct FormFactorProducts {
    aa: Array3<f64>,
    ax: Array2<f64>,
    xx: Array1<f64>,
}

impl FormFactorProducts {
    /// Build the product tables on the q values `q`, with excluded-volume
    /// dummies of displaced volume `exv_volume`.
    #[must_use]
    pub fn new(q: &[f64], exv_volume: f64) -> Self {
        let exv = ExvFormFactor::new(exv_volume);
        let evaluated: Vec<Vec<f64>> = (0..COUNT_WITHOUT_EXV)
            .map(|index| {
                let ff = &atomic_table()[index];
                q.iter().map(|&q| ff.evaluate(q)).collect()
            })
            .collect();
        let exv_evaluated: Vec<f64> = q.iter().map(|&q| exv.evaluate(q)).collect();

        let mut aa = Array3::zeros((COUNT_WITHOUT_EXV, COUNT_WITHOUT_EXV, q.len()));
        let mut ax = Array2::zeros((COUNT_WITHOUT_EXV, q.len()));
        let mut xx = Array1::zeros(q.len());
        for t1 in 0..COUNT_WITHOUT_EXV {
            for t2 in t1..COUNT_WITHOUT_EXV {
                for bin in 0..q.len() {
                    let product = evaluated[t1][bin] * evaluated[t2][bin];
                    aa[[t1, t2, bin]] = product;
                    aa[[t2, t1, bin]] = product;
                }
            }
            for bin in 0..q.len() {
                ax[[t1, bin]] = evaluated[t1][bin] * exv_evaluated[bin];
            }
        }
        for bin in 0..q.len() {
            xx[bin] = exv_evaluated[bin] * exv_evaluated[bin];
        }
        Self { aa, ax, xx }
    }

    /// Product f_{t1}(q)·f_{t2}(q) at q-bin `bin`.
    #[must_use]
    pub fn aa(&self, t1: FormFactorType, t2: FormFactorType, bin: usize) -> f64 {
        self.aa[[t1.as_index(), t2.as_index(), bin]]
    }

    /// Product f_t(q)·f_exv(q) at q-bin `bin`.
    #[must_use]
    pub fn ax(&self, t: FormFactorType, bin: usize) -> f64 {
        self.ax[[t.as_index(), bin]]
    }

    /// Product f_exv(q)² at q-bin `bin`.
    #[must_use]
    pub fn xx(&self, bin: usize) -> f64 {
        self.xx[bin]
    }
}

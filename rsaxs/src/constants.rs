//! Read-only physical tables: element properties, displaced volumes and
//! solvent constants.

use crate::error::{Error, Result};
use crate::form_factor::FormFactorType;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::{OnceLock, RwLock, RwLockReadGuard};

/// Electron density of bulk water in e/Å³.
pub const SOLVENT_ELECTRON_DENSITY: f64 = 0.334;

/// Effective radius of a water molecule in the hydration shell, in Å.
pub const HYDRATION_RADIUS: f64 = 1.5;

/// Chemical elements recognized in structure input.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[allow(missing_docs)]
pub enum Element {
    H,
    He,
    Li,
    Be,
    B,
    C,
    N,
    O,
    F,
    Ne,
    Na,
    Mg,
    Al,
    Si,
    P,
    S,
    Cl,
    Ar,
    K,
    Ca,
    Fe,
    Co,
    Ni,
    Cu,
    Zn,
    W,
}

impl Element {
    /// Parse an element symbol as it appears in a structure record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for symbols outside the supported set.
    pub fn parse(symbol: &str) -> Result<Self> {
        let symbol = symbol.trim();
        match symbol {
            "H" | "D" => Ok(Self::H),
            "He" | "HE" => Ok(Self::He),
            "Li" | "LI" => Ok(Self::Li),
            "Be" | "BE" => Ok(Self::Be),
            "B" => Ok(Self::B),
            "C" => Ok(Self::C),
            "N" => Ok(Self::N),
            "O" => Ok(Self::O),
            "F" => Ok(Self::F),
            "Ne" | "NE" => Ok(Self::Ne),
            "Na" | "NA" => Ok(Self::Na),
            "Mg" | "MG" => Ok(Self::Mg),
            "Al" | "AL" => Ok(Self::Al),
            "Si" | "SI" => Ok(Self::Si),
            "P" => Ok(Self::P),
            "S" => Ok(Self::S),
            "Cl" | "CL" => Ok(Self::Cl),
            "Ar" | "AR" => Ok(Self::Ar),
            "K" => Ok(Self::K),
            "Ca" | "CA" => Ok(Self::Ca),
            "Fe" | "FE" => Ok(Self::Fe),
            "Co" | "CO" => Ok(Self::Co),
            "Ni" | "NI" => Ok(Self::Ni),
            "Cu" | "CU" => Ok(Self::Cu),
            "Zn" | "ZN" => Ok(Self::Zn),
            "W" => Ok(Self::W),
            _ => Err(Error::InvalidInput(format!(
                "unknown element symbol \"{symbol}\""
            ))),
        }
    }

    /// Returns the element symbol as written in structure records.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::H => "H",
            Self::He => "He",
            Self::Li => "Li",
            Self::Be => "Be",
            Self::B => "B",
            Self::C => "C",
            Self::N => "N",
            Self::O => "O",
            Self::F => "F",
            Self::Ne => "Ne",
            Self::Na => "Na",
            Self::Mg => "Mg",
            Self::Al => "Al",
            Self::Si => "Si",
            Self::P => "P",
            Self::S => "S",
            Self::Cl => "Cl",
            Self::Ar => "Ar",
            Self::K => "K",
            Self::Ca => "Ca",
            Self::Fe => "Fe",
            Self::Co => "Co",
            Self::Ni => "Ni",
            Self::Cu => "Cu",
            Self::Zn => "Zn",
            Self::W => "W",
        }
    }

    /// Returns the atomic mass in amu.
    #[must_use]
    pub const fn mass(self) -> f64 {
        match self {
            Self::H => 1.0079,
            Self::He => 4.0026,
            Self::Li => 6.941,
            Self::Be => 9.0122,
            Self::B => 10.811,
            Self::C => 12.0107,
            Self::N => 14.0067,
            Self::O => 15.9994,
            Self::F => 18.9984,
            Self::Ne => 20.1797,
            Self::Na => 22.9897,
            Self::Mg => 24.305,
            Self::Al => 26.9815,
            Self::Si => 28.0855,
            Self::P => 30.9738,
            Self::S => 32.065,
            Self::Cl => 35.453,
            Self::Ar => 39.948,
            Self::K => 39.0983,
            Self::Ca => 40.078,
            Self::Fe => 55.845,
            Self::Co => 58.9332,
            Self::Ni => 58.6934,
            Self::Cu => 63.546,
            Self::Zn => 65.39,
            Self::W => 183.84,
        }
    }

    /// Returns the nuclear charge in units of e.
    #[must_use]
    pub const fn charge(self) -> u32 {
        match self {
            Self::H => 1,
            Self::He => 2,
            Self::Li => 3,
            Self::Be => 4,
            Self::B => 5,
            Self::C => 6,
            Self::N => 7,
            Self::O => 8,
            Self::F => 9,
            Self::Ne => 10,
            Self::Na => 11,
            Self::Mg => 12,
            Self::Al => 13,
            Self::Si => 14,
            Self::P => 15,
            Self::S => 16,
            Self::Cl => 17,
            Self::Ar => 18,
            Self::K => 19,
            Self::Ca => 20,
            Self::Fe => 26,
            Self::Co => 27,
            Self::Ni => 28,
            Self::Cu => 29,
            Self::Zn => 30,
            Self::W => 74,
        }
    }

    /// Returns the van-der-Waals radius in Å. Crystallographic values for
    /// H and the noble gases, equilibrium values elsewhere.
    #[must_use]
    pub const fn vdw_radius(self) -> f64 {
        match self {
            Self::H => 1.1,
            Self::He => 1.4,
            Self::Ne => 1.54,
            Self::Ar => 1.88,
            Self::Li => 2.63,
            Self::Be => 2.23,
            Self::B => 2.05,
            Self::C => 1.96,
            Self::N => 1.79,
            Self::O => 1.71,
            Self::F => 1.65,
            Self::Na => 2.77,
            Self::Mg => 2.42,
            Self::Al => 2.40,
            Self::Si => 2.26,
            Self::P => 2.14,
            Self::S => 2.06,
            Self::Cl => 2.05,
            Self::K => 3.02,
            Self::Ca => 2.78,
            Self::Fe => 2.27,
            Self::Co => 2.25,
            Self::Ni => 2.23,
            Self::Cu => 2.27,
            Self::Zn => 2.24,
            Self::W => 2.36,
        }
    }
}

/// Van-der-Waals radius of a scattering group, in Å. Implicit-hydrogen
/// groups use the radius of their heavy atom.
#[must_use]
pub const fn vdw_radius(kind: FormFactorType) -> f64 {
    match kind {
        FormFactorType::H => Element::H.vdw_radius(),
        FormFactorType::C | FormFactorType::CH | FormFactorType::CH2 | FormFactorType::CH3 => {
            Element::C.vdw_radius()
        }
        FormFactorType::N | FormFactorType::NH | FormFactorType::NH2 | FormFactorType::NH3 => {
            Element::N.vdw_radius()
        }
        FormFactorType::O | FormFactorType::OH => Element::O.vdw_radius(),
        FormFactorType::S | FormFactorType::SH => Element::S.vdw_radius(),
        _ => Element::Ar.vdw_radius(),
    }
}

/// Mass of a scattering group in amu.
#[must_use]
pub const fn group_mass(kind: FormFactorType) -> f64 {
    match kind {
        FormFactorType::H => Element::H.mass(),
        FormFactorType::C => Element::C.mass(),
        FormFactorType::CH => 13.019,
        FormFactorType::CH2 => 14.027,
        FormFactorType::CH3 => 15.035,
        FormFactorType::N => Element::N.mass(),
        FormFactorType::NH => 15.01474,
        FormFactorType::NH2 => 16.02274,
        FormFactorType::NH3 => 17.03074,
        FormFactorType::O => Element::O.mass(),
        FormFactorType::OH => 16.999,
        FormFactorType::S => Element::S.mass(),
        FormFactorType::SH => 33.06,
        FormFactorType::Other => Element::Ar.mass(),
        FormFactorType::Exv => 0.0,
    }
}

/// Number of electrons carried by a scattering group.
#[must_use]
pub const fn group_charge(kind: FormFactorType) -> u32 {
    match kind {
        FormFactorType::H => 1,
        FormFactorType::C => 6,
        FormFactorType::CH => 7,
        FormFactorType::CH2 => 8,
        FormFactorType::CH3 | FormFactorType::OH => 9,
        FormFactorType::N => 7,
        FormFactorType::NH | FormFactorType::O => 8,
        FormFactorType::NH2 => 9,
        FormFactorType::NH3 => 10,
        FormFactorType::S => 16,
        FormFactorType::SH => 17,
        FormFactorType::Other => 18,
        FormFactorType::Exv => 0,
    }
}

/// A full set of displaced volumes, one entry per scattering group, in Å³.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[allow(missing_docs)]
pub struct DisplacedVolumeSet {
    pub h: f64,
    pub c: f64,
    pub ch: f64,
    pub ch2: f64,
    pub ch3: f64,
    pub n: f64,
    pub nh: f64,
    pub nh2: f64,
    pub nh3: f64,
    pub o: f64,
    pub oh: f64,
    pub s: f64,
    pub sh: f64,
    pub other: f64,
}

impl DisplacedVolumeSet {
    /// Displaced volume of a scattering group.
    #[must_use]
    pub const fn get(&self, kind: FormFactorType) -> f64 {
        match kind {
            FormFactorType::H => self.h,
            FormFactorType::C => self.c,
            FormFactorType::CH => self.ch,
            FormFactorType::CH2 => self.ch2,
            FormFactorType::CH3 => self.ch3,
            FormFactorType::N => self.n,
            FormFactorType::NH => self.nh,
            FormFactorType::NH2 => self.nh2,
            FormFactorType::NH3 => self.nh3,
            FormFactorType::O => self.o,
            FormFactorType::OH => self.oh,
            FormFactorType::S => self.s,
            FormFactorType::SH => self.sh,
            FormFactorType::Other => self.other,
            FormFactorType::Exv => 0.0,
        }
    }
}

/// Traube additive volumes (Fraser, MacRae & Suzuki atomic values; group
/// volumes are heavy atom plus bound hydrogens).
pub const TRAUBE: DisplacedVolumeSet = DisplacedVolumeSet {
    h: 5.15,
    c: 16.44,
    ch: 21.59,
    ch2: 26.74,
    ch3: 31.89,
    n: 2.49,
    nh: 7.64,
    nh2: 12.79,
    nh3: 17.94,
    o: 9.13,
    oh: 14.28,
    s: 19.86,
    sh: 25.01,
    other: 26.0,
};

/// Voronoi-cell volumes averaged over high-resolution structures, implicit
/// hydrogens folded into their heavy atom.
pub const VORONOI_IMPLICIT_H: DisplacedVolumeSet = DisplacedVolumeSet {
    h: 5.02,
    c: 9.68,
    ch: 13.71,
    ch2: 22.53,
    ch3: 32.48,
    n: 2.06,
    nh: 9.16,
    nh2: 15.45,
    nh3: 21.42,
    o: 11.46,
    oh: 17.51,
    s: 24.55,
    sh: 33.51,
    other: 26.0,
};

/// Volumes chosen to minimize the per-group volume fluctuation across a
/// training set, implicit hydrogens folded in.
pub const MINIMUM_FLUCTUATION_IMPLICIT_H: DisplacedVolumeSet = DisplacedVolumeSet {
    h: 5.17,
    c: 10.21,
    ch: 16.21,
    ch2: 23.37,
    ch3: 30.33,
    n: 2.62,
    nh: 8.36,
    nh2: 13.83,
    nh3: 18.04,
    o: 10.37,
    oh: 16.01,
    s: 21.63,
    sh: 28.02,
    other: 26.0,
};

/// Spherical volumes from the group van-der-Waals radii.
#[must_use]
pub fn vdw_volume_set() -> DisplacedVolumeSet {
    let sphere = |r: f64| 4.0 / 3.0 * std::f64::consts::PI * r.powi(3);
    DisplacedVolumeSet {
        h: sphere(vdw_radius(FormFactorType::H)),
        c: sphere(vdw_radius(FormFactorType::C)),
        ch: sphere(vdw_radius(FormFactorType::CH)),
        ch2: sphere(vdw_radius(FormFactorType::CH2)),
        ch3: sphere(vdw_radius(FormFactorType::CH3)),
        n: sphere(vdw_radius(FormFactorType::N)),
        nh: sphere(vdw_radius(FormFactorType::NH)),
        nh2: sphere(vdw_radius(FormFactorType::NH2)),
        nh3: sphere(vdw_radius(FormFactorType::NH3)),
        o: sphere(vdw_radius(FormFactorType::O)),
        oh: sphere(vdw_radius(FormFactorType::OH)),
        s: sphere(vdw_radius(FormFactorType::S)),
        sh: sphere(vdw_radius(FormFactorType::SH)),
        other: sphere(vdw_radius(FormFactorType::Other)),
    }
}

fn displaced_volume_lock() -> &'static RwLock<DisplacedVolumeSet> {
    static TABLE: OnceLock<RwLock<DisplacedVolumeSet>> = OnceLock::new();
    TABLE.get_or_init(|| RwLock::new(TRAUBE))
}

/// Returns a copy of the active displaced-volume table.
///
/// # Panics
///
/// Panics if the table lock is poisoned.
#[must_use]
pub fn displaced_volumes() -> DisplacedVolumeSet {
    *displaced_volume_lock().read().unwrap()
}

/// Holds the displaced-volume table fixed for the duration of a histogram
/// build. Writers block until all guards are released.
///
/// # Panics
///
/// Panics if the table lock is poisoned.
#[must_use]
pub fn displaced_volume_guard() -> RwLockReadGuard<'static, DisplacedVolumeSet> {
    displaced_volume_lock().read().unwrap()
}

/// Replace the process-wide displaced-volume table. Blocks until no build
/// holds a [`displaced_volume_guard`].
///
/// # Panics
///
/// Panics if the table lock is poisoned.
pub fn set_displaced_volumes(table: DisplacedVolumeSet) {
    *displaced_volume_lock().write().unwrap() = table;
}

/// Reference volumes of the twenty standard amino-acid residues, in Å³.
#[must_use]
pub fn residue_volumes() -> &'static FxHashMap<&'static str, f64> {
    static MAP: OnceLock<FxHashMap<&'static str, f64>> = OnceLock::new();
    MAP.get_or_init(|| {
        [
            ("GLY", 66.4),
            ("ALA", 91.5),
            ("VAL", 141.7),
            ("LEU", 167.9),
            ("ILE", 168.8),
            ("PHE", 203.5),
            ("TYR", 203.6),
            ("TRP", 237.6),
            ("ASP", 113.6),
            ("GLU", 140.6),
            ("SER", 99.1),
            ("THR", 122.1),
            ("ASN", 135.2),
            ("GLN", 161.1),
            ("LYS", 176.2),
            ("ARG", 180.8),
            ("HIS", 167.3),
            ("MET", 170.8),
            ("CYS", 105.6),
            ("PRO", 129.3),
        ]
        .into_iter()
        .collect()
    })
}

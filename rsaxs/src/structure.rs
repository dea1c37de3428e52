//! Labeled atom records and their conversion into scattering bodies.
//!
//! Records carry the fields of a structure file row. Conversion filters
//! alternate locations, tags waters by residue name, optionally promotes
//! heavy atoms to implicit-hydrogen group types via a built-in residue
//! table, and groups the remaining atoms into one body per chain.

use crate::body::{Body, Molecule, PointFF};
use crate::config::Settings;
use crate::constants::Element;
use crate::error::{Error, Result};
use crate::form_factor::{FormFactorType, WATER};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::{Mutex, OnceLock};

/// One labeled atom row from a structure file.
#[derive(Clone, Debug, PartialEq)]
pub struct AtomRecord {
    /// Record serial number.
    pub serial: u32,
    /// Atom name, e.g. `CA` or `OG1`.
    pub name: String,
    /// Alternate-location indicator, if any.
    pub alt_loc: Option<char>,
    /// Residue name, e.g. `ALA` or `HOH`.
    pub residue: String,
    /// Chain identifier.
    pub chain: char,
    /// Residue sequence number.
    pub residue_seq: i32,
    /// Position in Å.
    pub x: f64,
    /// Position in Å.
    pub y: f64,
    /// Position in Å.
    pub z: f64,
    /// Occupancy.
    pub occupancy: f64,
    /// Isotropic B-factor.
    pub b_factor: f64,
    /// Element symbol.
    pub element: String,
}

impl AtomRecord {
    /// Whether the record is a solvent water.
    #[must_use]
    pub fn is_water(&self) -> bool {
        matches!(self.residue.as_str(), "HOH" | "WAT" | "SOL")
    }
}

// number of implicit hydrogens per (residue, atom name)
type ResidueTable = FxHashMap<&'static str, &'static [(&'static str, u32)]>;

fn residue_table() -> &'static ResidueTable {
    static TABLE: OnceLock<ResidueTable> = OnceLock::new();
    TABLE.get_or_init(|| {
        let entries: [(&'static str, &'static [(&'static str, u32)]); 20] = [
            ("GLY", &[]),
            ("ALA", &[("CB", 3)]),
            ("VAL", &[("CB", 1), ("CG1", 3), ("CG2", 3)]),
            ("LEU", &[("CB", 2), ("CG", 1), ("CD1", 3), ("CD2", 3)]),
            ("ILE", &[("CB", 1), ("CG1", 2), ("CG2", 3), ("CD1", 3)]),
            (
                "PHE",
                &[
                    ("CB", 2),
                    ("CD1", 1),
                    ("CD2", 1),
                    ("CE1", 1),
                    ("CE2", 1),
                    ("CZ", 1),
                ],
            ),
            (
                "TYR",
                &[
                    ("CB", 2),
                    ("CD1", 1),
                    ("CD2", 1),
                    ("CE1", 1),
                    ("CE2", 1),
                    ("OH", 1),
                ],
            ),
            (
                "TRP",
                &[
                    ("CB", 2),
                    ("CD1", 1),
                    ("NE1", 1),
                    ("CE3", 1),
                    ("CZ2", 1),
                    ("CZ3", 1),
                    ("CH2", 1),
                ],
            ),
            ("ASP", &[("CB", 2)]),
            ("GLU", &[("CB", 2), ("CG", 2)]),
            ("SER", &[("CB", 2), ("OG", 1)]),
            ("THR", &[("CB", 1), ("OG1", 1), ("CG2", 3)]),
            ("ASN", &[("CB", 2), ("ND2", 2)]),
            ("GLN", &[("CB", 2), ("CG", 2), ("NE2", 2)]),
            (
                "LYS",
                &[("CB", 2), ("CG", 2), ("CD", 2), ("CE", 2), ("NZ", 3)],
            ),
            (
                "ARG",
                &[
                    ("CB", 2),
                    ("CG", 2),
                    ("CD", 2),
                    ("NE", 1),
                    ("NH1", 2),
                    ("NH2", 2),
                ],
            ),
            ("HIS", &[("CB", 2), ("ND1", 1), ("CD2", 1), ("CE1", 1)]),
            ("MET", &[("CB", 2), ("CG", 2), ("CE", 3)]),
            ("CYS", &[("CB", 2), ("SG", 1)]),
            ("PRO", &[("CB", 2), ("CG", 2), ("CD", 2)]),
        ];
        entries.into_iter().collect()
    })
}

/// The number of implicit hydrogens bound to `atom_name` in residue
/// `residue`, or `None` for unknown residues.
#[must_use]
pub fn implicit_hydrogens(residue: &str, atom_name: &str) -> Option<u32> {
    let side_chains = residue_table().get(residue)?;
    // backbone atoms are shared by every residue
    let count = match atom_name {
        "N" => u32::from(residue != "PRO"),
        "CA" => {
            if residue == "GLY" {
                2
            } else {
                1
            }
        }
        "C" | "O" => 0,
        "OXT" => 1,
        _ => {
            side_chains
                .iter()
                .find(|&&(name, _)| name == atom_name)
                .map_or(0, |&(_, count)| count)
        }
    };
    Some(count)
}

fn warn_once(cause: &str, message: &str) {
    static WARNED: OnceLock<Mutex<FxHashSet<String>>> = OnceLock::new();
    let mut warned = WARNED
        .get_or_init(|| Mutex::new(FxHashSet::default()))
        .lock()
        .unwrap();
    if warned.insert(cause.to_owned()) {
        log::warn!("{message}");
    }
}

fn classify(record: &AtomRecord, settings: &Settings) -> Result<Option<FormFactorType>> {
    let element = match Element::parse(&record.element) {
        Ok(element) => element,
        Err(err) => {
            if settings.allow_unknown_atoms {
                warn_once(
                    &format!("element:{}", record.element),
                    &format!(
                        "unknown element \"{}\"; treating as a generic heavy atom",
                        record.element
                    ),
                );
                return Ok(Some(FormFactorType::Other));
            }
            return Err(err);
        }
    };

    if settings.implicit_hydrogens {
        if element == Element::H {
            // folded into the heavy atoms
            return Ok(None);
        }
        match implicit_hydrogens(&record.residue, &record.name) {
            Some(count) => Ok(Some(FormFactorType::with_hydrogens(element, count))),
            None => {
                warn_once(
                    &format!("residue:{}", record.residue),
                    &format!(
                        "residue \"{}\" has no hydrogen table; using bare element types",
                        record.residue
                    ),
                );
                Ok(Some(FormFactorType::from_element(element)))
            }
        }
    } else {
        Ok(Some(FormFactorType::from_element(element)))
    }
}

/// Convert labeled records into a molecule: one body per chain, waters
/// attached to the chain they follow.
///
/// Records with an alternate-location indicator other than blank or `A`
/// are dropped, as are zero-occupancy records.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for unknown element symbols (unless
/// `allow_unknown_atoms` is set) or when nothing usable remains.
pub fn build_molecule(records: &[AtomRecord], settings: &Settings) -> Result<Molecule> {
    let mut chains: Vec<(char, Vec<PointFF>, Vec<PointFF>)> = Vec::new();
    let mut chain_index: FxHashMap<char, usize> = FxHashMap::default();

    for record in records {
        if record.occupancy <= 0.0 {
            continue;
        }
        if record.alt_loc.is_some_and(|alt| alt != 'A') {
            continue;
        }

        let slot = *chain_index.entry(record.chain).or_insert_with(|| {
            chains.push((record.chain, Vec::new(), Vec::new()));
            chains.len() - 1
        });

        if record.is_water() {
            if record.element == "O" || record.element == "o" {
                chains[slot].2.push(PointFF::new(
                    record.x,
                    record.y,
                    record.z,
                    record.occupancy,
                    WATER,
                ));
            }
            continue;
        }

        if let Some(kind) = classify(record, settings)? {
            chains[slot].1.push(PointFF::new(
                record.x,
                record.y,
                record.z,
                record.occupancy,
                kind,
            ));
        }
    }

    if chains.iter().all(|(_, atoms, waters)| atoms.is_empty() && waters.is_empty()) {
        return Err(Error::InvalidInput(
            "no usable atom records in the input".into(),
        ));
    }

    let bodies = chains
        .into_iter()
        .filter(|(_, atoms, waters)| !atoms.is_empty() || !waters.is_empty())
        .map(|(_, atoms, waters)| Body::with_waters(atoms, waters))
        .collect();
    let mut molecule = Molecule::new(bodies);
    if settings.center_molecule {
        molecule.center();
    }
    Ok(molecule)
}

#[cfg(test)]
mod test {
    use super::*;
    use float_cmp::assert_approx_eq;

    fn record(name: &str, residue: &str, chain: char, element: &str) -> AtomRecord {
        AtomRecord {
            serial: 1,
            name: name.into(),
            alt_loc: None,
            residue: residue.into(),
            chain,
            residue_seq: 1,
            x: 1.0,
            y: 2.0,
            z: 3.0,
            occupancy: 1.0,
            b_factor: 20.0,
            element: element.into(),
        }
    }

    #[test]
    fn backbone_and_side_chain_promotion() {
        assert_eq!(implicit_hydrogens("ALA", "CA"), Some(1));
        assert_eq!(implicit_hydrogens("GLY", "CA"), Some(2));
        assert_eq!(implicit_hydrogens("PRO", "N"), Some(0));
        assert_eq!(implicit_hydrogens("ALA", "CB"), Some(3));
        assert_eq!(implicit_hydrogens("LYS", "NZ"), Some(3));
        assert_eq!(implicit_hydrogens("SER", "OG"), Some(1));
        assert_eq!(implicit_hydrogens("ALA", "C"), Some(0));
        assert_eq!(implicit_hydrogens("XYZ", "CA"), None);
    }

    #[test]
    fn records_become_typed_points() {
        let settings = Settings {
            center_molecule: false,
            ..Settings::default()
        };
        let records = vec![
            record("CA", "GLY", 'A', "C"),
            record("N", "GLY", 'A', "N"),
            record("O", "HOH", 'A', "O"),
        ];
        let molecule = build_molecule(&records, &settings).unwrap();
        assert_eq!(molecule.size(), 1);
        let body = &molecule.bodies()[0];
        assert_eq!(body.atoms().len(), 2);
        assert_eq!(body.atoms()[0].kind, FormFactorType::CH2);
        assert_eq!(body.atoms()[1].kind, FormFactorType::NH);
        assert_eq!(body.waters().len(), 1);
        assert_eq!(body.waters()[0].kind, WATER);
    }

    #[test]
    fn explicit_hydrogens_are_folded_away() {
        let settings = Settings {
            center_molecule: false,
            ..Settings::default()
        };
        let records = vec![record("CA", "ALA", 'A', "C"), record("HA", "ALA", 'A', "H")];
        let molecule = build_molecule(&records, &settings).unwrap();
        assert_eq!(molecule.atom_count(), 1);
        assert_eq!(molecule.atoms().next().unwrap().kind, FormFactorType::CH);

        // without promotion both atoms stay, bare-typed
        let settings = Settings {
            implicit_hydrogens: false,
            center_molecule: false,
            ..Settings::default()
        };
        let molecule = build_molecule(&records, &settings).unwrap();
        assert_eq!(molecule.atom_count(), 2);
        assert_eq!(molecule.atoms().next().unwrap().kind, FormFactorType::C);
    }

    #[test]
    fn unknown_elements_follow_the_flag() {
        let records = vec![record("X1", "LIG", 'A', "Xx"), record("CA", "ALA", 'A', "C")];
        assert!(build_molecule(&records, &Settings::default()).is_err());

        let settings = Settings {
            allow_unknown_atoms: true,
            center_molecule: false,
            ..Settings::default()
        };
        let molecule = build_molecule(&records, &settings).unwrap();
        assert_eq!(molecule.atom_count(), 2);
        assert_eq!(molecule.atoms().next().unwrap().kind, FormFactorType::Other);
    }

    #[test]
    fn alt_locations_and_chains() {
        let settings = Settings {
            center_molecule: false,
            ..Settings::default()
        };
        let mut alt = record("CA", "ALA", 'A', "C");
        alt.alt_loc = Some('B');
        let records = vec![
            record("CA", "ALA", 'A', "C"),
            alt,
            record("CA", "ALA", 'B', "C"),
        ];
        let molecule = build_molecule(&records, &settings).unwrap();
        assert_eq!(molecule.size(), 2);
        assert_eq!(molecule.atom_count(), 2);
    }

    #[test]
    fn centering_is_applied_when_configured() {
        let records = vec![record("CA", "ALA", 'A', "C")];
        let molecule = build_molecule(&records, &Settings::default()).unwrap();
        let pos = molecule.atoms().next().unwrap().pos;
        assert_approx_eq!(f64, pos.norm(), 0.0, epsilon = 1e-12);
    }
}

//! Theoretical isotope patterns for identified peptides.
//!
//! The pattern of a peptide is derived from its molecular formula when one
//! is known or parseable from the sequence; otherwise the composition is
//! approximated with averagine scaled to the identification mass. Patterns
//! are expressed as mass shifts from the monoisotopic mass paired with
//! abundances normalized to the most abundant isotope.

use std::collections::HashMap;

use chemical_elements::isotopic_pattern::{
    BafflingRecursiveIsotopicPatternGenerator,
    TheoreticalIsotopicPattern,
};
use chemical_elements::{
    ChemicalComposition,
    ElementSpecification,
    PROTON,
};
use rustyms::{
    Element,
    MolecularFormula,
    Peptidoform,
};
use tracing::{
    debug,
    warn,
};

use crate::models::Identification;

/// Mass difference between 13C and 12C, the spacing of peptide isotopes.
pub const NEUTRON_SHIFT: f64 = 1.0033548378;

/// Monoisotopic mass of a hydrogen atom, the unit of the decoy mass window.
pub const HYDROGEN_MASS: f64 = 1.00782503207;

/// Average amino acid residue composition.
const AVERAGINE: [(&str, f64); 5] = [
    ("C", 4.9384),
    ("H", 7.7583),
    ("N", 1.3577),
    ("O", 1.4773),
    ("S", 0.0417),
];

const ISOTOPE_BIN_WIDTH: f64 = 0.125;
const MIN_ISOTOPE_PROBABILITY: f64 = 1e-8;
/// Residual above which a formula is topped up with averagine (Da).
const MAX_FORMULA_MASS_ERROR: f64 = 20.0;
/// Isotopes past the required count are dropped once they fall below this
/// normalized abundance.
const ABUNDANCE_CUTOFF: f64 = 0.1;

/// The theoretical isotope pattern of one modified sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct IsotopePattern {
    /// Mass shift of each isotope from the monoisotopic mass, ascending.
    pub shifts: Vec<f64>,
    /// Abundances normalized so the most abundant isotope is 1.0.
    pub abundances: Vec<f64>,
    /// Position of the most abundant isotope.
    pub peakfinding_idx: usize,
}

impl IsotopePattern {
    pub fn len(&self) -> usize {
        self.shifts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shifts.is_empty()
    }

    /// Shift of the most abundant isotope from the monoisotopic mass.
    pub fn peakfinding_shift(&self) -> f64 {
        self.shifts[self.peakfinding_idx]
    }
}

/// Generates isotope patterns, caching nothing itself: callers key patterns
/// by modified sequence.
pub struct IsotopeModel {
    generator: BafflingRecursiveIsotopicPatternGenerator<'static>,
    averagine: Vec<(ElementSpecification<'static>, f64)>,
    averagine_unit_mass: f64,
    hydrogen: ElementSpecification<'static>,
}

impl Default for IsotopeModel {
    fn default() -> Self {
        Self::new()
    }
}

impl IsotopeModel {
    pub fn new() -> Self {
        let averagine: Vec<(ElementSpecification<'static>, f64)> = AVERAGINE
            .iter()
            .map(|(sym, count)| {
                let spec = ElementSpecification::parse(sym)
                    .expect("averagine element symbols are valid");
                (spec, *count)
            })
            .collect();
        let averagine_unit_mass: f64 = averagine
            .iter()
            .map(|(spec, count)| spec.element.most_abundant_mass * count)
            .sum();
        Self {
            generator: BafflingRecursiveIsotopicPatternGenerator::new(),
            averagine,
            averagine_unit_mass,
            hydrogen: ElementSpecification::parse("H").expect("H parses"),
        }
    }

    /// Build the isotope pattern for one identification.
    ///
    /// Falls back to pure averagine when no composition can be derived or
    /// the derived composition misses the identification mass by more than
    /// the averagine top-up can reconcile.
    pub fn pattern_for(
        &mut self,
        id: &Identification,
        num_isotopes_required: usize,
    ) -> IsotopePattern {
        let composition = self.composition_for(id);
        let mut composition = match composition {
            Some(comp) => comp,
            None => {
                debug!(
                    "No composition for {}; using averagine at {:.4} Da",
                    id.modified_sequence, id.monoisotopic_mass
                );
                self.averagine_composition(id.monoisotopic_mass)
            }
        };

        let residual = id.monoisotopic_mass - composition.mass();
        if residual > MAX_FORMULA_MASS_ERROR {
            self.top_up_with_averagine(&mut composition, residual);
        } else if residual < -MAX_FORMULA_MASS_ERROR {
            // The formula overshoots the identification mass; nothing can be
            // subtracted sensibly, so start over from mass alone.
            warn!(
                "Formula mass for {} overshoots the identification by {:.2} Da; \
                 falling back to averagine",
                id.modified_sequence, -residual
            );
            composition = self.averagine_composition(id.monoisotopic_mass);
        }

        let formula_mass = composition.mass();
        let peaks = self
            .generator
            .isotopic_variants(composition, 0, 1, PROTON);
        let pattern = TheoreticalIsotopicPattern::from(peaks).ignore_below(MIN_ISOTOPE_PROBABILITY);

        let mut masses = Vec::new();
        let mut abundances = Vec::new();
        for peak in pattern.iter() {
            masses.push(peak.mz() - PROTON);
            abundances.push(peak.intensity() as f64);
        }

        let binned = bin_isotopes(&masses, &abundances, formula_mass, ISOTOPE_BIN_WIDTH);
        truncate_pattern(binned, num_isotopes_required)
    }

    fn composition_for(&self, id: &Identification) -> Option<ChemicalComposition<'static>> {
        if let Some(formula) = &id.chemical_formula {
            if let Some(comp) = formula_to_composition(formula) {
                return Some(comp);
            }
            warn!(
                "Unparseable chemical formula {:?} for {}; deriving from sequence",
                formula, id.modified_sequence
            );
        }
        sequence_to_composition(&id.modified_sequence)
            .or_else(|| sequence_to_composition(&id.base_sequence))
    }

    fn averagine_composition(&self, mass: f64) -> ChemicalComposition<'static> {
        let scale = mass / self.averagine_unit_mass;
        let mut comp = ChemicalComposition::new();
        for (spec, count) in &self.averagine {
            comp.set(*spec, (count * scale).round() as i32);
        }
        self.correct_hydrogens(&mut comp, mass);
        comp
    }

    fn top_up_with_averagine(&self, comp: &mut ChemicalComposition<'static>, residual: f64) {
        let target = comp.mass() + residual;
        let scale = residual / self.averagine_unit_mass;
        for (spec, count) in &self.averagine {
            let add = (count * scale).round() as i32;
            let current = comp[spec];
            comp.set(*spec, current + add);
        }
        self.correct_hydrogens(comp, target);
    }

    /// Round the composition mass toward the target by adjusting hydrogens,
    /// the same correction averagine scaling classically applies.
    fn correct_hydrogens(&self, comp: &mut ChemicalComposition<'static>, target: f64) {
        let delta = (comp.mass() - target).round() as i32;
        let hydrogens = comp[&self.hydrogen];
        if delta > 0 {
            comp.set(self.hydrogen, (hydrogens - delta).max(0));
        } else if delta < 0 {
            comp.set(self.hydrogen, hydrogens - delta);
        }
    }
}

/// Parse a plain molecular formula like "C50H80N14O18" into a composition.
///
/// Element symbols must be in the supported table; anything else (isotope
/// labels, charges) fails the parse and the caller falls back.
pub fn formula_to_composition(formula: &str) -> Option<ChemicalComposition<'static>> {
    let mut comp = ChemicalComposition::new();
    let bytes = formula.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_uppercase() {
            return None;
        }
        let mut sym_end = i + 1;
        if sym_end < bytes.len() && bytes[sym_end].is_ascii_lowercase() {
            sym_end += 1;
        }
        let symbol = canonical_symbol(&formula[i..sym_end])?;
        i = sym_end;

        let mut count: i32 = 0;
        let mut saw_digit = false;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            count = count.checked_mul(10)?.checked_add((bytes[i] - b'0') as i32)?;
            saw_digit = true;
            i += 1;
        }
        if !saw_digit {
            count = 1;
        }
        let spec = ElementSpecification::parse(symbol).ok()?;
        let current = comp[&spec];
        comp.set(spec, current + count);
    }
    if comp.mass() > 0.0 {
        Some(comp)
    } else {
        None
    }
}

/// Derive the elemental composition of a peptide sequence (ProForma or plain
/// one-letter), via the peptide chemistry library.
pub fn sequence_to_composition(sequence: &str) -> Option<ChemicalComposition<'static>> {
    let peptide = Peptidoform::pro_forma(sequence, None).ok()?;
    let peptide = peptide.into_linear()?;
    let formulas = peptide.formulas();
    if formulas.len() != 1 {
        return None;
    }
    let form = formulas[0].clone();
    molecular_formula_to_composition(&form)
}

fn molecular_formula_to_composition(
    form: &MolecularFormula,
) -> Option<ChemicalComposition<'static>> {
    let mut comp = ChemicalComposition::new();
    for (elem, isotope, count) in form.elements() {
        if *count == 0 {
            continue;
        }
        if isotope.is_some() {
            // Fixed-isotope labels are outside the averagine-style model.
            return None;
        }
        let symbol = match elem {
            Element::H => "H",
            Element::C => "C",
            Element::N => "N",
            Element::O => "O",
            Element::S => "S",
            Element::P => "P",
            Element::Se => "Se",
            _ => return None,
        };
        let spec = ElementSpecification::parse(symbol).ok()?;
        let current = comp[&spec];
        comp.set(spec, current + *count as i32);
    }
    if comp.mass() > 0.0 {
        Some(comp)
    } else {
        None
    }
}

fn canonical_symbol(sym: &str) -> Option<&'static str> {
    const TABLE: [&str; 16] = [
        "H", "C", "N", "O", "S", "P", "Se", "Na", "K", "Cl", "Br", "I", "F", "Fe", "Zn", "Mg",
    ];
    TABLE.iter().find(|&&s| s == sym).copied()
}

/// Fold fine-structure isotope peaks into bins relative to the monoisotopic
/// mass, returning (shift, abundance) pairs in ascending shift order.
fn bin_isotopes(
    masses: &[f64],
    abundances: &[f64],
    mono_mass: f64,
    bin_width: f64,
) -> Vec<(f64, f64)> {
    use std::collections::BTreeMap;
    let mut bins: BTreeMap<i64, (f64, f64)> = BTreeMap::new();
    for (&mass, &abundance) in masses.iter().zip(abundances.iter()) {
        let shift = mass - mono_mass;
        let bin = (shift / bin_width).round() as i64;
        let entry = bins.entry(bin).or_insert((0.0, 0.0));
        entry.0 += abundance;
        entry.1 += abundance * shift;
    }
    bins.values()
        .filter(|(ab, _)| *ab > 0.0)
        .map(|(ab, weighted_shift)| (weighted_shift / ab, *ab))
        .collect()
}

/// Normalize to a max abundance of 1.0, then keep isotopes (ascending mass)
/// while fewer than the required count are kept or the next one is still
/// above the abundance cutoff.
fn truncate_pattern(binned: Vec<(f64, f64)>, num_isotopes_required: usize) -> IsotopePattern {
    let max_ab = binned
        .iter()
        .map(|(_, ab)| *ab)
        .fold(f64::MIN, f64::max)
        .max(f64::MIN_POSITIVE);

    let mut shifts = Vec::new();
    let mut abundances = Vec::new();
    for (shift, ab) in binned {
        let norm = ab / max_ab;
        if shifts.len() >= num_isotopes_required && norm <= ABUNDANCE_CUTOFF {
            break;
        }
        shifts.push(shift);
        abundances.push(norm);
    }

    let peakfinding_idx = abundances
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i)
        .unwrap_or(0);

    IsotopePattern {
        shifts,
        abundances,
        peakfinding_idx,
    }
}

/// Build one pattern per distinct modified sequence and stamp each
/// identification's peakfinding mass. This is the single mutation
/// identifications undergo.
pub fn build_isotope_patterns(
    ids: &mut [Identification],
    num_isotopes_required: usize,
) -> HashMap<String, IsotopePattern> {
    let st = std::time::Instant::now();
    let mut model = IsotopeModel::new();
    let mut patterns: HashMap<String, IsotopePattern> = HashMap::new();

    for id in ids.iter_mut() {
        if !patterns.contains_key(&id.modified_sequence) {
            let pattern = model.pattern_for(id, num_isotopes_required);
            patterns.insert(id.modified_sequence.clone(), pattern);
        }
        let pattern = &patterns[&id.modified_sequence];
        if !pattern.is_empty() {
            id.peakfinding_mass = id.monoisotopic_mass + pattern.peakfinding_shift();
        }
    }

    debug!(
        "Built {} isotope patterns for {} identifications in {:?}",
        patterns.len(),
        ids.len(),
        st.elapsed()
    );
    patterns
}

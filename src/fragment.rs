//! Label fragments and the built-in label interpreter.
//!
//! A [`Fragment`] is a small arena tree: atom 0 is the root that bonds to
//! the drawing, every other atom names its parent by index, and ring
//! closures point back to an earlier atom. The orchestrator materializes
//! all atoms first and resolves closures afterwards, so a fragment never
//! needs back-references.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use regex::Regex;
use tracing::trace;

use crate::bond::BondOrder;
use crate::collab::LabelInterpreter;
use crate::element::Element;

#[derive(Debug, Clone, PartialEq)]
pub struct FragmentAtom {
    pub element: Element,
    pub charge: i8,
    pub parent: Option<usize>,
    /// Order of the bond to `parent`.
    pub order: BondOrder,
    pub wedge: bool,
    pub dashed: bool,
    /// Extra single bond to an earlier atom of the same fragment.
    pub ring_closure: Option<usize>,
    /// Chain atoms that may bond onward to a second drawn neighbour.
    pub chain_absorbable: bool,
}

impl FragmentAtom {
    pub fn root(element: Element) -> Self {
        Self {
            element,
            charge: 0,
            parent: None,
            order: BondOrder::Single,
            wedge: false,
            dashed: false,
            ring_closure: None,
            chain_absorbable: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    atoms: Vec<FragmentAtom>,
}

impl Fragment {
    pub fn new(root: Element) -> Self {
        Self {
            atoms: vec![FragmentAtom::root(root)],
        }
    }

    pub fn atoms(&self) -> &[FragmentAtom] {
        &self.atoms
    }

    pub fn root(&self) -> &FragmentAtom {
        &self.atoms[0]
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn add_child(&mut self, parent: usize, element: Element, order: BondOrder) -> usize {
        let mut atom = FragmentAtom::root(element);
        atom.parent = Some(parent);
        atom.order = order;
        self.atoms.push(atom);
        self.atoms.len() - 1
    }

    pub fn set_charge(&mut self, idx: usize, charge: i8) -> &mut Self {
        self.atoms[idx].charge = charge;
        self
    }

    pub fn close_ring(&mut self, from: usize, to: usize) -> &mut Self {
        self.atoms[from].ring_closure = Some(to);
        self
    }

    /// Appends `n` carbons in a line under `parent`; returns the last index.
    pub fn add_chain(&mut self, parent: usize, n: usize, absorbable: bool) -> usize {
        let mut last = parent;
        for _ in 0..n {
            last = self.add_child(last, Element::C, BondOrder::Single);
            self.atoms[last].chain_absorbable = absorbable;
        }
        last
    }

    /// Parents and ring closures must point at earlier atoms, and only the
    /// root may lack a parent.
    pub fn is_valid(&self) -> bool {
        if self.atoms.is_empty() || self.atoms[0].parent.is_some() {
            return false;
        }
        self.atoms.iter().enumerate().skip(1).all(|(i, a)| {
            matches!(a.parent, Some(p) if p < i)
                && a.ring_closure.map_or(true, |r| r < i && Some(r) != a.parent)
        })
    }

    /// Index of the chain end a second drawn neighbour should bond to, when
    /// every non-root atom is absorbable and the fragment is a plain chain.
    pub fn chain_end(&self) -> Option<usize> {
        if self.atoms.len() < 2 {
            return if self.atoms.len() == 1 { Some(0) } else { None };
        }
        let linear = self
            .atoms
            .iter()
            .enumerate()
            .skip(1)
            .all(|(i, a)| a.chain_absorbable && a.parent == Some(i - 1) && a.ring_closure.is_none());
        linear.then(|| self.atoms.len() - 1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    Atom { element: Element, charge: i8 },
    Fragment(Fragment),
}

impl Interpretation {
    pub fn atom(element: Element) -> Self {
        Interpretation::Atom { element, charge: 0 }
    }

    pub fn root_element(&self) -> Element {
        match self {
            Interpretation::Atom { element, .. } => *element,
            Interpretation::Fragment(f) => f.root().element,
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Interpretation::Atom { .. } => true,
            Interpretation::Fragment(f) => f.is_valid(),
        }
    }
}

fn chain(n: usize) -> Interpretation {
    let mut f = Fragment::new(Element::C);
    f.add_chain(0, n.saturating_sub(1), false);
    Interpretation::Fragment(f)
}

fn with_children(root: Element, children: &[(Element, BondOrder)]) -> Fragment {
    let mut f = Fragment::new(root);
    for &(e, order) in children {
        f.add_child(0, e, order);
    }
    f
}

fn carboxyl(ester_carbon: bool) -> Interpretation {
    let mut f = with_children(
        Element::C,
        &[(Element::O, BondOrder::Double), (Element::O, BondOrder::Single)],
    );
    if ester_carbon {
        f.add_child(2, Element::C, BondOrder::Single);
    }
    Interpretation::Fragment(f)
}

fn ether(root: Element, tail: usize) -> Interpretation {
    let mut f = Fragment::new(root);
    f.add_chain(0, tail, false);
    Interpretation::Fragment(f)
}

fn phenyl(root: Element, linker: bool) -> Interpretation {
    let mut f = Fragment::new(root);
    let first = if linker {
        f.add_child(0, Element::C, BondOrder::Single)
    } else {
        0
    };
    let mut prev = first;
    for k in 1..6 {
        let order = if k % 2 == 1 {
            BondOrder::Double
        } else {
            BondOrder::Single
        };
        prev = f.add_child(prev, Element::C, order);
    }
    f.close_ring(prev, first);
    Interpretation::Fragment(f)
}

fn trihalo(halogen: Element) -> Interpretation {
    Interpretation::Fragment(with_children(
        Element::C,
        &[
            (halogen, BondOrder::Single),
            (halogen, BondOrder::Single),
            (halogen, BondOrder::Single),
        ],
    ))
}

fn branched(arms: usize) -> Interpretation {
    let mut f = Fragment::new(Element::C);
    for _ in 0..arms {
        f.add_child(0, Element::C, BondOrder::Single);
    }
    Interpretation::Fragment(f)
}

fn nitro() -> Interpretation {
    let mut f = with_children(
        Element::N,
        &[(Element::O, BondOrder::Double), (Element::O, BondOrder::Single)],
    );
    f.set_charge(0, 1).set_charge(2, -1);
    Interpretation::Fragment(f)
}

fn acetyl(root_oxygen: bool) -> Interpretation {
    let mut f = if root_oxygen {
        let mut f = Fragment::new(Element::O);
        f.add_child(0, Element::C, BondOrder::Single);
        f
    } else {
        Fragment::new(Element::C)
    };
    let carbonyl = f.len() - 1;
    f.add_child(carbonyl, Element::O, BondOrder::Double);
    f.add_child(carbonyl, Element::C, BondOrder::Single);
    Interpretation::Fragment(f)
}

fn boc() -> Interpretation {
    let mut f = with_children(
        Element::C,
        &[(Element::O, BondOrder::Double), (Element::O, BondOrder::Single)],
    );
    let quaternary = f.add_child(2, Element::C, BondOrder::Single);
    for _ in 0..3 {
        f.add_child(quaternary, Element::C, BondOrder::Single);
    }
    Interpretation::Fragment(f)
}

/// Abbreviation table. Left-side spellings ("HO2C", "O2N") map to the same
/// groups as their right-side forms.
fn rule_table() -> HashMap<&'static str, Interpretation> {
    use BondOrder::*;
    use Element::*;

    let mut t = HashMap::new();
    for k in ["OH", "HO"] {
        t.insert(k, Interpretation::atom(O));
    }
    for k in ["SH", "HS"] {
        t.insert(k, Interpretation::atom(S));
    }
    for k in ["NH", "HN", "NH2", "H2N"] {
        t.insert(k, Interpretation::atom(N));
    }
    for k in ["Me", "CH3", "H3C"] {
        t.insert(k, Interpretation::atom(C));
    }
    for k in ["Et", "C2H5", "H5C2"] {
        t.insert(k, chain(2));
    }
    for k in ["Pr", "nPr", "n-Pr", "C3H7"] {
        t.insert(k, chain(3));
    }
    for k in ["Bu", "nBu", "n-Bu", "C4H9"] {
        t.insert(k, chain(4));
    }
    for k in ["iPr", "i-Pr"] {
        t.insert(k, branched(2));
    }
    for k in ["tBu", "t-Bu"] {
        t.insert(k, branched(3));
    }
    for k in ["OMe", "MeO", "OCH3", "H3CO"] {
        t.insert(k, ether(O, 1));
    }
    for k in ["OEt", "EtO", "OC2H5"] {
        t.insert(k, ether(O, 2));
    }
    for k in ["SMe", "MeS"] {
        t.insert(k, ether(S, 1));
    }
    for k in ["NHMe", "MeHN"] {
        t.insert(k, ether(N, 1));
    }
    for k in ["NMe2", "Me2N"] {
        t.insert(
            k,
            Interpretation::Fragment(with_children(N, &[(C, Single), (C, Single)])),
        );
    }
    for k in ["CO2H", "COOH", "HO2C", "HOOC"] {
        t.insert(k, carboxyl(false));
    }
    for k in ["CO2Me", "COOMe", "CO2CH3", "MeO2C", "MeOOC", "H3CO2C"] {
        t.insert(k, carboxyl(true));
    }
    for k in ["CHO", "OHC"] {
        t.insert(k, Interpretation::Fragment(with_children(C, &[(O, Double)])));
    }
    for k in ["CN", "NC"] {
        t.insert(k, Interpretation::Fragment(with_children(C, &[(N, Triple)])));
    }
    for k in ["CONH2", "H2NOC"] {
        t.insert(
            k,
            Interpretation::Fragment(with_children(C, &[(O, Double), (N, Single)])),
        );
    }
    for k in ["NO2", "O2N"] {
        t.insert(k, nitro());
    }
    for k in ["SO2Me", "MeO2S"] {
        t.insert(
            k,
            Interpretation::Fragment(with_children(S, &[(O, Double), (O, Double), (C, Single)])),
        );
    }
    for k in ["CF3", "F3C"] {
        t.insert(k, trihalo(F));
    }
    for k in ["CCl3", "Cl3C"] {
        t.insert(k, trihalo(Cl));
    }
    for k in ["CBr3", "Br3C"] {
        t.insert(k, trihalo(Br));
    }
    for k in ["Ac", "COMe", "COCH3"] {
        t.insert(k, acetyl(false));
    }
    for k in ["OAc", "AcO"] {
        t.insert(k, acetyl(true));
    }
    for k in ["Ph", "C6H5"] {
        t.insert(k, phenyl(C, false));
    }
    for k in ["Bn", "PhCH2", "CH2Ph"] {
        t.insert(k, phenyl(C, true));
    }
    for k in ["OPh", "PhO"] {
        t.insert(k, phenyl(O, true));
    }
    t.insert("Boc", boc());
    t
}

fn repeat_group_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\(?CH2\)?(\d*)$").expect("literal pattern"))
}

fn alkyl_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^C(\d+)H(\d+)$").expect("literal pattern"))
}

fn charged_atom_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:H\d*)?([A-Z][a-z]?)(?:H\d*)?(\d?)([+-]?)$").expect("literal pattern")
    })
}

/// Fixes the OCR confusions that show up in labels: zero for O, five for S
/// at the start of a label, and capital I for l after C.
pub fn normalize_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().filter(|c| !c.is_whitespace()).collect();
    let mut out = String::with_capacity(chars.len());
    for (i, &c) in chars.iter().enumerate() {
        let prev = if i > 0 { Some(chars[i - 1]) } else { None };
        let next = chars.get(i + 1).copied();
        let fixed = match c {
            '0' if !prev.is_some_and(|p| p.is_ascii_digit()) => 'O',
            '5' if i == 0 && next.map_or(true, |n| n.is_ascii_uppercase()) => 'S',
            'I' if prev == Some('C') && !next.is_some_and(|n| n.is_ascii_lowercase()) => 'l',
            _ => c,
        };
        out.push(fixed);
    }
    out
}

/// Rule-table interpreter with regex fallbacks for repeat groups, alkyl
/// formulas and charged single atoms. Results are memoized per token.
pub struct BasicLabelInterpreter {
    rules: HashMap<&'static str, Interpretation>,
    cache: Mutex<HashMap<String, Option<Interpretation>>>,
}

impl Default for BasicLabelInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl BasicLabelInterpreter {
    pub fn new() -> Self {
        Self {
            rules: rule_table(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn lookup(&self, token: &str) -> Option<Interpretation> {
        if token.is_empty() {
            return None;
        }
        if let Some(found) = self.rules.get(token) {
            return Some(found.clone());
        }

        if let Some(caps) = repeat_group_re().captures(token) {
            let n = caps[1].parse::<usize>().unwrap_or(1).max(1);
            let mut f = Fragment::new(Element::C);
            f.atoms[0].chain_absorbable = true;
            f.add_chain(0, n - 1, true);
            return Some(Interpretation::Fragment(f));
        }

        if let Some(caps) = alkyl_re().captures(token) {
            let c: usize = caps[1].parse().ok()?;
            let h: usize = caps[2].parse().ok()?;
            if c > 0 && h == 2 * c + 1 {
                return Some(chain(c));
            }
        }

        if let Some(caps) = charged_atom_re().captures(token) {
            let element = Element::from_symbol(&caps[1])?;
            let magnitude: i8 = match &caps[2] {
                "" => 1,
                d => d.parse().ok()?,
            };
            let charge = match &caps[3] {
                "+" => magnitude,
                "-" => -magnitude,
                _ if caps[2].is_empty() => 0,
                // A bare digit is a hydrogen count we already skipped.
                _ => return None,
            };
            return Some(Interpretation::Atom { element, charge });
        }
        None
    }
}

impl LabelInterpreter for BasicLabelInterpreter {
    fn interpret(&self, token: &str) -> Option<Interpretation> {
        let key = normalize_token(token);
        if let Ok(cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&key) {
                return hit.clone();
            }
        }
        let result = self.lookup(&key).filter(Interpretation::is_valid);
        trace!(token, normalized = %key, found = result.is_some(), "interpreted label");
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, result.clone());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(token: &str) -> Fragment {
        match BasicLabelInterpreter::new().interpret(token) {
            Some(Interpretation::Fragment(f)) => f,
            other => panic!("{token}: expected fragment, got {other:?}"),
        }
    }

    #[test]
    fn carboxylic_acid_shape() {
        for token in ["CO2H", "COOH", "HO2C"] {
            let f = fragment(token);
            assert_eq!(f.len(), 3);
            assert_eq!(f.root().element, Element::C);
            let orders: Vec<BondOrder> = f.atoms()[1..].iter().map(|a| a.order).collect();
            assert_eq!(orders, vec![BondOrder::Double, BondOrder::Single]);
            assert!(f.atoms()[1..].iter().all(|a| a.element == Element::O && a.parent == Some(0)));
        }
    }

    #[test]
    fn phenyl_closes_ring() {
        let f = fragment("Ph");
        assert_eq!(f.len(), 6);
        assert!(f.is_valid());
        assert_eq!(f.atoms()[5].ring_closure, Some(0));
        let doubles = f.atoms().iter().filter(|a| a.order == BondOrder::Double).count();
        assert_eq!(doubles, 3);
    }

    #[test]
    fn repeat_groups_are_absorbable_chains() {
        let f = fragment("(CH2)4");
        assert_eq!(f.len(), 4);
        assert_eq!(f.chain_end(), Some(3));
        assert!(f.atoms().iter().all(|a| a.chain_absorbable));
        assert_eq!(fragment("CH2").len(), 1);
    }

    #[test]
    fn alkyl_formula() {
        assert_eq!(fragment("C5H11").len(), 5);
        assert_eq!(BasicLabelInterpreter::new().interpret("C5H9"), None);
    }

    #[test]
    fn single_atoms_and_charges() {
        let interp = BasicLabelInterpreter::new();
        assert_eq!(interp.interpret("N"), Some(Interpretation::atom(Element::N)));
        assert_eq!(interp.interpret("NH"), Some(Interpretation::atom(Element::N)));
        assert_eq!(
            interp.interpret("N+"),
            Some(Interpretation::Atom {
                element: Element::N,
                charge: 1
            })
        );
        assert_eq!(
            interp.interpret("O-"),
            Some(Interpretation::Atom {
                element: Element::O,
                charge: -1
            })
        );
        assert_eq!(
            interp.interpret("NH3+"),
            Some(Interpretation::Atom {
                element: Element::N,
                charge: 1
            })
        );
        assert_eq!(interp.interpret("Xq"), None);
        assert_eq!(interp.interpret(""), None);
    }

    #[test]
    fn ocr_confusions() {
        assert_eq!(normalize_token("C0OH"), "COOH");
        assert_eq!(normalize_token("CI"), "Cl");
        assert_eq!(normalize_token("CCI3"), "CCl3");
        assert_eq!(normalize_token("5H"), "SH");
        assert_eq!(normalize_token("(CH2)10"), "(CH2)10");
        let interp = BasicLabelInterpreter::new();
        assert_eq!(interp.interpret("CI"), Some(Interpretation::atom(Element::Cl)));
    }

    #[test]
    fn memoizes_results() {
        let interp = BasicLabelInterpreter::new();
        interp.interpret("OMe");
        interp.interpret("OMe");
        interp.interpret("Zz");
        assert_eq!(interp.cached_len(), 2);
    }

    #[test]
    fn invalid_fragment_detected() {
        let mut f = Fragment::new(Element::C);
        let c = f.add_child(0, Element::C, BondOrder::Single);
        f.close_ring(c, 0);
        assert!(!f.is_valid());
        assert!(Fragment::new(Element::N).is_valid());
    }
}

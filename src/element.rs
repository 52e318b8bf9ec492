/// Elements that realistically appear as labels in structure diagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum Element {
    H = 1,
    Li = 3,
    B = 5,
    #[default]
    C = 6,
    N = 7,
    O = 8,
    F = 9,
    Na = 11,
    Mg = 12,
    Al = 13,
    Si = 14,
    P = 15,
    S = 16,
    Cl = 17,
    K = 19,
    Ca = 20,
    Ti = 22,
    Cr = 24,
    Mn = 25,
    Fe = 26,
    Co = 27,
    Ni = 28,
    Cu = 29,
    Zn = 30,
    Ge = 32,
    As = 33,
    Se = 34,
    Br = 35,
    Rb = 37,
    Pd = 46,
    Ag = 47,
    Sn = 50,
    Te = 52,
    I = 53,
    Cs = 55,
    Ba = 56,
    Pt = 78,
    Au = 79,
    Hg = 80,
}

const SYMBOL_TABLE: [(&str, Element); 40] = [
    ("H", Element::H),
    ("Li", Element::Li),
    ("B", Element::B),
    ("C", Element::C),
    ("N", Element::N),
    ("O", Element::O),
    ("F", Element::F),
    ("Na", Element::Na),
    ("Mg", Element::Mg),
    ("Al", Element::Al),
    ("Si", Element::Si),
    ("P", Element::P),
    ("S", Element::S),
    ("Cl", Element::Cl),
    ("K", Element::K),
    ("Ca", Element::Ca),
    ("Ti", Element::Ti),
    ("Cr", Element::Cr),
    ("Mn", Element::Mn),
    ("Fe", Element::Fe),
    ("Co", Element::Co),
    ("Ni", Element::Ni),
    ("Cu", Element::Cu),
    ("Zn", Element::Zn),
    ("Ge", Element::Ge),
    ("As", Element::As),
    ("Se", Element::Se),
    ("Br", Element::Br),
    ("Rb", Element::Rb),
    ("Pd", Element::Pd),
    ("Ag", Element::Ag),
    ("Sn", Element::Sn),
    ("Te", Element::Te),
    ("I", Element::I),
    ("Cs", Element::Cs),
    ("Ba", Element::Ba),
    ("Pt", Element::Pt),
    ("Au", Element::Au),
    ("Hg", Element::Hg),
    // OCR frequently reads a lowercase l as an uppercase I.
    ("CI", Element::Cl),
];

impl Element {
    pub fn from_symbol(s: &str) -> Option<Element> {
        SYMBOL_TABLE.iter().find(|(sym, _)| *sym == s).map(|(_, e)| *e)
    }

    pub fn atomic_num(self) -> u8 {
        self as u8
    }

    pub fn symbol(self) -> &'static str {
        SYMBOL_TABLE
            .iter()
            .find(|(_, e)| *e == self)
            .map(|(sym, _)| *sym)
            .unwrap_or("?")
    }

    pub fn default_valences(self) -> &'static [u8] {
        match self {
            Element::H => &[1],
            Element::B => &[3],
            Element::C => &[4],
            Element::N => &[3, 5],
            Element::O => &[2],
            Element::F | Element::Cl | Element::Br => &[1],
            Element::Si | Element::Ge => &[4],
            Element::P | Element::As => &[3, 5],
            Element::S | Element::Se | Element::Te => &[2, 4, 6],
            Element::I => &[1, 3, 5, 7],
            _ => &[],
        }
    }

    /// Lowest normal valence; `None` for metals, which are never balanced.
    pub fn normal_valence(self) -> Option<u8> {
        self.default_valences().first().copied()
    }

    pub fn max_valence(self) -> Option<u8> {
        self.default_valences().last().copied()
    }

    pub fn is_carbon(self) -> bool {
        self == Element::C
    }

    pub fn is_heteroatom(self) -> bool {
        !matches!(self, Element::C | Element::H)
    }

    pub fn is_halogen(self) -> bool {
        matches!(self, Element::F | Element::Cl | Element::Br | Element::I)
    }

    pub fn is_metal(self) -> bool {
        self.default_valences().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_round_trip() {
        for (sym, e) in SYMBOL_TABLE.iter().take(39) {
            assert_eq!(Element::from_symbol(sym), Some(*e));
            assert_eq!(e.symbol(), *sym);
        }
    }

    #[test]
    fn confusable_chlorine_reads_as_cl() {
        assert_eq!(Element::from_symbol("CI"), Some(Element::Cl));
        assert_eq!(Element::Cl.symbol(), "Cl");
    }

    #[test]
    fn valences() {
        assert_eq!(Element::C.normal_valence(), Some(4));
        assert_eq!(Element::N.max_valence(), Some(5));
        assert_eq!(Element::S.default_valences(), &[2, 4, 6]);
        assert!(Element::Na.is_metal());
        assert!(Element::Cl.is_halogen());
        assert!(!Element::C.is_heteroatom());
    }

    #[test]
    fn atomic_numbers() {
        assert_eq!(Element::C.atomic_num(), 6);
        assert_eq!(Element::Br.atomic_num(), 35);
    }
}

use serde::{Deserialize, Serialize};

use crate::element::Element;
use crate::geom::Point;

/// A candidate atom in the reconstructed graph.
///
/// Positions stay in image coordinates for the whole life of the graph; the
/// serializer downstream decides how to scale them.
///
/// # Examples
///
/// ```
/// use crabsketch::{Element, Node, Point};
///
/// let n = Node::new(Point::new(10.0, 4.0)).with_element(Element::N);
/// assert_eq!(n.element, Element::N);
/// assert!(!n.invented);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub position: Point,
    /// Unlabeled vertices are carbon.
    pub element: Element,
    pub charge: i8,
    /// Synthesized by fragment expansion rather than observed in the image.
    pub invented: bool,
    /// Label token this node was fused from, if any.
    pub group: Option<usize>,
    /// Set when a proximity merge refused to collapse this node with a
    /// neighbour that sits suspiciously close.
    pub too_close: bool,
    /// Merged into or split out during the current refinement pass.
    pub resolved: bool,
}

impl Node {
    pub fn new(position: Point) -> Self {
        Self {
            position,
            element: Element::C,
            charge: 0,
            invented: false,
            group: None,
            too_close: false,
            resolved: false,
        }
    }

    pub fn with_element(mut self, element: Element) -> Self {
        self.element = element;
        self
    }

    pub fn with_charge(mut self, charge: i8) -> Self {
        self.charge = charge;
        self
    }

    pub fn invented(mut self) -> Self {
        self.invented = true;
        self
    }

    pub fn is_labeled(&self) -> bool {
        self.group.is_some() || self.element != Element::C || self.charge != 0
    }
}

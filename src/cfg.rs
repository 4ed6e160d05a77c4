//! The control-flow automaton the analysis walks over.

use crate::bitvector::TypeInfo;
use crate::expr::Expression;
use crate::formula::MemoryLocation;
use std::fmt;
use thiserror::Error;

/// Error definitions
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CfaError {
    /// An edge referenced a location this automaton never issued
    #[error("unknown location l{0}")]
    UnknownLocation(usize),
}

/// Identifies a program location
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocationId(pub usize);

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "l{}", self.0)
    }
}

/// Identifies a control-flow edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId(pub usize);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// The operation an edge performs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeKind {
    /// No operation
    Blank,
    /// Branching on a condition
    Assume {
        /// The branch condition
        condition: Expression,
        /// Whether this edge is the branch on which the condition holds
        assumed: bool,
    },
    /// Introduction of a variable, with an optional initial value
    Declaration {
        /// The declared variable
        variable: MemoryLocation,
        /// Its declared type
        type_info: TypeInfo,
        /// The initializer, if one is given
        initializer: Option<Expression>,
    },
    /// An assignment
    Statement {
        /// Assignment target
        lhs: Expression,
        /// Assigned value
        rhs: Expression,
    },
    /// Entry into a function, assigning the arguments to the parameters
    FunctionCall {
        /// Name of the called function
        callee: String,
        /// Parameter variables paired with their argument expressions
        parameters: Vec<(MemoryLocation, Expression)>,
    },
    /// Return from a function back to its caller
    FunctionReturn {
        /// Name of the function returned from
        callee: String,
        /// Assignment of the returned value at the call site, if any
        assignment: Option<(MemoryLocation, Expression)>,
        /// The location the call was made from
        call_location: LocationId,
    },
}

/// One directed edge of the automaton
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfaEdge {
    /// This edge's identifier
    pub id: EdgeId,
    /// Source location
    pub predecessor: LocationId,
    /// Target location
    pub successor: LocationId,
    /// The operation performed along the edge
    pub kind: EdgeKind,
}

/// A control-flow automaton: locations connected by operation-carrying
/// edges, each location belonging to one function
#[derive(Debug, Clone, Default)]
pub struct Cfa {
    location_functions: Vec<String>,
    edges: Vec<CfaEdge>,
    entering: Vec<Vec<EdgeId>>,
    leaving: Vec<Vec<EdgeId>>,
}

impl Cfa {
    /// An automaton with no locations
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a location belonging to `function`
    pub fn add_location(&mut self, function: impl Into<String>) -> LocationId {
        let id = LocationId(self.location_functions.len());
        self.location_functions.push(function.into());
        self.entering.push(Vec::new());
        self.leaving.push(Vec::new());
        id
    }

    /// Connects two previously added locations
    pub fn add_edge(
        &mut self,
        predecessor: LocationId,
        successor: LocationId,
        kind: EdgeKind,
    ) -> Result<EdgeId, CfaError> {
        for location in [predecessor, successor] {
            if location.0 >= self.location_functions.len() {
                return Err(CfaError::UnknownLocation(location.0));
            }
        }
        let id = EdgeId(self.edges.len());
        self.edges.push(CfaEdge {
            id,
            predecessor,
            successor,
            kind,
        });
        self.leaving[predecessor.0].push(id);
        self.entering[successor.0].push(id);
        Ok(id)
    }

    /// The edge behind an identifier this automaton issued
    pub fn edge(&self, id: EdgeId) -> &CfaEdge {
        &self.edges[id.0]
    }

    /// All edges in creation order
    pub fn edges(&self) -> &[CfaEdge] {
        &self.edges
    }

    /// Edges ending in `location`
    pub fn entering_edges(&self, location: LocationId) -> &[EdgeId] {
        &self.entering[location.0]
    }

    /// Edges starting in `location`
    pub fn leaving_edges(&self, location: LocationId) -> &[EdgeId] {
        &self.leaving[location.0]
    }

    /// The function `location` belongs to
    pub fn location_function(&self, location: LocationId) -> &str {
        &self.location_functions[location.0]
    }

    /// Number of locations
    pub fn location_count(&self) -> usize {
        self.location_functions.len()
    }

    /// All locations in creation order
    pub fn locations(&self) -> impl Iterator<Item = LocationId> {
        (0..self.location_functions.len()).map(LocationId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_connect_locations() {
        let mut cfa = Cfa::new();
        let entry = cfa.add_location("main");
        let body = cfa.add_location("main");
        let exit = cfa.add_location("main");
        let first = cfa.add_edge(entry, body, EdgeKind::Blank).unwrap();
        let second = cfa.add_edge(body, exit, EdgeKind::Blank).unwrap();
        let back = cfa.add_edge(body, body, EdgeKind::Blank).unwrap();
        assert_eq!(cfa.entering_edges(body), &[first, back]);
        assert_eq!(cfa.leaving_edges(body), &[second, back]);
        assert_eq!(cfa.edge(first).successor, body);
        assert_eq!(cfa.location_function(entry), "main");
        assert_eq!(cfa.location_count(), 3);
    }

    #[test]
    fn foreign_locations_are_rejected() {
        let mut cfa = Cfa::new();
        let only = cfa.add_location("main");
        let result = cfa.add_edge(only, LocationId(7), EdgeKind::Blank);
        assert_eq!(result, Err(CfaError::UnknownLocation(7)));
    }
}

//! Interval-based invariant inference over control-flow automata.
//!
//! Integer values are modelled as compound intervals with exact bit-vector
//! wraparound semantics. Variable definitions are kept as formulas in a
//! persistent, acyclic environment, so relations between variables survive
//! joins, and a widening operator with condition hints makes fixpoint
//! iteration over loops terminate without giving up the bounds the program
//! itself checks for.

#![warn(missing_docs)]

pub mod abstraction;
pub mod analyzer;
pub mod bitvector;
pub mod cfg;
pub mod compound;
pub mod environment;
pub mod eval;
pub mod expr;
pub mod formula;
pub mod interval;
pub mod machine;
pub mod manager;
pub mod precision;
pub mod state;
pub mod transfer;

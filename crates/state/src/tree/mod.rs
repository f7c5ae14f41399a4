// Path: crates/state/src/tree/mod.rs
//! Hash trees.

pub mod avl;

//! This module focuses on turning a sewer network and its survey data into
//! a petgraph graph object, with an elevation for every node.

pub mod petgraph;
pub mod resolve;
pub mod sawtooth;
pub mod structs;
pub mod virtual_measurements;

pub mod api;
pub mod assignment;
pub mod config;
pub mod deconv;
pub mod design;
pub mod error;
pub mod pairs;
pub mod peptide;
pub mod plate;
pub mod readout;
pub mod solver;
// cmd and reports are binary modules (owned by main.rs).

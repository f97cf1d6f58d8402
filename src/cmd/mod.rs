pub mod deconvolve;
pub mod generate;
pub mod verify;

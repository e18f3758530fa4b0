pub mod hash;
pub mod quality;
pub mod track;

pub mod effects;
pub mod filters;
pub mod sketch;

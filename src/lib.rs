//! PaintOver: turn a photo into an outline sketch and paint over it on
//! three toggleable layers with global undo/redo.

pub mod canvas;
pub mod cli;
pub mod components;
pub mod error;
pub mod io;
pub mod logger;
pub mod ops;
pub mod project;
pub mod settings;

pub use canvas::{CanvasState, LayerId, ViewTransform};
pub use error::PaintError;
pub use project::{Action, Project};
pub use settings::AppSettings;

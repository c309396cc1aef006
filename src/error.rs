use thiserror::Error;

/// Errors surfaced by the canvas core and its file boundaries.
#[derive(Debug, Error)]
pub enum PaintError {
    /// A source image or encoded layer failed to decode. Nothing was committed.
    #[error("failed to load image: {0}")]
    ImageLoad(String),

    /// The output surface for a render or export could not be acquired.
    #[error("drawing surface unavailable: {0}")]
    ContextUnavailable(String),

    #[error("raster is {found:?} but the canvas is {expected:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        found: (u32, u32),
    },

    #[error("the sketch layer is read-only")]
    ReadOnlyLayer,

    #[error("invalid convolution kernel: {0}")]
    InvalidKernel(String),

    #[error("invalid project file: {0}")]
    ProjectFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image encode error: {0}")]
    Encode(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}

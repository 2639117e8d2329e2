use std::fmt;

#[derive(Debug)]
pub enum RasterError {
    NotTrueType,
    MalformedFont(String),
    MissingTable(&'static str),
    UnknownOperator(String),
    MalformedContent(String),
    NonInvertibleMatrix,
    InvalidConfiguration(String),
    Image(String),
    Pdf(String),
    Io(std::io::Error),
}

impl fmt::Display for RasterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RasterError::NotTrueType => write!(f, "data is not a TrueType font"),
            RasterError::MalformedFont(message) => write!(f, "malformed font: {}", message),
            RasterError::MissingTable(tag) => write!(f, "font is missing required table '{}'", tag),
            RasterError::UnknownOperator(op) => {
                write!(f, "unknown content stream operator '{}'", op)
            }
            RasterError::MalformedContent(message) => {
                write!(f, "malformed content stream: {}", message)
            }
            RasterError::NonInvertibleMatrix => write!(f, "matrix is not invertible"),
            RasterError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            RasterError::Image(message) => write!(f, "image error: {}", message),
            RasterError::Pdf(message) => write!(f, "pdf error: {}", message),
            RasterError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for RasterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RasterError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RasterError {
    fn from(value: std::io::Error) -> Self {
        RasterError::Io(value)
    }
}

pub(crate) fn lopdf_err(err: lopdf::Error) -> RasterError {
    RasterError::Pdf(err.to_string())
}

pub(crate) fn image_err(err: image::ImageError) -> RasterError {
    RasterError::Image(err.to_string())
}

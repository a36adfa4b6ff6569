use thiserror::Error;

pub type Result<T> = std::result::Result<T, NrmlError>;

#[derive(Debug, Error)]
pub enum NrmlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    XmlAttribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("INI error: {0}")]
    Ini(#[from] ini::Error),

    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    #[error("Missing element <{element}> in {context}")]
    MissingElement {
        element: &'static str,
        context: String,
    },

    #[error("{0} is a compulsory value")]
    MissingField(String),

    #[error("Invalid number in <{element}>: {value:?}")]
    InvalidNumber { element: String, value: String },

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Inconsistent data: {0}")]
    Inconsistent(String),

    #[error("External command failed: {command} ({status})")]
    ExternalCommand { command: String, status: String },
}

impl NrmlError {
    pub fn missing(element: &'static str, context: impl Into<String>) -> Self {
        NrmlError::MissingElement {
            element,
            context: context.into(),
        }
    }
}

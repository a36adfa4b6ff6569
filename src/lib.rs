pub mod archive;
pub mod convert;
pub mod disaggregation;
pub mod error;
pub mod exposure;
pub mod geodesy;
pub mod mfd;
pub mod model;
pub mod parser;
pub mod plot;
pub mod writer;

pub use archive::{NrmlArchive, XmlEntry};
pub use convert::{Converter, MapFormat};
pub use disaggregation::{BinLimits, Pmf, PmfKind};
pub use error::{NrmlError, Result};
pub use exposure::ExposurePortfolio;
pub use model::{
    Curve, CurveKind, ExposureAsset, ExposureMetadata, GridMetadata, MapNode, RuptureRecord,
    SourceGeometry, SourceKind, SourceRecord,
};
pub use parser::{detect_kind, NrmlKind};
pub use plot::{GmtConfig, GmtPlan, GmtRunner, Region};
pub use writer::{ExposureWriter, ShapefileWriter, TextWriter};

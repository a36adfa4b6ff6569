use nrml_tools::model::{Curve, MapNode, SourceGeometry, SourceKind, SourceRecord};
use nrml_tools::{parser, Converter, GmtConfig, MapFormat};
use pyo3::prelude::*;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[pymodule]
#[pyo3(name = "nrml_tools")]
fn nrml_tools_py(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyMapNode>()?;
    m.add_class::<PyCurve>()?;
    m.add_class::<PySource>()?;
    m.add_function(wrap_pyfunction!(parse_hazard_map, m)?)?;
    m.add_function(wrap_pyfunction!(parse_loss_map, m)?)?;
    m.add_function(wrap_pyfunction!(parse_hazard_curves, m)?)?;
    m.add_function(wrap_pyfunction!(parse_loss_curves, m)?)?;
    m.add_function(wrap_pyfunction!(parse_source_model, m)?)?;
    m.add_function(wrap_pyfunction!(detect_kind, m)?)?;
    m.add_function(wrap_pyfunction!(convert, m)?)?;
    m.add_function(wrap_pyfunction!(exposure_txt_to_nrml, m)?)?;
    m.add_function(wrap_pyfunction!(exposure_grid_to_nrml, m)?)?;
    Ok(())
}

#[pyclass(name = "MapNode")]
#[derive(Clone)]
pub struct PyMapNode {
    #[pyo3(get)]
    pub lon: f64,
    #[pyo3(get)]
    pub lat: f64,
    #[pyo3(get)]
    pub value: f64,
}

impl From<MapNode> for PyMapNode {
    fn from(node: MapNode) -> Self {
        PyMapNode {
            lon: node.lon,
            lat: node.lat,
            value: node.value,
        }
    }
}

#[pymethods]
impl PyMapNode {
    fn __repr__(&self) -> String {
        format!("MapNode(lon={}, lat={}, value={})", self.lon, self.lat, self.value)
    }
}

#[pyclass(name = "Curve")]
#[derive(Clone)]
pub struct PyCurve {
    #[pyo3(get)]
    pub id: Option<String>,
    #[pyo3(get)]
    pub lon: f64,
    #[pyo3(get)]
    pub lat: f64,
    #[pyo3(get)]
    pub x_label: String,
    #[pyo3(get)]
    pub abscissae: Vec<f64>,
    #[pyo3(get)]
    pub poes: Vec<f64>,
}

impl From<Curve> for PyCurve {
    fn from(curve: Curve) -> Self {
        PyCurve {
            id: curve.id,
            lon: curve.lon,
            lat: curve.lat,
            x_label: curve.kind.x_label().to_string(),
            abscissae: curve.abscissae,
            poes: curve.poes,
        }
    }
}

#[pymethods]
impl PyCurve {
    fn __repr__(&self) -> String {
        format!(
            "Curve(id={:?}, lon={}, lat={}, points={})",
            self.id,
            self.lon,
            self.lat,
            self.abscissae.len()
        )
    }
}

#[pyclass(name = "Source")]
#[derive(Clone)]
pub struct PySource {
    #[pyo3(get)]
    pub id: String,
    #[pyo3(get)]
    pub name: String,
    #[pyo3(get)]
    pub kind: String,
    /// ポイント震源は1点、それ以外は閉じたリング
    #[pyo3(get)]
    pub coordinates: Vec<(f64, f64)>,
    #[pyo3(get)]
    pub max_magnitude: f64,
    #[pyo3(get)]
    pub total_occurrence_rate: f64,
}

impl From<SourceRecord> for PySource {
    fn from(source: SourceRecord) -> Self {
        let kind = match source.kind {
            SourceKind::Area => "area",
            SourceKind::Point => "point",
            SourceKind::SimpleFault => "simple_fault",
            SourceKind::ComplexFault => "complex_fault",
        };
        let coordinates = match source.geometry {
            SourceGeometry::Polygon(ring) => ring,
            SourceGeometry::Point(lon, lat) => vec![(lon, lat)],
        };
        PySource {
            id: source.id,
            name: source.name,
            kind: kind.to_string(),
            coordinates,
            max_magnitude: source.max_magnitude,
            total_occurrence_rate: source.total_occurrence_rate,
        }
    }
}

#[pymethods]
impl PySource {
    fn __repr__(&self) -> String {
        format!(
            "Source(id='{}', kind='{}', max_magnitude={}, total_occurrence_rate={})",
            self.id, self.kind, self.max_magnitude, self.total_occurrence_rate
        )
    }
}

fn open(path: &str) -> PyResult<BufReader<File>> {
    let file = File::open(path).map_err(|e| {
        PyErr::new::<pyo3::exceptions::PyIOError, _>(format!("Failed to open file: {}", e))
    })?;
    Ok(BufReader::new(file))
}

fn to_py_err(context: &str, e: nrml_tools::NrmlError) -> PyErr {
    PyErr::new::<pyo3::exceptions::PyIOError, _>(format!("{}: {}", context, e))
}

fn paths_to_strings(paths: Vec<PathBuf>) -> Vec<String> {
    paths
        .into_iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect()
}

#[pyfunction]
pub fn parse_hazard_map(path: &str) -> PyResult<Vec<PyMapNode>> {
    let nodes = parser::parse_hazard_map(open(path)?)
        .map_err(|e| to_py_err("Failed to parse hazard map", e))?;
    Ok(nodes.into_iter().map(PyMapNode::from).collect())
}

#[pyfunction]
pub fn parse_loss_map(path: &str) -> PyResult<Vec<PyMapNode>> {
    let nodes = parser::parse_loss_map(open(path)?)
        .map_err(|e| to_py_err("Failed to parse loss map", e))?;
    Ok(nodes.into_iter().map(PyMapNode::from).collect())
}

#[pyfunction]
pub fn parse_hazard_curves(path: &str) -> PyResult<Vec<PyCurve>> {
    let curves = parser::parse_hazard_curves(open(path)?)
        .map_err(|e| to_py_err("Failed to parse hazard curves", e))?;
    Ok(curves.into_iter().map(PyCurve::from).collect())
}

#[pyfunction]
pub fn parse_loss_curves(path: &str) -> PyResult<Vec<PyCurve>> {
    let curves = parser::parse_loss_curves(open(path)?)
        .map_err(|e| to_py_err("Failed to parse loss curves", e))?;
    Ok(curves.into_iter().map(PyCurve::from).collect())
}

#[pyfunction]
pub fn parse_source_model(path: &str) -> PyResult<Vec<PySource>> {
    let sources = parser::parse_source_model(open(path)?)
        .map_err(|e| to_py_err("Failed to parse source model", e))?;
    Ok(sources.into_iter().map(PySource::from).collect())
}

/// 文書の種類を "HazardMap" などの名前で返す。NRML でなければ None
#[pyfunction]
pub fn detect_kind(path: &str) -> PyResult<Option<String>> {
    let kind = parser::detect_kind(open(path)?)
        .map_err(|e| to_py_err("Failed to read XML", e))?;
    Ok(kind.map(|k| format!("{:?}", k)))
}

#[pyfunction]
#[pyo3(signature = (path, output_stem, format="shp"))]
pub fn convert(path: &str, output_stem: &str, format: &str) -> PyResult<Vec<String>> {
    let map_format = match format {
        "shp" => MapFormat::Shapefile,
        "csv" => MapFormat::Csv,
        other => {
            return Err(PyErr::new::<pyo3::exceptions::PyValueError, _>(format!(
                "Unknown format: {}",
                other
            )))
        }
    };

    let kind = parser::detect_kind(open(path)?)
        .map_err(|e| to_py_err("Failed to read XML", e))?
        .ok_or_else(|| {
            PyErr::new::<pyo3::exceptions::PyValueError, _>(format!(
                "Not an NRML document: {}",
                path
            ))
        })?;

    let converter = Converter::new(map_format, GmtConfig::default());
    let written = converter
        .convert(kind, open(path)?, Path::new(output_stem))
        .map_err(|e| to_py_err("Failed to convert", e))?;
    Ok(paths_to_strings(written))
}

#[pyfunction]
pub fn exposure_txt_to_nrml(path: &str, output_path: &str) -> PyResult<String> {
    let written = Converter::default()
        .exposure_txt(open(path)?, Path::new(output_path))
        .map_err(|e| to_py_err("Failed to convert exposure", e))?;
    Ok(written.to_string_lossy().into_owned())
}

#[pyfunction]
pub fn exposure_grid_to_nrml(
    data_path: &str,
    metadata_path: &str,
    taxonomy: &str,
    output_path: &str,
) -> PyResult<String> {
    let written = Converter::default()
        .exposure_grid(
            open(metadata_path)?,
            open(data_path)?,
            taxonomy,
            Path::new(output_path),
        )
        .map_err(|e| to_py_err("Failed to convert population grid", e))?;
    Ok(written.to_string_lossy().into_owned())
}

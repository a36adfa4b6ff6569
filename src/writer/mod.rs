mod exposure;
mod text;

pub use exposure::ExposureWriter;
pub use text::TextWriter;

use gdal::spatial_ref::SpatialRef;
use gdal::vector::{
    FieldDefn, FieldValue, Geometry, Layer, LayerAccess, LayerOptions, OGRFieldType,
    OGRwkbGeometryType,
};
use gdal::{Dataset, DriverManager};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::model::{MapNode, RuptureRecord, SourceGeometry, SourceRecord};

const SHAPEFILE_DRIVER: &str = "ESRI Shapefile";
const WGS84_EPSG: u32 = 4326;

/// DBF の列定義
struct FieldSpec {
    name: &'static str,
    ty: OGRFieldType::Type,
    width: i32,
    precision: i32,
}

const VALUE_FIELDS: [FieldSpec; 1] = [FieldSpec {
    name: "VALUE",
    ty: OGRFieldType::OFTReal,
    width: 20,
    precision: 5,
}];

const SOURCE_FIELDS: [FieldSpec; 4] = [
    FieldSpec {
        name: "ID",
        ty: OGRFieldType::OFTString,
        width: 50,
        precision: 0,
    },
    FieldSpec {
        name: "NAME",
        ty: OGRFieldType::OFTString,
        width: 80,
        precision: 0,
    },
    FieldSpec {
        name: "MAX_MAG",
        ty: OGRFieldType::OFTReal,
        width: 10,
        precision: 1,
    },
    FieldSpec {
        name: "OCC_RATE",
        ty: OGRFieldType::OFTReal,
        width: 24,
        precision: 14,
    },
];

const RUPTURE_FIELDS: [FieldSpec; 3] = [
    FieldSpec {
        name: "TRT",
        ty: OGRFieldType::OFTString,
        width: 50,
        precision: 0,
    },
    FieldSpec {
        name: "MAG",
        ty: OGRFieldType::OFTReal,
        width: 10,
        precision: 1,
    },
    FieldSpec {
        name: "RAKE",
        ty: OGRFieldType::OFTReal,
        width: 10,
        precision: 1,
    },
];

/// GDAL/OGR の ESRI Shapefile ドライバで WGS84 のシェープファイルを書く
#[derive(Default)]
pub struct ShapefileWriter {}

impl ShapefileWriter {
    pub fn new() -> Self {
        Self {}
    }

    /// ハザードマップ・損失マップの地点をポイントレイヤとして書く
    pub fn write_map_nodes(&self, nodes: &[MapNode], output_path: &Path) -> Result<()> {
        tracing::info!(
            "Writing {} map nodes to {}",
            nodes.len(),
            output_path.display()
        );

        let mut dataset = create_dataset(output_path)?;
        let mut layer = create_layer(
            &mut dataset,
            &layer_name(output_path),
            OGRwkbGeometryType::wkbPoint,
            &VALUE_FIELDS,
        )?;

        for node in nodes {
            layer.create_feature_fields(
                point(node.lon, node.lat)?,
                &["VALUE"],
                &[FieldValue::RealValue(node.value)],
            )?;
        }

        Ok(())
    }

    /// 震源をポリゴン（面震源・断層震源）とポイント（ポイント震源）に分けて書く。
    ///
    /// 出力は `<stem>_polygons.shp` と `<stem>_points.shp`。地物のないレイヤは作らない。
    /// 作成したファイルのパスを返す。
    pub fn write_sources(
        &self,
        sources: &[SourceRecord],
        output_stem: &Path,
    ) -> Result<Vec<PathBuf>> {
        let (polygons, points): (Vec<&SourceRecord>, Vec<&SourceRecord>) = sources
            .iter()
            .partition(|s| matches!(s.geometry, SourceGeometry::Polygon(_)));

        let mut written = Vec::new();
        for (suffix, group, ty) in [
            ("polygons", polygons, OGRwkbGeometryType::wkbPolygon),
            ("points", points, OGRwkbGeometryType::wkbPoint),
        ] {
            if group.is_empty() {
                continue;
            }

            let path = suffixed_path(output_stem, suffix);
            tracing::info!("Writing {} sources to {}", group.len(), path.display());

            let mut dataset = create_dataset(&path)?;
            let mut layer = create_layer(&mut dataset, &layer_name(&path), ty, &SOURCE_FIELDS)?;
            for source in group {
                let geometry = match &source.geometry {
                    SourceGeometry::Polygon(ring) => polygon(ring)?,
                    SourceGeometry::Point(lon, lat) => point(*lon, *lat)?,
                };
                layer.create_feature_fields(
                    geometry,
                    &["ID", "NAME", "MAX_MAG", "OCC_RATE"],
                    &[
                        FieldValue::StringValue(source.id.clone()),
                        FieldValue::StringValue(source.name.clone()),
                        FieldValue::RealValue(source.max_magnitude),
                        FieldValue::RealValue(source.total_occurrence_rate),
                    ],
                )?;
            }
            written.push(path);
        }

        Ok(written)
    }

    /// 破壊面の地表投影をポリゴンレイヤとして書く
    pub fn write_ruptures(&self, ruptures: &[RuptureRecord], output_path: &Path) -> Result<()> {
        tracing::info!(
            "Writing {} ruptures to {}",
            ruptures.len(),
            output_path.display()
        );

        let mut dataset = create_dataset(output_path)?;
        let mut layer = create_layer(
            &mut dataset,
            &layer_name(output_path),
            OGRwkbGeometryType::wkbPolygon,
            &RUPTURE_FIELDS,
        )?;

        for rupture in ruptures {
            layer.create_feature_fields(
                polygon(&rupture.outline)?,
                &["TRT", "MAG", "RAKE"],
                &[
                    FieldValue::StringValue(rupture.tectonic_region.clone()),
                    FieldValue::RealValue(rupture.magnitude),
                    FieldValue::RealValue(rupture.rake),
                ],
            )?;
        }

        Ok(())
    }
}

fn create_dataset(output_path: &Path) -> Result<Dataset> {
    let driver = DriverManager::get_driver_by_name(SHAPEFILE_DRIVER)?;

    // 既存のシェープファイルは .dbf/.shx ごと置き換える
    if output_path.exists() {
        driver.delete(output_path)?;
    }

    Ok(driver.create_vector_only(output_path)?)
}

fn create_layer<'a>(
    dataset: &'a mut Dataset,
    name: &str,
    ty: OGRwkbGeometryType::Type,
    fields: &[FieldSpec],
) -> Result<Layer<'a>> {
    let srs = SpatialRef::from_epsg(WGS84_EPSG)?;
    let layer = dataset.create_layer(LayerOptions {
        name,
        srs: Some(&srs),
        ty,
        options: None,
    })?;

    for def in fields {
        let field = FieldDefn::new(def.name, def.ty)?;
        field.set_width(def.width);
        if def.precision > 0 {
            field.set_precision(def.precision);
        }
        field.add_to_layer(&layer)?;
    }

    Ok(layer)
}

fn layer_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "layer".to_string())
}

fn suffixed_path(stem: &Path, suffix: &str) -> PathBuf {
    let base = stem.with_extension("");
    let name = base
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    base.with_file_name(format!("{}_{}.shp", name, suffix))
}

fn point(lon: f64, lat: f64) -> Result<Geometry> {
    Ok(Geometry::from_wkt(&format!("POINT ({} {})", lon, lat))?)
}

fn polygon(ring: &[(f64, f64)]) -> Result<Geometry> {
    let coords = ring
        .iter()
        .map(|(lon, lat)| format!("{} {}", lon, lat))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(Geometry::from_wkt(&format!("POLYGON (({}))", coords))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceKind;
    use tempfile::TempDir;

    fn shapefile_available() -> bool {
        DriverManager::get_driver_by_name(SHAPEFILE_DRIVER).is_ok()
    }

    fn feature_count(path: &Path) -> u64 {
        let dataset = Dataset::open(path).unwrap();
        let layer = dataset.layer(0).unwrap();
        layer.feature_count()
    }

    fn source(id: &str, geometry: SourceGeometry) -> SourceRecord {
        SourceRecord {
            id: id.to_string(),
            name: format!("{} name", id),
            kind: SourceKind::Area,
            geometry,
            max_magnitude: 7.0,
            total_occurrence_rate: 1.5e-5,
            trace: None,
        }
    }

    #[test]
    fn test_suffixed_path() {
        assert_eq!(
            suffixed_path(Path::new("out/model.shp"), "points"),
            PathBuf::from("out/model_points.shp")
        );
        assert_eq!(
            suffixed_path(Path::new("model"), "polygons"),
            PathBuf::from("model_polygons.shp")
        );
    }

    #[test]
    fn test_write_map_nodes() {
        if !shapefile_available() {
            eprintln!("Skipping test: ESRI Shapefile driver not available");
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let output_path = temp_dir.path().join("hazard.shp");

        let nodes = vec![
            MapNode::new(9.15, 45.17, 0.25),
            MapNode::new(9.16, 45.18, 0.30),
        ];
        let writer = ShapefileWriter::new();
        writer.write_map_nodes(&nodes, &output_path).unwrap();
        assert_eq!(feature_count(&output_path), 2);

        // 上書きできること
        writer.write_map_nodes(&nodes[..1], &output_path).unwrap();
        assert_eq!(feature_count(&output_path), 1);
    }

    #[test]
    fn test_write_sources_splits_layers() {
        if !shapefile_available() {
            eprintln!("Skipping test: ESRI Shapefile driver not available");
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let stem = temp_dir.path().join("model");

        let ring = vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)];
        let sources = vec![
            source("a", SourceGeometry::Polygon(ring.clone())),
            source("b", SourceGeometry::Polygon(ring)),
            source("c", SourceGeometry::Point(10.0, 45.0)),
        ];

        let written = ShapefileWriter::new().write_sources(&sources, &stem).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(feature_count(&temp_dir.path().join("model_polygons.shp")), 2);
        assert_eq!(feature_count(&temp_dir.path().join("model_points.shp")), 1);
    }

    #[test]
    fn test_empty_point_layer_is_not_created() {
        if !shapefile_available() {
            eprintln!("Skipping test: ESRI Shapefile driver not available");
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let stem = temp_dir.path().join("faults");

        let sources = vec![source(
            "f",
            SourceGeometry::Polygon(vec![(0.0, 0.0), (0.0, 1.0), (0.1, 1.0), (0.0, 0.0)]),
        )];
        let written = ShapefileWriter::new().write_sources(&sources, &stem).unwrap();
        assert_eq!(written, vec![temp_dir.path().join("faults_polygons.shp")]);
        assert!(!temp_dir.path().join("faults_points.shp").exists());
    }

    #[test]
    fn test_write_ruptures() {
        if !shapefile_available() {
            eprintln!("Skipping test: ESRI Shapefile driver not available");
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let output_path = temp_dir.path().join("ruptures.shp");

        let rupture = RuptureRecord {
            tectonic_region: "Active Shallow Crust".to_string(),
            magnitude: 7.65,
            rake: 15.0,
            outline: vec![(0.0, 0.0), (0.0, 0.5), (0.1, 0.5), (0.1, 0.0), (0.0, 0.0)],
            plane_area: 100.0,
            footprint_area: 70.0,
        };
        ShapefileWriter::new()
            .write_ruptures(&[rupture], &output_path)
            .unwrap();
        assert_eq!(feature_count(&output_path), 1);
    }
}

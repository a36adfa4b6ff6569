use std::io::BufRead;
use tracing::{debug, warn};

use super::{close_ring, parse_pos, parse_pos_list_2d, parse_pos_list_3d, walk, Visit};
use crate::error::{NrmlError, Result};
use crate::geodesy::{polygon_area, ComplexFaultSurface, Location, SimpleFaultSurface};
use crate::mfd::{self, MfdTotals};
use crate::model::{SourceGeometry, SourceKind, SourceRecord};

/// 複雑断層の面積計算に使うメッシュ間隔 (km)
pub const COMPLEX_FAULT_MESH_SPACING: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Edge {
    Top,
    Bottom,
}

#[derive(Debug, Default)]
struct GutenbergRichter {
    a_value: Option<f64>,
    b_value: Option<f64>,
    min_magnitude: Option<f64>,
    max_magnitude: Option<f64>,
}

impl GutenbergRichter {
    fn totals(&self, context: &str) -> Result<MfdTotals> {
        mfd::truncated_gutenberg_richter(
            self.a_value.ok_or_else(|| NrmlError::missing("aValueCumulative", context))?,
            self.b_value.ok_or_else(|| NrmlError::missing("bValue", context))?,
            self.min_magnitude.ok_or_else(|| NrmlError::missing("minMagnitude", context))?,
            self.max_magnitude.ok_or_else(|| NrmlError::missing("maxMagnitude", context))?,
        )
    }
}

#[derive(Debug)]
struct PendingSource {
    kind: SourceKind,
    id: String,
    name: Option<String>,
    edge: Option<Edge>,
    boundary: Option<Vec<(f64, f64)>>,
    location: Option<(f64, f64)>,
    trace: Option<Vec<Location>>,
    top_edge: Option<Vec<Location>>,
    bottom_edge: Option<Vec<Location>>,
    dip: Option<f64>,
    upper_depth: Option<f64>,
    lower_depth: Option<f64>,
    gutenberg_richter: GutenbergRichter,
    mfds: Vec<MfdTotals>,
}

impl PendingSource {
    fn new(kind: SourceKind, id: &str) -> Self {
        Self {
            kind,
            id: id.to_string(),
            name: None,
            edge: None,
            boundary: None,
            location: None,
            trace: None,
            top_edge: None,
            bottom_edge: None,
            dip: None,
            upper_depth: None,
            lower_depth: None,
            gutenberg_richter: GutenbergRichter::default(),
            mfds: Vec::new(),
        }
    }

    fn context(&self) -> String {
        format!("source {}", self.id)
    }

    fn finish(self) -> Result<SourceRecord> {
        let context = self.context();
        let totals = mfd::combine(self.mfds.iter().copied())
            .ok_or_else(|| NrmlError::missing("truncatedGutenbergRichter", &context))?;

        let mut trace = None;
        let (geometry, rate) = match self.kind {
            SourceKind::Area => {
                let ring = close_ring(
                    self.boundary
                        .ok_or_else(|| NrmlError::missing("gml:posList", &context))?,
                );
                let area = polygon_area(&ring);
                (SourceGeometry::Polygon(ring), normalize(totals.occurrence_rate, area, &context)?)
            }
            SourceKind::Point => {
                let (lon, lat) = self
                    .location
                    .ok_or_else(|| NrmlError::missing("gml:pos", &context))?;
                (SourceGeometry::Point(lon, lat), totals.occurrence_rate)
            }
            SourceKind::SimpleFault => {
                let points = self
                    .trace
                    .ok_or_else(|| NrmlError::missing("gml:posList", &context))?;
                trace = Some(points.iter().map(|p| (p.lon, p.lat, p.depth)).collect());
                let surface = SimpleFaultSurface::from_top_edge(
                    points,
                    self.upper_depth
                        .ok_or_else(|| NrmlError::missing("upperSeismogenicDepth", &context))?,
                    self.lower_depth
                        .ok_or_else(|| NrmlError::missing("lowerSeismogenicDepth", &context))?,
                    self.dip.ok_or_else(|| NrmlError::missing("dip", &context))?,
                )?;
                let rate = normalize(totals.occurrence_rate, surface.area(), &context)?;
                (SourceGeometry::Polygon(surface.outline()), rate)
            }
            SourceKind::ComplexFault => {
                let surface = ComplexFaultSurface::from_edges(
                    self.top_edge
                        .ok_or_else(|| NrmlError::missing("faultTopEdge", &context))?,
                    self.bottom_edge
                        .ok_or_else(|| NrmlError::missing("faultBottomEdge", &context))?,
                    COMPLEX_FAULT_MESH_SPACING,
                )?;
                let rate = normalize(totals.occurrence_rate, surface.area(), &context)?;
                (SourceGeometry::Polygon(surface.outline()), rate)
            }
        };

        Ok(SourceRecord {
            id: self.id,
            name: self.name.unwrap_or_default(),
            kind: self.kind,
            geometry,
            max_magnitude: totals.max_magnitude,
            total_occurrence_rate: rate,
            trace,
        })
    }
}

fn normalize(rate: f64, area: f64, context: &str) -> Result<f64> {
    if area <= 0.0 {
        return Err(NrmlError::InvalidGeometry(format!(
            "{}: surface area must be positive, got {}",
            context, area
        )));
    }
    Ok(rate / area)
}

fn source_kind(name: &str) -> Option<SourceKind> {
    match name {
        "areaSource" => Some(SourceKind::Area),
        "pointSource" => Some(SourceKind::Point),
        "simpleFaultSource" => Some(SourceKind::SimpleFault),
        "complexFaultSource" => Some(SourceKind::ComplexFault),
        _ => None,
    }
}

/// 震源モデルを読み、震源ごとに ID、名前、形状、最大マグニチュード、総発生率を返す。
///
/// 面震源と断層震源の発生率は面積 (km²) あたりに正規化する。ポイント震源は
/// 年あたりのまま。
pub fn parse_source_model<R: BufRead>(reader: R) -> Result<Vec<SourceRecord>> {
    let mut sources = Vec::new();
    let mut pending: Option<PendingSource> = None;

    walk(reader, |visit| {
        match visit {
            Visit::Open(el) => {
                if let Some(kind) = source_kind(&el.name) {
                    pending = Some(PendingSource::new(kind, el.id().unwrap_or_default()));
                    return Ok(());
                }
                let Some(source) = pending.as_mut() else {
                    return Ok(());
                };
                match el.name.as_str() {
                    "faultTopEdge" => source.edge = Some(Edge::Top),
                    "faultBottomEdge" => source.edge = Some(Edge::Bottom),
                    "truncatedGutenbergRichter" => {
                        source.gutenberg_richter = GutenbergRichter::default()
                    }
                    _ => {}
                }
            }
            Visit::Close(el) => {
                if source_kind(&el.name).is_some() {
                    if let Some(source) = pending.take() {
                        sources.push(source.finish()?);
                    }
                    return Ok(());
                }
                let Some(source) = pending.as_mut() else {
                    return Ok(());
                };
                match el.name.as_str() {
                    "name" => source.name = Some(el.text.trim().to_string()),
                    "pos" if source.kind == SourceKind::Point => {
                        source.location = Some(parse_pos(&el.text)?)
                    }
                    "posList" => match (source.kind, source.edge) {
                        (SourceKind::Area, _) => {
                            source.boundary = Some(parse_pos_list_2d(&el.text)?)
                        }
                        (SourceKind::SimpleFault, _) => {
                            source.trace = Some(parse_pos_list_3d(&el.text)?)
                        }
                        (SourceKind::ComplexFault, Some(Edge::Top)) => {
                            source.top_edge = Some(parse_pos_list_3d(&el.text)?)
                        }
                        (SourceKind::ComplexFault, Some(Edge::Bottom)) => {
                            source.bottom_edge = Some(parse_pos_list_3d(&el.text)?)
                        }
                        _ => warn!("Ignoring posList outside fault edges in {}", source.context()),
                    },
                    "faultTopEdge" | "faultBottomEdge" => source.edge = None,
                    "dip" => source.dip = Some(el.number()?),
                    "upperSeismogenicDepth" => source.upper_depth = Some(el.number()?),
                    "lowerSeismogenicDepth" => source.lower_depth = Some(el.number()?),
                    "aValueCumulative" => source.gutenberg_richter.a_value = Some(el.number()?),
                    "bValue" => source.gutenberg_richter.b_value = Some(el.number()?),
                    "minMagnitude" => source.gutenberg_richter.min_magnitude = Some(el.number()?),
                    "maxMagnitude" => source.gutenberg_richter.max_magnitude = Some(el.number()?),
                    "truncatedGutenbergRichter" => {
                        let totals = source.gutenberg_richter.totals(&source.context())?;
                        source.mfds.push(totals);
                    }
                    "evenlyDiscretizedIncrementalMFD" => {
                        let totals = mfd::evenly_discretized(
                            el.attribute_number("minVal")?,
                            el.attribute_number("binSize")?,
                            &el.numbers()?,
                        )?;
                        source.mfds.push(totals);
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    })?;

    debug!("Parsed {} seismic sources", sources.len());
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE_MODEL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<nrml xmlns:gml="http://www.opengis.net/gml" xmlns="http://openquake.org/xmlns/nrml/0.3" gml:id="n1">
  <sourceModel gml:id="sm1">
    <config/>
    <areaSource gml:id="src01">
      <gml:name>Cell</gml:name>
      <tectonicRegion>Active Shallow Crust</tectonicRegion>
      <areaBoundary>
        <gml:Polygon><gml:exterior><gml:LinearRing>
          <gml:posList>0.0 0.0 1.0 0.0 1.0 1.0 0.0 1.0</gml:posList>
        </gml:LinearRing></gml:exterior></gml:Polygon>
      </areaBoundary>
      <ruptureRateModel>
        <truncatedGutenbergRichter>
          <aValueCumulative>5.0</aValueCumulative>
          <bValue>1.0</bValue>
          <minMagnitude>5.0</minMagnitude>
          <maxMagnitude>7.0</maxMagnitude>
        </truncatedGutenbergRichter>
      </ruptureRateModel>
      <ruptureRateModel>
        <truncatedGutenbergRichter>
          <aValueCumulative>4.0</aValueCumulative>
          <bValue>1.0</bValue>
          <minMagnitude>5.0</minMagnitude>
          <maxMagnitude>7.5</maxMagnitude>
        </truncatedGutenbergRichter>
      </ruptureRateModel>
    </areaSource>
    <pointSource gml:id="src02">
      <gml:name>Point</gml:name>
      <location><gml:Point><gml:pos>10.0 45.0</gml:pos></gml:Point></location>
      <ruptureRateModel>
        <evenlyDiscretizedIncrementalMFD minVal="5.05" binSize="0.1" type="ML">0.01 0.005 0.001</evenlyDiscretizedIncrementalMFD>
      </ruptureRateModel>
    </pointSource>
    <simpleFaultSource gml:id="src03">
      <gml:name>Fault</gml:name>
      <rake>90.0</rake>
      <evenlyDiscretizedIncrementalMFD minVal="6.55" binSize="0.1" type="ML">0.002 0.001</evenlyDiscretizedIncrementalMFD>
      <simpleFaultGeometry gml:id="sfg_1">
        <faultTrace><gml:LineString><gml:posList>0.0 0.0 0.0 0.0 0.5 0.0</gml:posList></gml:LineString></faultTrace>
        <dip>90</dip>
        <upperSeismogenicDepth>0.0</upperSeismogenicDepth>
        <lowerSeismogenicDepth>10.0</lowerSeismogenicDepth>
      </simpleFaultGeometry>
    </simpleFaultSource>
    <complexFaultSource gml:id="src04">
      <gml:name>Slab</gml:name>
      <truncatedGutenbergRichter>
        <aValueCumulative>3.0</aValueCumulative>
        <bValue>1.0</bValue>
        <minMagnitude>5.0</minMagnitude>
        <maxMagnitude>8.0</maxMagnitude>
      </truncatedGutenbergRichter>
      <complexFaultGeometry>
        <faultEdges>
          <faultTopEdge><gml:LineString><gml:posList>0.0 0.0 0.0 0.0 0.5 0.0</gml:posList></gml:LineString></faultTopEdge>
          <faultBottomEdge><gml:LineString><gml:posList>0.0 0.0 10.0 0.0 0.5 10.0</gml:posList></gml:LineString></faultBottomEdge>
        </faultEdges>
      </complexFaultGeometry>
    </complexFaultSource>
  </sourceModel>
</nrml>"#;

    #[test]
    fn test_parse_all_source_kinds() {
        let sources = parse_source_model(SOURCE_MODEL.as_bytes()).unwrap();
        let kinds: Vec<_> = sources.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SourceKind::Area,
                SourceKind::Point,
                SourceKind::SimpleFault,
                SourceKind::ComplexFault
            ]
        );
        assert_eq!(sources[0].id, "src01");
        assert_eq!(sources[0].name, "Cell");
    }

    #[test]
    fn test_area_source_combines_mfds_and_normalizes() {
        let sources = parse_source_model(SOURCE_MODEL.as_bytes()).unwrap();
        let area = &sources[0];

        assert_eq!(area.max_magnitude, 7.5);
        let SourceGeometry::Polygon(ring) = &area.geometry else {
            panic!("area source must be a polygon");
        };
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.first(), ring.last());

        let rate = (1.0 - 0.01) + (0.1 - 10f64.powf(-3.5));
        let expected = rate / polygon_area(ring);
        assert!((area.total_occurrence_rate - expected).abs() < 1e-15);
    }

    #[test]
    fn test_point_source_rate_is_not_normalized() {
        let sources = parse_source_model(SOURCE_MODEL.as_bytes()).unwrap();
        let point = &sources[1];
        assert_eq!(point.geometry, SourceGeometry::Point(10.0, 45.0));
        assert!((point.max_magnitude - 5.25).abs() < 1e-12);
        assert!((point.total_occurrence_rate - 0.016).abs() < 1e-12);
    }

    #[test]
    fn test_fault_sources_are_normalized_by_surface_area() {
        let sources = parse_source_model(SOURCE_MODEL.as_bytes()).unwrap();

        let simple = &sources[2];
        assert_eq!(simple.trace, Some(vec![(0.0, 0.0, 0.0), (0.0, 0.5, 0.0)]));
        assert!((simple.max_magnitude - 6.65).abs() < 1e-12);
        let length = crate::geodesy::EARTH_RADIUS * 0.5f64.to_radians();
        let expected = 0.003 / (length * 10.0);
        assert!((simple.total_occurrence_rate - expected).abs() / expected < 1e-9);

        let complex = &sources[3];
        assert_eq!(complex.max_magnitude, 8.0);
        let expected = (0.01 - 1e-5) / (length * 10.0);
        assert!((complex.total_occurrence_rate - expected).abs() / expected < 5e-3);
    }

    #[test]
    fn test_source_without_mfd_is_an_error() {
        let xml = r#"<nrml xmlns:gml="http://www.opengis.net/gml"><sourceModel>
            <pointSource gml:id="p"><gml:pos>1 2</gml:pos></pointSource>
        </sourceModel></nrml>"#;
        let err = parse_source_model(xml.as_bytes()).unwrap_err();
        assert!(matches!(err, NrmlError::MissingElement { .. }), "{}", err);
    }
}

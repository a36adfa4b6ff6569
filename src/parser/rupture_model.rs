use std::io::BufRead;
use tracing::{debug, warn};

use super::source_model::{Edge, COMPLEX_FAULT_MESH_SPACING};
use super::{parse_pos_list_3d, walk, Visit};
use crate::error::{NrmlError, Result};
use crate::geodesy::{ComplexFaultSurface, Location, SimpleFaultSurface};
use crate::model::RuptureRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuptureKind {
    SimpleFault,
    ComplexFault,
}

fn rupture_kind(name: &str) -> Option<RuptureKind> {
    match name {
        "simpleFaultRupture" => Some(RuptureKind::SimpleFault),
        "complexFaultRupture" => Some(RuptureKind::ComplexFault),
        _ => None,
    }
}

#[derive(Debug)]
struct PendingRupture {
    id: String,
    kind: RuptureKind,
    magnitude: Option<f64>,
    tectonic_region: Option<String>,
    rake: Option<f64>,
    edge: Option<Edge>,
    top_edge: Option<Vec<Location>>,
    bottom_edge: Option<Vec<Location>>,
    dip: Option<f64>,
    upper_depth: Option<f64>,
    lower_depth: Option<f64>,
}

impl PendingRupture {
    fn new(id: &str, kind: RuptureKind) -> Self {
        Self {
            id: id.to_string(),
            kind,
            magnitude: None,
            tectonic_region: None,
            rake: None,
            edge: None,
            top_edge: None,
            bottom_edge: None,
            dip: None,
            upper_depth: None,
            lower_depth: None,
        }
    }

    fn finish(self) -> Result<RuptureRecord> {
        let context = format!("rupture {}", self.id);
        let top_edge = self
            .top_edge
            .ok_or_else(|| NrmlError::missing("gml:posList", &context))?;

        let (outline, plane_area, footprint_area) = match self.kind {
            RuptureKind::SimpleFault => {
                let upper = self
                    .upper_depth
                    .ok_or_else(|| NrmlError::missing("upperSeismogenicDepth", &context))?;
                let lower = self
                    .lower_depth
                    .ok_or_else(|| NrmlError::missing("lowerSeismogenicDepth", &context))?;
                let dip = self.dip.ok_or_else(|| NrmlError::missing("dip", &context))?;
                let surface = SimpleFaultSurface::from_top_edge(top_edge, upper, lower, dip)?;
                (surface.outline(), surface.area(), surface.footprint_area())
            }
            RuptureKind::ComplexFault => {
                let bottom_edge = self
                    .bottom_edge
                    .ok_or_else(|| NrmlError::missing("faultBottomEdge", &context))?;
                let surface = ComplexFaultSurface::from_edges(
                    top_edge,
                    bottom_edge,
                    COMPLEX_FAULT_MESH_SPACING,
                )?;
                (surface.outline(), surface.area(), surface.footprint_area())
            }
        };

        Ok(RuptureRecord {
            tectonic_region: self
                .tectonic_region
                .ok_or_else(|| NrmlError::missing("tectonicRegion", &context))?,
            magnitude: self
                .magnitude
                .ok_or_else(|| NrmlError::missing("magnitude", &context))?,
            rake: self.rake.ok_or_else(|| NrmlError::missing("rake", &context))?,
            outline,
            plane_area,
            footprint_area,
        })
    }
}

/// `simpleFaultRupture` と `complexFaultRupture` ごとに断層面の外周、地体構造区分、
/// マグニチュード、すべり角を返す
pub fn parse_rupture_model<R: BufRead>(reader: R) -> Result<Vec<RuptureRecord>> {
    let mut ruptures = Vec::new();
    let mut pending: Option<PendingRupture> = None;

    walk(reader, |visit| {
        match visit {
            Visit::Open(el) => {
                if let Some(kind) = rupture_kind(&el.name) {
                    pending = Some(PendingRupture::new(el.id().unwrap_or_default(), kind));
                    return Ok(());
                }
                let Some(rupture) = pending.as_mut() else {
                    return Ok(());
                };
                match el.name.as_str() {
                    "faultTopEdge" => rupture.edge = Some(Edge::Top),
                    "faultBottomEdge" => rupture.edge = Some(Edge::Bottom),
                    _ => {}
                }
            }
            Visit::Close(el) => {
                if rupture_kind(&el.name).is_some() {
                    if let Some(rupture) = pending.take() {
                        ruptures.push(rupture.finish()?);
                    }
                    return Ok(());
                }
                let Some(rupture) = pending.as_mut() else {
                    return Ok(());
                };
                match el.name.as_str() {
                    "magnitude" => rupture.magnitude = Some(el.number()?),
                    "tectonicRegion" => {
                        rupture.tectonic_region = Some(el.text.trim().to_string())
                    }
                    "rake" => rupture.rake = Some(el.number()?),
                    "posList" => match (rupture.kind, rupture.edge) {
                        (RuptureKind::SimpleFault, _) | (_, Some(Edge::Top)) => {
                            rupture.top_edge = Some(parse_pos_list_3d(&el.text)?)
                        }
                        (_, Some(Edge::Bottom)) => {
                            rupture.bottom_edge = Some(parse_pos_list_3d(&el.text)?)
                        }
                        _ => warn!(
                            "Ignoring posList outside fault edges in rupture {}",
                            rupture.id
                        ),
                    },
                    "faultTopEdge" | "faultBottomEdge" => rupture.edge = None,
                    "dip" => rupture.dip = Some(el.number()?),
                    "upperSeismogenicDepth" => rupture.upper_depth = Some(el.number()?),
                    "lowerSeismogenicDepth" => rupture.lower_depth = Some(el.number()?),
                    _ => {}
                }
            }
            _ => {}
        }
        Ok(())
    })?;

    debug!("Parsed {} ruptures", ruptures.len());
    Ok(ruptures)
}

use std::io::BufRead;
use tracing::debug;

use super::{parse_pos, walk, Visit};
use crate::error::{NrmlError, Result};
use crate::model::{Curve, CurveKind};

/// ハザードカーブ。`hazardCurveField` の `IML` を後続の全 `HCNode` で共有する
pub fn parse_hazard_curves<R: BufRead>(reader: R) -> Result<Vec<Curve>> {
    let mut curves = Vec::new();
    let mut imls: Option<Vec<f64>> = None;
    let mut node_id: Option<String> = None;
    let mut pos: Option<(f64, f64)> = None;
    let mut poes: Option<Vec<f64>> = None;

    walk(reader, |visit| {
        match visit {
            Visit::Open(el) if el.name == "HCNode" => {
                node_id = Some(el.id().unwrap_or("HCNode").to_string());
                pos = None;
                poes = None;
            }
            Visit::Close(el) => match el.name.as_str() {
                "IML" if node_id.is_none() => imls = Some(el.numbers()?),
                "pos" if node_id.is_some() => pos = Some(parse_pos(&el.text)?),
                "poE" if node_id.is_some() => poes = Some(el.numbers()?),
                "HCNode" => {
                    let context = node_id.take().unwrap_or_default();
                    let levels = imls.clone().ok_or_else(|| NrmlError::missing("IML", &context))?;
                    let (lon, lat) = pos
                        .take()
                        .ok_or_else(|| NrmlError::missing("gml:pos", &context))?;
                    let poes = poes.take().ok_or_else(|| NrmlError::missing("poE", &context))?;
                    curves.push(build_curve(
                        None,
                        lon,
                        lat,
                        CurveKind::HazardCurve,
                        levels,
                        poes,
                        &context,
                    )?);
                }
                _ => {}
            },
            _ => {}
        }
        Ok(())
    })?;

    debug!("Parsed {} hazard curves", curves.len());
    Ok(curves)
}

/// 損失カーブ・損失率カーブ。`asset` ごとに1本
pub fn parse_loss_curves<R: BufRead>(reader: R) -> Result<Vec<Curve>> {
    let mut curves = Vec::new();
    let mut node_pos: Option<(f64, f64)> = None;
    let mut asset_id: Option<String> = None;
    let mut asset_pos: Option<(f64, f64)> = None;
    let mut kind: Option<CurveKind> = None;
    let mut abscissae: Option<Vec<f64>> = None;
    let mut poes: Option<Vec<f64>> = None;

    walk(reader, |visit| {
        match visit {
            Visit::Open(el) => match el.name.as_str() {
                "LCNode" => node_pos = None,
                "asset" => {
                    asset_id = Some(el.id().unwrap_or_default().to_string());
                    asset_pos = None;
                    kind = None;
                    abscissae = None;
                    poes = None;
                }
                _ => {}
            },
            Visit::Close(el) => match el.name.as_str() {
                "pos" if asset_id.is_some() => asset_pos = Some(parse_pos(&el.text)?),
                "pos" => node_pos = Some(parse_pos(&el.text)?),
                "loss" if asset_id.is_some() => abscissae = Some(el.numbers()?),
                "lossRatio" if asset_id.is_some() => abscissae = Some(el.numbers()?),
                "poE" if asset_id.is_some() => poes = Some(el.numbers()?),
                "lossCurve" if asset_id.is_some() => kind = Some(CurveKind::LossCurve),
                "lossRatioCurve" if asset_id.is_some() => kind = Some(CurveKind::LossRatioCurve),
                "asset" => {
                    let id = asset_id.take().unwrap_or_default();
                    let context = format!("asset {}", id);
                    let (lon, lat) = asset_pos
                        .take()
                        .or(node_pos)
                        .ok_or_else(|| NrmlError::missing("gml:pos", &context))?;
                    let kind = kind
                        .take()
                        .ok_or_else(|| NrmlError::missing("lossCurve", &context))?;
                    let xs = abscissae.take().ok_or_else(|| NrmlError::missing("loss", &context))?;
                    let ys = poes.take().ok_or_else(|| NrmlError::missing("poE", &context))?;
                    curves.push(build_curve(Some(id), lon, lat, kind, xs, ys, &context)?);
                }
                _ => {}
            },
        }
        Ok(())
    })?;

    debug!("Parsed {} loss curves", curves.len());
    Ok(curves)
}

fn build_curve(
    id: Option<String>,
    lon: f64,
    lat: f64,
    kind: CurveKind,
    abscissae: Vec<f64>,
    poes: Vec<f64>,
    context: &str,
) -> Result<Curve> {
    if abscissae.len() != poes.len() {
        return Err(NrmlError::Inconsistent(format!(
            "{}: {} abscissae but {} probabilities of exceedance",
            context,
            abscissae.len(),
            poes.len()
        )));
    }

    Ok(Curve {
        id,
        lon,
        lat,
        kind,
        abscissae,
        poes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HAZARD_CURVES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<nrml xmlns:gml="http://www.opengis.net/gml" xmlns="http://openquake.org/xmlns/nrml/0.3">
  <hazardResult gml:id="hr1">
    <hazardCurveField gml:id="hcf_1" endBranchLabel="1_1">
      <IML IMT="PGA">0.005 0.007 0.0098</IML>
      <HCNode gml:id="hcn_1">
        <HCSite><gml:Point srsName="epsg:4326"><gml:pos>-122.5 37.5</gml:pos></gml:Point></HCSite>
        <HazardCurve><poE>0.98 0.97 0.95</poE></HazardCurve>
      </HCNode>
      <HCNode gml:id="hcn_2">
        <HCSite><gml:Point srsName="epsg:4326"><gml:pos>-122.4 37.5</gml:pos></gml:Point></HCSite>
        <HazardCurve><poE>0.90 0.80 0.70</poE></HazardCurve>
      </HCNode>
    </hazardCurveField>
  </hazardResult>
</nrml>"#;

    #[test]
    fn test_parse_hazard_curves_shares_imls() {
        let curves = parse_hazard_curves(HAZARD_CURVES.as_bytes()).unwrap();
        assert_eq!(curves.len(), 2);
        assert_eq!(curves[1].lon, -122.4);
        assert_eq!(curves[1].abscissae, vec![0.005, 0.007, 0.0098]);
        assert_eq!(curves[1].poes, vec![0.90, 0.80, 0.70]);
        assert_eq!(curves[0].kind, CurveKind::HazardCurve);
        assert_eq!(curves[0].id, None);
    }

    #[test]
    fn test_hazard_curve_length_mismatch() {
        let xml = HAZARD_CURVES.replace("0.98 0.97 0.95", "0.98 0.97");
        let err = parse_hazard_curves(xml.as_bytes()).unwrap_err();
        assert!(matches!(err, NrmlError::Inconsistent(_)), "{}", err);
    }

    #[test]
    fn test_parse_loss_and_loss_ratio_curves() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<nrml xmlns:gml="http://www.opengis.net/gml" xmlns="http://openquake.org/xmlns/nrml/0.3">
  <riskResult gml:id="rr">
    <lossCurveList gml:id="lcl">
      <LCNode gml:id="lcn_1">
        <site><gml:Point><gml:pos>9.15 45.17</gml:pos></gml:Point></site>
        <asset gml:id="a1">
          <lossCurve>
            <poE>0.5 0.1</poE>
            <loss>100.0 200.0</loss>
          </lossCurve>
        </asset>
        <asset gml:id="a2">
          <site><gml:Point><gml:pos>9.20 45.20</gml:pos></gml:Point></site>
          <lossRatioCurve>
            <poE>0.4 0.2 0.1</poE>
            <lossRatio>0.1 0.2 0.3</lossRatio>
          </lossRatioCurve>
        </asset>
      </LCNode>
    </lossCurveList>
  </riskResult>
</nrml>"#;

        let curves = parse_loss_curves(xml.as_bytes()).unwrap();
        assert_eq!(curves.len(), 2);

        assert_eq!(curves[0].id.as_deref(), Some("a1"));
        assert_eq!((curves[0].lon, curves[0].lat), (9.15, 45.17));
        assert_eq!(curves[0].kind, CurveKind::LossCurve);
        assert_eq!(curves[0].abscissae, vec![100.0, 200.0]);

        assert_eq!(curves[1].id.as_deref(), Some("a2"));
        assert_eq!((curves[1].lon, curves[1].lat), (9.20, 45.20));
        assert_eq!(curves[1].kind, CurveKind::LossRatioCurve);
        assert_eq!(curves[1].points().last(), Some((0.3, 0.1)));
    }
}

use std::io::BufRead;
use tracing::debug;

use super::{parse_pos, walk, Visit};
use crate::error::{NrmlError, Result};
use crate::model::MapNode;

/// `HMNode` ごとに位置（`gml:pos`）と値（`IML`）を取り出す
pub fn parse_hazard_map<R: BufRead>(reader: R) -> Result<Vec<MapNode>> {
    let mut nodes = Vec::new();
    let mut node_id: Option<String> = None;
    let mut pos: Option<(f64, f64)> = None;
    let mut value: Option<f64> = None;

    walk(reader, |visit| {
        match visit {
            Visit::Open(el) if el.name == "HMNode" => {
                node_id = Some(el.id().unwrap_or("HMNode").to_string());
                pos = None;
                value = None;
            }
            Visit::Close(el) if node_id.is_some() => match el.name.as_str() {
                "pos" => pos = Some(parse_pos(&el.text)?),
                "IML" => value = Some(el.number()?),
                "HMNode" => {
                    let context = node_id.take().unwrap_or_default();
                    let (lon, lat) = pos
                        .take()
                        .ok_or_else(|| NrmlError::missing("gml:pos", &context))?;
                    let value = value
                        .take()
                        .ok_or_else(|| NrmlError::missing("IML", &context))?;
                    nodes.push(MapNode::new(lon, lat, value));
                }
                _ => {}
            },
            _ => {}
        }
        Ok(())
    })?;

    debug!("Parsed {} hazard map nodes", nodes.len());
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HAZARD_MAP: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<nrml xmlns:gml="http://www.opengis.net/gml" xmlns="http://openquake.org/xmlns/nrml/0.3" gml:id="n1">
  <hazardResult gml:id="hr1">
    <config/>
    <hazardMap gml:id="hm1" IMT="PGA" poE="0.1">
      <HMNode gml:id="n1">
        <HMSite><gml:Point srsName="epsg:4326"><gml:pos>-118.229 33.859</gml:pos></gml:Point></HMSite>
        <IML>0.1</IML>
      </HMNode>
      <HMNode gml:id="n2">
        <HMSite><gml:Point srsName="epsg:4326"><gml:pos>-118.129 33.859</gml:pos></gml:Point></HMSite>
        <IML>0.25</IML>
      </HMNode>
    </hazardMap>
  </hazardResult>
</nrml>"#;

    #[test]
    fn test_parse_hazard_map_keeps_every_node() {
        let nodes = parse_hazard_map(HAZARD_MAP.as_bytes()).unwrap();
        assert_eq!(
            nodes,
            vec![
                MapNode::new(-118.229, 33.859, 0.1),
                MapNode::new(-118.129, 33.859, 0.25),
            ]
        );
    }

    #[test]
    fn test_missing_iml_is_an_error() {
        let xml = r#"<nrml xmlns:gml="http://www.opengis.net/gml"><HMNode gml:id="x">
            <gml:pos>1 2</gml:pos></HMNode></nrml>"#;
        let err = parse_hazard_map(xml.as_bytes()).unwrap_err();
        assert!(matches!(err, NrmlError::MissingElement { element: "IML", .. }), "{}", err);
    }

    #[test]
    fn test_malformed_xml_is_an_error() {
        let xml = r#"<nrml><HMNode><IML>0.1</HMNode></nrml>"#;
        assert!(parse_hazard_map(xml.as_bytes()).is_err());
    }
}

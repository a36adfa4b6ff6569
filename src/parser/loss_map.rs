use std::io::BufRead;
use tracing::debug;

use super::{parse_pos, walk, Visit};
use crate::error::{NrmlError, Result};
use crate::model::MapNode;

/// `LMNode` ごとに位置と、その地点の全資産の損失の合計を取り出す。
///
/// 決定論的な損失マップは `loss/mean`、確率論的な損失マップは `loss/value` に
/// 資産ごとの値を持つ。どちらも合計する。
pub fn parse_loss_map<R: BufRead>(reader: R) -> Result<Vec<MapNode>> {
    let mut nodes = Vec::new();
    let mut node_id: Option<String> = None;
    let mut pos: Option<(f64, f64)> = None;
    let mut total = 0.0;
    let mut assets = 0usize;

    walk(reader, |visit| {
        match visit {
            Visit::Open(el) if el.name == "LMNode" => {
                node_id = Some(el.id().unwrap_or("LMNode").to_string());
                pos = None;
                total = 0.0;
            }
            Visit::Close(el) if node_id.is_some() => match el.name.as_str() {
                "pos" => pos = Some(parse_pos(&el.text)?),
                "mean" | "value" => {
                    total += el.number()?;
                    assets += 1;
                }
                "LMNode" => {
                    let context = node_id.take().unwrap_or_default();
                    let (lon, lat) = pos
                        .take()
                        .ok_or_else(|| NrmlError::missing("gml:pos", &context))?;
                    nodes.push(MapNode::new(lon, lat, total));
                }
                _ => {}
            },
            _ => {}
        }
        Ok(())
    })?;

    debug!("Parsed {} loss map nodes ({} asset losses)", nodes.len(), assets);
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sums_mean_losses_per_node() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<nrml xmlns:gml="http://www.opengis.net/gml" xmlns="http://openquake.org/xmlns/nrml/0.3">
  <riskResult gml:id="rr">
    <lossMap gml:id="lm" endBranchLabel="0" lossCategory="building" unit="EUR">
      <LMNode gml:id="lmn_1">
        <site><gml:Point srsName="epsg:4326"><gml:pos>9.15 45.17</gml:pos></gml:Point></site>
        <loss assetRef="a1"><mean>120.5</mean><stdDev>3.0</stdDev></loss>
        <loss assetRef="a2"><mean>79.5</mean><stdDev>1.0</stdDev></loss>
      </LMNode>
      <LMNode gml:id="lmn_2">
        <site><gml:Point srsName="epsg:4326"><gml:pos>9.16 45.18</gml:pos></gml:Point></site>
        <loss assetRef="a3"><mean>10.0</mean><stdDev>0.5</stdDev></loss>
      </LMNode>
    </lossMap>
  </riskResult>
</nrml>"#;

        let nodes = parse_loss_map(xml.as_bytes()).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0], MapNode::new(9.15, 45.17, 200.0));
        assert_eq!(nodes[1], MapNode::new(9.16, 45.18, 10.0));
    }

    #[test]
    fn test_sums_probabilistic_values() {
        let xml = r#"<nrml xmlns:gml="http://www.opengis.net/gml">
      <LMNode gml:id="n">
        <site><gml:Point><gml:pos>1.0 2.0</gml:pos></gml:Point></site>
        <loss assetRef="a1"><value>1.25</value></loss>
        <loss assetRef="a2"><value>2.5</value></loss>
      </LMNode></nrml>"#;

        let nodes = parse_loss_map(xml.as_bytes()).unwrap();
        assert_eq!(nodes, vec![MapNode::new(1.0, 2.0, 3.75)]);
    }

    #[test]
    fn test_node_without_losses_is_zero() {
        let xml = r#"<nrml xmlns:gml="http://www.opengis.net/gml"><LMNode>
            <gml:pos>1 2</gml:pos></LMNode></nrml>"#;
        let nodes = parse_loss_map(xml.as_bytes()).unwrap();
        assert_eq!(nodes, vec![MapNode::new(1.0, 2.0, 0.0)]);
    }
}

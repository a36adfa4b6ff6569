//! 曝露データの入力：テキスト形式のポートフォリオとバイナリ人口グリッド

use csv::{ReaderBuilder, Trim};
use ini::Ini;
use std::collections::HashMap;
use std::io::{BufRead, Read};
use tracing::{debug, info};

use crate::error::{NrmlError, Result};
use crate::model::{ExposureAsset, ExposureMetadata, GridMetadata, MapNode};

/// 資産行のヘッダに必須の列
pub const ASSET_FIELDS: [&str; 12] = [
    "lon",
    "lat",
    "taxonomy",
    "stco",
    "number",
    "area",
    "reco",
    "coco",
    "occupantDay",
    "occupantNight",
    "deductible",
    "limit",
];

/// テキスト形式のポートフォリオから作る曝露モデルの gml:id
pub const PORTFOLIO_MODEL_ID: &str = "ep1";
/// 人口グリッドから作る曝露モデルの gml:id
pub const GRID_MODEL_ID: &str = "em1";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExposurePortfolio {
    /// `exposureModel` の gml:id
    pub model_id: String,
    pub metadata: ExposureMetadata,
    pub assets: Vec<ExposureAsset>,
}

/// テキスト形式のポートフォリオを読む。
///
/// 1行目がメタデータの項目名、2行目がその値。続いて `ASSET_FIELDS` を全て含む
/// ヘッダ行があり、その後ろが資産の行になる。
pub fn read_exposure_txt<R: BufRead>(mut reader: R) -> Result<ExposurePortfolio> {
    let mut content = String::new();
    reader.read_to_string(&mut content)?;

    let lines: Vec<&str> = content.lines().collect();
    let metadata = parse_metadata(&lines)?;

    let header_index = lines
        .iter()
        .enumerate()
        .skip(2)
        .find(|(_, line)| is_asset_header(line))
        .map(|(i, _)| i)
        .ok_or_else(|| NrmlError::MissingField("asset header line".to_string()))?;

    let asset_block = lines[header_index..].join("\n");
    let mut csv_reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(asset_block.as_bytes());

    let mut assets = Vec::new();
    for record in csv_reader.deserialize::<ExposureAsset>() {
        assets.push(record?);
    }

    debug!(
        "Read exposure portfolio {} with {} assets",
        metadata.exposure_list_id,
        assets.len()
    );

    Ok(ExposurePortfolio {
        model_id: PORTFOLIO_MODEL_ID.to_string(),
        metadata,
        assets,
    })
}

fn is_asset_header(line: &str) -> bool {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    ASSET_FIELDS.iter().all(|name| fields.contains(name))
}

fn parse_metadata(lines: &[&str]) -> Result<ExposureMetadata> {
    let block = lines.iter().take(2).copied().collect::<Vec<_>>().join("\n");
    let mut csv_reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(block.as_bytes());

    let headers = csv_reader.headers()?.clone();
    let values = csv_reader
        .records()
        .next()
        .transpose()?
        .ok_or_else(|| NrmlError::MissingField("metadata values".to_string()))?;

    let fields: HashMap<&str, &str> = headers
        .iter()
        .zip(values.iter())
        .filter(|(_, v)| !v.is_empty())
        .collect();
    let get = |key: &str| fields.get(key).map(|v| v.to_string());

    Ok(ExposureMetadata {
        exposure_list_id: get("expModId")
            .ok_or_else(|| NrmlError::MissingField("expModId".to_string()))?,
        asset_category: get("assetCategory"),
        description: get("description"),
        stco_type: get("stcoType"),
        stco_unit: get("stcoUnit"),
        area_type: get("areaType"),
        area_unit: get("areaUnit"),
        coco_type: get("cocoType"),
        coco_unit: get("cocoUnit"),
        reco_type: get("recoType"),
        reco_unit: get("recoUnit"),
        taxonomy_source: get("taxonomySource"),
    })
}

/// `[georeference]` セクションを持つ INI からグリッドの地理参照を読む
pub fn read_grid_metadata<R: Read>(mut reader: R) -> Result<GridMetadata> {
    let ini = Ini::read_from(&mut reader)?;
    let section = ini
        .section(Some("georeference"))
        .ok_or_else(|| NrmlError::MissingField("[georeference]".to_string()))?;

    let value = |key: &str| -> Result<&str> {
        section
            .get(key)
            .ok_or_else(|| NrmlError::MissingField(format!("georeference.{}", key)))
    };
    let float = |key: &str| -> Result<f64> {
        let raw = value(key)?;
        raw.trim().parse().map_err(|_| NrmlError::InvalidNumber {
            element: format!("georeference.{}", key),
            value: raw.to_string(),
        })
    };
    let count = |key: &str| -> Result<usize> {
        let raw = value(key)?;
        raw.trim().parse().map_err(|_| NrmlError::InvalidNumber {
            element: format!("georeference.{}", key),
            value: raw.to_string(),
        })
    };

    let metadata = GridMetadata {
        nrows: count("nrows")?,
        ncols: count("ncols")?,
        xmin: float("xmin")?,
        ymin: float("ymin")?,
        xmax: float("xmax")?,
        ymax: float("ymax")?,
    };

    if metadata.nrows == 0 || metadata.ncols == 0 {
        return Err(NrmlError::Inconsistent(
            "grid must have at least one row and one column".to_string(),
        ));
    }
    Ok(metadata)
}

/// リトルエンディアン 16bit 整数のセル値
pub fn read_grid_values<R: Read>(mut reader: R) -> Result<Vec<i16>> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;

    if bytes.len() % 2 != 0 {
        return Err(NrmlError::Inconsistent(format!(
            "binary grid has an odd number of bytes ({})",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect())
}

/// 北西の角から行優先でセルを地点に変換する。負の値は 0 にする
pub fn grid_nodes(metadata: &GridMetadata, values: &[i16]) -> Result<Vec<MapNode>> {
    let expected = metadata.nrows.checked_mul(metadata.ncols).ok_or_else(|| {
        NrmlError::Inconsistent(format!(
            "grid size {}x{} overflows",
            metadata.nrows, metadata.ncols
        ))
    })?;
    if values.len() != expected {
        return Err(NrmlError::Inconsistent(format!(
            "grid declares {}x{} cells but data holds {}",
            metadata.nrows,
            metadata.ncols,
            values.len()
        )));
    }

    let (x_step, y_step) = (metadata.x_step(), metadata.y_step());
    let nodes: Vec<MapNode> = values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let (row, col) = (i / metadata.ncols, i % metadata.ncols);
            MapNode::new(
                metadata.xmin + col as f64 * x_step,
                metadata.ymax - row as f64 * y_step,
                f64::from(value.max(0)),
            )
        })
        .collect();

    info!("Converted {} grid cells", nodes.len());
    Ok(nodes)
}

/// 人口グリッドを単一のタクソノミーの資産からなるポートフォリオにする
pub fn grid_portfolio(nodes: &[MapNode], taxonomy: &str) -> ExposurePortfolio {
    let assets = nodes
        .iter()
        .map(|node| ExposureAsset {
            lon: Some(node.lon.to_string()),
            lat: Some(node.lat.to_string()),
            taxonomy: Some(taxonomy.to_string()),
            number: Some(node.value.to_string()),
            ..Default::default()
        })
        .collect();

    ExposurePortfolio {
        model_id: GRID_MODEL_ID.to_string(),
        metadata: ExposureMetadata {
            exposure_list_id: "el1".to_string(),
            asset_category: Some("population".to_string()),
            ..Default::default()
        },
        assets,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PORTFOLIO: &str = "expModId,assetCategory,description,stcoType,stcoUnit,areaType,areaUnit,cocoType,cocoUnit,recoType,recoUnit,taxonomySource
PAV01,buildings,Collection of existing building in downtown Pavia,aggregated,USD,per_asset,GBP,per_area,CHF,aggregated, EUR,pavia taxonomy

lon,lat,taxonomy,stco,number,area,reco,coco,occupantDay,occupantNight,deductible,limit
28.6925,40.9775,RC_MR_LC,40000,50,1500,4000,1000,10,,0.05,32000
28.6975,40.9825,RC_MR_LC,300000,100,1000,30000,2000,15,,0.10,240000";

    #[test]
    fn test_read_metadata() {
        let portfolio = read_exposure_txt(PORTFOLIO.as_bytes()).unwrap();
        let metadata = portfolio.metadata;

        assert_eq!(metadata.exposure_list_id, "PAV01");
        assert_eq!(metadata.asset_category.as_deref(), Some("buildings"));
        assert_eq!(
            metadata.description.as_deref(),
            Some("Collection of existing building in downtown Pavia")
        );
        assert_eq!(metadata.reco_unit.as_deref(), Some("EUR"));
        assert_eq!(metadata.taxonomy_source.as_deref(), Some("pavia taxonomy"));
    }

    #[test]
    fn test_read_assets() {
        let portfolio = read_exposure_txt(PORTFOLIO.as_bytes()).unwrap();
        assert_eq!(portfolio.assets.len(), 2);

        let first = &portfolio.assets[0];
        assert_eq!(first.lon.as_deref(), Some("28.6925"));
        assert_eq!(first.lat.as_deref(), Some("40.9775"));
        assert_eq!(first.taxonomy.as_deref(), Some("RC_MR_LC"));
        assert_eq!(first.stco.as_deref(), Some("40000"));
        assert_eq!(first.occupants_day.as_deref(), Some("10"));
        assert_eq!(first.occupants_night, None);
        assert_eq!(first.deductible.as_deref(), Some("0.05"));
        assert_eq!(first.limit.as_deref(), Some("32000"));

        assert_eq!(portfolio.assets[1].deductible.as_deref(), Some("0.10"));
    }

    #[test]
    fn test_missing_asset_header() {
        let text = "expModId,assetCategory\nPAV01,buildings\n";
        assert!(read_exposure_txt(text.as_bytes()).is_err());
    }

    #[test]
    fn test_grid_metadata_and_nodes() {
        let ini = "[georeference]\nnrows = 2\nncols = 3\nxmin = 10.0\nymin = 40.0\nxmax = 13.0\nymax = 42.0\n";
        let metadata = read_grid_metadata(ini.as_bytes()).unwrap();
        assert_eq!(metadata.nrows, 2);
        assert_eq!(metadata.ncols, 3);

        let bytes: Vec<u8> = [5i16, -1, 7, 0, 12, 300]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let values = read_grid_values(bytes.as_slice()).unwrap();
        assert_eq!(values, vec![5, -1, 7, 0, 12, 300]);

        let nodes = grid_nodes(&metadata, &values).unwrap();
        assert_eq!(nodes[0], MapNode::new(10.0, 42.0, 5.0));
        assert_eq!(nodes[1], MapNode::new(11.0, 42.0, 0.0));
        assert_eq!(nodes[3], MapNode::new(10.0, 41.0, 0.0));
        assert_eq!(nodes[5], MapNode::new(12.0, 41.0, 300.0));
    }

    #[test]
    fn test_grid_size_mismatch() {
        let metadata = GridMetadata {
            nrows: 2,
            ncols: 2,
            xmin: 0.0,
            ymin: 0.0,
            xmax: 1.0,
            ymax: 1.0,
        };
        assert!(grid_nodes(&metadata, &[1, 2, 3]).is_err());
        assert!(read_grid_values([1u8, 2, 3].as_slice()).is_err());
    }

    #[test]
    fn test_grid_size_overflow() {
        let metadata = GridMetadata {
            nrows: usize::MAX,
            ncols: 2,
            xmin: 0.0,
            ymin: 0.0,
            xmax: 1.0,
            ymax: 1.0,
        };
        assert!(matches!(
            grid_nodes(&metadata, &[1, 2]),
            Err(NrmlError::Inconsistent(_))
        ));
    }

    #[test]
    fn test_grid_portfolio() {
        let portfolio = grid_portfolio(&[MapNode::new(1.5, 2.5, 10.0)], "POP");
        assert_eq!(portfolio.model_id, "em1");
        assert_eq!(portfolio.metadata.asset_category.as_deref(), Some("population"));
        assert_eq!(portfolio.assets[0].number.as_deref(), Some("10"));
        assert_eq!(portfolio.assets[0].taxonomy.as_deref(), Some("POP"));
    }
}

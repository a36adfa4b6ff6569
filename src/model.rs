use serde::Deserialize;

/// 経緯度と値を持つ地点（ハザードマップ、損失マップ、人口グリッド）
#[derive(Debug, Clone, PartialEq)]
pub struct MapNode {
    pub lon: f64,
    pub lat: f64,
    pub value: f64,
}

impl MapNode {
    pub fn new(lon: f64, lat: f64, value: f64) -> Self {
        Self { lon, lat, value }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveKind {
    HazardCurve,
    LossCurve,
    LossRatioCurve,
}

impl CurveKind {
    pub fn x_label(&self) -> &'static str {
        match self {
            CurveKind::HazardCurve => "Intensity measure levels",
            CurveKind::LossCurve => "loss",
            CurveKind::LossRatioCurve => "loss ratio",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    pub id: Option<String>,
    pub lon: f64,
    pub lat: f64,
    pub kind: CurveKind,
    pub abscissae: Vec<f64>,
    pub poes: Vec<f64>,
}

impl Curve {
    /// (x, 超過確率) の組を順番に返す
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.abscissae.iter().copied().zip(self.poes.iter().copied())
    }

    /// 出力画像のファイル名（拡張子なし）
    pub fn file_stem(&self) -> String {
        match &self.id {
            Some(id) => format!("{}_{}_{}", id, self.lon, self.lat),
            None => format!("{}_{}", self.lon, self.lat),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Area,
    Point,
    SimpleFault,
    ComplexFault,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceGeometry {
    /// 閉じたリング（最初と最後の頂点が同じ）
    Polygon(Vec<(f64, f64)>),
    Point(f64, f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub id: String,
    pub name: String,
    pub kind: SourceKind,
    pub geometry: SourceGeometry,
    pub max_magnitude: f64,
    /// 年あたり。ポイント震源以外は単位面積（km²）あたり
    pub total_occurrence_rate: f64,
    /// 単純断層の `faultTrace`（lon, lat, depth）。NRML の値をそのまま保持する
    pub trace: Option<Vec<(f64, f64, f64)>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuptureRecord {
    pub tectonic_region: String,
    pub magnitude: f64,
    pub rake: f64,
    pub outline: Vec<(f64, f64)>,
    /// 断層面の面積 (km²)
    pub plane_area: f64,
    /// 地表投影ポリゴンの面積 (km²)
    pub footprint_area: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExposureMetadata {
    pub exposure_list_id: String,
    pub asset_category: Option<String>,
    pub description: Option<String>,
    pub stco_type: Option<String>,
    pub stco_unit: Option<String>,
    pub area_type: Option<String>,
    pub area_unit: Option<String>,
    pub coco_type: Option<String>,
    pub coco_unit: Option<String>,
    pub reco_type: Option<String>,
    pub reco_unit: Option<String>,
    pub taxonomy_source: Option<String>,
}

/// ポートフォリオの1行。値は入力の文字列表現をそのまま保持する
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExposureAsset {
    pub lon: Option<String>,
    pub lat: Option<String>,
    pub taxonomy: Option<String>,
    pub stco: Option<String>,
    pub number: Option<String>,
    pub area: Option<String>,
    pub reco: Option<String>,
    pub coco: Option<String>,
    #[serde(rename = "occupantDay")]
    pub occupants_day: Option<String>,
    #[serde(rename = "occupantNight")]
    pub occupants_night: Option<String>,
    pub deductible: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridMetadata {
    pub nrows: usize,
    pub ncols: usize,
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl GridMetadata {
    pub fn x_step(&self) -> f64 {
        ((self.xmax - self.xmin) / self.ncols as f64).abs()
    }

    pub fn y_step(&self) -> f64 {
        ((self.ymax - self.ymin) / self.nrows as f64).abs()
    }
}

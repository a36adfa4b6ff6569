//! 分解 (disaggregation) 結果の確率質量関数 (PMF) とビン境界

use ini::Ini;
use std::io::Read;

use crate::error::{NrmlError, Result};

/// 設定ファイルでビン境界を記述するセクション
const HAZARD_SECTION: &str = "HAZARD";

/// 描画できる PMF の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PmfKind {
    Trt,
    Mag,
    Dist,
    MagDist,
    MagDistEps,
    LatLon,
}

impl PmfKind {
    pub const ALL: [PmfKind; 6] = [
        PmfKind::Trt,
        PmfKind::MagDistEps,
        PmfKind::Dist,
        PmfKind::Mag,
        PmfKind::MagDist,
        PmfKind::LatLon,
    ];

    /// 結果ファイル内のデータセット名から判定する
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.key() == key)
    }

    pub fn key(&self) -> &'static str {
        match self {
            PmfKind::Trt => "TRTPMF",
            PmfKind::Mag => "MagPMF",
            PmfKind::Dist => "DistPMF",
            PmfKind::MagDist => "MagDistPMF",
            PmfKind::MagDistEps => "MagDistEpsPMF",
            PmfKind::LatLon => "LatLonPMF",
        }
    }

    /// 出力画像のファイル名（拡張子なし）
    pub fn file_stem(&self) -> &'static str {
        match self {
            PmfKind::Trt => "trt_pmf",
            PmfKind::Mag => "mag_pmf",
            PmfKind::Dist => "dist_pmf",
            PmfKind::MagDist => "mag_dist_pmf",
            PmfKind::MagDistEps => "mag_dist_eps_pmf",
            PmfKind::LatLon => "lat_lon_pmf",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            PmfKind::Trt => "Tectonic Region Type PMF",
            PmfKind::Mag => "Magnitude PMF",
            PmfKind::Dist => "Distance PMF",
            PmfKind::MagDist => "Magnitude-Distance PMF",
            PmfKind::MagDistEps => "Magnitude-Distance-Epsilon PMF",
            PmfKind::LatLon => "Longitude-Latitude PMF",
        }
    }
}

/// 多次元の PMF。値は行優先（最後の添字が最も速く変わる）で並ぶ
#[derive(Debug, Clone, PartialEq)]
pub struct Pmf {
    pub kind: PmfKind,
    pub shape: Vec<usize>,
    pub values: Vec<f64>,
}

impl Pmf {
    pub fn new(kind: PmfKind, shape: Vec<usize>, values: Vec<f64>) -> Result<Self> {
        let len = shape
            .iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(n))
            .ok_or_else(|| NrmlError::Inconsistent(format!("{}: shape overflows", kind.key())))?;
        if len != values.len() {
            return Err(NrmlError::Inconsistent(format!(
                "{}: shape {:?} needs {} values, got {}",
                kind.key(),
                shape,
                len,
                values.len()
            )));
        }
        Ok(Self {
            kind,
            shape,
            values,
        })
    }

    /// 添字の値。次元数が合わないか範囲外なら `None`
    pub fn get(&self, index: &[usize]) -> Option<f64> {
        if index.len() != self.shape.len() {
            return None;
        }
        let mut offset = 0;
        for (&i, &n) in index.iter().zip(&self.shape) {
            if i >= n {
                return None;
            }
            offset = offset * n + i;
        }
        self.values.get(offset).copied()
    }

    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::max)
    }
}

/// `[HAZARD]` セクションのビン境界
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BinLimits {
    pub lons: Vec<f64>,
    pub lats: Vec<f64>,
    pub mags: Vec<f64>,
    pub eps: Vec<f64>,
    pub dists: Vec<f64>,
}

impl BinLimits {
    /// PMF の形がビン数と一致するか確かめる。TRT はビン境界を持たない
    pub fn check(&self, pmf: &Pmf) -> Result<()> {
        let bins = |limits: &[f64]| limits.len().saturating_sub(1);
        let expected = match pmf.kind {
            PmfKind::Trt => return Ok(()),
            PmfKind::Mag => vec![bins(&self.mags)],
            PmfKind::Dist => vec![bins(&self.dists)],
            PmfKind::MagDist => vec![bins(&self.mags), bins(&self.dists)],
            PmfKind::MagDistEps => vec![bins(&self.mags), bins(&self.dists), bins(&self.eps)],
            PmfKind::LatLon => vec![bins(&self.lats), bins(&self.lons)],
        };
        if pmf.shape != expected {
            return Err(NrmlError::Inconsistent(format!(
                "{}: shape {:?} does not match bin limits {:?}",
                pmf.kind.key(),
                pmf.shape,
                expected
            )));
        }
        Ok(())
    }
}

/// OpenQuake の設定ファイルから分解のビン境界を読む
pub fn read_bin_limits<R: Read>(mut reader: R) -> Result<BinLimits> {
    let ini = Ini::read_from(&mut reader)?;
    let section = ini
        .section(Some(HAZARD_SECTION))
        .ok_or_else(|| NrmlError::MissingField(format!("[{}]", HAZARD_SECTION)))?;

    let limits = |key: &str| -> Result<Vec<f64>> {
        let raw = section
            .get(key)
            .ok_or_else(|| NrmlError::MissingField(key.to_string()))?;
        let values = raw
            .split(',')
            .map(|v| {
                v.trim().parse::<f64>().map_err(|_| NrmlError::InvalidNumber {
                    element: key.to_string(),
                    value: v.trim().to_string(),
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        if values.len() < 2 || values.windows(2).any(|w| w[0] >= w[1]) {
            return Err(NrmlError::Inconsistent(format!(
                "{} must list at least two increasing limits, got {:?}",
                key, raw
            )));
        }
        Ok(values)
    };

    Ok(BinLimits {
        lons: limits("LONGITUDE_BIN_LIMITS")?,
        lats: limits("LATITUDE_BIN_LIMITS")?,
        mags: limits("MAGNITUDE_BIN_LIMITS")?,
        eps: limits("EPSILON_BIN_LIMITS")?,
        dists: limits("DISTANCE_BIN_LIMITS")?,
    })
}

/// HDF5 の結果ファイルから描画できる PMF を読む。未対応のデータセットは飛ばす
#[cfg(feature = "hdf5")]
pub fn read_pmfs(path: &std::path::Path) -> Result<Vec<Pmf>> {
    use tracing::{info, warn};

    let file = hdf5::File::open(path)?;
    let mut pmfs = Vec::new();
    for name in file.member_names()? {
        let Some(kind) = PmfKind::from_key(&name) else {
            warn!("{} is not supported for plotting", name);
            continue;
        };
        let dataset = file.dataset(&name)?;
        let pmf = Pmf::new(kind, dataset.shape(), dataset.read_raw::<f64>()?)?;
        info!("Read {} {:?}", name, pmf.shape);
        pmfs.push(pmf);
    }
    Ok(pmfs)
}

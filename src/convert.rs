//! 入力1つを読み、変換結果を書き出す一連の処理

use rayon::prelude::*;
use std::fs;
use std::io::{BufRead, Read};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::disaggregation::{read_bin_limits, Pmf};
use crate::error::Result;
use crate::exposure::{
    grid_nodes, grid_portfolio, read_exposure_txt, read_grid_metadata, read_grid_values,
};
use crate::model::{Curve, MapNode};
use crate::parser::{
    parse_hazard_curves, parse_hazard_map, parse_loss_curves, parse_loss_map, parse_rupture_model,
    parse_source_model, NrmlKind,
};
use crate::plot::{
    curve_plans, disaggregation_plans, loss_map_plan, source_model_plan, GmtConfig, GmtRunner,
};
use crate::writer::{ExposureWriter, ShapefileWriter, TextWriter};

/// 地点データの出力形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MapFormat {
    #[default]
    Shapefile,
    Csv,
}

impl MapFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            MapFormat::Shapefile => "shp",
            MapFormat::Csv => "csv",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Converter {
    pub map_format: MapFormat,
    pub gmt: GmtConfig,
}

impl Converter {
    pub fn new(map_format: MapFormat, gmt: GmtConfig) -> Self {
        Self { map_format, gmt }
    }

    pub fn hazard_map<R: BufRead>(&self, reader: R, output_stem: &Path) -> Result<Vec<PathBuf>> {
        let nodes = parse_hazard_map(reader)?;
        self.write_map(&nodes, output_stem)
    }

    pub fn loss_map<R: BufRead>(&self, reader: R, output_stem: &Path) -> Result<Vec<PathBuf>> {
        let nodes = parse_loss_map(reader)?;
        self.write_map(&nodes, output_stem)
    }

    fn write_map(&self, nodes: &[MapNode], output_stem: &Path) -> Result<Vec<PathBuf>> {
        let path = output_stem.with_extension(self.map_format.extension());
        match self.map_format {
            MapFormat::Shapefile => ShapefileWriter::new().write_map_nodes(nodes, &path)?,
            MapFormat::Csv => TextWriter::new().write_map_nodes_file(nodes, &path)?,
        }
        Ok(vec![path])
    }

    /// カーブ画像を `output_dir` に並列で描く
    pub fn hazard_curves<R: BufRead>(&self, reader: R, output_dir: &Path) -> Result<Vec<PathBuf>> {
        let curves = parse_hazard_curves(reader)?;
        self.render_curves(&curves, output_dir)
    }

    pub fn loss_curves<R: BufRead>(&self, reader: R, output_dir: &Path) -> Result<Vec<PathBuf>> {
        let curves = parse_loss_curves(reader)?;
        self.render_curves(&curves, output_dir)
    }

    fn render_curves(&self, curves: &[Curve], output_dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(output_dir)?;
        let runner = GmtRunner::new(&self.gmt);
        let plans = curve_plans(curves, output_dir)?;
        info!("Rendering {} curves", plans.len());
        plans.par_iter().map(|plan| runner.run(plan)).collect()
    }

    pub fn source_model<R: BufRead>(&self, reader: R, output_stem: &Path) -> Result<Vec<PathBuf>> {
        let sources = parse_source_model(reader)?;
        ShapefileWriter::new().write_sources(&sources, output_stem)
    }

    pub fn rupture_model<R: BufRead>(&self, reader: R, output_stem: &Path) -> Result<Vec<PathBuf>> {
        let ruptures = parse_rupture_model(reader)?;
        let path = output_stem.with_extension("shp");
        ShapefileWriter::new().write_ruptures(&ruptures, &path)?;
        Ok(vec![path])
    }

    pub fn exposure_txt<R: BufRead>(&self, reader: R, output_path: &Path) -> Result<PathBuf> {
        let portfolio = read_exposure_txt(reader)?;
        ExposureWriter::new().write_file(&portfolio, output_path)?;
        Ok(output_path.to_path_buf())
    }

    /// 人口グリッド（INI の地理参照とバイナリのセル値）を NRML の曝露モデルにする
    pub fn exposure_grid<M: Read, D: Read>(
        &self,
        metadata: M,
        data: D,
        taxonomy: &str,
        output_path: &Path,
    ) -> Result<PathBuf> {
        let grid = read_grid_metadata(metadata)?;
        let values = read_grid_values(data)?;
        let nodes = grid_nodes(&grid, &values)?;
        ExposureWriter::new().write_file(&grid_portfolio(&nodes, taxonomy), output_path)?;
        Ok(output_path.to_path_buf())
    }

    pub fn plot_loss_map<R: BufRead>(&self, reader: R, output_dir: &Path) -> Result<PathBuf> {
        let nodes = parse_loss_map(reader)?;
        let plan = loss_map_plan(&nodes, output_dir, &self.gmt)?;
        GmtRunner::new(&self.gmt).run(&plan)
    }

    pub fn plot_source_model<R: BufRead>(&self, reader: R, output_stem: &Path) -> Result<PathBuf> {
        let sources = parse_source_model(reader)?;
        let plan = source_model_plan(&sources, output_stem, &self.gmt)?;
        GmtRunner::new(&self.gmt).run(&plan)
    }

    /// 分解結果の PMF を描画する。ビン境界は設定ファイルの `[HAZARD]` から読む
    pub fn plot_disaggregation<R: Read>(
        &self,
        pmfs: &[Pmf],
        config: R,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        let limits = read_bin_limits(config)?;
        let plans = disaggregation_plans(pmfs, &limits, output_dir, &self.gmt)?;
        fs::create_dir_all(output_dir)?;
        let runner = GmtRunner::new(&self.gmt);
        plans.par_iter().map(|plan| runner.run(plan)).collect()
    }

    /// HDF5 の結果ファイルにある PMF をすべて描画する
    #[cfg(feature = "hdf5")]
    pub fn plot_disaggregation_file<R: Read>(
        &self,
        results: &Path,
        config: R,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        let pmfs = crate::disaggregation::read_pmfs(results)?;
        if pmfs.is_empty() {
            warn!("{}: no PMF to plot", results.display());
        }
        self.plot_disaggregation(&pmfs, config, output_dir)
    }

    /// 文書の種類に応じた変換を行う。曲線は `output_stem` をディレクトリとして使う。
    ///
    /// 曝露モデルはすでに NRML の入力形式なので何もしない。
    pub fn convert<R: BufRead>(
        &self,
        kind: NrmlKind,
        reader: R,
        output_stem: &Path,
    ) -> Result<Vec<PathBuf>> {
        if let Some(parent) = output_stem.parent() {
            fs::create_dir_all(parent)?;
        }

        match kind {
            NrmlKind::HazardMap => self.hazard_map(reader, output_stem),
            NrmlKind::LossMap => self.loss_map(reader, output_stem),
            NrmlKind::HazardCurves => self.hazard_curves(reader, output_stem),
            NrmlKind::LossCurves => self.loss_curves(reader, output_stem),
            NrmlKind::SourceModel => self.source_model(reader, output_stem),
            NrmlKind::RuptureModel => self.rupture_model(reader, output_stem),
            NrmlKind::ExposureModel => {
                warn!(
                    "Exposure models need no conversion: {}",
                    output_stem.display()
                );
                Ok(Vec::new())
            }
        }
    }
}

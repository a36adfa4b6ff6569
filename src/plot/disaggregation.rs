use std::path::Path;

use super::{multi_segment, GmtConfig, GmtPlan, GmtStep};
use crate::disaggregation::{BinLimits, Pmf, PmfKind};
use crate::error::{NrmlError, Result};

/// 3 次元の棒グラフで PMF の値ごとに使う色（イプシロンのビン順）
const EPSILON_COLORS: [&str; 8] = [
    "blue", "green", "red", "cyan", "magenta", "yellow", "black", "white",
];

/// TRTPMF の各要素に対応する地体構造区分
const TECTONIC_REGIONS: [&str; 5] = ["ACTIVE", "STABLE", "SUB_INTER", "SUB_INTRA", "VOLCANIC"];

const VIEW_POINT: &str = "-p200/30";
const BAR: &str = "-Sb0.5c";
const COLUMN: &str = "-So0.5c";

/// PMF ごとに1枚の図を描く計画を返す。
///
/// 出力は `<output_dir>/<trt_pmf|mag_pmf|...>.png`。1 次元の PMF はビンの中心に棒を立て、
/// 2 次元以上の PMF は 3 次元の柱で描く。各計画は専用の作業ディレクトリを使う。
pub fn disaggregation_plans(
    pmfs: &[Pmf],
    limits: &BinLimits,
    output_dir: &Path,
    config: &GmtConfig,
) -> Result<Vec<GmtPlan>> {
    pmfs.iter()
        .map(|pmf| {
            limits.check(pmf)?;
            let max = pmf.max();
            if max <= 0.0 {
                return Err(NrmlError::Inconsistent(format!(
                    "{}: no positive probability to plot",
                    pmf.kind.key()
                )));
            }
            let mut canvas = Canvas::new(pmf.kind, output_dir, max, config);
            match pmf.kind {
                PmfKind::Trt => canvas.trt(pmf),
                PmfKind::Mag => canvas.histogram(pmf, &limits.mags, "Magnitude"),
                PmfKind::Dist => canvas.histogram(pmf, &limits.dists, "Distance (km)"),
                PmfKind::MagDist => canvas.mag_dist(pmf, limits),
                PmfKind::MagDistEps => canvas.mag_dist_eps(pmf, limits)?,
                PmfKind::LatLon => canvas.lat_lon(pmf, limits),
            }
            Ok(canvas.finish())
        })
        .collect()
}

fn centers(limits: &[f64]) -> Vec<f64> {
    limits.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect()
}

struct Canvas {
    plan: GmtPlan,
    kind: PmfKind,
    postscript: String,
    data: String,
    max: f64,
    xy_size: f64,
    z_size: f64,
}

impl Canvas {
    fn new(kind: PmfKind, output_dir: &Path, max: f64, config: &GmtConfig) -> Self {
        let stem = kind.file_stem();
        Self {
            plan: GmtPlan::new(
                &output_dir.join(stem),
                output_dir.join(format!("{}.png", stem)),
            ),
            kind,
            postscript: format!("{}.ps", stem),
            data: format!("{}.dat", stem),
            max,
            xy_size: config.xy_size,
            z_size: config.z_size,
        }
    }

    fn title(&self) -> String {
        format!("-BWS+t{}", self.kind.title())
    }

    fn title_3d(&self) -> String {
        format!("-BWSneZ+t{}", self.kind.title())
    }

    fn flat_projection(&self) -> String {
        format!("-JX{}c/{}c", self.xy_size, self.z_size)
    }

    fn z_projection(&self) -> String {
        format!("-JZ{}c", self.z_size)
    }

    /// 1 次元の棒グラフ
    fn histogram(&mut self, pmf: &Pmf, limits: &[f64], label: &str) {
        let (first, last) = (limits[0], limits[limits.len() - 1]);
        let region = format!("-R{}/{}/0/{}", first, last, self.max);
        let rows: String = centers(limits)
            .iter()
            .zip(&pmf.values)
            .map(|(x, p)| format!("{} {}\n", x, p))
            .collect();
        self.bars(region, format!("-Bxa+l{}", label), rows);
    }

    fn trt(&mut self, pmf: &Pmf) {
        let n = pmf.values.len();
        let region = format!("-R0/{}/0/{}", n + 1, self.max);
        let rows: String = pmf
            .values
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{} {}\n", i + 1, p))
            .collect();
        self.bars(region, "-Bx0+lTectonic Region Type".to_string(), rows);

        let labels: String = (0..n)
            .map(|i| match TECTONIC_REGIONS.get(i) {
                Some(name) => format!("{} 0 {}\n", i + 1, name),
                None => format!("{} 0 TRT{}\n", i + 1, i + 1),
            })
            .collect();
        self.plan.add_data_file("labels.dat", labels);
        self.plan.push(
            GmtStep::new(
                "pstext",
                ["labels.dat", "-R", "-J", "-F+f8p+jTC", "-D0/-0.2c", "-N", "-O"],
            )
            .append_to(&self.postscript),
        );
    }

    fn bars(&mut self, region: String, x_axis: String, rows: String) {
        let projection = self.flat_projection();
        let basemap = GmtStep::new(
            "psbasemap",
            [
                region.clone(),
                projection.clone(),
                x_axis,
                "-Bya+lProbability".to_string(),
                self.title(),
                "-K".to_string(),
            ],
        )
        .write_to(&self.postscript);
        self.plan.add_data_file(&self.data, rows);
        self.plan.push(basemap);
        let mut args = vec![
            self.data.clone(),
            region,
            projection,
            BAR.to_string(),
            "-Ggray".to_string(),
            "-Wthinnest".to_string(),
            "-O".to_string(),
        ];
        if self.kind == PmfKind::Trt {
            args.push("-K".to_string());
        }
        self.plan
            .push(GmtStep::new("psxy", args).append_to(&self.postscript));
    }

    /// 3 次元の枠。`frame` が `pscoast` なら海岸線を描く
    fn frame_3d(&mut self, frame: &str, region: &str, projection: &str, axes: [String; 3]) {
        let mut args = vec![
            region.to_string(),
            projection.to_string(),
            self.z_projection(),
            VIEW_POINT.to_string(),
        ];
        args.extend(axes);
        args.push(self.title_3d());
        if frame == "pscoast" {
            args.extend(
                ["-Dh", "-W0.25p", "-Glightgray", "--FORMAT_GEO_MAP=ddd:mmF"].map(String::from),
            );
        }
        args.push("-K".to_string());
        self.plan
            .push(GmtStep::new(frame, args).write_to(&self.postscript));
    }

    fn columns(
        &mut self,
        region: &str,
        projection: &str,
        symbol: &str,
        fill: &[&str],
        last: bool,
    ) {
        let mut args = vec![
            self.data.clone(),
            region.to_string(),
            projection.to_string(),
            self.z_projection(),
            VIEW_POINT.to_string(),
            symbol.to_string(),
            "-Wthinnest".to_string(),
        ];
        args.extend(fill.iter().map(|f| f.to_string()));
        args.push("-O".to_string());
        if !last {
            args.push("-K".to_string());
        }
        self.plan
            .push(GmtStep::new("psxyz", args).append_to(&self.postscript));
    }

    fn mag_dist_region(&self, limits: &BinLimits) -> String {
        format!(
            "-R{}/{}/{}/{}/0/{}",
            limits.mags[0],
            limits.mags[limits.mags.len() - 1],
            limits.dists[0],
            limits.dists[limits.dists.len() - 1],
            self.max
        )
    }

    fn mag_dist_axes() -> [String; 3] {
        [
            "-Bxa+lMagnitude (Mw)".to_string(),
            "-Bya+lDistance (km)".to_string(),
            "-Bza+lProbability".to_string(),
        ]
    }

    fn mag_dist(&mut self, pmf: &Pmf, limits: &BinLimits) {
        let region = self.mag_dist_region(limits);
        let projection = format!("-JX{}c/{}c", self.xy_size, self.xy_size);
        let (mags, dists) = (centers(&limits.mags), centers(&limits.dists));

        // 奥の柱から描く
        let mut rows = String::new();
        for i in (0..mags.len()).rev() {
            for j in (0..dists.len()).rev() {
                let p = pmf.get(&[i, j]).unwrap_or(0.0);
                rows.push_str(&format!("{} {} {}\n", mags[i], dists[j], p));
            }
        }
        self.plan.add_data_file(&self.data, rows);

        self.frame_3d("psbasemap", &region, &projection, Self::mag_dist_axes());
        self.columns(&region, &projection, COLUMN, &["-Ggray"], true);
    }

    /// セルごとにイプシロンのビンを値の小さい順に重ね、前の値を柱の底にする
    fn mag_dist_eps(&mut self, pmf: &Pmf, limits: &BinLimits) -> Result<()> {
        let eps_bins = limits.eps.len() - 1;
        if eps_bins > EPSILON_COLORS.len() {
            return Err(NrmlError::Inconsistent(format!(
                "{}: {} epsilon bins, at most {} can be coloured",
                self.kind.key(),
                eps_bins,
                EPSILON_COLORS.len()
            )));
        }
        let region = self.mag_dist_region(limits);
        let projection = format!("-JX{}c/{}c", self.xy_size, self.xy_size);
        let (mags, dists) = (centers(&limits.mags), centers(&limits.dists));

        let mut segments = Vec::new();
        for i in (0..mags.len()).rev() {
            for j in (0..dists.len()).rev() {
                let mut cell: Vec<(usize, f64)> = (0..eps_bins)
                    .map(|k| (k, pmf.get(&[i, j, k]).unwrap_or(0.0)))
                    .collect();
                cell.sort_by(|a, b| a.1.total_cmp(&b.1));

                let mut base = 0.0;
                for (k, p) in cell {
                    segments.push((
                        format!("-G{}", EPSILON_COLORS[k]),
                        vec![format!("{} {} {} {}", mags[i], dists[j], p, base)],
                    ));
                    base = p;
                }
            }
        }
        self.plan.add_data_file(
            &self.data,
            multi_segment(segments.iter().map(|(h, rows)| (h.as_str(), rows.clone()))),
        );

        let mut legend = String::from("H 14 Times-Roman Epsilon\n");
        for k in 0..eps_bins {
            legend.push_str(&format!(
                "G 0.2c\nS 0.5c s 0.5c {} 0.25p 1.5c {} - {}\n",
                EPSILON_COLORS[k],
                limits.eps[k],
                limits.eps[k + 1]
            ));
        }
        self.plan.add_data_file("legend.dat", legend);

        self.frame_3d("psbasemap", &region, &projection, Self::mag_dist_axes());
        // 柱の色はセグメントヘッダの -G、底は最終列から読む
        self.columns(&region, &projection, "-So0.5cb", &[], false);
        let position = format!("-Dx{}c/{}c+w4c+jBL", self.xy_size + 1.0, self.z_size / 2.0);
        self.plan.push(
            GmtStep::new("pslegend", ["legend.dat", "-R", "-J", position.as_str(), "-O"])
                .append_to(&self.postscript),
        );
        Ok(())
    }

    fn lat_lon(&mut self, pmf: &Pmf, limits: &BinLimits) {
        let region = format!(
            "-R{}/{}/{}/{}/0/{}",
            limits.lons[0],
            limits.lons[limits.lons.len() - 1],
            limits.lats[0],
            limits.lats[limits.lats.len() - 1],
            self.max
        );
        let projection = format!("-JM{}c", self.xy_size);
        let (lats, lons) = (centers(&limits.lats), centers(&limits.lons));

        let mut rows = String::new();
        for i in (0..lats.len()).rev() {
            for j in (0..lons.len()).rev() {
                let p = pmf.get(&[i, j]).unwrap_or(0.0);
                rows.push_str(&format!("{} {} {}\n", lons[j], lats[i], p));
            }
        }
        self.plan.add_data_file(&self.data, rows);

        let axes = [
            "-Bxa".to_string(),
            "-Bya".to_string(),
            "-Bza+lProbability".to_string(),
        ];
        self.frame_3d("pscoast", &region, &projection, axes);
        self.columns(&region, &projection, COLUMN, &["-Ggray"], true);
    }

    fn finish(mut self) -> GmtPlan {
        self.plan.push(GmtStep::new(
            "psconvert",
            [self.postscript.as_str(), "-A", "-Tg", "-D.."],
        ));
        self.plan
    }
}

use std::path::Path;
use tracing::warn;

use super::{GmtPlan, GmtStep};
use crate::error::{NrmlError, Result};
use crate::model::Curve;

/// カーブごとに両対数グラフを1枚描く計画を返す。
///
/// 出力は `<output_dir>/<lon>_<lat>.png`（損失カーブは `<id>_<lon>_<lat>.png`）。
/// 対数軸に載らない 0 以下の点は除く。
///
/// GMT は作業ディレクトリに `gmt.history` などを書くので、並列に実行しても
/// 衝突しないよう各カーブは `<output_dir>/<stem>/` を作業ディレクトリにする。
pub fn curve_plans(curves: &[Curve], output_dir: &Path) -> Result<Vec<GmtPlan>> {
    curves.iter().map(|curve| curve_plan(curve, output_dir)).collect()
}

fn curve_plan(curve: &Curve, output_dir: &Path) -> Result<GmtPlan> {
    let stem = curve.file_stem();
    let points: Vec<(f64, f64)> = curve.points().filter(|&(x, y)| x > 0.0 && y > 0.0).collect();
    if points.len() < curve.abscissae.len() {
        warn!(
            "{}: dropping {} points that cannot be drawn on log axes",
            stem,
            curve.abscissae.len() - points.len()
        );
    }
    if points.is_empty() {
        return Err(NrmlError::Inconsistent(format!(
            "{}: curve has no positive points",
            stem
        )));
    }

    let (x_min, x_max) = log_bounds(points.iter().map(|p| p.0));
    let (y_min, y_max) = log_bounds(points.iter().map(|p| p.1));

    let data = format!("{}.dat", stem);
    let postscript = format!("{}.ps", stem);
    let region = format!("-R{:e}/{:e}/{:e}/{:e}", x_min, x_max, y_min, y_max);
    let projection = "-JX15cl/10cl";

    let mut plan = GmtPlan::new(
        &output_dir.join(&stem),
        output_dir.join(format!("{}.png", stem)),
    );
    plan.add_data_file(
        &data,
        points.iter().map(|(x, y)| format!("{} {}\n", x, y)).collect(),
    );

    plan.push(
        GmtStep::new(
            "psbasemap",
            [
                region.clone(),
                projection.to_string(),
                format!("-Bxa1pf3+l{}", curve.kind.x_label()),
                "-Bya1pf3+lProbability of exceedance".to_string(),
                "-BWSne".to_string(),
                "-K".to_string(),
            ],
        )
        .write_to(&postscript),
    );
    plan.push(
        GmtStep::new(
            "psxy",
            [data.as_str(), region.as_str(), projection, "-W1p,blue", "-O", "-K"],
        )
        .append_to(&postscript),
    );
    plan.push(
        GmtStep::new(
            "psxy",
            [data.as_str(), region.as_str(), projection, "-Sc0.15c", "-Gblue", "-O"],
        )
        .append_to(&postscript),
    );
    plan.push(GmtStep::new(
        "psconvert",
        [postscript.as_str(), "-A", "-Tg", "-D.."],
    ));

    Ok(plan)
}

/// 値を含む10のべき乗の範囲
fn log_bounds<I: Iterator<Item = f64>>(values: I) -> (f64, f64) {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let low = min.log10().floor();
    let high = max.log10().ceil().max(low + 1.0);
    (10f64.powf(low), 10f64.powf(high))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CurveKind;

    fn curve(id: Option<&str>, kind: CurveKind) -> Curve {
        Curve {
            id: id.map(String::from),
            lon: 9.15,
            lat: 45.17,
            kind,
            abscissae: vec![0.005, 0.05, 0.5],
            poes: vec![0.98, 0.2, 0.0],
        }
    }

    #[test]
    fn test_log_bounds() {
        let (low, high) = log_bounds([0.005, 0.5].into_iter());
        assert!((low - 0.001).abs() < 1e-12);
        assert!((high - 1.0).abs() < 1e-12);

        let (low, high) = log_bounds([10.0].into_iter());
        assert!((low - 10.0).abs() < 1e-9);
        assert!((high - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_hazard_curve_plan() {
        let dir = Path::new("curves");
        let plans = curve_plans(&[curve(None, CurveKind::HazardCurve)], dir).unwrap();
        assert_eq!(plans.len(), 1);

        let plan = &plans[0];
        assert_eq!(plan.output, dir.join("9.15_45.17.png"));
        assert_eq!(plan.programs(), vec!["psbasemap", "psxy", "psxy", "psconvert"]);

        // poE が 0 の点は除く
        assert_eq!(plan.data_files[0].0, "9.15_45.17.dat");
        assert_eq!(plan.data_files[0].1, "0.005 0.98\n0.05 0.2\n");
        assert!(plan.steps[0]
            .args
            .contains(&"-Bxa1pf3+lIntensity measure levels".to_string()));
    }

    #[test]
    fn test_each_curve_has_its_own_work_dir() {
        let dir = Path::new("curves");
        let mut other = curve(None, CurveKind::HazardCurve);
        other.lon = 10.0;
        let plans = curve_plans(&[curve(None, CurveKind::HazardCurve), other], dir).unwrap();

        assert_eq!(plans[0].work_dir, dir.join("9.15_45.17"));
        assert_eq!(plans[1].work_dir, dir.join("10_45.17"));
        assert_ne!(plans[0].work_dir, plans[1].work_dir);

        // 画像は出力ディレクトリに置く
        let convert = plans[0].steps.last().unwrap();
        assert!(convert.args.contains(&"-D..".to_string()));
        assert_eq!(plans[0].output, dir.join("9.15_45.17.png"));
    }

    #[test]
    fn test_loss_curve_file_name() {
        let plans =
            curve_plans(&[curve(Some("a1"), CurveKind::LossCurve)], Path::new("out")).unwrap();
        assert_eq!(plans[0].output, Path::new("out/a1_9.15_45.17.png"));
        assert!(plans[0].steps[0].args.contains(&"-Bxa1pf3+lloss".to_string()));
    }

    #[test]
    fn test_curve_without_positive_points() {
        let mut flat = curve(None, CurveKind::HazardCurve);
        flat.poes = vec![0.0, 0.0, 0.0];
        assert!(curve_plans(&[flat], Path::new("out")).is_err());
    }
}

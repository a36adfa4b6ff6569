use std::path::Path;
use tracing::warn;

use super::{GmtConfig, GmtPlan, GmtStep, Region};
use crate::error::{NrmlError, Result};
use crate::model::MapNode;

const DATA_FILE: &str = "loss_map.xyz";
const PALETTE_FILE: &str = "loss_map.cpt";
const POSTSCRIPT_FILE: &str = "loss_map.ps";
const PROJECTION: &str = "-JM15c";

/// 損失マップを四角形シンボルで塗り分ける計画。
///
/// 色は損失の常用対数で決める。値が 0 以下の地点は対数が取れないため描かない。
pub fn loss_map_plan(nodes: &[MapNode], output_dir: &Path, config: &GmtConfig) -> Result<GmtPlan> {
    let positive: Vec<&MapNode> = nodes.iter().filter(|n| n.value > 0.0).collect();
    if positive.len() < nodes.len() {
        warn!(
            "Skipping {} loss map nodes with non-positive values",
            nodes.len() - positive.len()
        );
    }

    let region = Region::enclosing(positive.iter().map(|n| (n.lon, n.lat)), 0.5)
        .ok_or_else(|| NrmlError::Inconsistent("loss map has no positive values".to_string()))?;

    let data_min = positive.iter().map(|n| n.value).fold(f64::INFINITY, f64::min);
    let data_max = positive.iter().map(|n| n.value).fold(f64::NEG_INFINITY, f64::max);
    let (low, high) = palette_range(
        config.min_value.unwrap_or(data_min),
        config.max_value.unwrap_or(data_max),
    )?;

    let mut plan = GmtPlan::new(output_dir, output_dir.join("loss_map.png"));
    plan.add_data_file(
        DATA_FILE,
        positive
            .iter()
            .map(|n| format!("{} {} {}\n", n.lon, n.lat, n.value.log10()))
            .collect(),
    );

    let r = region.to_arg();
    plan.push(
        GmtStep::new(
            "pscoast",
            [r.as_str(), PROJECTION, "-P", "-Df", "-Na", "-G230", "-K"],
        )
        .write_to(POSTSCRIPT_FILE),
    );
    plan.push(
        GmtStep::new(
            "makecpt",
            [
                format!("-C{}", config.palette),
                format!("-T{}/{}/1", low, high),
                "-D".to_string(),
            ],
        )
        .write_to(PALETTE_FILE),
    );
    plan.push(
        GmtStep::new(
            "psxy",
            [
                DATA_FILE.to_string(),
                r.clone(),
                PROJECTION.to_string(),
                format!("-C{}", PALETTE_FILE),
                format!("-Ss{}c", config.symbol_size),
                "-O".to_string(),
                "-K".to_string(),
            ],
        )
        .append_to(POSTSCRIPT_FILE),
    );
    plan.push(
        GmtStep::new(
            "psscale",
            [
                "-D7.5c/-1c/13c/0.3ch".to_string(),
                format!("-C{}", PALETTE_FILE),
                "-B+llog10(loss)".to_string(),
                "-O".to_string(),
                "-K".to_string(),
            ],
        )
        .append_to(POSTSCRIPT_FILE),
    );
    plan.push(
        GmtStep::new(
            "pscoast",
            [r.as_str(), PROJECTION, "-W", "-Df", "-Na", "-Ba", "-Slightblue", "-O"],
        )
        .append_to(POSTSCRIPT_FILE),
    );
    plan.push(GmtStep::new("psconvert", [POSTSCRIPT_FILE, "-A", "-Tg"]));

    Ok(plan)
}

/// パレットの範囲を常用対数の整数に丸める
fn palette_range(min_value: f64, max_value: f64) -> Result<(i32, i32)> {
    if min_value <= 0.0 || max_value <= 0.0 {
        return Err(NrmlError::Inconsistent(format!(
            "palette bounds must be positive, got {} and {}",
            min_value, max_value
        )));
    }
    if min_value > max_value {
        return Err(NrmlError::Inconsistent(format!(
            "palette minimum {} exceeds maximum {}",
            min_value, max_value
        )));
    }

    let low = min_value.log10().floor() as i32;
    let high = (max_value.log10().ceil() as i32).max(low + 1);
    Ok((low, high))
}

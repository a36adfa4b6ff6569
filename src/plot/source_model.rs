use std::path::Path;
use tracing::info;

use super::{multi_segment, GmtConfig, GmtPlan, GmtStep, Region};
use crate::error::{NrmlError, Result};
use crate::model::{SourceGeometry, SourceKind, SourceRecord};

/// 面震源の境界（青）と単純断層のトレース（赤）を海岸線の上に描く計画
pub fn source_model_plan(
    sources: &[SourceRecord],
    output_stem: &Path,
    config: &GmtConfig,
) -> Result<GmtPlan> {
    let work_dir = match output_stem.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let name = output_stem
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "map".to_string());

    let areas: Vec<(&str, &Vec<(f64, f64)>)> = sources
        .iter()
        .filter(|s| s.kind == SourceKind::Area)
        .filter_map(|s| match &s.geometry {
            SourceGeometry::Polygon(ring) => Some((s.id.as_str(), ring)),
            SourceGeometry::Point(..) => None,
        })
        .collect();
    let faults: Vec<(&str, &Vec<(f64, f64, f64)>)> = sources
        .iter()
        .filter_map(|s| s.trace.as_ref().map(|t| (s.id.as_str(), t)))
        .collect();

    let region = match config.region {
        Some(region) => region,
        None => {
            let points = areas
                .iter()
                .flat_map(|(_, ring)| ring.iter().copied())
                .chain(faults.iter().flat_map(|(_, t)| t.iter().map(|p| (p.0, p.1))));
            let region = Region::enclosing(points, 0.5).ok_or_else(|| {
                NrmlError::InvalidGeometry("no area sources or fault traces to plot".to_string())
            })?;
            info!("Map region from data extent: {}", region);
            region
        }
    };

    let postscript = format!("{}.ps", name);
    let mut plan = GmtPlan::new(work_dir, work_dir.join(format!("{}.png", name)));
    let r = region.to_arg();
    let projection: &[&str] = if config.portrait {
        &["-P", "-JM13c"]
    } else {
        &["-JM20c"]
    };
    let with_map = |extra: &[&str]| -> Vec<String> {
        std::iter::once(r.as_str())
            .chain(projection.iter().copied())
            .chain(extra.iter().copied())
            .map(String::from)
            .collect()
    };

    plan.push(GmtStep::new("gmtset", ["MAP_FRAME_TYPE", "plain"]));
    plan.push(GmtStep::new("gmtset", ["PS_MEDIA", "a4"]));
    plan.push(
        GmtStep::new("psbasemap", with_map(&["-B5.0", "-Xc", "-Yc", "-K"])).write_to(&postscript),
    );
    plan.push(
        GmtStep::new(
            "pscoast",
            with_map(&["-Wthin", "-N1", "-A1000", "-Slightblue", "-O", "-K"]),
        )
        .append_to(&postscript),
    );

    if !areas.is_empty() {
        let file = format!("{}_area_sources.dat", name);
        plan.add_data_file(
            &file,
            multi_segment(areas.iter().map(|(id, ring)| {
                (*id, ring.iter().map(|(lon, lat)| format!("{} {}", lon, lat)).collect())
            })),
        );
        let mut args = vec![file];
        args.extend(with_map(&["-Wthick,blue", "-O", "-K", "-L"]));
        plan.push(GmtStep::new("psxy", args).append_to(&postscript));
    }

    if !faults.is_empty() {
        let file = format!("{}_simple_fault_sources.dat", name);
        plan.add_data_file(
            &file,
            multi_segment(faults.iter().map(|(id, trace)| {
                (
                    *id,
                    trace
                        .iter()
                        .map(|(lon, lat, depth)| format!("{} {} {}", lon, lat, depth))
                        .collect(),
                )
            })),
        );
        let mut args = vec![file];
        args.extend(with_map(&["-Wthick,red", "-O", "-K"]));
        plan.push(GmtStep::new("psxy", args).append_to(&postscript));
    }

    plan.push(
        GmtStep::new("pscoast", with_map(&["-Wthin", "-N1", "-A1000", "-O"]))
            .append_to(&postscript),
    );
    plan.push(GmtStep::new("psconvert", [postscript.as_str(), "-A", "-Tg"]));

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources() -> Vec<SourceRecord> {
        vec![
            SourceRecord {
                id: "src01".to_string(),
                name: "Cell".to_string(),
                kind: SourceKind::Area,
                geometry: SourceGeometry::Polygon(vec![
                    (0.0, 0.0),
                    (1.0, 0.0),
                    (1.0, 1.0),
                    (0.0, 0.0),
                ]),
                max_magnitude: 7.0,
                total_occurrence_rate: 1e-4,
                trace: None,
            },
            SourceRecord {
                id: "src02".to_string(),
                name: "Point".to_string(),
                kind: SourceKind::Point,
                geometry: SourceGeometry::Point(20.0, 20.0),
                max_magnitude: 5.0,
                total_occurrence_rate: 1e-2,
                trace: None,
            },
            SourceRecord {
                id: "src03".to_string(),
                name: "Fault".to_string(),
                kind: SourceKind::SimpleFault,
                geometry: SourceGeometry::Polygon(vec![
                    (2.0, 2.0),
                    (2.0, 3.0),
                    (2.1, 3.0),
                    (2.0, 2.0),
                ]),
                max_magnitude: 6.5,
                total_occurrence_rate: 1e-5,
                trace: Some(vec![(2.0, 2.0, 0.0), (2.0, 3.0, 0.0)]),
            },
        ]
    }

    #[test]
    fn test_source_model_plan() {
        let plan =
            source_model_plan(&sources(), Path::new("out/model"), &GmtConfig::default()).unwrap();

        assert_eq!(plan.work_dir, Path::new("out"));
        assert_eq!(plan.output, Path::new("out/model.png"));
        assert_eq!(
            plan.programs(),
            vec!["gmtset", "gmtset", "psbasemap", "pscoast", "psxy", "psxy", "pscoast", "psconvert"]
        );

        let (area_file, area_data) = &plan.data_files[0];
        assert_eq!(area_file, "model_area_sources.dat");
        assert_eq!(area_data, "> src01\n0 0\n1 0\n1 1\n0 0\n");

        let (fault_file, fault_data) = &plan.data_files[1];
        assert_eq!(fault_file, "model_simple_fault_sources.dat");
        assert_eq!(fault_data, "> src03\n2 2 0\n2 3 0\n");

        // ポイント震源は範囲に含めない
        assert!(plan.steps[2].args.contains(&"-R0/2/0/3".to_string()));
        assert!(plan.steps[2].args.contains(&"-JM20c".to_string()));
        assert!(plan.steps[4].args.contains(&"-L".to_string()));
    }

    #[test]
    fn test_portrait_and_user_region() {
        let config = GmtConfig {
            portrait: true,
            region: Some("5/19/35/48".parse().unwrap()),
            ..Default::default()
        };
        let plan = source_model_plan(&sources(), Path::new("map"), &config).unwrap();

        assert_eq!(plan.work_dir, Path::new("."));
        let basemap = &plan.steps[2].args;
        assert!(basemap.contains(&"-R5/19/35/48".to_string()));
        assert!(basemap.contains(&"-P".to_string()));
        assert!(basemap.contains(&"-JM13c".to_string()));
    }

    #[test]
    fn test_points_only_without_region_is_an_error() {
        let points: Vec<SourceRecord> = sources()
            .into_iter()
            .filter(|s| s.kind == SourceKind::Point)
            .collect();
        assert!(source_model_plan(&points, Path::new("map"), &GmtConfig::default()).is_err());
    }
}

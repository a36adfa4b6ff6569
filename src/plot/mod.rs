//! GMT による描画。
//!
//! 描画はまず `GmtPlan`（書き出すデータファイルと、実行するプログラムの列）として
//! 組み立て、`GmtRunner` がそれを実行する。計画の組み立ては GMT なしでテストできる。

mod curves;
mod disaggregation;
mod loss_map;
mod source_model;

pub use curves::curve_plans;
pub use disaggregation::disaggregation_plans;
pub use loss_map::loss_map_plan;
pub use source_model::source_model_plan;

use std::fmt;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::{NrmlError, Result};

/// GMT の描画オプション
#[derive(Debug, Clone, PartialEq)]
pub struct GmtConfig {
    /// GMT 5 以降の `gmt <module>` 形式で呼ぶ場合のプログラム名
    pub program_prefix: Option<String>,
    /// 損失マップの四角形シンボルの一辺 (cm)
    pub symbol_size: f64,
    /// カラーパレットの下限。未指定ならデータの最小値
    pub min_value: Option<f64>,
    /// カラーパレットの上限。未指定ならデータの最大値
    pub max_value: Option<f64>,
    /// `makecpt -C` に渡すマスターパレット
    pub palette: String,
    /// 地図の範囲。未指定ならデータの範囲
    pub region: Option<Region>,
    pub portrait: bool,
    /// PMF 図の x・y 方向の大きさ (cm)
    pub xy_size: f64,
    /// PMF 図の z 方向（確率軸）の大きさ (cm)
    pub z_size: f64,
}

impl Default for GmtConfig {
    fn default() -> Self {
        Self {
            program_prefix: Some("gmt".to_string()),
            symbol_size: 0.1,
            min_value: None,
            max_value: None,
            palette: "hot".to_string(),
            region: None,
            portrait: false,
            xy_size: 15.0,
            z_size: 10.0,
        }
    }
}

/// 地図の範囲（GMT の `-Rwest/east/south/north` の順）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub west: f64,
    pub east: f64,
    pub south: f64,
    pub north: f64,
}

impl Region {
    /// 点群を囲む範囲。幅や高さが 0 の場合は `pad` 度だけ広げる
    pub fn enclosing<I>(points: I, pad: f64) -> Option<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut region: Option<Region> = None;
        for (x, y) in points {
            let r = region.get_or_insert(Region {
                west: x,
                east: x,
                south: y,
                north: y,
            });
            r.west = r.west.min(x);
            r.east = r.east.max(x);
            r.south = r.south.min(y);
            r.north = r.north.max(y);
        }

        region.map(|mut r| {
            if r.east - r.west <= 0.0 {
                r.west -= pad;
                r.east += pad;
            }
            if r.north - r.south <= 0.0 {
                r.south -= pad;
                r.north += pad;
            }
            r
        })
    }

    pub fn to_arg(&self) -> String {
        format!("-R{}", self)
    }
}

/// 値は丸めずに最短の表現で書く
impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.west, self.east, self.south, self.north
        )
    }
}

impl FromStr for Region {
    type Err = NrmlError;

    fn from_str(s: &str) -> Result<Self> {
        let values = s
            .split('/')
            .map(|v| {
                v.trim().parse::<f64>().map_err(|_| NrmlError::InvalidNumber {
                    element: "region".to_string(),
                    value: s.to_string(),
                })
            })
            .collect::<Result<Vec<f64>>>()?;

        let &[west, east, south, north] = values.as_slice() else {
            return Err(NrmlError::InvalidGeometry(format!(
                "region must be west/east/south/north, got {:?}",
                s
            )));
        };
        if west >= east || south >= north {
            return Err(NrmlError::InvalidGeometry(format!(
                "region {:?} is empty",
                s
            )));
        }

        Ok(Region {
            west,
            east,
            south,
            north,
        })
    }
}

/// 標準出力のリダイレクト先（作業ディレクトリからの相対パス）
#[derive(Debug, Clone, PartialEq)]
pub struct Redirect {
    pub file: String,
    pub append: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GmtStep {
    pub program: String,
    pub args: Vec<String>,
    pub stdout: Option<Redirect>,
}

impl GmtStep {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            stdout: None,
        }
    }

    /// `> file`
    pub fn write_to(mut self, file: &str) -> Self {
        self.stdout = Some(Redirect {
            file: file.to_string(),
            append: false,
        });
        self
    }

    /// `>> file`
    pub fn append_to(mut self, file: &str) -> Self {
        self.stdout = Some(Redirect {
            file: file.to_string(),
            append: true,
        });
        self
    }

    fn command_line(&self) -> String {
        let mut line = std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        if let Some(redirect) = &self.stdout {
            let op = if redirect.append { ">>" } else { ">" };
            line.push_str(&format!(" {} {}", op, redirect.file));
        }
        line
    }
}

/// 1枚の図を描くためのデータファイルとコマンド列
#[derive(Debug, Clone, PartialEq)]
pub struct GmtPlan {
    pub work_dir: PathBuf,
    /// (作業ディレクトリからの相対パス, 内容)
    pub data_files: Vec<(String, String)>,
    pub steps: Vec<GmtStep>,
    /// 最終的に得られる画像
    pub output: PathBuf,
}

impl GmtPlan {
    pub fn new(work_dir: &Path, output: PathBuf) -> Self {
        Self {
            work_dir: work_dir.to_path_buf(),
            data_files: Vec::new(),
            steps: Vec::new(),
            output,
        }
    }

    pub fn add_data_file(&mut self, name: &str, content: String) {
        self.data_files.push((name.to_string(), content));
    }

    pub fn push(&mut self, step: GmtStep) {
        self.steps.push(step);
    }

    pub fn programs(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.program.as_str()).collect()
    }
}

/// `GmtPlan` を子プロセスとして実行する
#[derive(Debug, Clone, Default)]
pub struct GmtRunner {
    program_prefix: Option<String>,
}

impl GmtRunner {
    pub fn new(config: &GmtConfig) -> Self {
        Self {
            program_prefix: config.program_prefix.clone(),
        }
    }

    pub fn run(&self, plan: &GmtPlan) -> Result<PathBuf> {
        fs::create_dir_all(&plan.work_dir)?;
        for (name, content) in &plan.data_files {
            fs::write(plan.work_dir.join(name), content)?;
        }

        for step in &plan.steps {
            self.run_step(&plan.work_dir, step)?;
        }

        info!("Rendered {}", plan.output.display());
        Ok(plan.output.clone())
    }

    fn run_step(&self, work_dir: &Path, step: &GmtStep) -> Result<()> {
        let mut command = match &self.program_prefix {
            Some(prefix) => {
                let mut command = Command::new(prefix);
                command.arg(&step.program);
                command
            }
            None => Command::new(&step.program),
        };
        command.args(&step.args).current_dir(work_dir);

        if let Some(redirect) = &step.stdout {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .append(redirect.append)
                .truncate(!redirect.append)
                .open(work_dir.join(&redirect.file))?;
            command.stdout(Stdio::from(file));
        }

        debug!("Running {}", step.command_line());
        let status = command.status().map_err(|e| NrmlError::ExternalCommand {
            command: step.command_line(),
            status: e.to_string(),
        })?;

        if !status.success() {
            return Err(NrmlError::ExternalCommand {
                command: step.command_line(),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

/// GMT の複数セグメント形式。各セグメントは `>` 行で始まる
pub(crate) fn multi_segment<'a, I>(segments: I) -> String
where
    I: IntoIterator<Item = (&'a str, Vec<String>)>,
{
    let mut out = String::new();
    for (header, rows) in segments {
        out.push_str(&format!("> {}\n", header));
        for row in rows {
            out.push_str(&row);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_region_from_str() {
        let region: Region = "5.5/19/35.5/48".parse().unwrap();
        assert_eq!(region.west, 5.5);
        assert_eq!(region.north, 48.0);
        assert_eq!(region.to_arg(), "-R5.5/19/35.5/48");

        // 狭い範囲でも幅が 0 にならない
        let narrow: Region = "10.001/10.004/45/45.002".parse().unwrap();
        assert_eq!(narrow.to_arg(), "-R10.001/10.004/45/45.002");

        assert!("1/2/3".parse::<Region>().is_err());
        assert!("10/5/0/1".parse::<Region>().is_err());
        assert!("a/b/c/d".parse::<Region>().is_err());
    }

    #[test]
    fn test_region_enclosing() {
        let region = Region::enclosing(vec![(1.0, 2.0), (3.0, -1.0)], 0.5).unwrap();
        assert_eq!(
            region,
            Region {
                west: 1.0,
                east: 3.0,
                south: -1.0,
                north: 2.0
            }
        );

        let single = Region::enclosing(vec![(1.0, 2.0)], 0.5).unwrap();
        assert_eq!((single.west, single.east), (0.5, 1.5));
        assert!(Region::enclosing(Vec::new(), 0.5).is_none());
    }

    #[test]
    fn test_command_line() {
        let step = GmtStep::new("psxy", ["a.dat", "-O"]).append_to("map.ps");
        assert_eq!(step.command_line(), "psxy a.dat -O >> map.ps");
    }

    #[test]
    fn test_multi_segment() {
        let text = multi_segment(vec![
            ("a", vec!["1 2".to_string(), "3 4".to_string()]),
            ("b", vec!["5 6".to_string()]),
        ]);
        assert_eq!(text, "> a\n1 2\n3 4\n> b\n5 6\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_runner_writes_files_and_redirects() {
        let temp_dir = TempDir::new().unwrap();
        let mut plan = GmtPlan::new(temp_dir.path(), temp_dir.path().join("out.txt"));
        plan.add_data_file("in.txt", "hello\n".to_string());
        plan.push(GmtStep::new("cat", ["in.txt"]).write_to("out.txt"));
        plan.push(GmtStep::new("cat", ["in.txt"]).append_to("out.txt"));

        let runner = GmtRunner::new(&GmtConfig {
            program_prefix: None,
            ..Default::default()
        });
        let output = runner.run(&plan).unwrap();
        assert_eq!(fs::read_to_string(output).unwrap(), "hello\nhello\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_runner_reports_failed_command() {
        let temp_dir = TempDir::new().unwrap();
        let mut plan = GmtPlan::new(temp_dir.path(), temp_dir.path().join("never"));
        plan.push(GmtStep::new("false", Vec::<String>::new()));

        let runner = GmtRunner::new(&GmtConfig {
            program_prefix: None,
            ..Default::default()
        });
        let err = runner.run(&plan).unwrap_err();
        assert!(matches!(err, NrmlError::ExternalCommand { .. }), "{}", err);
    }
}

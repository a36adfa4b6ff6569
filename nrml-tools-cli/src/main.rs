use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use nrml_tools::{detect_kind, Converter, GmtConfig, MapFormat, NrmlArchive, Region};
use rayon::ThreadPoolBuilder;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// GMT 4 形式でモジュールを直接呼び出す（`gmt` コマンドを経由しない）
    #[arg(long, global = true)]
    gmt_classic: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// ハザードマップをシェープファイルに変換
    HazardMap(Io),
    /// 損失マップをシェープファイルまたは CSV に変換
    LossMap {
        #[command(flatten)]
        io: Io,
        /// 出力形式
        #[arg(long, value_enum, default_value_t = Format::Shp)]
        format: Format,
    },
    /// ハザードカーブを PNG に描画（出力はディレクトリ）
    HazardCurves(Io),
    /// 損失カーブ・損失率カーブを PNG に描画（出力はディレクトリ）
    LossCurves(Io),
    /// 震源モデルをシェープファイルに変換
    SourceModel(Io),
    /// 破壊モデルをシェープファイルに変換
    RuptureModel(Io),
    /// テキスト形式のポートフォリオを NRML の曝露モデルに変換
    ExposureTxt(Io),
    /// バイナリ人口グリッドを NRML の曝露モデルに変換
    ExposureGrid {
        #[command(flatten)]
        io: Io,
        /// 地理参照を記述した INI ファイル（デフォルト: 入力と同名の .ini）
        #[arg(short, long, value_name = "FILE")]
        metadata: Option<PathBuf>,
        /// 資産のタクソノミー
        #[arg(short, long)]
        taxonomy: String,
    },
    /// 損失マップを GMT で描画（出力はディレクトリ）
    PlotLossMap {
        #[command(flatten)]
        io: Io,
        /// シンボルの大きさ (cm)
        #[arg(long, default_value_t = 0.1)]
        res: f64,
        /// カラーパレットの最小値
        #[arg(long)]
        min_val: Option<f64>,
        /// カラーパレットの最大値
        #[arg(long)]
        max_val: Option<f64>,
    },
    /// 震源モデルを GMT で描画
    PlotSourceModel {
        #[command(flatten)]
        io: Io,
        /// 地図の範囲 west/east/south/north（デフォルト: データの範囲）
        #[arg(short, long)]
        region: Option<String>,
        /// 縦向きの地図にする
        #[arg(short, long)]
        portrait: bool,
    },
    /// 分解結果 (HDF5) の PMF を GMT で描画（出力はディレクトリ）
    #[cfg(feature = "hdf5")]
    PlotDisaggregation {
        #[command(flatten)]
        io: Io,
        /// ビン境界 (`[HAZARD]`) を記述した OpenQuake の設定ファイル
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
        /// x・y 方向の大きさ (cm)
        #[arg(long, default_value_t = 15.0)]
        xy_size: f64,
        /// 確率軸の大きさ (cm)
        #[arg(long, default_value_t = 10.0)]
        z_size: f64,
    },
    /// XML、ZIP、ディレクトリ内の NRML 文書を種類に応じて一括変換
    Convert {
        /// 入力XMLファイル、ZIPファイル、またはディレクトリ
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// 出力ディレクトリ
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,

        /// 並列処理スレッド数（デフォルト: CPUコア数）
        #[arg(short, long)]
        threads: Option<usize>,

        /// 地点データの出力形式
        #[arg(long, value_enum, default_value_t = Format::Shp)]
        format: Format,
    },
}

#[derive(Args, Debug)]
struct Io {
    /// 入力ファイル
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// 出力パス（デフォルト: 入力から拡張子を除いたもの）
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,
}

impl Io {
    fn output(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| self.input.with_extension(""))
    }

    fn reader(&self) -> Result<BufReader<File>> {
        let file = File::open(&self.input)
            .with_context(|| format!("Failed to open {}", self.input.display()))?;
        Ok(BufReader::new(file))
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Format {
    Shp,
    Csv,
}

impl From<Format> for MapFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Shp => MapFormat::Shapefile,
            Format::Csv => MapFormat::Csv,
        }
    }
}

fn main() -> Result<()> {
    // ログの初期化
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let start_time = std::time::Instant::now();

    let mut gmt = GmtConfig::default();
    if cli.gmt_classic {
        gmt.program_prefix = None;
    }

    let written = run(cli.command, gmt)?;
    for path in &written {
        info!("Written: {}", path.display());
    }

    info!("Total processing time: {:?}", start_time.elapsed());
    Ok(())
}

fn run(command: Command, mut gmt: GmtConfig) -> Result<Vec<PathBuf>> {
    let written = match command {
        Command::HazardMap(io) => Converter::default().hazard_map(io.reader()?, &io.output())?,
        Command::LossMap { io, format } => {
            Converter::new(format.into(), gmt).loss_map(io.reader()?, &io.output())?
        }
        Command::HazardCurves(io) => {
            Converter::new(MapFormat::default(), gmt).hazard_curves(io.reader()?, &io.output())?
        }
        Command::LossCurves(io) => {
            Converter::new(MapFormat::default(), gmt).loss_curves(io.reader()?, &io.output())?
        }
        Command::SourceModel(io) => Converter::default().source_model(io.reader()?, &io.output())?,
        Command::RuptureModel(io) => {
            Converter::default().rupture_model(io.reader()?, &io.output())?
        }
        Command::ExposureTxt(io) => {
            let output = io.output().with_extension("xml");
            vec![Converter::default().exposure_txt(io.reader()?, &output)?]
        }
        Command::ExposureGrid {
            io,
            metadata,
            taxonomy,
        } => {
            let metadata = metadata.unwrap_or_else(|| io.input.with_extension("ini"));
            let ini = File::open(&metadata)
                .with_context(|| format!("Failed to open {}", metadata.display()))?;
            let output = io.output().with_extension("xml");
            vec![Converter::default().exposure_grid(ini, io.reader()?, &taxonomy, &output)?]
        }
        Command::PlotLossMap {
            io,
            res,
            min_val,
            max_val,
        } => {
            gmt.symbol_size = res;
            gmt.min_value = min_val;
            gmt.max_value = max_val;
            let output_dir = io.output();
            fs::create_dir_all(&output_dir)?;
            let converter = Converter::new(MapFormat::default(), gmt);
            vec![converter.plot_loss_map(io.reader()?, &output_dir)?]
        }
        Command::PlotSourceModel {
            io,
            region,
            portrait,
        } => {
            gmt.region = region
                .map(|r| r.parse::<Region>())
                .transpose()
                .context("Invalid --region")?;
            gmt.portrait = portrait;
            let converter = Converter::new(MapFormat::default(), gmt);
            vec![converter.plot_source_model(io.reader()?, &io.output())?]
        }
        #[cfg(feature = "hdf5")]
        Command::PlotDisaggregation {
            io,
            config,
            xy_size,
            z_size,
        } => {
            gmt.xy_size = xy_size;
            gmt.z_size = z_size;
            let ini = File::open(&config)
                .with_context(|| format!("Failed to open {}", config.display()))?;
            Converter::new(MapFormat::default(), gmt)
                .plot_disaggregation_file(&io.input, ini, &io.output())?
        }
        Command::Convert {
            input,
            output,
            threads,
            format,
        } => {
            // スレッドプールの設定
            if let Some(threads) = threads {
                ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build_global()
                    .context("Failed to build thread pool")?;
            }
            fs::create_dir_all(&output)?;
            let converter = Converter::new(format.into(), gmt);
            convert_input(&converter, &input, &output)?
        }
    };
    Ok(written)
}

fn convert_input(converter: &Converter, input: &Path, output: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        let ext = input.extension().and_then(|s| s.to_str()).unwrap_or("");

        match ext {
            "zip" => {
                info!("Processing ZIP file: {:?}", input);
                process_zip_file(converter, input, output)
            }
            "xml" => {
                info!("Processing XML file: {:?}", input);
                process_file(converter, input, output)
            }
            _ => {
                error!("Unsupported file type: {:?}", input);
                anyhow::bail!("Input file must be .xml or .zip");
            }
        }
    } else if input.is_dir() {
        info!("Processing directory: {:?}", input);
        process_directory(converter, input, output)
    } else {
        error!("Invalid input path: {:?}", input);
        anyhow::bail!("Input path must be a file or directory");
    }
}

fn process_file(converter: &Converter, path: &Path, output: &Path) -> Result<Vec<PathBuf>> {
    let kind = detect_kind(BufReader::new(File::open(path)?))?;
    let Some(kind) = kind else {
        warn!("Not an NRML document: {:?}", path);
        return Ok(Vec::new());
    };

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    info!("Converting {:?} as {:?}", path, kind);

    let reader = BufReader::new(File::open(path)?);
    converter
        .convert(kind, reader, &output.join(stem))
        .with_context(|| format!("Failed to convert {}", path.display()))
}

fn process_zip_file(converter: &Converter, path: &Path, output: &Path) -> Result<Vec<PathBuf>> {
    use rayon::prelude::*;

    let archive = NrmlArchive::new(path);
    let entries = archive.classified_entries()?;

    let archive_stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("archive");
    let output = output.join(archive_stem);

    let results: Vec<Result<Vec<PathBuf>>> = entries
        .par_iter()
        .map(|(entry, kind)| {
            let Some(kind) = kind else {
                warn!("Not an NRML document: {}", entry.name);
                return Ok(Vec::new());
            };
            let stem = output.join(entry.relative_stem());
            converter
                .convert(*kind, entry.content.as_slice(), &stem)
                .with_context(|| format!("Failed to convert {}", entry.name))
        })
        .collect();

    collect_results(results, |i| entries[i].0.name.clone())
}

fn process_directory(converter: &Converter, dir: &Path, output: &Path) -> Result<Vec<PathBuf>> {
    use rayon::prelude::*;

    // XML/ZIPファイルを再帰的に収集
    let input_files = collect_input_files(dir)?;
    info!("Found {} input files (XML/ZIP)", input_files.len());

    // 並列処理でファイルを変換
    let results: Vec<Result<Vec<PathBuf>>> = input_files
        .par_iter()
        .map(|(path, file_type)| {
            let relative = path
                .parent()
                .and_then(|p| p.strip_prefix(dir).ok())
                .unwrap_or(Path::new(""));
            let output = output.join(relative);
            match file_type {
                FileType::Xml => process_file(converter, path, &output),
                FileType::Zip => process_zip_file(converter, path, &output),
            }
        })
        .collect();

    collect_results(results, |i| input_files[i].0.display().to_string())
}

/// 失敗をまとめて報告する
fn collect_results<F>(results: Vec<Result<Vec<PathBuf>>>, name: F) -> Result<Vec<PathBuf>>
where
    F: Fn(usize) -> String,
{
    let mut written = Vec::new();
    let mut errors = Vec::new();
    for (i, result) in results.into_iter().enumerate() {
        match result {
            Ok(paths) => written.extend(paths),
            Err(e) => errors.push(format!("{}: {:#}", name(i), e)),
        }
    }

    if !errors.is_empty() {
        error!("Failed to process {} files:", errors.len());
        for err in &errors {
            error!("  {}", err);
        }
        anyhow::bail!("{} files failed to process", errors.len());
    }

    Ok(written)
}

fn collect_input_files(dir: &Path) -> Result<Vec<(PathBuf, FileType)>> {
    let mut files = Vec::new();

    let mut entries = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();

        if path.is_dir() {
            // サブディレクトリを再帰的に探索
            files.extend(collect_input_files(&path)?);
        } else {
            match path.extension().and_then(|s| s.to_str()) {
                Some("xml") => files.push((path, FileType::Xml)),
                Some("zip") => files.push((path, FileType::Zip)),
                _ => {}
            }
        }
    }

    Ok(files)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FileType {
    Xml,
    Zip,
}

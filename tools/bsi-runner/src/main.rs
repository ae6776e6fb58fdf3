//! 骨扫描 BSI 批处理程序.

mod result;
mod runner;

use bone_berry::pipeline::{ExternalCommand, PipelineConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

/// 命令行参数.
#[derive(Parser, Debug)]
#[command(name = "bsi-runner")]
#[command(about = "核医学全身骨扫描 BSI 批处理")]
struct Args {
    /// 研究数据根目录. 默认为 `$BSI_STUDIES_DIR` 或 `$HOME/dataset/bsi`
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// JSON 配置文件路径
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 日志级别
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 导入一个研究的多帧原始图像 (npy).
    Import {
        /// 多帧原始图像, `(帧, 高, 宽)` 或单帧 `(高, 宽)` 的 f32 npy
        frames: PathBuf,

        /// 患者 ID
        #[arg(long)]
        patient: String,

        /// 检查日期 `YYYYMMDD`
        #[arg(long)]
        date: String,

        /// 机构代码
        #[arg(long, default_value = "")]
        session: String,

        /// 各帧的仪器标签, 按帧顺序给出
        #[arg(long = "label")]
        labels: Vec<String>,

        /// 确认所有低置信度的视图分配
        #[arg(long)]
        confirm: bool,
    },

    /// 显示各研究的阶段完成情况.
    Status {
        /// 只处理这些患者. 为空时处理全部
        patients: Vec<String>,
    },

    /// 运行各研究的所有未完成阶段.
    Run {
        /// 分割模型的可执行程序
        #[arg(long)]
        segmenter: String,

        /// 分割模型的一个参数, 可重复, 按顺序传递. 可含 `{input}` `{output}` 占位符
        #[arg(long = "segmenter-arg", allow_hyphen_values = true)]
        segmenter_args: Vec<String>,

        /// 检测模型的可执行程序
        #[arg(long)]
        detector: String,

        /// 检测模型的一个参数, 可重复, 按顺序传递. 可含 `{input}` `{output}` 占位符
        #[arg(long = "detector-arg", allow_hyphen_values = true)]
        detector_args: Vec<String>,

        /// 分类模型的可执行程序. 缺省时保留提取器给出的暂定类别
        #[arg(long)]
        classifier: Option<String>,

        /// 分类模型的一个参数, 可重复, 按顺序传递.
        /// 可含 `{input}` `{mask}` `{boxes}` `{output}` 占位符
        #[arg(long = "classifier-arg", allow_hyphen_values = true, requires = "classifier")]
        classifier_args: Vec<String>,

        /// 并行处理的研究数. 默认为可用核心数
        #[arg(short, long)]
        jobs: Option<usize>,

        /// 只处理这些患者. 为空时处理全部
        patients: Vec<String>,
    },

    /// 删除一个研究遗留的锁文件. 只应在确认没有其它进程处理该研究时使用.
    Unlock {
        /// 患者 ID
        #[arg(long)]
        patient: String,

        /// 检查日期 `YYYYMMDD`
        #[arg(long)]
        date: String,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = log::Level::from_str(&args.log_level)?;
    simple_logger::init_with_level(level)?;

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig {
            root: utils::loader::studies_dir_from_env_or_home(),
            ..Default::default()
        },
    };
    if let Some(root) = args.root {
        config.root = root;
    }
    log::debug!("配置: {config:?}");

    match args.command {
        Command::Import {
            frames,
            patient,
            date,
            session,
            labels,
            confirm,
        } => {
            let request = runner::ImportRequest {
                frames,
                patient,
                date,
                session,
                labels,
                confirm,
            };
            runner::import(&config, &request)?;
        }
        Command::Status { patients } => {
            runner::status(&config, &patients)?;
        }
        Command::Run {
            segmenter,
            segmenter_args,
            detector,
            detector_args,
            classifier,
            classifier_args,
            jobs,
            patients,
        } => {
            let models = runner::Models {
                segmenter: ExternalCommand::new(segmenter, segmenter_args),
                detector: ExternalCommand::new(detector, detector_args),
                classifier: classifier.map(|c| ExternalCommand::new(c, classifier_args)),
            };
            let jobs = jobs.unwrap_or_else(utils::cpus).max(1);
            let report = runner::run(&config, &models, jobs, &patients)?;
            result::analyze(&report);
            if !report.is_all_ok() {
                anyhow::bail!("{} 个研究处理失败", report.failed().count());
            }
        }
        Command::Unlock { patient, date } => {
            runner::unlock(&config, &patient, &date)?;
        }
    }
    Ok(())
}

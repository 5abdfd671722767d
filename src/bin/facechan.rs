/// 单通道人脸分析 - 读取图片目录或原始帧文件,逐帧输出JSON结果
///
/// 主程序入口 - 直接运行: cargo run --bin facechan --release -- --config channel.json --frames ./frames
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use facetrack_rs::{
    status_code, Channel, ChannelParams, FrameData, FrameFormat, IdentitySource,
};

/// 单通道人脸分析程序
#[derive(Parser, Debug)]
#[command(author, version, about = "人脸检测 + 识别 + 跟踪 (单通道)", long_about = None)]
struct Args {
    /// 通道配置文件 (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 图片目录或单张图片
    #[arg(short, long)]
    frames: Option<PathBuf>,

    /// 原始帧文件 (连续存放的等尺寸帧)
    #[arg(long, conflicts_with = "frames")]
    raw: Option<PathBuf>,

    /// 原始帧宽度
    #[arg(long, default_value_t = 1920)]
    width: u32,

    /// 原始帧高度
    #[arg(long, default_value_t = 1080)]
    height: u32,

    /// 原始帧格式: i420 / rgb / bgr
    #[arg(long, default_value = "i420")]
    format: String,

    /// 推理设备,覆盖配置文件 (CPU / GPU / CUDA:n / TRT:n)
    #[arg(short, long)]
    device: Option<String>,

    /// 检测间隔,覆盖配置文件
    #[arg(short, long)]
    interval: Option<u32>,

    /// 人脸库文件,创建通道后加载
    #[arg(short, long)]
    gallery: Option<PathBuf>,

    /// 忽略检测间隔,每帧都处理
    #[arg(long)]
    force: bool,

    /// 帧率,用于计算每帧的时间戳 (毫秒)
    #[arg(long, default_value_t = 25)]
    fps: u32,
}

fn parse_format(name: &str) -> Result<FrameFormat> {
    match name.to_lowercase().as_str() {
        "i420" | "yuv420p" => Ok(FrameFormat::I420),
        "rgb" | "rgb24" => Ok(FrameFormat::Rgb),
        "bgr" | "bgr24" => Ok(FrameFormat::Bgr),
        other => bail!("unsupported raw frame format '{}'", other),
    }
}

/// 目录下的图片文件 (按文件名排序)
fn list_images(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files: Vec<PathBuf> = fs::read_dir(path)
        .with_context(|| format!("cannot read frames directory {}", path.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| matches!(e.to_lowercase().as_str(), "jpg" | "jpeg" | "png" | "bmp"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

/// 第 index 帧的时间戳 (毫秒)
fn timestamp_ms(index: usize, fps: u32) -> u64 {
    index as u64 * 1000 / fps.max(1) as u64
}

fn emit(channel: &mut Channel, frame: &FrameData<'_>, force: bool, source: &str) {
    let frame_id = channel.next_frame_id();
    let outcome = channel.process(frame, force);
    let code = status_code(&outcome);
    let line = match outcome {
        Ok(o) => json!({
            "frame_id": frame_id,
            "timestamp": frame.timestamp,
            "source": source,
            "status": code,
            "results": o.results(),
        }),
        Err(e) => json!({
            "frame_id": frame_id,
            "timestamp": frame.timestamp,
            "source": source,
            "status": code,
            "error": e.to_string(),
        }),
    };
    println!("{}", line);
}

fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(true).with_target(false).with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let args = Args::parse();

    let mut params = match &args.config {
        Some(path) => ChannelParams::load(path)?,
        None => ChannelParams::default(),
    };
    if let Some(device) = &args.device {
        params.device = Some(device.clone());
    }
    if let Some(interval) = args.interval {
        params.detect_interval = interval;
    }

    let mut channel = Channel::create(params)?;
    if let Some(gallery) = &args.gallery {
        channel.set_identity_db(IdentitySource::File(gallery.clone()))?;
    }

    if let Some(raw) = &args.raw {
        let format = parse_format(&args.format)?;
        let frame_len = format
            .required_len(args.width, args.height)
            .context("invalid raw frame format")?;
        let data = fs::read(raw).with_context(|| format!("cannot read {}", raw.display()))?;
        info!(
            "🎞️ 原始帧: {} ({}x{} {}, 共 {} 帧)",
            raw.display(),
            args.width,
            args.height,
            format.name(),
            data.len() / frame_len.max(1)
        );
        for (i, chunk) in data.chunks(frame_len.max(1)).enumerate() {
            let frame = FrameData::new(chunk, args.width, args.height, format)
                .with_timestamp(timestamp_ms(i, args.fps));
            emit(&mut channel, &frame, args.force, &format!("{}#{}", raw.display(), i));
        }
    } else if let Some(frames) = &args.frames {
        let files = list_images(frames)?;
        info!("🖼️ 共 {} 张图片", files.len());
        for (i, file) in files.into_iter().enumerate() {
            let img = match image::open(&file) {
                Ok(img) => img.to_rgb8(),
                Err(e) => {
                    warn!("⚠️ 跳过 {}: {}", file.display(), e);
                    continue;
                }
            };
            let frame = FrameData::new(img.as_raw(), img.width(), img.height(), FrameFormat::Rgb)
                .with_timestamp(timestamp_ms(i, args.fps));
            emit(&mut channel, &frame, args.force, &file.display().to_string());
        }
    } else {
        bail!("either --frames or --raw is required");
    }

    channel.destroy();
    Ok(())
}

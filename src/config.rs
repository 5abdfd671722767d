//! 通道配置 - 可通过JSON文件加载

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{ChannelError, ChannelResult};

/// 默认推理设备
pub const DEFAULT_DEVICE: &str = "CPU";

/// 通道参数配置
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChannelParams {
    // === 模型路径 (空字符串视为未配置) ===
    pub face_detect_model_path: Option<PathBuf>, // 人脸检测模型
    pub face_recog_model_path: Option<PathBuf>,  // 人脸特征模型
    pub landmarks_model_path: Option<PathBuf>,   // 人脸关键点模型

    // === 设备 ===
    pub device: Option<String>, // CPU / GPU / CUDA:n / TRT:n
    pub max_batch_size: usize,  // 最大推理批大小

    // === 阈值 ===
    pub detect_threshold: f32, // 检测置信度阈值
    pub reid_threshold: f32,   // 识别相似度阈值

    // === 人脸库 ===
    pub reid_gallery_path: Option<PathBuf>,

    // === 通道 ===
    pub detect_interval: u32, // 每隔N帧做一次完整检测 (0 = 每帧)
    pub channel_id: i32,
}

impl Default for ChannelParams {
    fn default() -> Self {
        Self {
            face_detect_model_path: None,
            face_recog_model_path: None,
            landmarks_model_path: None,
            device: None,
            max_batch_size: 16,
            detect_threshold: 0.5,
            reid_threshold: 0.7,
            reid_gallery_path: None,
            detect_interval: 0,
            channel_id: 0,
        }
    }
}

/// 过滤掉空路径
fn configured(path: &Option<PathBuf>) -> Option<&Path> {
    path.as_deref().filter(|p| !p.as_os_str().is_empty())
}

impl ChannelParams {
    /// 从JSON文件加载配置
    pub fn load(path: impl AsRef<Path>) -> ChannelResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        let params: Self = serde_json::from_str(&json)?;
        info!("✅ 通道配置已从 {} 加载", path.display());
        Ok(params)
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> ChannelResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        info!("💾 通道配置已保存到 {}", path.as_ref().display());
        Ok(())
    }

    pub fn detect_model(&self) -> Option<&Path> {
        configured(&self.face_detect_model_path)
    }

    pub fn recog_model(&self) -> Option<&Path> {
        configured(&self.face_recog_model_path)
    }

    pub fn landmarks_model(&self) -> Option<&Path> {
        configured(&self.landmarks_model_path)
    }

    pub fn gallery_path(&self) -> Option<&Path> {
        configured(&self.reid_gallery_path)
    }

    /// 实际使用的设备名 (未指定时回退到CPU)
    pub fn device_name(&self) -> &str {
        match self.device.as_deref().map(str::trim) {
            Some(d) if !d.is_empty() => d,
            _ => DEFAULT_DEVICE,
        }
    }

    /// 是否启用完整识别 (检测+关键点+特征三个模型都已配置)
    pub fn recognition_enabled(&self) -> bool {
        self.detect_model().is_some()
            && self.recog_model().is_some()
            && self.landmarks_model().is_some()
    }

    /// 校验参数,失败即视为通道创建失败
    pub fn validate(&self) -> ChannelResult<()> {
        if !(0.0..=1.0).contains(&self.detect_threshold) {
            return Err(ChannelError::creation_failure(format!(
                "detect_threshold {} out of [0, 1]",
                self.detect_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.reid_threshold) {
            return Err(ChannelError::creation_failure(format!(
                "reid_threshold {} out of [0, 1]",
                self.reid_threshold
            )));
        }
        if self.max_batch_size == 0 {
            return Err(ChannelError::creation_failure("max_batch_size must be > 0"));
        }

        let paths = [
            ("face detection model", self.detect_model()),
            ("face recognition model", self.recog_model()),
            ("landmarks model", self.landmarks_model()),
            ("reid gallery", self.gallery_path()),
        ];
        for (what, path) in paths {
            if let Some(p) = path {
                if !p.exists() {
                    return Err(ChannelError::creation_failure(format!(
                        "{} not found: {}",
                        what,
                        p.display()
                    )));
                }
            }
        }
        Ok(())
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️  通道 #{} 配置:", self.channel_id);
        info!("  设备: {}", self.device_name());
        info!(
            "  检测模型: {}",
            self.detect_model()
                .map_or("<未配置>".to_string(), |p| p.display().to_string())
        );
        info!("  识别启用: {}", self.recognition_enabled());
        info!(
            "  检测阈值: {:.2} | 识别阈值: {:.2}",
            self.detect_threshold, self.reid_threshold
        );
        info!("  检测间隔: {} | 最大批大小: {}", self.detect_interval, self.max_batch_size);
    }
}

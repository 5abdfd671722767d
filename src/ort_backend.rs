//! ONNX Runtime 推理后端
//! 设备选择 → 会话构建 → 张量推理

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};
use ndarray::{Array, IxDyn};
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, TensorRTExecutionProvider,
};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::info;

/// 执行设备 (Execution Provider)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrtEP {
    CPU,
    CUDA(i32),
    Trt(i32),
}

impl OrtEP {
    /// 从设备名解析: CPU / GPU[:n] / CUDA[:n] / TRT[:n] / TENSORRT[:n]
    pub fn from_device(name: &str) -> Result<Self> {
        let upper = name.trim().to_uppercase();
        let (kind, index) = match upper.split_once(':') {
            Some((kind, idx)) => {
                let idx: i32 = idx
                    .trim()
                    .parse()
                    .map_err(|_| anyhow!("invalid device index in '{}'", name))?;
                (kind.trim().to_string(), idx)
            }
            None => (upper.clone(), 0),
        };

        match kind.as_str() {
            "" | "CPU" => Ok(OrtEP::CPU),
            "GPU" | "CUDA" => Ok(OrtEP::CUDA(index)),
            "TRT" | "TENSORRT" => Ok(OrtEP::Trt(index)),
            _ => bail!("unsupported inference device '{}'", name),
        }
    }

    /// 设备是否支持动态批大小 (TensorRT引擎为静态形状)
    pub fn supports_dynamic_batch(&self) -> bool {
        !matches!(self, OrtEP::Trt(_))
    }

    pub fn name(&self) -> String {
        match self {
            OrtEP::CPU => "CPU".to_string(),
            OrtEP::CUDA(id) => format!("CUDA:{}", id),
            OrtEP::Trt(id) => format!("TensorRT:{}", id),
        }
    }
}

/// 推理后端配置
#[derive(Debug, Clone)]
pub struct OrtConfig {
    pub f: PathBuf,
    pub ep: OrtEP,
    /// 请求的最大批大小,设备不支持动态批时强制为1
    pub max_batch: usize,
}

impl OrtConfig {
    pub fn new(f: impl AsRef<Path>, ep: OrtEP, max_batch: usize) -> Self {
        Self {
            f: f.as_ref().to_path_buf(),
            ep,
            max_batch,
        }
    }
}

/// ONNX Runtime 会话封装
pub struct OrtBackend {
    session: Session,
    output_names: Vec<String>,
    batch: usize,
}

impl OrtBackend {
    pub fn build(config: OrtConfig) -> Result<Self> {
        let builder = Session::builder()
            .map_err(|e| anyhow!("Failed to create session builder: {}", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow!("Failed to set optimization level: {}", e))?;

        let builder = match config.ep {
            OrtEP::CPU => builder
                .with_execution_providers([CPUExecutionProvider::default().build()]),
            OrtEP::CUDA(id) => builder.with_execution_providers([
                CUDAExecutionProvider::default().with_device_id(id).build(),
                CPUExecutionProvider::default().build(),
            ]),
            OrtEP::Trt(id) => builder.with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(id)
                    .build(),
                CUDAExecutionProvider::default().with_device_id(id).build(),
                CPUExecutionProvider::default().build(),
            ]),
        }
        .map_err(|e| anyhow!("Failed to set execution providers: {}", e))?;

        let session = builder
            .commit_from_file(&config.f)
            .map_err(|e| anyhow!("Failed to load model {}: {}", config.f.display(), e))?;

        let output_names = session.outputs.iter().map(|o| o.name.clone()).collect();

        let batch = if config.ep.supports_dynamic_batch() {
            config.max_batch.max(1)
        } else {
            1
        };

        info!(
            "✅ 模型加载成功: {} (设备: {}, 批大小: {})",
            config.f.display(),
            config.ep.name(),
            batch
        );

        Ok(Self {
            session,
            output_names,
            batch,
        })
    }

    /// 执行一次前向推理,返回全部输出张量
    pub fn run(&mut self, xs: Array<f32, IxDyn>) -> Result<Vec<Array<f32, IxDyn>>> {
        let shape = xs.shape().to_vec();
        let data: Vec<f32> = xs.iter().copied().collect();
        let input: Value = Tensor::from_array((shape, data.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| anyhow!("Failed to create tensor: {}", e))?;

        let outputs = self
            .session
            .run(ort::inputs![input])
            .map_err(|e| anyhow!("ONNX inference failed: {}", e))?;

        let mut ys = Vec::with_capacity(self.output_names.len());
        for name in &self.output_names {
            let value = outputs
                .get(name.as_str())
                .ok_or_else(|| anyhow!("Missing output tensor '{}'", name))?;
            let (shape, data) = value
                .try_extract_tensor::<f32>()
                .map_err(|e| anyhow!("Failed to extract tensor '{}': {}", name, e))?;
            let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
            ys.push(Array::from_shape_vec(IxDyn(&dims), data.to_vec())?);
        }
        Ok(ys)
    }

    pub fn batch(&self) -> usize {
        self.batch
    }
}

//! 人脸库 (Identity gallery)
//! JSON文件 / 内存记录 → 身份列表 → 余弦相似度匹配

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::detection::UNKNOWN_ID;
use crate::error::{ChannelError, ChannelResult};

/// 人脸库文件中的单条记录: 图片路径或特征向量
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum GalleryEntry {
    Embedding(Vec<f32>),
    Image(PathBuf),
}

/// 一个身份的一张注册人脸
#[derive(Clone, Debug)]
pub enum IdentityFace {
    /// 原始图片,注册时检测 + 对齐 + 提特征
    Image(RgbImage),
    Embedding(Vec<f32>),
}

/// 内存中的身份记录
#[derive(Clone, Debug)]
pub struct IdentityRecord {
    pub label: String,
    pub faces: Vec<IdentityFace>,
}

impl IdentityRecord {
    pub fn new(label: impl Into<String>, faces: Vec<IdentityFace>) -> Self {
        Self {
            label: label.into(),
            faces,
        }
    }

    pub fn from_embedding(label: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self::new(label, vec![IdentityFace::Embedding(embedding)])
    }
}

/// 人脸库来源
#[derive(Clone, Debug)]
pub enum IdentitySource {
    Records(Vec<IdentityRecord>),
    File(PathBuf),
}

/// 读取人脸库JSON文件: { "label": [entry, ...], ... }
///
/// 按标签排序返回,相对图片路径以库文件所在目录为基准
pub fn read_gallery_file(path: &Path) -> ChannelResult<Vec<IdentityRecord>> {
    let json = fs::read_to_string(path).map_err(|e| {
        ChannelError::gallery(format!("cannot read gallery {}: {}", path.display(), e))
    })?;
    let entries: BTreeMap<String, Vec<GalleryEntry>> = serde_json::from_str(&json)
        .map_err(|e| ChannelError::gallery(format!("malformed gallery {}: {}", path.display(), e)))?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let mut records = Vec::with_capacity(entries.len());
    for (label, items) in entries {
        let mut faces = Vec::with_capacity(items.len());
        for item in items {
            let face = match item {
                GalleryEntry::Embedding(v) => IdentityFace::Embedding(v),
                GalleryEntry::Image(p) => {
                    let full = if p.is_absolute() { p } else { base.join(p) };
                    let img = image::open(&full).map_err(|e| {
                        ChannelError::gallery(format!(
                            "cannot load face image {} for '{}': {}",
                            full.display(),
                            label,
                            e
                        ))
                    })?;
                    IdentityFace::Image(img.to_rgb8())
                }
            };
            faces.push(face);
        }
        records.push(IdentityRecord { label, faces });
    }

    info!("📂 人脸库已读取: {} ({} 个身份)", path.display(), records.len());
    Ok(records)
}

/// 余弦相似度 (维度不一致或零向量时为0)
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na < 1e-6 || nb < 1e-6 {
        return 0.0;
    }
    dot / (na * nb)
}

#[derive(Clone, Debug)]
struct GalleryIdentity {
    label: String,
    embeddings: Vec<Vec<f32>>,
}

/// 特征库: 身份索引 = 插入顺序
#[derive(Clone, Debug)]
pub struct EmbeddingsGallery {
    identities: Vec<GalleryIdentity>,
    threshold: f32,
}

impl EmbeddingsGallery {
    pub fn empty(threshold: f32) -> Self {
        Self {
            identities: Vec::new(),
            threshold,
        }
    }

    /// 从 (标签, 特征列表) 构建,整体校验通过才返回
    pub fn from_embeddings(
        identities: Vec<(String, Vec<Vec<f32>>)>,
        threshold: f32,
    ) -> ChannelResult<Self> {
        let mut seen = HashSet::new();
        let mut dim: Option<usize> = None;

        for (label, embeddings) in &identities {
            if label.trim().is_empty() {
                return Err(ChannelError::gallery("identity label must not be empty"));
            }
            if !seen.insert(label.as_str()) {
                return Err(ChannelError::gallery(format!("duplicate identity label '{}'", label)));
            }
            if embeddings.is_empty() {
                return Err(ChannelError::gallery(format!(
                    "identity '{}' has no usable face",
                    label
                )));
            }
            for e in embeddings {
                if e.is_empty() {
                    return Err(ChannelError::gallery(format!(
                        "identity '{}' has an empty embedding",
                        label
                    )));
                }
                match dim {
                    None => dim = Some(e.len()),
                    Some(d) if d != e.len() => {
                        return Err(ChannelError::gallery(format!(
                            "identity '{}' embedding dimension {} != {}",
                            label,
                            e.len(),
                            d
                        )))
                    }
                    _ => {}
                }
            }
        }

        Ok(Self {
            identities: identities
                .into_iter()
                .map(|(label, embeddings)| GalleryIdentity { label, embeddings })
                .collect(),
            threshold,
        })
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// 身份索引 → 显示名称, 未知身份为空字符串
    pub fn label_by_id(&self, id: i32) -> &str {
        if id == UNKNOWN_ID || id < 0 {
            return "";
        }
        self.identities
            .get(id as usize)
            .map(|i| i.label.as_str())
            .unwrap_or("")
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.identities.iter().map(|i| i.label.as_str())
    }

    /// 旧库身份索引 → 本库身份索引 (按标签对应, 已移除的身份为 UNKNOWN_ID)
    pub fn index_map_from(&self, old: &EmbeddingsGallery) -> Vec<i32> {
        old.labels()
            .map(|label| {
                self.labels()
                    .position(|l| l == label)
                    .map_or(UNKNOWN_ID, |idx| idx as i32)
            })
            .collect()
    }

    /// 查询特征 → 身份索引
    ///
    /// 相似度 ≥ 阈值的 (查询, 身份) 按相似度降序贪心分配,
    /// 每个身份在一帧内最多分配给一张人脸
    pub fn identify(&self, embeddings: &[Vec<f32>]) -> Vec<i32> {
        let mut ids = vec![UNKNOWN_ID; embeddings.len()];
        if self.identities.is_empty() {
            return ids;
        }

        let mut pairs: Vec<(f32, usize, usize)> = Vec::new();
        for (q, query) in embeddings.iter().enumerate() {
            for (g, identity) in self.identities.iter().enumerate() {
                let best = identity
                    .embeddings
                    .iter()
                    .map(|e| cosine_similarity(query, e))
                    .fold(f32::MIN, f32::max);
                if best >= self.threshold {
                    pairs.push((best, q, g));
                }
            }
        }
        pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut identity_used = vec![false; self.identities.len()];
        for (_, q, g) in pairs {
            if ids[q] != UNKNOWN_ID || identity_used[g] {
                continue;
            }
            ids[q] = g as i32;
            identity_used[g] = true;
        }
        ids
    }
}

// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::{ensure_non_empty, MediaError, MediaToolkit};

/// 分片计划
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitPlan {
    /// 分片数量，至少为 1
    pub num_parts: u32,
    /// 每片时长（秒），单片时为整段时长
    pub part_duration: f64,
}

impl SplitPlan {
    /// 第 `index` 片（从 0 开始）的起始偏移与时长，最后一片不限时长
    pub fn cut_window(&self, index: u32) -> (f64, Option<f64>) {
        let start = index as f64 * self.part_duration;
        if index + 1 >= self.num_parts {
            (start, None)
        } else {
            (start, Some(self.part_duration))
        }
    }
}

/// 按大小上限计算分片数量：`ceil(size / limit)`，至少为 1
pub fn part_count(size_bytes: u64, limit_bytes: u64) -> u32 {
    if limit_bytes == 0 || size_bytes <= limit_bytes {
        return 1;
    }
    size_bytes.div_ceil(limit_bytes) as u32
}

/// 计算分片计划
///
/// 每片时长低于 `min_part_secs` 时减少分片数到 `max(1, floor(duration / min))`。
///
/// # 参数
///
/// * `size_bytes` - 源文件大小
/// * `limit_bytes` - 平台单文件上限
/// * `duration_secs` - 媒体时长
/// * `min_part_secs` - 单片最短时长
pub fn plan_split(
    size_bytes: u64,
    limit_bytes: u64,
    duration_secs: f64,
    min_part_secs: f64,
) -> SplitPlan {
    let mut num_parts = part_count(size_bytes, limit_bytes);

    if num_parts > 1 && min_part_secs > 0.0 && duration_secs / (num_parts as f64) < min_part_secs {
        num_parts = ((duration_secs / min_part_secs).floor() as u32).max(1);
    }

    SplitPlan {
        num_parts,
        part_duration: duration_secs / num_parts as f64,
    }
}

/// 准备好的上传分片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedPart {
    /// 从 1 开始的分片序号
    pub part_number: u32,
    pub path: PathBuf,
}

/// 把超过平台上限的文件切成按时间连续的若干片
pub struct Splitter {
    toolkit: Arc<dyn MediaToolkit>,
    limit_bytes: u64,
    min_part_secs: f64,
}

impl Splitter {
    pub fn new(toolkit: Arc<dyn MediaToolkit>, limit_bytes: u64, min_part_secs: f64) -> Self {
        Self {
            toolkit,
            limit_bytes,
            min_part_secs,
        }
    }

    /// 为上传准备分片
    ///
    /// 文件未超过上限时原样返回单片；否则探测时长并用流复制切片，
    /// 分片文件与源文件放在同一目录。
    ///
    /// # 返回值
    ///
    /// 按 `part_number` 升序、编号为 1..N 的分片列表
    pub async fn prepare(&self, input: &Path) -> Result<Vec<PreparedPart>, MediaError> {
        let size = ensure_non_empty(input).await?;

        if part_count(size, self.limit_bytes) == 1 {
            return Ok(vec![PreparedPart {
                part_number: 1,
                path: input.to_path_buf(),
            }]);
        }

        let duration = self.toolkit.probe_duration(input).await?;
        let plan = plan_split(size, self.limit_bytes, duration, self.min_part_secs);
        info!(
            "Splitting {} ({} bytes, {:.1}s) into {} parts of {:.1}s",
            input.display(),
            size,
            duration,
            plan.num_parts,
            plan.part_duration
        );

        if plan.num_parts == 1 {
            return Ok(vec![PreparedPart {
                part_number: 1,
                path: input.to_path_buf(),
            }]);
        }

        let mut parts = Vec::with_capacity(plan.num_parts as usize);
        for index in 0..plan.num_parts {
            let part_number = index + 1;
            let output = part_path(input, part_number);
            let (start, length) = plan.cut_window(index);

            self.toolkit.cut(input, start, length, &output).await?;
            let part_size = ensure_non_empty(&output).await?;
            debug!("Part {} ready: {} bytes", part_number, part_size);

            parts.push(PreparedPart {
                part_number,
                path: output,
            });
        }
        Ok(parts)
    }
}

fn part_path(input: &Path, part_number: u32) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let name = match input.extension() {
        Some(ext) => format!("{}.part{}.{}", stem, part_number, ext.to_string_lossy()),
        None => format!("{}.part{}", stem, part_number),
    };
    input.with_file_name(name)
}

// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};
use url::Url;

use super::{MediaError, MediaToolkit, MergeProgressFn};
use crate::config::settings::MediaSettings;
use crate::domain::models::task::MergeProgress;

const STDERR_TAIL_LINES: usize = 5;

/// 基于 ffmpeg / ffprobe 进程的媒体工具
pub struct FfmpegToolkit {
    ffmpeg_path: String,
    ffprobe_path: String,
    http: reqwest::Client,
}

impl FfmpegToolkit {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
            http,
        }
    }

    pub fn from_settings(settings: &MediaSettings) -> Self {
        Self::new(&settings.ffmpeg_path, &settings.ffprobe_path)
    }

    /// 拉取清单并统计媒体分段数
    ///
    /// 遇到主清单时跟随第一个变体。
    pub async fn count_segments(
        &self,
        manifest_url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<u32, MediaError> {
        let body = self.fetch_manifest(manifest_url, headers).await?;

        let body = match master_variant(&body) {
            Some(variant) => {
                let resolved = resolve_uri(manifest_url, variant);
                debug!("Following variant playlist {}", resolved);
                self.fetch_manifest(&resolved, headers).await?
            }
            None => body,
        };

        let segments = count_media_segments(&body);
        if segments == 0 {
            return Err(MediaError::EmptyManifest);
        }
        Ok(segments)
    }

    async fn fetch_manifest(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<String, MediaError> {
        let response = self
            .http
            .get(url)
            .headers(to_header_map(headers))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }

    /// 运行 ffmpeg，逐行把诊断输出交给 `on_line`
    async fn run_ffmpeg(
        &self,
        args: Vec<String>,
        mut on_line: impl FnMut(&str) + Send,
    ) -> Result<(), MediaError> {
        debug!("Running {} {}", self.ffmpeg_path, args.join(" "));

        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MediaError::Spawn {
                tool: "ffmpeg".to_string(),
                source,
            })?;

        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
        if let Some(stderr) = child.stderr.take() {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                on_line(&line);
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }

        let status = child.wait().await?;
        if status.success() {
            Ok(())
        } else {
            Err(MediaError::ProcessFailed {
                tool: "ffmpeg".to_string(),
                code: status.code(),
                message: tail.into_iter().collect::<Vec<_>>().join(" | "),
            })
        }
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn merge(
        &self,
        manifest_url: &str,
        headers: &HashMap<String, String>,
        output: &Path,
        on_progress: MergeProgressFn<'_>,
    ) -> Result<(), MediaError> {
        let total = self.count_segments(manifest_url, headers).await?;
        on_progress(MergeProgress::new(0, total));

        let mut opened = 0u32;
        self.run_ffmpeg(merge_args(manifest_url, headers, output), |line| {
            if is_segment_open(line) {
                opened += 1;
                on_progress(MergeProgress::new(opened, total));
            }
        })
        .await?;

        on_progress(MergeProgress::new(total, total));
        Ok(())
    }

    async fn probe_duration(&self, input: &Path) -> Result<f64, MediaError> {
        let output = Command::new(&self.ffprobe_path)
            .args(probe_args(input))
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| MediaError::Spawn {
                tool: "ffprobe".to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(MediaError::ProcessFailed {
                tool: "ffprobe".to_string(),
                code: output.status.code(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_duration(&String::from_utf8_lossy(&output.stdout))
    }

    async fn cut(
        &self,
        input: &Path,
        start_secs: f64,
        duration_secs: Option<f64>,
        output: &Path,
    ) -> Result<(), MediaError> {
        self.run_ffmpeg(cut_args(input, start_secs, duration_secs, output), |_| {})
            .await
    }
}

fn to_header_map(headers: &HashMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => warn!("Skipping invalid request header {}", name),
        }
    }
    map
}

fn merge_args(manifest_url: &str, headers: &HashMap<String, String>, output: &Path) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-y".into(),
        "-protocol_whitelist".into(),
        "file,http,https,tcp,tls".into(),
    ];

    if !headers.is_empty() {
        let mut names: Vec<&String> = headers.keys().collect();
        names.sort();
        let joined: String = names
            .into_iter()
            .map(|name| format!("{}: {}\r\n", name, headers[name]))
            .collect();
        args.push("-headers".into());
        args.push(joined);
    }

    args.extend([
        "-i".into(),
        manifest_url.to_string(),
        "-c".into(),
        "copy".into(),
        "-bsf:a".into(),
        "aac_adtstoasc".into(),
        "-movflags".into(),
        "+faststart".into(),
        output.to_string_lossy().into_owned(),
    ]);
    args
}

fn cut_args(input: &Path, start_secs: f64, duration_secs: Option<f64>, output: &Path) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-ss".into(),
        format!("{:.3}", start_secs),
        "-i".into(),
        input.to_string_lossy().into_owned(),
    ];
    if let Some(duration) = duration_secs {
        args.push("-t".into());
        args.push(format!("{:.3}", duration));
    }
    args.extend([
        "-c".into(),
        "copy".into(),
        "-avoid_negative_ts".into(),
        "make_zero".into(),
        "-movflags".into(),
        "+faststart".into(),
        "-y".into(),
        output.to_string_lossy().into_owned(),
    ]);
    args
}

fn probe_args(input: &Path) -> Vec<String> {
    vec![
        "-v".into(),
        "error".into(),
        "-show_entries".into(),
        "format=duration".into(),
        "-of".into(),
        "default=noprint_wrappers=1:nokey=1".into(),
        input.to_string_lossy().into_owned(),
    ]
}

fn parse_duration(stdout: &str) -> Result<f64, MediaError> {
    let raw = stdout.trim();
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => Ok(value),
        _ => Err(MediaError::Probe(format!("unexpected ffprobe output '{}'", raw))),
    }
}

/// 统计清单中的媒体分段（非注释、非空行）
pub fn count_media_segments(manifest: &str) -> u32 {
    manifest
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .count() as u32
}

fn master_variant(manifest: &str) -> Option<&str> {
    if !manifest.contains("#EXT-X-STREAM-INF") {
        return None;
    }
    manifest
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
}

fn resolve_uri(base: &str, reference: &str) -> String {
    Url::parse(base)
        .and_then(|base| base.join(reference))
        .map(|url| url.to_string())
        .unwrap_or_else(|_| reference.to_string())
}

fn is_segment_open(line: &str) -> bool {
    line.contains("Opening") && line.contains(".ts")
}

//! 历史日志的压缩与清理.
//!
//! 滚动文件名为 `{prefix}.{YYYY-MM-DD}`, 压缩后追加 `.gz`.
//! 早于保留期限的文件 (含已压缩的) 被删除; 早于今天且未压缩的文件按配置压缩.

use super::LoggingConfig;
use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, NaiveDate};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// 一次清理的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub compressed: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

/// 按 `today` 计算保留期限, 压缩并删除历史日志
pub fn cleanup_logs(config: &LoggingConfig, today: NaiveDate) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();
    let Some(directory) = config.directory.as_deref().map(Path::new) else {
        return Ok(report);
    };
    if !directory.exists() {
        return Ok(report);
    }

    let cutoff = today - ChronoDuration::days(config.retention_days);
    let mut entries: Vec<_> = fs::read_dir(directory)
        .with_context(|| format!("读取日志目录失败, path={}", directory.display()))?
        .collect::<io::Result<_>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let file_name = entry.file_name().to_string_lossy().to_string();
        let Some((date, compressed)) = parse_rolled_name(&file_name, &config.file_prefix) else {
            continue;
        };
        let path = entry.path();

        if date < cutoff {
            fs::remove_file(&path)
                .with_context(|| format!("删除过期日志失败, path={}", path.display()))?;
            report.removed.push(path);
        } else if config.compress_history && !compressed && date < today {
            report.compressed.push(compress_to_gz(&path)?);
        }
    }

    Ok(report)
}

fn compress_to_gz(path: &Path) -> Result<PathBuf> {
    let gz_path = PathBuf::from(format!("{}.gz", path.display()));
    let mut input =
        File::open(path).with_context(|| format!("打开待压缩日志失败, path={}", path.display()))?;
    let output = File::create(&gz_path)
        .with_context(|| format!("创建压缩日志失败, path={}", gz_path.display()))?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?;
    fs::remove_file(path)
        .with_context(|| format!("删除已压缩日志失败, path={}", path.display()))?;
    Ok(gz_path)
}

/// 解析 `{prefix}.{YYYY-MM-DD}[.gz]`, 返回日期与是否已压缩
fn parse_rolled_name(file_name: &str, prefix: &str) -> Option<(NaiveDate, bool)> {
    let rest = file_name.strip_prefix(prefix)?.strip_prefix('.')?;
    let (date_part, compressed) = match rest.strip_suffix(".gz") {
        Some(date_part) => (date_part, true),
        None => (rest, false),
    };
    if date_part.len() != 10 {
        return None;
    }
    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()?;
    (date.format("%Y-%m-%d").to_string() == date_part).then_some((date, compressed))
}

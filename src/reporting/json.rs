//! # JSON Reporting Module / JSON 报告模块
//!
//! Serializes a finalized run summary for machine consumers (CI reporters,
//! result archives). The rendering is a direct projection of the result
//! tree: status, site, label, message, stack trace, duration, property bag
//! and the child list per node.
//!
//! 为机器消费者（CI 报告器、结果归档）序列化最终的运行摘要。
//! 渲染是结果树的直接投影。

use anyhow::{Context, Result};
use std::path::Path;

use crate::core::results::RunSummary;

/// Renders a run summary as pretty-printed JSON.
pub fn render_json_report(summary: &RunSummary) -> Result<String> {
    serde_json::to_string_pretty(summary).context("Failed to serialize run summary")
}

/// Renders a run summary and writes it to a file.
pub fn write_json_report(summary: &RunSummary, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let rendered = render_json_report(summary)?;
    std::fs::write(path, rendered)
        .with_context(|| format!("Failed to write report file: {}", path.display()))
}

//! # Console Reporting Module / 控制台报告模块
//!
//! This module prints colored, formatted run summaries to the console:
//! a per-case status table followed by aggregate counts, and a detail
//! section for every failed case.
//!
//! 此模块在控制台打印彩色格式化的运行摘要：
//! 每用例状态表及汇总计数，以及每个失败用例的详情部分。

use colored::*;

use crate::core::results::{ResultLabel, RunSummary, TestNodeResult, TestStatus};

/// Prints a formatted summary of one run to the console.
/// Displays a row per case leaf with status, full name and duration,
/// using color coding to highlight different statuses, then the totals.
///
/// 在控制台打印一次运行的格式化摘要。
/// 每个用例叶子显示一行，包含状态、全名和持续时间，
/// 使用颜色编码突出显示不同状态，最后是总计。
///
/// # Output Format / 输出格式
/// ```text
/// --- Test Run Summary ---
///   - Passed        | Tests.Calc.add(1,2)                      |      1.23s
///   - Failed        | Tests.Calc.divide(1,0)                   |      0.45s
///   - Skipped       | Tests.Calc.slow_path                     |      0.00s
///
///   5 passed, 1 failed, 1 skipped, 0 inconclusive (7 total) in 1.70s
/// ```
pub fn print_summary(summary: &RunSummary) {
    println!("\n{}", "--- Test Run Summary ---".bold());

    for leaf in collect_leaves(&summary.result) {
        let status_str = status_text(leaf);
        let status_colored = match leaf.status {
            TestStatus::Passed => status_str.green(),
            TestStatus::Failed => status_str.red(),
            TestStatus::Skipped => status_str.dimmed(),
            TestStatus::Inconclusive => status_str.yellow(),
        };
        println!(
            "  - {:<13} | {:<40} | {:>10}",
            status_colored,
            leaf.full_name,
            format!("{:.2?}", leaf.duration)
        );
    }

    let counts = &summary.counts;
    let totals = format!(
        "{} passed, {} failed, {} skipped, {} inconclusive ({} total) in {:.2?}",
        counts.passed,
        counts.failed,
        counts.skipped,
        counts.inconclusive,
        counts.total(),
        summary.result.duration,
    );
    let totals = if summary.has_failures() { totals.red().bold() } else { totals.green().bold() };
    println!("\n  {}", totals);
}

/// Prints detailed information about every failed case in the run:
/// failure site, message and stack trace where available.
///
/// 打印运行中每个失败用例的详细信息：失败位置、消息和可用的堆栈跟踪。
pub fn print_failure_details(summary: &RunSummary) {
    let failures = summary.result.failed_leaves();
    if failures.is_empty() {
        return;
    }

    println!("\n{}", "--- Failures ---".red().bold());
    println!("{}", "-".repeat(80));

    for (i, failure) in failures.iter().enumerate() {
        println!(
            "[{}/{}] {} '{}'  (site: {:?})",
            i + 1,
            failures.len(),
            "FAILED".red(),
            failure.full_name.cyan(),
            failure.site,
        );
        if let Some(message) = &failure.message {
            println!("\n{}", message);
        }
        if let Some(trace) = &failure.stack_trace {
            println!("\n{}", trace.dimmed());
        }
        println!("{}", "-".repeat(80));
    }
}

fn status_text(leaf: &TestNodeResult) -> &'static str {
    match (leaf.status, leaf.label) {
        (TestStatus::Failed, ResultLabel::Error) => "Error",
        (TestStatus::Failed, ResultLabel::Invalid) => "Invalid",
        (TestStatus::Failed, ResultLabel::Cancelled) => "Cancelled",
        (TestStatus::Failed, _) => "Failed",
        (TestStatus::Passed, _) => "Passed",
        (TestStatus::Skipped, ResultLabel::Explicit) => "Explicit",
        (TestStatus::Skipped, ResultLabel::Ignored) => "Ignored",
        (TestStatus::Skipped, _) => "Skipped",
        (TestStatus::Inconclusive, _) => "Inconclusive",
    }
}

fn collect_leaves(result: &TestNodeResult) -> Vec<&TestNodeResult> {
    let mut leaves = Vec::new();
    collect_into(result, &mut leaves);
    leaves
}

fn collect_into<'a>(result: &'a TestNodeResult, leaves: &mut Vec<&'a TestNodeResult>) {
    if result.children.is_empty() {
        leaves.push(result);
    } else {
        for child in &result.children {
            collect_into(child, leaves);
        }
    }
}

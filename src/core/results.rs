//! # Result Model Module / 结果模型模块
//!
//! This module defines the outcome model produced for every node of the test
//! tree: status, failure site, label, message, stack trace, duration and the
//! ordered child results, together with the deterministic rules for rolling
//! child failures into parent state.
//!
//! 此模块定义了为测试树的每个节点生成的结果模型：状态、失败位置、标签、
//! 消息、堆栈跟踪、持续时间和有序的子结果，
//! 以及将子节点失败汇总到父节点状态的确定性规则。

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::core::tree::PropertyBag;

/// The fixed message a suite reports when one or more of its children failed.
/// 当一个或多个子测试失败时，套件报告的固定消息。
pub const CHILD_ERRORS_MESSAGE: &str = "One or more child tests had errors";

/// The message recorded for nodes resolved by a user cancellation.
pub const USER_CANCELLED_MESSAGE: &str = "Test cancelled by user";

/// The terminal status of one executed test node.
/// 一个已执行测试节点的最终状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TestStatus {
    /// The node completed without any failure.
    /// 节点完成且没有任何失败。
    Passed,
    /// The node failed: assertion, error, timeout, or a failing child.
    /// 节点失败：断言、错误、超时或失败的子节点。
    Failed,
    /// The node did not run (ignored, explicit, platform mismatch, parent failure).
    /// 节点未运行（被忽略、显式、平台不匹配、父节点失败）。
    Skipped,
    /// The node ran but produced no verdict (e.g., an empty data source).
    /// 节点已运行但没有产生结论（例如空数据源）。
    Inconclusive,
}

/// Which phase of execution produced a non-passing result.
/// 执行的哪个阶段产生了未通过的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureSite {
    /// The test body itself (also used for timeouts and build defects).
    Test,
    /// A setup method (per-case or one-time).
    SetUp,
    /// A teardown method; takes precedence in reporting over prior status.
    TearDown,
    /// Synthesized on a child because an ancestor failed before it could run.
    Parent,
    /// Recorded on a suite because one or more children failed.
    Child,
}

/// A refinement of [`TestStatus`], mirroring the labels consumers rely on.
/// [`TestStatus`] 的细化标签，消费者依赖这些标签。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResultLabel {
    /// No refinement; the status stands alone.
    None,
    /// A failure caused by an unexpected panic rather than an assertion.
    Error,
    /// A build-time defect: the node was never runnable.
    Invalid,
    /// Skipped because of an ignore marker or ignore signal.
    Ignored,
    /// Skipped because the node is explicit and was not directly selected.
    Explicit,
    /// Resolved by a user cancellation while in flight.
    Cancelled,
}

impl Default for ResultLabel {
    fn default() -> Self {
        ResultLabel::None
    }
}

/// The outcome of executing one test node. One instance is created per node
/// per run, mutated by the command pipeline stages, and finally folded into
/// the parent's child list.
///
/// 执行一个测试节点的结果。每个节点每次运行创建一个实例，
/// 由命令流水线各阶段修改，最终折叠进父节点的子结果列表。
#[derive(Debug, Clone, Serialize)]
pub struct TestNodeResult {
    /// The node's local name.
    pub name: String,
    /// The node's stable full dotted name.
    /// 节点的稳定全名（点分格式）。
    pub full_name: String,
    pub status: TestStatus,
    pub label: ResultLabel,
    /// Meaningful only when `status` is not `Passed`.
    pub site: FailureSite,
    pub message: Option<String>,
    pub stack_trace: Option<String>,
    /// Wall-clock duration of this node including children.
    pub duration: Duration,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Serializable copy of the node's property bag.
    pub properties: PropertyBag,
    /// Child results in declaration order; empty for case nodes.
    /// 按声明顺序排列的子结果；用例节点为空。
    pub children: Vec<TestNodeResult>,
}

impl TestNodeResult {
    /// Creates an in-progress result for a node, assumed inconclusive until
    /// a pipeline stage records a verdict.
    pub fn new(name: &str, full_name: &str) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            full_name: full_name.to_string(),
            status: TestStatus::Inconclusive,
            label: ResultLabel::None,
            site: FailureSite::Test,
            message: None,
            stack_trace: None,
            duration: Duration::ZERO,
            start_time: now,
            end_time: now,
            properties: PropertyBag::new(),
            children: Vec::new(),
        }
    }

    /// Records a verdict, replacing any previous one.
    pub fn set_result(&mut self, status: TestStatus, label: ResultLabel, site: FailureSite) {
        self.status = status;
        self.label = label;
        self.site = site;
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    /// Returns a copy of this result re-attributed to a different failure site.
    /// Used when synthesizing child results from a parent failure.
    pub fn with_site(&self, site: FailureSite) -> Self {
        let mut copy = self.clone();
        copy.site = site;
        copy
    }

    pub fn is_failure(&self) -> bool {
        self.status == TestStatus::Failed
    }

    pub fn is_passed(&self) -> bool {
        self.status == TestStatus::Passed
    }

    /// Appends a teardown failure to this result, overriding a prior pass.
    /// The message becomes `{prior}\nTearDown : {message}` and the site
    /// becomes `TearDown` even when the original cause was a child failure.
    ///
    /// 将 teardown 失败附加到此结果，覆盖之前的通过状态。
    /// 消息变为 `{prior}\nTearDown : {message}`，
    /// 即使最初的原因是子节点失败，失败位置也变为 `TearDown`。
    pub fn record_teardown_failure(&mut self, message: &str, stack_trace: Option<String>, errored: bool) {
        let teardown_message = format!("TearDown : {}", message);
        self.message = Some(match self.message.take() {
            Some(prior) => format!("{}\n{}", prior, teardown_message),
            None => teardown_message,
        });
        if let Some(trace) = stack_trace {
            let teardown_trace = format!("--TearDown\n{}", trace);
            self.stack_trace = Some(match self.stack_trace.take() {
                Some(prior) => format!("{}\n{}", prior, teardown_trace),
                None => teardown_trace,
            });
        }
        let label = if errored { ResultLabel::Error } else { ResultLabel::None };
        self.set_result(TestStatus::Failed, label, FailureSite::TearDown);
    }

    /// Folds a finalized child result into this suite result. Must only be
    /// called after the child's Finalized transition completed.
    pub fn add_child_result(&mut self, child: TestNodeResult) {
        if child.is_failure() && !self.is_failure() {
            self.set_result(TestStatus::Failed, ResultLabel::None, FailureSite::Child);
            self.message = Some(CHILD_ERRORS_MESSAGE.to_string());
        }
        self.children.push(child);
    }

    /// Marks this in-progress result finalized, stamping end time and duration.
    pub fn finalize(&mut self) {
        self.end_time = Utc::now();
        self.duration = (self.end_time - self.start_time)
            .to_std()
            .unwrap_or(Duration::ZERO);
    }

    /// Counts leaf results by status across the whole subtree.
    fn tally(&self, counts: &mut ResultCounts) {
        if self.children.is_empty() {
            match self.status {
                TestStatus::Passed => counts.passed += 1,
                TestStatus::Failed => counts.failed += 1,
                TestStatus::Skipped => counts.skipped += 1,
                TestStatus::Inconclusive => counts.inconclusive += 1,
            }
        } else {
            for child in &self.children {
                child.tally(counts);
            }
        }
    }

    /// Walks the subtree collecting every failed leaf, in declaration order.
    pub fn failed_leaves(&self) -> Vec<&TestNodeResult> {
        let mut found = Vec::new();
        self.collect_failed(&mut found);
        found
    }

    fn collect_failed<'a>(&'a self, found: &mut Vec<&'a TestNodeResult>) {
        if self.children.is_empty() {
            if self.is_failure() {
                found.push(self);
            }
        } else {
            for child in &self.children {
                child.collect_failed(found);
            }
        }
    }

    /// Looks a result up by its full dotted name, anywhere in the subtree.
    pub fn find(&self, full_name: &str) -> Option<&TestNodeResult> {
        if self.full_name == full_name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(full_name))
    }
}

/// Leaf-case counts for one completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResultCounts {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub inconclusive: usize,
}

impl ResultCounts {
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped + self.inconclusive
    }
}

/// The finalized outcome of one whole run: the result tree plus its counts.
/// 一次完整运行的最终结果：结果树及其统计数据。
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub result: TestNodeResult,
    pub counts: ResultCounts,
    pub started: DateTime<Utc>,
    pub ended: DateTime<Utc>,
}

impl RunSummary {
    pub fn new(result: TestNodeResult) -> Self {
        let mut counts = ResultCounts::default();
        result.tally(&mut counts);
        let started = result.start_time;
        let ended = result.end_time;
        Self { result, counts, started, ended }
    }

    pub fn has_failures(&self) -> bool {
        self.counts.failed > 0
    }
}

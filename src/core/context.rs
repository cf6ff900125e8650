//! # Execution Context Module / 执行上下文模块
//!
//! The scoped, inheritable bag of ambient state propagated down the test
//! tree: culture, parallelism scope, cancellation token, remaining time
//! budget, repeat attempt bookkeeping and the current node. Child scopes are
//! derived values that inherit from their parent; leaving a scope restores
//! the parent's ambient state by construction, even when a timeout or a
//! cancellation tears the child down mid-flight.
//!
//! 沿测试树向下传播的作用域化、可继承的环境状态包：区域性、并行范围、
//! 取消令牌、剩余时间预算、重复尝试记录和当前节点。
//! 子作用域是从父级继承的派生值；离开作用域时父级的环境状态天然恢复，
//! 即使超时或取消在执行中途拆除了子作用域。

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::core::expansion::ArgValue;
use crate::core::metadata::ParallelScope;
use crate::core::results::TestStatus;
use crate::infra::platform;

/// The control-flow signal raised by user test code through the assertion
/// boundary. The engine catches and classifies these distinctly from
/// arbitrary panics, which become `Error` results.
///
/// 用户测试代码通过断言边界抛出的控制流信号。
/// 引擎捕获这些信号并将其与任意 panic 区分分类，后者成为 `Error` 结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestSignal {
    /// A checked condition did not hold.
    AssertionFailed(String),
    /// The test asked to be skipped at run time.
    Ignored(String),
    /// The test could not reach a verdict.
    Inconclusive(String),
}

impl TestSignal {
    pub fn message(&self) -> &str {
        match self {
            TestSignal::AssertionFailed(m)
            | TestSignal::Ignored(m)
            | TestSignal::Inconclusive(m) => m,
        }
    }
}

impl fmt::Display for TestSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestSignal::AssertionFailed(m) => write!(f, "AssertionFailed : {}", m),
            TestSignal::Ignored(m) => write!(f, "Ignored : {}", m),
            TestSignal::Inconclusive(m) => write!(f, "Inconclusive : {}", m),
        }
    }
}

/// Asserts a condition, failing the test with the given message otherwise.
pub fn ensure(condition: bool, message: impl Into<String>) -> Result<(), TestSignal> {
    if condition {
        Ok(())
    } else {
        Err(TestSignal::AssertionFailed(message.into()))
    }
}

/// Ambient state for one subtree execution. Forms a parent-link chain; a
/// child context is created when entering a node and discarded when leaving
/// it, so parental ambient state survives any child mutation.
///
/// 一个子树执行的环境状态。形成父链；进入节点时创建子上下文，
/// 离开时丢弃，因此父级环境状态不受任何子级修改影响。
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Full name of the node this context belongs to.
    pub node_name: String,
    pub culture: String,
    pub ui_culture: String,
    /// Effective parallelism scope inherited from the nearest declaration.
    pub parallel_scope: ParallelScope,
    /// Set once a single-threaded suite is entered; forces the whole subtree
    /// onto the dispatching task.
    pub single_threaded: bool,
    pub worker_count: usize,
    pub token: CancellationToken,
    /// Absolute deadline for the current timeout/cancel-after budget.
    pub deadline: Option<Instant>,
    pub debugger_attached: bool,
    /// 1-based attempt index under a repeat/retry wrapper.
    /// 重复/重试包装器下的尝试序号（从 1 开始）。
    pub attempt: usize,
    /// Statuses of prior attempts, in attempt order.
    pub prior_statuses: Vec<TestStatus>,
    /// The enclosing context, if any.
    pub parent: Option<Arc<ExecutionContext>>,
}

impl ExecutionContext {
    /// The root context for one run.
    pub fn root(node_name: &str, worker_count: usize, token: CancellationToken) -> Self {
        let culture = platform::default_culture();
        Self {
            node_name: node_name.to_string(),
            ui_culture: culture.clone(),
            culture,
            parallel_scope: ParallelScope::NONE,
            single_threaded: false,
            worker_count,
            token,
            deadline: None,
            debugger_attached: platform::debugger_attached(),
            attempt: 1,
            prior_statuses: Vec::new(),
            parent: None,
        }
    }

    /// Derives the child context used while executing one child node. All
    /// unset ambient fields are inherited; the parent link records the chain.
    pub fn child_for(&self, node_name: &str) -> Self {
        let mut child = self.clone();
        child.node_name = node_name.to_string();
        child.attempt = 1;
        child.prior_statuses = Vec::new();
        child.parent = Some(Arc::new(self.clone()));
        child
    }

    pub fn remaining_time(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// The view of the execution context handed to user test bodies and
/// lifecycle hooks: the resolved argument tuple plus the ambient facts a
/// test may branch on.
///
/// 交给用户测试体和生命周期钩子的执行上下文视图：
/// 解析后的参数元组以及测试可以据以分支的环境信息。
#[derive(Debug, Clone)]
pub struct CaseContext {
    pub args: Vec<ArgValue>,
    /// The expected value declared on the case, if any.
    pub expected: Option<ArgValue>,
    /// 1-based attempt index; lets user code branch per attempt.
    pub attempt: usize,
    /// Results of prior attempts in attempt order (visible to teardown).
    pub prior_statuses: Vec<TestStatus>,
    pub culture: String,
    pub ui_culture: String,
    pub token: CancellationToken,
    pub deadline: Option<Instant>,
}

impl CaseContext {
    pub fn arg(&self, index: usize) -> &ArgValue {
        &self.args[index]
    }

    pub fn cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn remaining_time(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

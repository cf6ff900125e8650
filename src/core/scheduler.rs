//! # Work Scheduler Module / 工作调度模块
//!
//! Traverses the built test tree and produces the completed result tree.
//! Suites run their one-time hooks around their children; children eligible
//! for parallel execution are dispatched onto the worker pool while the rest
//! run sequentially in declaration order. Results are always folded back in
//! declaration order, and each child's result is folded only after that
//! child fully finalized. Every node resolves to a terminal result — a
//! cancelled, filtered-out or crashed subtree is synthesized, never hung.
//!
//! 遍历构建好的测试树并产生完整的结果树。
//! 套件围绕其子节点运行一次性钩子；可并行执行的子节点被派发到工作池，
//! 其余按声明顺序依次运行。结果始终按声明顺序折叠回去，
//! 且每个子节点的结果只有在其完全定稿后才被折叠。
//! 每个节点都解析为最终结果 —— 被取消、被过滤或崩溃的子树会被合成，
//! 绝不挂起。

use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::core::config::{EngineSettings, TestFilter};
use crate::core::context::{CaseContext, ExecutionContext, TestSignal};
use crate::core::metadata::LifecycleHook;
use crate::core::pipeline::{self, CaseIdentity};
use crate::core::results::{
    FailureSite, ResultLabel, RunSummary, TestNodeResult, TestStatus, USER_CANCELLED_MESSAGE,
};
use crate::core::tree::{NodeKind, RunState, TestNode};

/// Executes one built test tree under the configured settings.
/// 在配置的设置下执行一棵构建好的测试树。
pub struct WorkScheduler {
    worker_count: usize,
    filter: Arc<TestFilter>,
    token: CancellationToken,
}

impl WorkScheduler {
    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            worker_count: settings.worker_count,
            filter: Arc::new(settings.filter.clone()),
            token: CancellationToken::new(),
        }
    }

    /// The cooperative token observed at every dispatch point. Cancelling it
    /// resolves all in-flight and pending work instead of hanging it.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub async fn run(&self, tree: &TestNode) -> RunSummary {
        let ctx = ExecutionContext::root(&tree.full_name, self.worker_count, self.token.clone());
        let result = execute_node(
            Arc::new(tree.clone()),
            ctx,
            self.filter.clone(),
            false,
        )
        .await;
        RunSummary::new(result)
    }
}

/// Executes one node and its subtree, yielding its finalized result.
///
/// The future is `'static` so that parallel children can be moved onto
/// independent worker tasks.
pub fn execute_node(
    node: Arc<TestNode>,
    ctx: ExecutionContext,
    filter: Arc<TestFilter>,
    directly_selected: bool,
) -> BoxFuture<'static, TestNodeResult> {
    Box::pin(async move {
        // Cancellation is observed at the start of every dispatch.
        if ctx.is_cancelled() {
            return synthesize_subtree(
                &node,
                TestStatus::Failed,
                ResultLabel::Cancelled,
                FailureSite::Test,
                USER_CANCELLED_MESSAGE,
                None,
            );
        }

        match node.run_state {
            RunState::Runnable => {}
            RunState::NotRunnable => {
                let reason = node.skip_reason.clone().unwrap_or_default();
                return synthesize_subtree(
                    &node,
                    TestStatus::Failed,
                    ResultLabel::Invalid,
                    FailureSite::Test,
                    &reason,
                    None,
                );
            }
            RunState::Ignored => {
                let reason = node.skip_reason.clone().unwrap_or_default();
                return synthesize_subtree(
                    &node,
                    TestStatus::Skipped,
                    ResultLabel::Ignored,
                    FailureSite::Test,
                    &reason,
                    None,
                );
            }
            RunState::Explicit => {
                if !directly_selected && !filter.selects(&node) {
                    return synthesize_subtree(
                        &node,
                        TestStatus::Skipped,
                        ResultLabel::Explicit,
                        FailureSite::Test,
                        node.skip_reason.as_deref().unwrap_or(""),
                        None,
                    );
                }
            }
            RunState::Skipped => {
                let reason = node.skip_reason.clone().unwrap_or_default();
                return synthesize_subtree(
                    &node,
                    TestStatus::Skipped,
                    ResultLabel::None,
                    FailureSite::Test,
                    &reason,
                    None,
                );
            }
        }

        match &node.kind {
            NodeKind::Case(plan) => {
                let id = CaseIdentity {
                    name: node.name.clone(),
                    full_name: node.full_name.clone(),
                };
                let mut result = pipeline::run_case(id, plan.clone(), &ctx).await;
                result.properties = node.properties.clone();
                result
            }
            _ => execute_suite(node.clone(), ctx, filter, directly_selected).await,
        }
    })
}

async fn execute_suite(
    node: Arc<TestNode>,
    ctx: ExecutionContext,
    filter: Arc<TestFilter>,
    directly_selected: bool,
) -> TestNodeResult {
    let mut result = TestNodeResult::new(&node.name, &node.full_name);
    result.properties = node.properties.clone();

    let (once_set_ups, once_tear_downs) = match &node.kind {
        NodeKind::Fixture(plan) => (plan.once_set_ups.clone(), plan.once_tear_downs.clone()),
        _ => (Vec::new(), Vec::new()),
    };

    // One-time setup failure resolves the whole subtree without running it.
    if let Some(failure) = run_once_hooks(&once_set_ups, &ctx).await {
        apply_setup_failure(&node, &mut result, failure);
        run_once_tear_downs(&once_tear_downs, &ctx, &mut result).await;
        result.finalize();
        return result;
    }

    let outcomes = execute_children(&node, &ctx, &filter, directly_selected).await;
    for (_, child_result) in outcomes {
        result.add_child_result(child_result);
    }

    if !result.is_failure() {
        let no_data = matches!(node.kind, NodeKind::ParameterizedMethod { no_data: true });
        if !no_data {
            result.status = TestStatus::Passed;
        }
    }

    run_once_tear_downs(&once_tear_downs, &ctx, &mut result).await;
    result.finalize();
    result
}

/// Dispatches a suite's children, honoring parallelism scope, the
/// single-threaded flag and the filter. Parallel-eligible children go onto
/// worker tasks bounded by the pool size; the rest run in declaration order
/// on the dispatching task. Outcomes come back sorted by declaration index.
///
/// 派发套件的子节点，遵循并行范围、单线程标志和过滤器。
/// 可并行的子节点进入受池大小限制的工作任务；其余在派发任务上按声明顺序
/// 运行。结果按声明索引排序返回。
async fn execute_children(
    node: &TestNode,
    ctx: &ExecutionContext,
    filter: &Arc<TestFilter>,
    directly_selected: bool,
) -> Vec<(usize, TestNodeResult)> {
    let parent_scope = node.declared_scope.unwrap_or(ctx.parallel_scope);
    let single_threaded = ctx.single_threaded || node.single_threaded;

    let mut sequential = Vec::new();
    let mut parallel = Vec::new();

    for (index, child) in node.children.iter().enumerate() {
        if !filter.passes(child) {
            continue;
        }
        let child_scope = child.declared_scope.unwrap_or(parent_scope);

        let mut child_ctx = ctx.child_for(&child.full_name);
        child_ctx.parallel_scope = child_scope;
        child_ctx.single_threaded = single_threaded;

        let selected = directly_selected || filter.selects(child);
        let future = execute_node(Arc::clone(child), child_ctx, filter.clone(), selected);

        let parallel_eligible = ctx.worker_count > 0
            && !single_threaded
            && (child_scope.self_scope || parent_scope.allows_children());
        let identity = (child.name.clone(), child.full_name.clone());
        if parallel_eligible {
            parallel.push((index, identity, future));
        } else {
            sequential.push((index, identity, future));
        }
    }

    let mut outcomes = Vec::new();
    for (index, identity, future) in sequential {
        outcomes.push((index, guarded(identity, future).await));
    }

    let limit = ctx.worker_count.max(1);
    // Boxed up front; mapping bare async closures over the recursive futures
    // trips rustc's higher-ranked `Send` inference.
    let boxed: Vec<BoxFuture<'static, (usize, TestNodeResult)>> = parallel
        .into_iter()
        .map(|(index, identity, future)| {
            let joined: BoxFuture<'static, (usize, TestNodeResult)> =
                Box::pin(async move { (index, guarded(identity, future).await) });
            joined
        })
        .collect();
    let mut joined = stream::iter(boxed).buffer_unordered(limit);
    while let Some(outcome) = joined.next().await {
        outcomes.push(outcome);
    }

    outcomes.sort_by_key(|(index, _)| *index);
    outcomes
}

/// Shields the dispatcher from a panicking subtree: an unhandled panic while
/// executing a child resolves to an `Error` result instead of unwinding
/// through the whole run.
async fn guarded(
    (name, full_name): (String, String),
    future: BoxFuture<'static, TestNodeResult>,
) -> TestNodeResult {
    use futures::FutureExt;
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let mut result = TestNodeResult::new(&name, &full_name);
            result.set_result(TestStatus::Failed, ResultLabel::Error, FailureSite::Test);
            result.set_message(format!("Scheduler failure: {}", panic_text(payload.as_ref())));
            result.finalize();
            result
        }
    }
}

/// How a one-time hook run ended, when it did not pass.
enum OnceFailure {
    Ignored(String),
    Failed { message: String, errored: bool },
}

/// Runs one-time hooks in order, stopping at the first non-passing one.
async fn run_once_hooks(hooks: &[LifecycleHook], ctx: &ExecutionContext) -> Option<OnceFailure> {
    for hook in hooks {
        let outcome = call_hook(hook, ctx).await;
        match outcome {
            None => continue,
            failure => return failure,
        }
    }
    None
}

async fn run_once_tear_downs(
    hooks: &[LifecycleHook],
    ctx: &ExecutionContext,
    result: &mut TestNodeResult,
) {
    for hook in hooks {
        match call_hook(hook, ctx).await {
            None => {}
            Some(OnceFailure::Ignored(reason)) => {
                result.record_teardown_failure(&reason, None, false);
            }
            Some(OnceFailure::Failed { message, errored }) => {
                result.record_teardown_failure(&message, None, errored);
            }
        }
    }
}

/// Invokes one hook off the async runtime, classifying its outcome.
async fn call_hook(hook: &LifecycleHook, ctx: &ExecutionContext) -> Option<OnceFailure> {
    let func = hook.func.clone();
    let case_ctx = CaseContext {
        args: Vec::new(),
        expected: None,
        attempt: ctx.attempt,
        prior_statuses: ctx.prior_statuses.clone(),
        culture: ctx.culture.clone(),
        ui_culture: ctx.ui_culture.clone(),
        token: ctx.token.clone(),
        deadline: ctx.deadline,
    };
    let joined = tokio::task::spawn_blocking(move || {
        panic::catch_unwind(AssertUnwindSafe(|| func(&case_ctx)))
    })
    .await;

    match joined {
        Ok(Ok(Ok(()))) => None,
        Ok(Ok(Err(TestSignal::Ignored(reason)))) => Some(OnceFailure::Ignored(reason)),
        Ok(Ok(Err(signal))) => Some(OnceFailure::Failed {
            message: signal.message().to_string(),
            errored: false,
        }),
        Ok(Err(payload)) => Some(OnceFailure::Failed {
            // The box itself is `dyn Any`; `as_ref` reaches the payload.
            message: panic_text(payload.as_ref()),
            errored: true,
        }),
        Err(join_error) => Some(OnceFailure::Failed {
            message: format!("Worker task failed: {}", join_error),
            errored: true,
        }),
    }
}

fn panic_text(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Resolves a suite whose one-time setup did not pass: the suite records the
/// failure at the `SetUp` site and every descendant is synthesized with the
/// suite's message behind a `OneTimeSetUp: ` prefix and the `Parent` site.
///
/// 解析一次性 setup 未通过的套件：套件在 `SetUp` 位置记录失败，
/// 每个后代都以带 `OneTimeSetUp: ` 前缀的套件消息和 `Parent` 位置合成。
fn apply_setup_failure(node: &TestNode, result: &mut TestNodeResult, failure: OnceFailure) {
    let (status, label, message) = match failure {
        OnceFailure::Ignored(reason) => (TestStatus::Skipped, ResultLabel::Ignored, reason),
        OnceFailure::Failed { message, errored } => {
            let label = if errored { ResultLabel::Error } else { ResultLabel::None };
            (TestStatus::Failed, label, message)
        }
    };
    result.set_result(status, label, FailureSite::SetUp);
    result.set_message(message.clone());

    let child_status = match status {
        TestStatus::Skipped => TestStatus::Skipped,
        _ => TestStatus::Failed,
    };
    let child_message = format!("OneTimeSetUp: {}", message);
    for child in &node.children {
        let child_result = synthesize_subtree(
            child,
            child_status,
            label,
            FailureSite::Parent,
            &child_message,
            result.stack_trace.clone(),
        );
        // Folded directly so the suite keeps its own setup-site verdict.
        result.children.push(child_result);
    }
}

/// Synthesizes a finalized result for a node and all of its descendants
/// without executing anything.
fn synthesize_subtree(
    node: &TestNode,
    status: TestStatus,
    label: ResultLabel,
    site: FailureSite,
    message: &str,
    stack_trace: Option<String>,
) -> TestNodeResult {
    let mut result = TestNodeResult::new(&node.name, &node.full_name);
    result.set_result(status, label, site);
    if !message.is_empty() {
        result.set_message(message);
    }
    result.stack_trace = stack_trace.clone();
    result.properties = node.properties.clone();
    for child in &node.children {
        result.children.push(synthesize_subtree(
            child,
            status,
            label,
            FailureSite::Parent,
            message,
            stack_trace.clone(),
        ));
    }
    result.finalize();
    result
}

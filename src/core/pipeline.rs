//! # Command Pipeline Module / 命令流水线模块
//!
//! Wraps a leaf case's invocation in a nested chain of decorators. Each
//! wrapper owns exactly one inner command and either propagates or replaces
//! its result. The chain is built innermost-first: leaf invoke, then
//! context-apply, then timeout, then repeat/retry — so every attempt gets a
//! freshly-applied context and a fresh time budget.
//!
//! 将叶子用例的调用包装在嵌套的装饰器链中。每个包装器恰好拥有一个内部
//! 命令，并传播或替换其结果。链从最内层开始构建：叶子调用、上下文应用、
//! 超时、重复/重试 —— 因此每次尝试都获得新应用的上下文和新的时间预算。

use futures::future::BoxFuture;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use crate::core::context::{CaseContext, ExecutionContext, TestSignal};
use crate::core::results::{
    FailureSite, ResultLabel, TestNodeResult, TestStatus, USER_CANCELLED_MESSAGE,
};
use crate::core::tree::{CasePlan, RepeatSpec, TimeBudget};
use crate::core::metadata::ExecutionConstraint;
use crate::infra::platform;

/// The message reported when a required thread mode is unavailable.
pub const APARTMENT_UNSUPPORTED_MESSAGE: &str =
    "Apartment state cannot be set on this platform.";

/// The stable identity of the case a command chain executes.
#[derive(Debug, Clone)]
pub struct CaseIdentity {
    pub name: String,
    pub full_name: String,
}

/// One stage of the pipeline: executes under a context, yields a result.
/// 流水线的一个阶段：在上下文下执行，产生一个结果。
pub trait TestCommand: Send + Sync {
    fn execute<'a>(&'a self, ctx: &'a ExecutionContext) -> BoxFuture<'a, TestNodeResult>;
}

/// Builds the full command chain for one case plan.
pub fn build_case_command(id: CaseIdentity, plan: CasePlan) -> Box<dyn TestCommand> {
    let repeat = plan.repeat;
    let budget = plan.budget;
    let culture = plan.culture.clone();
    let ui_culture = plan.ui_culture.clone();

    let mut command: Box<dyn TestCommand> = Box::new(InvokeCommand { id: id.clone(), plan });
    command = Box::new(ApplyContextCommand { culture, ui_culture, inner: command });
    if let Some(budget) = budget {
        command = Box::new(TimeoutCommand { id: id.clone(), budget, inner: command });
    }
    match repeat {
        Some(RepeatSpec::Repeat(count)) => {
            command = Box::new(RepeatCommand { count, inner: command });
        }
        Some(RepeatSpec::Retry(count)) => {
            command = Box::new(RetryCommand { count, inner: command });
        }
        None => {}
    }
    command
}

/// Convenience entry point used by the scheduler: builds the chain, runs it
/// and finalizes the result.
pub async fn run_case(
    id: CaseIdentity,
    plan: CasePlan,
    ctx: &ExecutionContext,
) -> TestNodeResult {
    let command = build_case_command(id, plan);
    let mut result = command.execute(ctx).await;
    result.finalize();
    result
}

/// The innermost stage: performs the user call with the resolved argument
/// tuple on an execution unit satisfying the plan's constraint, and
/// classifies whatever comes out of it.
///
/// 最内层阶段：在满足计划约束的执行单元上用解析后的参数元组执行用户调用，
/// 并对其产出进行分类。
struct InvokeCommand {
    id: CaseIdentity,
    plan: CasePlan,
}

impl TestCommand for InvokeCommand {
    fn execute<'a>(&'a self, ctx: &'a ExecutionContext) -> BoxFuture<'a, TestNodeResult> {
        Box::pin(async move {
            if ctx.is_cancelled() {
                let mut result = TestNodeResult::new(&self.id.name, &self.id.full_name);
                result.set_result(TestStatus::Failed, ResultLabel::Cancelled, FailureSite::Test);
                result.set_message(USER_CANCELLED_MESSAGE);
                return result;
            }

            if let ExecutionConstraint::DedicatedThreadWithMode(mode) = self.plan.constraint {
                if !platform::supports_thread_mode(mode) {
                    let mut result = TestNodeResult::new(&self.id.name, &self.id.full_name);
                    result.set_result(TestStatus::Skipped, ResultLabel::None, FailureSite::Test);
                    result.set_message(APARTMENT_UNSUPPORTED_MESSAGE);
                    return result;
                }
            }

            let case_ctx = CaseContext {
                args: self.plan.args.clone(),
                expected: self.plan.expected.clone(),
                attempt: ctx.attempt,
                prior_statuses: ctx.prior_statuses.clone(),
                culture: ctx.culture.clone(),
                ui_culture: ctx.ui_culture.clone(),
                token: ctx.token.clone(),
                deadline: ctx.deadline,
            };
            let id = self.id.clone();
            let plan = self.plan.clone();

            match self.plan.constraint {
                ExecutionConstraint::None => {
                    let handle =
                        tokio::task::spawn_blocking(move || run_case_sync(&id, &plan, &case_ctx));
                    match handle.await {
                        Ok(result) => result,
                        Err(join_error) => {
                            error_result(&self.id, &format!("worker failed: {}", join_error))
                        }
                    }
                }
                ExecutionConstraint::DedicatedThread
                | ExecutionConstraint::DedicatedThreadWithMode(_) => {
                    let (send, recv) = tokio::sync::oneshot::channel();
                    std::thread::spawn(move || {
                        let _ = send.send(run_case_sync(&id, &plan, &case_ctx));
                    });
                    match recv.await {
                        Ok(result) => result,
                        Err(_) => error_result(&self.id, "dedicated worker thread exited early"),
                    }
                }
            }
        })
    }
}

fn error_result(id: &CaseIdentity, message: &str) -> TestNodeResult {
    let mut result = TestNodeResult::new(&id.name, &id.full_name);
    result.set_result(TestStatus::Failed, ResultLabel::Error, FailureSite::Test);
    result.set_message(message);
    result
}

/// The outcome of one guarded user-code call.
enum CallOutcome {
    Passed,
    Signal(TestSignal),
    /// An arbitrary panic, rendered to its payload string.
    Panicked(String),
}

fn guarded_call(
    func: &(dyn Fn(&CaseContext) -> Result<(), TestSignal> + Send + Sync),
    ctx: &CaseContext,
) -> CallOutcome {
    match panic::catch_unwind(AssertUnwindSafe(|| func(ctx))) {
        Ok(Ok(())) => CallOutcome::Passed,
        Ok(Err(signal)) => CallOutcome::Signal(signal),
        // The box itself is `dyn Any`; `as_ref` reaches the payload.
        Err(payload) => CallOutcome::Panicked(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Runs one case synchronously: setups, body, teardowns, in that order.
/// Setup failure skips the body but never the teardowns; a teardown failure
/// is appended to the result and takes over the reported site.
///
/// 同步运行一个用例：依次是 setup、测试体、teardown。
/// setup 失败会跳过测试体但绝不跳过 teardown；
/// teardown 失败会附加到结果上并接管报告的失败位置。
fn run_case_sync(id: &CaseIdentity, plan: &CasePlan, ctx: &CaseContext) -> TestNodeResult {
    let mut result = TestNodeResult::new(&id.name, &id.full_name);

    let mut set_up_failed = false;
    for hook in &plan.set_ups {
        match guarded_call(hook.func.as_ref(), ctx) {
            CallOutcome::Passed => continue,
            CallOutcome::Signal(TestSignal::Ignored(reason)) => {
                result.set_result(TestStatus::Skipped, ResultLabel::Ignored, FailureSite::SetUp);
                result.set_message(reason);
            }
            CallOutcome::Signal(TestSignal::Inconclusive(reason)) => {
                result.set_result(
                    TestStatus::Inconclusive,
                    ResultLabel::None,
                    FailureSite::SetUp,
                );
                result.set_message(reason);
            }
            CallOutcome::Signal(signal @ TestSignal::AssertionFailed(_)) => {
                result.set_result(TestStatus::Failed, ResultLabel::None, FailureSite::SetUp);
                result.set_message(signal.message());
            }
            CallOutcome::Panicked(message) => {
                result.set_result(TestStatus::Failed, ResultLabel::Error, FailureSite::SetUp);
                result.set_message(message);
            }
        }
        set_up_failed = true;
        break;
    }

    if !set_up_failed {
        match guarded_call(plan.body.as_ref(), ctx) {
            CallOutcome::Passed => {
                result.set_result(TestStatus::Passed, ResultLabel::None, FailureSite::Test);
            }
            CallOutcome::Signal(TestSignal::AssertionFailed(message)) => {
                result.set_result(TestStatus::Failed, ResultLabel::None, FailureSite::Test);
                result.set_message(message);
            }
            CallOutcome::Signal(TestSignal::Ignored(reason)) => {
                result.set_result(TestStatus::Skipped, ResultLabel::Ignored, FailureSite::Test);
                result.set_message(reason);
            }
            CallOutcome::Signal(TestSignal::Inconclusive(reason)) => {
                result.set_result(TestStatus::Inconclusive, ResultLabel::None, FailureSite::Test);
                result.set_message(reason);
            }
            CallOutcome::Panicked(message) => {
                result.set_result(TestStatus::Failed, ResultLabel::Error, FailureSite::Test);
                result.set_message(message);
            }
        }
    }

    for hook in &plan.tear_downs {
        match guarded_call(hook.func.as_ref(), ctx) {
            CallOutcome::Passed => {}
            CallOutcome::Signal(signal) => {
                result.record_teardown_failure(signal.message(), None, false);
            }
            CallOutcome::Panicked(message) => {
                result.record_teardown_failure(&message, None, true);
            }
        }
    }

    result.finalize();
    result
}

/// Applies scoped ambient changes (culture markers) to a derived context
/// before invoking the inner command. Sits inside the timeout and repeat
/// wrappers so every attempt re-applies a fresh context.
struct ApplyContextCommand {
    culture: Option<String>,
    ui_culture: Option<String>,
    inner: Box<dyn TestCommand>,
}

impl TestCommand for ApplyContextCommand {
    fn execute<'a>(&'a self, ctx: &'a ExecutionContext) -> BoxFuture<'a, TestNodeResult> {
        Box::pin(async move {
            let mut scoped = ctx.clone();
            if let Some(culture) = &self.culture {
                scoped.culture = culture.clone();
            }
            if let Some(ui_culture) = &self.ui_culture {
                scoped.ui_culture = ui_culture.clone();
            }
            self.inner.execute(&scoped).await
        })
    }
}

/// Races the inner command against its wall-clock budget.
///
/// A result that beat the clock is returned unmodified, whatever it is. On
/// expiry the result is forced to `Failed` with the budget message — unless
/// a debugger is attached, in which case the wrapper waits for natural
/// completion so that stepping through a test is not penalized.
///
/// 让内部命令与其墙钟预算赛跑。
/// 赶在截止前完成的结果原样返回。到期时结果被强制为 `Failed` 并附带预算
/// 消息 —— 除非附加了调试器，此时包装器等待自然完成，
/// 使单步调试不受墙钟压力惩罚。
struct TimeoutCommand {
    id: CaseIdentity,
    budget: TimeBudget,
    inner: Box<dyn TestCommand>,
}

impl TimeoutCommand {
    fn expiry_message(&self) -> String {
        let kind = if self.budget.cooperative { "CancelAfter" } else { "Timeout" };
        format!("Test exceeded {} value of {}ms", kind, self.budget.millis)
    }
}

impl TestCommand for TimeoutCommand {
    fn execute<'a>(&'a self, ctx: &'a ExecutionContext) -> BoxFuture<'a, TestNodeResult> {
        Box::pin(async move {
            let duration = Duration::from_millis(self.budget.millis);
            let mut scoped = ctx.clone();
            scoped.deadline = Some(Instant::now() + duration);

            // Cooperative budgets get a child token the user code can observe.
            let child_token = ctx.token.child_token();
            if self.budget.cooperative {
                scoped.token = child_token.clone();
            }

            if ctx.debugger_attached {
                return self.inner.execute(&scoped).await;
            }

            match tokio::time::timeout(duration, self.inner.execute(&scoped)).await {
                Ok(result) => result,
                Err(_) => {
                    if self.budget.cooperative {
                        child_token.cancel();
                    }
                    let mut result = TestNodeResult::new(&self.id.name, &self.id.full_name);
                    result.set_result(TestStatus::Failed, ResultLabel::None, FailureSite::Test);
                    result.set_message(self.expiry_message());
                    result
                }
            }
        })
    }
}

/// Re-invokes the inner command up to `count` times, stopping at the first
/// non-passing attempt. An ignored result short-circuits immediately and is
/// never re-attempted. The attempt index and prior attempt statuses are
/// exposed through the derived context.
struct RepeatCommand {
    count: u32,
    inner: Box<dyn TestCommand>,
}

impl TestCommand for RepeatCommand {
    fn execute<'a>(&'a self, ctx: &'a ExecutionContext) -> BoxFuture<'a, TestNodeResult> {
        Box::pin(async move {
            run_attempts(self.inner.as_ref(), ctx, self.count, |status| {
                status == TestStatus::Passed
            })
            .await
        })
    }
}

/// Re-invokes the inner command up to `count` times, stopping as soon as one
/// attempt passes; skipped and inconclusive attempts also stop immediately.
/// Only a failing attempt is retried.
struct RetryCommand {
    count: u32,
    inner: Box<dyn TestCommand>,
}

impl TestCommand for RetryCommand {
    fn execute<'a>(&'a self, ctx: &'a ExecutionContext) -> BoxFuture<'a, TestNodeResult> {
        Box::pin(async move {
            run_attempts(self.inner.as_ref(), ctx, self.count, |status| {
                status == TestStatus::Failed
            })
            .await
        })
    }
}

/// Shared attempt loop: runs while `continues(status)` holds and attempts
/// remain. A final failure is re-attributed to the `Child` site, keeping an
/// `Error` label from the last attempt intact.
///
/// 共享的尝试循环：当 `continues(status)` 成立且还有剩余尝试时继续运行。
/// 最终失败被重新归因到 `Child` 位置，保留最后一次尝试的 `Error` 标签。
async fn run_attempts(
    inner: &dyn TestCommand,
    ctx: &ExecutionContext,
    count: u32,
    continues: impl Fn(TestStatus) -> bool,
) -> TestNodeResult {
    let count = count.max(1) as usize;
    let mut prior_statuses: Vec<TestStatus> = Vec::new();
    let mut last = None;

    for attempt in 1..=count {
        let mut scoped = ctx.clone();
        scoped.attempt = attempt;
        scoped.prior_statuses = prior_statuses.clone();

        let result = inner.execute(&scoped).await;
        let status = result.status;
        prior_statuses.push(status);
        last = Some(result);

        if !continues(status) {
            break;
        }
    }

    let mut result = last.unwrap_or_else(|| TestNodeResult::new(&ctx.node_name, &ctx.node_name));
    if result.is_failure() {
        result.site = FailureSite::Child;
    }
    result
}

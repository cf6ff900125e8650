//! # Command Pipeline Unit Tests / 命令流水线单元测试
//!
//! This module contains unit tests for the per-case command chain:
//! invocation and outcome classification, setup/teardown ordering,
//! repeat/retry attempt loops and the timeout race.
//!
//! 此模块包含每用例命令链的单元测试：调用和结果分类、
//! setup/teardown 顺序、重复/重试尝试循环和超时竞赛。

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use lattice_runner::core::context::{ExecutionContext, TestSignal};
use lattice_runner::core::metadata::{ExecutionConstraint, LifecycleHook, ThreadMode};
use lattice_runner::core::pipeline::{run_case, CaseIdentity, APARTMENT_UNSUPPORTED_MESSAGE};
use lattice_runner::core::results::{FailureSite, ResultLabel, TestStatus, USER_CANCELLED_MESSAGE};
use lattice_runner::core::tree::{CasePlan, RepeatSpec, TimeBudget};

fn identity() -> CaseIdentity {
    CaseIdentity {
        name: "case".to_string(),
        full_name: "Sample.Tests.Calc.case".to_string(),
    }
}

fn plan_of(
    body: impl Fn(&lattice_runner::core::context::CaseContext) -> Result<(), TestSignal>
        + Send
        + Sync
        + 'static,
) -> CasePlan {
    CasePlan {
        body: Arc::new(body),
        args: Vec::new(),
        expected: None,
        set_ups: Vec::new(),
        tear_downs: Vec::new(),
        constraint: ExecutionConstraint::None,
        budget: None,
        repeat: None,
        culture: None,
        ui_culture: None,
    }
}

fn root_ctx() -> ExecutionContext {
    let mut ctx = ExecutionContext::root("Sample", 0, CancellationToken::new());
    // Pipeline tests control the debugger flag themselves.
    ctx.debugger_attached = false;
    ctx
}

#[cfg(test)]
mod classification_tests {
    use super::*;

    #[tokio::test]
    async fn passing_body_reports_passed() {
        let result = run_case(identity(), plan_of(|_| Ok(())), &root_ctx()).await;
        assert_eq!(result.status, TestStatus::Passed);
        assert_eq!(result.full_name, "Sample.Tests.Calc.case");
    }

    #[tokio::test]
    async fn assertion_failure_reports_failed_at_the_test_site() {
        let plan = plan_of(|_| Err(TestSignal::AssertionFailed("1 != 2".to_string())));
        let result = run_case(identity(), plan, &root_ctx()).await;

        assert_eq!(result.status, TestStatus::Failed);
        assert_eq!(result.site, FailureSite::Test);
        assert_eq!(result.label, ResultLabel::None);
        assert_eq!(result.message.as_deref(), Some("1 != 2"));
    }

    #[tokio::test]
    async fn panic_reports_failed_with_the_error_label() {
        let plan = plan_of(|_| panic!("boom"));
        let result = run_case(identity(), plan, &root_ctx()).await;

        assert_eq!(result.status, TestStatus::Failed);
        assert_eq!(result.label, ResultLabel::Error);
        assert_eq!(result.message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn ignore_signal_reports_skipped() {
        let plan = plan_of(|_| Err(TestSignal::Ignored("not today".to_string())));
        let result = run_case(identity(), plan, &root_ctx()).await;

        assert_eq!(result.status, TestStatus::Skipped);
        assert_eq!(result.label, ResultLabel::Ignored);
    }

    #[tokio::test]
    async fn inconclusive_signal_reports_inconclusive() {
        let plan = plan_of(|_| Err(TestSignal::Inconclusive("cannot tell".to_string())));
        let result = run_case(identity(), plan, &root_ctx()).await;
        assert_eq!(result.status, TestStatus::Inconclusive);
    }

    #[tokio::test]
    async fn cancelled_token_resolves_without_invoking_the_body() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let plan = plan_of(common::counting(&invoked));
        let ctx = root_ctx();
        ctx.token.cancel();

        let result = run_case(identity(), plan, &ctx).await;
        assert_eq!(result.status, TestStatus::Failed);
        assert_eq!(result.label, ResultLabel::Cancelled);
        assert_eq!(result.message.as_deref(), Some(USER_CANCELLED_MESSAGE));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }
}

#[cfg(test)]
mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn setup_failure_skips_the_body_but_not_the_teardowns() {
        let body_runs = Arc::new(AtomicUsize::new(0));
        let teardown_runs = Arc::new(AtomicUsize::new(0));

        let mut plan = plan_of(common::counting(&body_runs));
        plan.set_ups
            .push(LifecycleHook::new("set_up", common::failing("setup broke")));
        plan.tear_downs
            .push(LifecycleHook::new("tear_down", common::counting(&teardown_runs)));

        let result = run_case(identity(), plan, &root_ctx()).await;
        assert_eq!(result.status, TestStatus::Failed);
        assert_eq!(result.site, FailureSite::SetUp);
        assert_eq!(body_runs.load(Ordering::SeqCst), 0);
        assert_eq!(teardown_runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn teardown_failure_overrides_a_passing_body() {
        let mut plan = plan_of(|_| Ok(()));
        plan.tear_downs
            .push(LifecycleHook::new("tear_down", common::failing("cleanup broke")));

        let result = run_case(identity(), plan, &root_ctx()).await;
        assert_eq!(result.status, TestStatus::Failed);
        assert_eq!(result.site, FailureSite::TearDown);
        assert_eq!(result.message.as_deref(), Some("TearDown : cleanup broke"));
    }

    #[tokio::test]
    async fn teardown_failure_appends_behind_the_body_failure() {
        let mut plan = plan_of(common::failing("body broke"));
        plan.tear_downs
            .push(LifecycleHook::new("tear_down", common::failing("cleanup broke")));

        let result = run_case(identity(), plan, &root_ctx()).await;
        assert_eq!(result.site, FailureSite::TearDown);
        assert_eq!(
            result.message.as_deref(),
            Some("body broke\nTearDown : cleanup broke")
        );
    }

    #[tokio::test]
    async fn dedicated_thread_constraint_still_runs_the_case() {
        let mut plan = plan_of(|_| Ok(()));
        plan.constraint = ExecutionConstraint::DedicatedThread;

        let result = run_case(identity(), plan, &root_ctx()).await;
        assert_eq!(result.status, TestStatus::Passed);
    }

    #[tokio::test]
    async fn unsupported_thread_mode_degrades_to_a_clean_skip() {
        let mut plan = plan_of(|_| Ok(()));
        plan.constraint =
            ExecutionConstraint::DedicatedThreadWithMode(ThreadMode::SingleApartment);

        let result = run_case(identity(), plan, &root_ctx()).await;
        assert_eq!(result.status, TestStatus::Skipped);
        assert_eq!(result.message.as_deref(), Some(APARTMENT_UNSUPPORTED_MESSAGE));
        assert_eq!(
            APARTMENT_UNSUPPORTED_MESSAGE,
            "Apartment state cannot be set on this platform."
        );
    }
}

#[cfg(test)]
mod repeat_retry_tests {
    use super::*;

    #[tokio::test]
    async fn repeat_invokes_every_attempt_while_passing() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let mut plan = plan_of(common::counting(&invoked));
        plan.repeat = Some(RepeatSpec::Repeat(4));

        let result = run_case(identity(), plan, &root_ctx()).await;
        assert_eq!(result.status, TestStatus::Passed);
        assert_eq!(invoked.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn repeat_stops_at_the_first_failure_with_the_child_site() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let counter = invoked.clone();
        let mut plan = plan_of(move |_| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt == 2 {
                Err(TestSignal::AssertionFailed("attempt 2 broke".to_string()))
            } else {
                Ok(())
            }
        });
        plan.repeat = Some(RepeatSpec::Repeat(5));

        let result = run_case(identity(), plan, &root_ctx()).await;
        assert_eq!(result.status, TestStatus::Failed);
        assert_eq!(result.site, FailureSite::Child);
        assert_eq!(invoked.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn always_failing_body_runs_setup_and_teardown_once_per_attempt() {
        let set_ups = Arc::new(AtomicUsize::new(0));
        let bodies = Arc::new(AtomicUsize::new(0));
        let tear_downs = Arc::new(AtomicUsize::new(0));

        let mut plan = plan_of(common::counting_failure(&bodies, "always broken"));
        plan.set_ups
            .push(LifecycleHook::new("set_up", common::counting(&set_ups)));
        plan.tear_downs
            .push(LifecycleHook::new("tear_down", common::counting(&tear_downs)));
        plan.repeat = Some(RepeatSpec::Retry(3));

        let result = run_case(identity(), plan, &root_ctx()).await;
        assert_eq!(result.status, TestStatus::Failed);
        assert_eq!(result.site, FailureSite::Child);
        assert_eq!(set_ups.load(Ordering::SeqCst), 3);
        assert_eq!(bodies.load(Ordering::SeqCst), 3);
        assert_eq!(tear_downs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn ignore_short_circuits_the_repeat_loop() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let counter = invoked.clone();
        let mut plan = plan_of(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(TestSignal::Ignored("not today".to_string()))
        });
        plan.repeat = Some(RepeatSpec::Repeat(5));

        let result = run_case(identity(), plan, &root_ctx()).await;
        assert_eq!(result.status, TestStatus::Skipped);
        assert_eq!(invoked.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_stops_as_soon_as_one_attempt_passes() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let counter = invoked.clone();
        let mut plan = plan_of(move |ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            if ctx.attempt < 3 {
                Err(TestSignal::AssertionFailed("warming up".to_string()))
            } else {
                Ok(())
            }
        });
        plan.repeat = Some(RepeatSpec::Retry(5));

        let result = run_case(identity(), plan, &root_ctx()).await;
        assert_eq!(result.status, TestStatus::Passed);
        assert_eq!(invoked.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_exhaustion_keeps_the_error_label_of_the_last_attempt() {
        let mut plan = plan_of(|_| panic!("kaboom"));
        plan.repeat = Some(RepeatSpec::Retry(2));

        let result = run_case(identity(), plan, &root_ctx()).await;
        assert_eq!(result.status, TestStatus::Failed);
        assert_eq!(result.site, FailureSite::Child);
        assert_eq!(result.label, ResultLabel::Error);
    }

    #[tokio::test]
    async fn prior_attempt_statuses_are_visible_to_later_attempts() {
        let mut plan = plan_of(|ctx| {
            if ctx.attempt == 1 {
                Err(TestSignal::AssertionFailed("first".to_string()))
            } else {
                assert_eq!(ctx.prior_statuses, vec![TestStatus::Failed]);
                Ok(())
            }
        });
        plan.repeat = Some(RepeatSpec::Retry(2));

        let result = run_case(identity(), plan, &root_ctx()).await;
        assert_eq!(result.status, TestStatus::Passed);
    }
}

#[cfg(test)]
mod timeout_tests {
    use super::*;

    #[tokio::test]
    async fn expired_timeout_forces_a_failure_with_the_exact_message() {
        let mut plan = plan_of(|_| {
            std::thread::sleep(Duration::from_millis(500));
            Ok(())
        });
        plan.budget = Some(TimeBudget { millis: 50, cooperative: false });

        let result = run_case(identity(), plan, &root_ctx()).await;
        assert_eq!(result.status, TestStatus::Failed);
        assert_eq!(result.site, FailureSite::Test);
        assert_eq!(
            result.message.as_deref(),
            Some("Test exceeded Timeout value of 50ms")
        );
    }

    #[tokio::test]
    async fn cooperative_budget_reports_the_cancel_after_wording() {
        let mut plan = plan_of(|_| {
            std::thread::sleep(Duration::from_millis(500));
            Ok(())
        });
        plan.budget = Some(TimeBudget { millis: 50, cooperative: true });

        let result = run_case(identity(), plan, &root_ctx()).await;
        assert_eq!(
            result.message.as_deref(),
            Some("Test exceeded CancelAfter value of 50ms")
        );
    }

    #[tokio::test]
    async fn result_that_beats_the_clock_is_returned_unmodified() {
        let mut plan = plan_of(common::failing("quick failure"));
        plan.budget = Some(TimeBudget { millis: 5_000, cooperative: false });

        let result = run_case(identity(), plan, &root_ctx()).await;
        assert_eq!(result.status, TestStatus::Failed);
        assert_eq!(result.message.as_deref(), Some("quick failure"));
    }

    #[tokio::test]
    async fn attached_debugger_suppresses_the_forced_timeout_failure() {
        let mut plan = plan_of(|_| {
            std::thread::sleep(Duration::from_millis(150));
            Ok(())
        });
        plan.budget = Some(TimeBudget { millis: 20, cooperative: false });

        let mut ctx = root_ctx();
        ctx.debugger_attached = true;

        let result = run_case(identity(), plan, &ctx).await;
        assert_eq!(result.status, TestStatus::Passed);
    }
}

// Shared test helpers for engine tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use lattice_runner::core::config::EngineSettings;
use lattice_runner::core::context::{CaseContext, TestSignal};
use lattice_runner::core::metadata::{FixtureDef, MethodDef, TestRegistry};
use lattice_runner::core::results::RunSummary;

/// A body that always passes.
pub fn passing() -> impl Fn(&CaseContext) -> Result<(), TestSignal> + Send + Sync + 'static {
    |_ctx| Ok(())
}

/// A body that always fails with an assertion message.
pub fn failing(
    message: &str,
) -> impl Fn(&CaseContext) -> Result<(), TestSignal> + Send + Sync + 'static {
    let message = message.to_string();
    move |_ctx| Err(TestSignal::AssertionFailed(message.clone()))
}

/// A body that passes and bumps a counter on every invocation.
pub fn counting(
    counter: &Arc<AtomicUsize>,
) -> impl Fn(&CaseContext) -> Result<(), TestSignal> + Send + Sync + 'static {
    let counter = counter.clone();
    move |_ctx| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A body that fails and bumps a counter on every invocation.
pub fn counting_failure(
    counter: &Arc<AtomicUsize>,
    message: &str,
) -> impl Fn(&CaseContext) -> Result<(), TestSignal> + Send + Sync + 'static {
    let counter = counter.clone();
    let message = message.to_string();
    move |_ctx| {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(TestSignal::AssertionFailed(message.clone()))
    }
}

/// Wraps one fixture into a registry named `Sample`.
pub fn registry_with(fixture: FixtureDef) -> TestRegistry {
    TestRegistry::new("Sample").fixture(fixture)
}

/// Wraps one method into a `Sample.Tests.Calc` fixture and registry.
pub fn registry_with_method(method: MethodDef) -> TestRegistry {
    registry_with(FixtureDef::new("Sample.Tests", "Calc").test(method))
}

/// Runs a registry fully sequentially, without a filter.
pub async fn run_sequential(registry: &TestRegistry) -> RunSummary {
    lattice_runner::run_registry(registry, &EngineSettings::default().sequential()).await
}

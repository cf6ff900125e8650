//! # Lattice Runner Library / Lattice Runner 库
//!
//! This library provides the engine of Lattice Runner: a declarative,
//! metadata-driven unit-test framework core. Tests are registered as data
//! (fixtures, methods, markers and parameter sources), built once into an
//! immutable test tree, and executed by a parallel work scheduler through a
//! per-case command pipeline.
//!
//! 此库提供 Lattice Runner 的引擎：一个声明式、元数据驱动的单元测试
//! 框架核心。测试以数据的形式注册（夹具、方法、标记和参数源），
//! 构建为不可变的测试树，由并行工作调度器通过每用例命令流水线执行。
//!
//! ## Modules / 模块
//!
//! - `core` - Test metadata, tree building, command pipeline and scheduling
//! - `infra` - Environment services: platform, locale and debugger probing
//! - `reporting` - Result tree rendering for console and JSON consumers
//!
//! - `core` - 测试元数据、树构建、命令流水线和调度
//! - `infra` - 环境服务：平台、区域和调试器探测
//! - `reporting` - 面向控制台和 JSON 消费者的结果树渲染

pub mod core;
pub mod infra;
pub mod reporting;

// Re-export commonly used items
pub use crate::core::config::{EngineSettings, LoadRestriction, TestFilter};
pub use crate::core::context::{ensure, CaseContext, ExecutionContext, TestSignal};
pub use crate::core::expansion::{ArgValue, CaseData, CaseSource, CombiningStrategy, DataSourceRegistry, ParamDef};
pub use crate::core::metadata::{
    ExecutionConstraint, FixtureDef, LifecycleHook, Marker, MethodDef, ParallelScope, TestRegistry,
    ThreadMode,
};
pub use crate::core::results::{FailureSite, ResultLabel, RunSummary, TestNodeResult, TestStatus};
pub use crate::core::scheduler::WorkScheduler;
pub use crate::core::tree::{RunState, TestNode, TreeBuilder};

/// Builds the test tree for a registry and runs it under the given settings.
///
/// 为注册单元构建测试树并在给定设置下运行。
pub async fn run_registry(registry: &TestRegistry, settings: &EngineSettings) -> RunSummary {
    let tree = TreeBuilder::new().build_restricted(registry, &settings.load);
    WorkScheduler::new(settings).run(&tree).await
}

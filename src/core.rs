//! # Core Module / 核心模块
//!
//! This module contains the core functionality of Lattice Runner,
//! including test metadata, case expansion, tree building, the command
//! pipeline, the work scheduler and the result model.
//!
//! 此模块包含 Lattice Runner 的核心功能，
//! 包括测试元数据、用例展开、树构建、命令流水线、工作调度和结果模型。

pub mod config;
pub mod context;
pub mod expansion;
pub mod metadata;
pub mod naming;
pub mod pairwise;
pub mod pipeline;
pub mod results;
pub mod scheduler;
pub mod tree;

// Re-exports
pub use config::EngineSettings;
pub use results::RunSummary;
pub use scheduler::WorkScheduler;
pub use tree::TreeBuilder;

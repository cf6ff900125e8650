//! # Reporting Module / 报告模块
//!
//! This module renders finalized result trees for consumers: a colored
//! console summary for interactive use and a JSON rendering for machine
//! consumers. The result tree itself is the contract; these renderers never
//! reinterpret statuses.
//!
//! 此模块为消费者渲染最终的结果树：交互使用的彩色控制台摘要
//! 和面向机器消费者的 JSON 渲染。结果树本身就是契约；
//! 这些渲染器从不重新解释状态。

pub mod console;
pub mod json;

// Re-export common reporting functions
pub use console::{print_failure_details, print_summary};
pub use json::render_json_report;

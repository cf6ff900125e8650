//! # Engine Configuration Module / 引擎配置模块
//!
//! The small configuration surface accepted from the load-time collaborator:
//! worker pool size, the execution filter and the discovery load restriction.
//! Settings can be populated programmatically or loaded from a TOML file.
//!
//! 从加载时协作者接受的小型配置面：工作池大小、执行过滤器和发现加载限制。
//! 设置可以编程方式填充，也可以从 TOML 文件加载。

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::core::tree::{property_keys, TestNode};

fn default_worker_count() -> usize {
    num_cpus::get() / 2 + 1
}

/// The engine's runtime settings.
/// 引擎的运行时设置。
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    /// Parallel dispatch pool size; zero means fully sequential execution.
    /// 并行调度池大小；零表示完全顺序执行。
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default)]
    pub filter: TestFilter,
    #[serde(default)]
    pub load: LoadRestriction,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            filter: TestFilter::default(),
            load: LoadRestriction::default(),
        }
    }
}

impl EngineSettings {
    /// Loads settings from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))
    }

    pub fn sequential(mut self) -> Self {
        self.worker_count = 0;
        self
    }

    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_filter(mut self, filter: TestFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// Restricts which built nodes execute, by full name and by category.
/// An empty filter matches everything; exclusions apply on top of inclusions.
///
/// 按全名和类别限制哪些已构建节点执行。
/// 空过滤器匹配一切；排除规则在包含规则之上应用。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestFilter {
    /// Full dotted names to include; selecting a suite selects its subtree.
    #[serde(default)]
    pub include_names: Vec<String>,
    #[serde(default)]
    pub include_categories: Vec<String>,
    #[serde(default)]
    pub exclude_categories: Vec<String>,
}

impl TestFilter {
    pub fn is_empty(&self) -> bool {
        self.include_names.is_empty()
            && self.include_categories.is_empty()
            && self.exclude_categories.is_empty()
    }

    pub fn named(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            include_names: names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Whether the node's subtree may contain anything worth executing. Used
    /// by the scheduler to prune children before dispatch.
    pub fn passes(&self, node: &TestNode) -> bool {
        if self.is_excluded(node) {
            return false;
        }
        if self.include_names.is_empty() && self.include_categories.is_empty() {
            return true;
        }

        let name_related = self.include_names.iter().any(|name| {
            node.full_name == *name
                // The node sits under an included suite...
                || node.full_name.starts_with(&format!("{}.", name))
                // ...or an included node sits under this suite.
                || name.starts_with(&format!("{}.", node.full_name))
        });
        if name_related {
            return true;
        }

        if !self.include_categories.is_empty() {
            return self.subtree_has_category(node);
        }
        false
    }

    /// Whether the node (or an ancestor of it) was selected by name, which is
    /// what allows an explicit node to run.
    /// 节点（或其祖先）是否被按名称选中，这决定显式节点是否运行。
    pub fn selects(&self, node: &TestNode) -> bool {
        self.include_names.iter().any(|name| {
            node.full_name == *name || node.full_name.starts_with(&format!("{}.", name))
        })
    }

    fn is_excluded(&self, node: &TestNode) -> bool {
        let categories = node.properties.get(property_keys::CATEGORY);
        self.exclude_categories
            .iter()
            .any(|excluded| categories.contains(excluded))
    }

    fn subtree_has_category(&self, node: &TestNode) -> bool {
        let categories = node.properties.get(property_keys::CATEGORY);
        if self
            .include_categories
            .iter()
            .any(|included| categories.contains(included))
        {
            return true;
        }
        node.children.iter().any(|child| self.subtree_has_category(child))
    }
}

/// Limits discovery to fixtures under the named namespaces. An empty
/// restriction scans everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoadRestriction {
    #[serde(default)]
    pub namespaces: Vec<String>,
}

impl LoadRestriction {
    pub fn allows(&self, namespace: &str) -> bool {
        if self.namespaces.is_empty() {
            return true;
        }
        self.namespaces.iter().any(|allowed| {
            namespace == allowed || namespace.starts_with(&format!("{}.", allowed))
        })
    }
}

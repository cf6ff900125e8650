//! # Metadata Reader Module / 元数据读取模块
//!
//! Declarative facts about program elements. Fixtures and test methods are
//! described as data: a closed set of marker kinds attached to each element,
//! lifecycle hooks, parameter declarations and the test body closure. The
//! reader returns the effective markers of an element, applying inheritance
//! (markers on a base fixture are visible on derived ones unless overridden)
//! and multiplicity (single-use markers: the nearest declaration wins;
//! repeatable markers accumulate). It never executes user code; malformed
//! combinations become build-time diagnoses rather than discovery failures.
//!
//! 关于程序元素的声明式事实。夹具和测试方法被描述为数据：
//! 附加在每个元素上的封闭标记种类集合、生命周期钩子、参数声明和测试体闭包。
//! 读取器返回元素的有效标记，应用继承规则（基类夹具上的标记在派生类上可见，
//! 除非被覆盖）和多重性规则（单次标记以最近的声明为准；可重复标记累积）。
//! 它从不执行用户代码；格式错误的组合成为构建期诊断，而不是发现失败。

use std::fmt;
use std::sync::Arc;

use crate::core::context::{CaseContext, TestSignal};
use crate::core::expansion::{CaseData, CaseSource, DataSourceRegistry, ParamDef};

/// The exact reason reported when more than one repeat-kind marker is
/// attached to a single method.
pub const REPEAT_CONFLICT_REASON: &str =
    "Multiple attributes that repeat a test may cause issues.";

/// A unit of user code: a test body or a lifecycle hook.
pub type TestBody = Arc<dyn Fn(&CaseContext) -> Result<(), TestSignal> + Send + Sync>;

/// The independent parallelism flags resolved per node.
/// `Self` allows the node itself to run alongside siblings; `Children` and
/// `Fixtures` govern what the node's descendants may do. `ALL` composes
/// `SELF | CHILDREN`.
///
/// 每个节点解析的独立并行标志。`Self` 允许节点本身与兄弟节点并行运行；
/// `Children` 和 `Fixtures` 控制节点后代的行为。`ALL` 组合 `SELF | CHILDREN`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParallelScope {
    pub none: bool,
    pub self_scope: bool,
    pub children: bool,
    pub fixtures: bool,
}

impl ParallelScope {
    pub const NONE: ParallelScope =
        ParallelScope { none: true, self_scope: false, children: false, fixtures: false };
    pub const SELF: ParallelScope =
        ParallelScope { none: false, self_scope: true, children: false, fixtures: false };
    pub const CHILDREN: ParallelScope =
        ParallelScope { none: false, self_scope: false, children: true, fixtures: false };
    pub const FIXTURES: ParallelScope =
        ParallelScope { none: false, self_scope: false, children: false, fixtures: true };
    pub const ALL: ParallelScope =
        ParallelScope { none: false, self_scope: true, children: true, fixtures: false };

    pub const fn union(self, other: ParallelScope) -> ParallelScope {
        ParallelScope {
            none: self.none || other.none,
            self_scope: self.self_scope || other.self_scope,
            children: self.children || other.children,
            fixtures: self.fixtures || other.fixtures,
        }
    }

    /// `None` combined with any positive flag is contradictory.
    pub fn is_valid(&self) -> bool {
        !(self.none && (self.self_scope || self.children || self.fixtures))
    }

    pub fn allows_children(&self) -> bool {
        self.children || self.fixtures
    }
}

/// A required execution-unit constraint for a leaf invocation.
/// 叶子调用所需的执行单元约束。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionConstraint {
    /// No affinity requirement; the scheduler picks freely.
    #[default]
    None,
    /// The invocation and its setup/teardown must run on a fresh thread.
    DedicatedThread,
    /// A fresh thread configured with a platform thread mode. Platforms
    /// without the concept degrade the node to a clean `Skipped` result.
    /// 配置了平台线程模式的新线程。不支持该概念的平台将节点降级为干净的
    /// `Skipped` 结果。
    DedicatedThreadWithMode(ThreadMode),
}

/// A platform-specific thread execution mode (apartment state on runtimes
/// that have one).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadMode {
    SingleApartment,
    MultiApartment,
}

/// The closed set of declarative markers interpreted at build time.
/// 构建期解释的封闭声明式标记集合。
#[derive(Debug, Clone)]
pub enum Marker {
    /// Repeatable; multiple categories accumulate into a multi-valued property.
    Category(String),
    /// Repeatable custom key/value property.
    Property { key: String, value: String },
    Description(String),
    Author(String),
    /// Skip the node. With `until`, the ignore dissolves once the date has
    /// passed (resolved once at build time against build wall-clock).
    /// 跳过节点。带有 `until` 时，一旦日期已过忽略即失效
    /// （构建期针对构建墙钟解析一次）。
    Ignore { reason: String, until: Option<String> },
    /// Run only when directly selected by the filter.
    Explicit { reason: Option<String> },
    /// Re-invoke up to `n` times, stopping at the first non-passing attempt.
    Repeat(u32),
    /// Re-invoke up to `n` times, stopping at the first passing attempt.
    Retry(u32),
    /// Wall-clock budget in milliseconds, thread-race model.
    Timeout(u64),
    /// Wall-clock budget in milliseconds, cooperative-token model.
    CancelAfter(u64),
    Parallelizable(ParallelScope),
    /// Force this whole subtree onto one dispatching task.
    SingleThreaded,
    RequiresThread(ExecutionConstraint),
    /// Include/exclude platform names; a mismatch skips the node.
    Platform { include: Vec<String>, exclude: Vec<String> },
    /// Ambient culture applied for the node's scope only.
    Culture(String),
    UiCulture(String),
}

/// Marker kind used for inheritance and multiplicity resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    Category,
    Property,
    Description,
    Author,
    Ignore,
    Explicit,
    Repeat,
    Retry,
    Timeout,
    CancelAfter,
    Parallelizable,
    SingleThreaded,
    RequiresThread,
    Platform,
    Culture,
    UiCulture,
}

impl Marker {
    pub fn kind(&self) -> MarkerKind {
        match self {
            Marker::Category(_) => MarkerKind::Category,
            Marker::Property { .. } => MarkerKind::Property,
            Marker::Description(_) => MarkerKind::Description,
            Marker::Author(_) => MarkerKind::Author,
            Marker::Ignore { .. } => MarkerKind::Ignore,
            Marker::Explicit { .. } => MarkerKind::Explicit,
            Marker::Repeat(_) => MarkerKind::Repeat,
            Marker::Retry(_) => MarkerKind::Retry,
            Marker::Timeout(_) => MarkerKind::Timeout,
            Marker::CancelAfter(_) => MarkerKind::CancelAfter,
            Marker::Parallelizable(_) => MarkerKind::Parallelizable,
            Marker::SingleThreaded => MarkerKind::SingleThreaded,
            Marker::RequiresThread(_) => MarkerKind::RequiresThread,
            Marker::Platform { .. } => MarkerKind::Platform,
            Marker::Culture(_) => MarkerKind::Culture,
            Marker::UiCulture(_) => MarkerKind::UiCulture,
        }
    }

    /// Whether several markers of this kind may decorate one element.
    pub fn is_repeatable(&self) -> bool {
        matches!(self.kind(), MarkerKind::Category | MarkerKind::Property)
    }
}

/// A named lifecycle hook resolved onto a fixture.
#[derive(Clone)]
pub struct LifecycleHook {
    pub name: String,
    pub func: TestBody,
}

impl LifecycleHook {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&CaseContext) -> Result<(), TestSignal> + Send + Sync + 'static,
    {
        Self { name: name.into(), func: Arc::new(func) }
    }
}

impl fmt::Debug for LifecycleHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleHook").field("name", &self.name).finish_non_exhaustive()
    }
}

/// The declarative description of one test method.
/// 一个测试方法的声明式描述。
#[derive(Clone)]
pub struct MethodDef {
    pub name: String,
    pub markers: Vec<Marker>,
    pub params: Vec<ParamDef>,
    pub source: Option<CaseSource>,
    pub body: TestBody,
}

impl MethodDef {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&CaseContext) -> Result<(), TestSignal> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            markers: Vec::new(),
            params: Vec::new(),
            source: None,
            body: Arc::new(body),
        }
    }

    pub fn marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    pub fn param(mut self, param: ParamDef) -> Self {
        self.params.push(param);
        self
    }

    /// Appends one explicit case, creating the explicit source when needed.
    pub fn case(mut self, case: CaseData) -> Self {
        match &mut self.source {
            Some(CaseSource::Explicit(cases)) => cases.push(case),
            _ => self.source = Some(CaseSource::Explicit(vec![case])),
        }
        self
    }

    pub fn with_source(mut self, source: CaseSource) -> Self {
        self.source = Some(source);
        self
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("name", &self.name)
            .field("markers", &self.markers.len())
            .field("params", &self.params.len())
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// The declarative description of one test fixture, optionally deriving from
/// a base fixture whose markers, hooks and methods it inherits.
///
/// 一个测试夹具的声明式描述，可以派生自一个基夹具，
/// 继承其标记、钩子和方法。
#[derive(Clone, Debug)]
pub struct FixtureDef {
    /// Local type name.
    pub name: String,
    /// Dotted namespace the fixture belongs to.
    pub namespace: String,
    pub markers: Vec<Marker>,
    pub set_ups: Vec<LifecycleHook>,
    pub tear_downs: Vec<LifecycleHook>,
    pub once_set_ups: Vec<LifecycleHook>,
    pub once_tear_downs: Vec<LifecycleHook>,
    pub tests: Vec<MethodDef>,
    pub base: Option<Arc<FixtureDef>>,
}

impl FixtureDef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            markers: Vec::new(),
            set_ups: Vec::new(),
            tear_downs: Vec::new(),
            once_set_ups: Vec::new(),
            once_tear_downs: Vec::new(),
            tests: Vec::new(),
            base: None,
        }
    }

    pub fn marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    pub fn set_up(mut self, hook: LifecycleHook) -> Self {
        self.set_ups.push(hook);
        self
    }

    pub fn tear_down(mut self, hook: LifecycleHook) -> Self {
        self.tear_downs.push(hook);
        self
    }

    pub fn once_set_up(mut self, hook: LifecycleHook) -> Self {
        self.once_set_ups.push(hook);
        self
    }

    pub fn once_tear_down(mut self, hook: LifecycleHook) -> Self {
        self.once_tear_downs.push(hook);
        self
    }

    pub fn test(mut self, method: MethodDef) -> Self {
        self.tests.push(method);
        self
    }

    pub fn inherits(mut self, base: FixtureDef) -> Self {
        self.base = Some(Arc::new(base));
        self
    }

    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

/// The assembly-level registration unit handed to the tree builder: the
/// fixtures to scan plus the named data sources they reference.
///
/// 交给树构建器的程序集级注册单元：要扫描的夹具及其引用的命名数据源。
#[derive(Default, Clone)]
pub struct TestRegistry {
    pub name: String,
    pub fixtures: Vec<Arc<FixtureDef>>,
    pub sources: DataSourceRegistry,
}

impl TestRegistry {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), fixtures: Vec::new(), sources: DataSourceRegistry::new() }
    }

    pub fn fixture(mut self, fixture: FixtureDef) -> Self {
        self.fixtures.push(Arc::new(fixture));
        self
    }

    pub fn with_sources(mut self, sources: DataSourceRegistry) -> Self {
        self.sources = sources;
        self
    }
}

/// A build-time diagnosis attached to a node instead of a thrown error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnosis {
    pub reason: String,
}

/// The metadata reader: pure functions over element definitions. It resolves
/// inheritance and multiplicity once, at build time, and diagnoses
/// conflicting combinations without executing any user code.
pub struct MetadataReader;

impl MetadataReader {
    /// Effective markers of a fixture, walking the base chain root-to-leaf.
    /// Repeatable kinds accumulate across the chain; for single-use kinds
    /// the most-derived declaration wins.
    ///
    /// 夹具的有效标记，沿基类链从根到叶遍历。
    /// 可重复种类沿链累积；单次种类以最派生的声明为准。
    pub fn fixture_markers(fixture: &FixtureDef) -> Vec<Marker> {
        let mut chain = Vec::new();
        let mut current = Some(fixture);
        while let Some(def) = current {
            chain.push(def);
            current = def.base.as_deref();
        }
        chain.reverse();

        let mut effective: Vec<Marker> = Vec::new();
        for def in chain {
            for marker in &def.markers {
                if !marker.is_repeatable() {
                    effective.retain(|m| m.kind() != marker.kind());
                }
                effective.push(marker.clone());
            }
        }
        effective
    }

    /// Setup hooks in execution order: base-first down the inheritance chain,
    /// resolved once at build time.
    pub fn resolved_set_ups(fixture: &FixtureDef) -> Vec<LifecycleHook> {
        let mut hooks = match fixture.base.as_deref() {
            Some(base) => Self::resolved_set_ups(base),
            None => Vec::new(),
        };
        hooks.extend(fixture.set_ups.iter().cloned());
        hooks
    }

    /// Teardown hooks in execution order: derived-first up the chain.
    pub fn resolved_tear_downs(fixture: &FixtureDef) -> Vec<LifecycleHook> {
        let mut hooks: Vec<LifecycleHook> = fixture.tear_downs.clone();
        if let Some(base) = fixture.base.as_deref() {
            hooks.extend(Self::resolved_tear_downs(base));
        }
        hooks
    }

    pub fn resolved_once_set_ups(fixture: &FixtureDef) -> Vec<LifecycleHook> {
        let mut hooks = match fixture.base.as_deref() {
            Some(base) => Self::resolved_once_set_ups(base),
            None => Vec::new(),
        };
        hooks.extend(fixture.once_set_ups.iter().cloned());
        hooks
    }

    pub fn resolved_once_tear_downs(fixture: &FixtureDef) -> Vec<LifecycleHook> {
        let mut hooks: Vec<LifecycleHook> = fixture.once_tear_downs.clone();
        if let Some(base) = fixture.base.as_deref() {
            hooks.extend(Self::resolved_once_tear_downs(base));
        }
        hooks
    }

    /// Test methods visible on a fixture: inherited methods from the base
    /// chain unless overridden by name in a more derived fixture.
    pub fn visible_tests(fixture: &FixtureDef) -> Vec<MethodDef> {
        let mut tests = match fixture.base.as_deref() {
            Some(base) => Self::visible_tests(base),
            None => Vec::new(),
        };
        for method in &fixture.tests {
            tests.retain(|existing| existing.name != method.name);
            tests.push(method.clone());
        }
        tests
    }

    /// Diagnoses conflicting marker combinations on one method. Returns the
    /// first applicable diagnosis; the affected node becomes not-runnable
    /// while discovery continues for siblings.
    pub fn diagnose_method(markers: &[Marker], is_parameterized: bool) -> Option<Diagnosis> {
        let repeat_kinds = markers
            .iter()
            .filter(|m| matches!(m.kind(), MarkerKind::Repeat | MarkerKind::Retry))
            .count();
        if repeat_kinds > 1 {
            return Some(Diagnosis { reason: REPEAT_CONFLICT_REASON.to_string() });
        }

        for marker in markers {
            if let Marker::Parallelizable(scope) = marker {
                if !scope.is_valid() {
                    return Some(Diagnosis {
                        reason: "May not specify ParallelScope.Self in combination with ParallelScope.None".to_string(),
                    });
                }
                if scope.fixtures {
                    return Some(Diagnosis {
                        reason: "May not specify ParallelScope.Fixtures on a test method".to_string(),
                    });
                }
                if scope.children && !is_parameterized {
                    return Some(Diagnosis {
                        reason: "May not specify ParallelScope.Children on a non-parameterized test method".to_string(),
                    });
                }
            }
        }
        None
    }

    /// Diagnoses conflicting marker combinations on one fixture.
    pub fn diagnose_fixture(markers: &[Marker]) -> Option<Diagnosis> {
        for marker in markers {
            if let Marker::Parallelizable(scope) = marker {
                if !scope.is_valid() {
                    return Some(Diagnosis {
                        reason: "May not specify ParallelScope.Self in combination with ParallelScope.None".to_string(),
                    });
                }
            }
        }
        None
    }
}

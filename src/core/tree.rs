//! # Test Tree Module / 测试树模块
//!
//! Builds the immutable hierarchical test tree from registered metadata:
//! assembly root, nested namespace suites, fixture suites, parameterized
//! method suites and case leaves. Every node's run state is resolved exactly
//! once here, at build time, from its effective markers; execution never
//! re-evaluates eligibility. Defective declarations become not-runnable
//! nodes carrying a diagnostic, and discovery always continues for siblings.
//!
//! 从注册的元数据构建不可变的分层测试树：程序集根、嵌套命名空间套件、
//! 夹具套件、参数化方法套件和用例叶子。每个节点的运行状态在构建期
//! 根据其有效标记精确解析一次；执行阶段从不重新评估资格。
//! 有缺陷的声明成为携带诊断的不可运行节点，兄弟节点的发现始终继续。

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::core::config::LoadRestriction;
use crate::core::expansion::{self, ArgValue, CaseData, CaseOverride, DataSourceRegistry};
use crate::core::metadata::{
    ExecutionConstraint, FixtureDef, LifecycleHook, Marker, MetadataReader, MethodDef,
    ParallelScope, TestBody, TestRegistry,
};
use crate::core::naming;
use crate::infra::platform;

/// Well-known property keys recorded in node property bags.
pub mod property_keys {
    pub const CATEGORY: &str = "Category";
    pub const DESCRIPTION: &str = "Description";
    pub const AUTHOR: &str = "Author";
    pub const SKIP_REASON: &str = "_SKIPREASON";
}

/// An ordered multi-map of node properties. Keys keep their first-seen order
/// and each key holds the values in declaration order, so reports are stable.
///
/// 节点属性的有序多值映射。键保持首次出现的顺序，
/// 每个键按声明顺序保存其值，因此报告是稳定的。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PropertyBag(Vec<(String, Vec<String>)>);

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: &str, value: impl Into<String>) {
        match self.0.iter_mut().find(|(k, _)| k == key) {
            Some((_, values)) => values.push(value.into()),
            None => self.0.push((key.to_string(), vec![value.into()])),
        }
    }

    /// Replaces all values of a key with a single value.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.0.retain(|(k, _)| k != key);
        self.0.push((key.to_string(), vec![value.into()]));
    }

    pub fn get(&self, key: &str) -> &[String] {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }

    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key).first().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The eligibility of a node, resolved once at build time.
/// 节点的运行资格，构建期解析一次。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    /// Eligible for normal execution.
    Runnable,
    /// Structurally defective; reports `Failed` with an `Invalid` label.
    /// 结构性缺陷；报告 `Failed` 并带 `Invalid` 标签。
    NotRunnable,
    /// Declaratively skipped; reports `Skipped` with an `Ignored` label.
    Ignored,
    /// Runs only when directly selected by the filter.
    Explicit,
    /// Skipped for environmental reasons (platform mismatch).
    Skipped,
}

/// A wall-clock budget attached to a case invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBudget {
    pub millis: u64,
    /// Cooperative budgets signal the token and wait; non-cooperative ones
    /// abandon the invocation at the deadline.
    /// 协作式预算发出令牌信号并等待；非协作式预算在截止时放弃调用。
    pub cooperative: bool,
}

/// A repetition wrapper attached to a case invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatSpec {
    /// Invoke up to `n` times, stopping at the first non-passing attempt.
    Repeat(u32),
    /// Invoke up to `n` times, stopping at the first passing attempt.
    Retry(u32),
}

/// Everything the pipeline needs to execute one case leaf.
/// 流水线执行一个用例叶子所需的一切。
#[derive(Clone)]
pub struct CasePlan {
    pub body: TestBody,
    pub args: Vec<ArgValue>,
    pub expected: Option<ArgValue>,
    /// Per-case setup hooks, base-first.
    pub set_ups: Vec<LifecycleHook>,
    /// Per-case teardown hooks, derived-first.
    pub tear_downs: Vec<LifecycleHook>,
    pub constraint: ExecutionConstraint,
    pub budget: Option<TimeBudget>,
    pub repeat: Option<RepeatSpec>,
    pub culture: Option<String>,
    pub ui_culture: Option<String>,
}

impl std::fmt::Debug for CasePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CasePlan")
            .field("args", &self.args)
            .field("constraint", &self.constraint)
            .field("budget", &self.budget)
            .field("repeat", &self.repeat)
            .finish_non_exhaustive()
    }
}

/// The one-time hooks executed around a fixture's children.
#[derive(Clone, Default)]
pub struct FixturePlan {
    pub once_set_ups: Vec<LifecycleHook>,
    pub once_tear_downs: Vec<LifecycleHook>,
}

impl std::fmt::Debug for FixturePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixturePlan")
            .field("once_set_ups", &self.once_set_ups.len())
            .field("once_tear_downs", &self.once_tear_downs.len())
            .finish()
    }
}

/// The structural kind of one tree node.
/// 树节点的结构种类。
#[derive(Debug, Clone)]
pub enum NodeKind {
    Assembly,
    Namespace,
    Fixture(FixturePlan),
    /// The suite grouping one method's expanded cases. `no_data` marks a
    /// source that produced zero cases, which reports `Inconclusive`.
    ParameterizedMethod { no_data: bool },
    Case(CasePlan),
}

/// One immutable node of the built test tree.
#[derive(Debug, Clone)]
pub struct TestNode {
    /// Local display name.
    pub name: String,
    /// Stable dotted full name, unique within the tree.
    /// 稳定的点分全名，在树中唯一。
    pub full_name: String,
    pub kind: NodeKind,
    pub run_state: RunState,
    /// Populated whenever `run_state` is not `Runnable`.
    pub skip_reason: Option<String>,
    pub properties: PropertyBag,
    /// Parallelism scope declared on this node, if any; effective scope is
    /// resolved by inheritance at dispatch time.
    pub declared_scope: Option<ParallelScope>,
    /// Forces this node's whole subtree onto one dispatching task.
    pub single_threaded: bool,
    /// Children are shared so dispatch never deep-clones a subtree.
    /// 子节点共享存储，派发时不会深拷贝子树。
    pub children: Vec<Arc<TestNode>>,
}

impl TestNode {
    fn suite(name: &str, full_name: &str, kind: NodeKind) -> Self {
        Self {
            name: name.to_string(),
            full_name: full_name.to_string(),
            kind,
            run_state: RunState::Runnable,
            skip_reason: None,
            properties: PropertyBag::new(),
            declared_scope: None,
            single_threaded: false,
            children: Vec::new(),
        }
    }

    pub fn is_suite(&self) -> bool {
        !matches!(self.kind, NodeKind::Case(_))
    }

    /// Looks a node up by its full dotted name, anywhere in the subtree.
    pub fn find(&self, full_name: &str) -> Option<&TestNode> {
        if self.full_name == full_name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(full_name))
    }

    /// Counts case leaves in the subtree.
    pub fn case_count(&self) -> usize {
        match &self.kind {
            NodeKind::Case(_) => 1,
            _ => self.children.iter().map(|c| c.case_count()).sum(),
        }
    }

    fn set_skip(&mut self, state: RunState, reason: impl Into<String>) {
        let reason = reason.into();
        self.properties.set(property_keys::SKIP_REASON, reason.clone());
        self.run_state = state;
        self.skip_reason = Some(reason);
    }

    /// Walks the subtree checking a predicate on any case plan.
    fn any_case(&self, predicate: &dyn Fn(&CasePlan) -> bool) -> bool {
        match &self.kind {
            NodeKind::Case(plan) => predicate(plan),
            _ => self.children.iter().any(|c| c.any_case(predicate)),
        }
    }
}

/// The effective per-element marker summary used during building.
#[derive(Default)]
struct MarkerSummary {
    ignore: Option<(String, Option<String>)>,
    explicit: Option<Option<String>>,
    platform: Option<(Vec<String>, Vec<String>)>,
    scope: Option<ParallelScope>,
    single_threaded: bool,
    constraint: Option<ExecutionConstraint>,
    budget: Option<TimeBudget>,
    repeat: Option<RepeatSpec>,
    culture: Option<String>,
    ui_culture: Option<String>,
}

impl MarkerSummary {
    fn collect(markers: &[Marker], properties: &mut PropertyBag) -> Self {
        let mut summary = MarkerSummary::default();
        for marker in markers {
            match marker {
                Marker::Category(name) => properties.add(property_keys::CATEGORY, name.clone()),
                Marker::Property { key, value } => properties.add(key, value.clone()),
                Marker::Description(text) => {
                    properties.set(property_keys::DESCRIPTION, text.clone())
                }
                Marker::Author(name) => properties.add(property_keys::AUTHOR, name.clone()),
                Marker::Ignore { reason, until } => {
                    summary.ignore = Some((reason.clone(), until.clone()))
                }
                Marker::Explicit { reason } => summary.explicit = Some(reason.clone()),
                Marker::Platform { include, exclude } => {
                    summary.platform = Some((include.clone(), exclude.clone()))
                }
                Marker::Parallelizable(scope) => summary.scope = Some(*scope),
                Marker::SingleThreaded => summary.single_threaded = true,
                Marker::RequiresThread(constraint) => summary.constraint = Some(*constraint),
                Marker::Timeout(millis) => {
                    summary.budget = Some(TimeBudget { millis: *millis, cooperative: false })
                }
                Marker::CancelAfter(millis) => {
                    summary.budget = Some(TimeBudget { millis: *millis, cooperative: true })
                }
                Marker::Repeat(n) => summary.repeat = Some(RepeatSpec::Repeat(*n)),
                Marker::Retry(n) => summary.repeat = Some(RepeatSpec::Retry(*n)),
                Marker::Culture(name) => summary.culture = Some(name.clone()),
                Marker::UiCulture(name) => summary.ui_culture = Some(name.clone()),
            }
        }
        summary
    }
}

/// Builds the test tree for one registry. Holds the build wall-clock so that
/// time-bounded ignores resolve consistently across the whole tree.
///
/// 为一个注册单元构建测试树。持有构建墙钟，
/// 使有时限的忽略在整棵树中一致解析。
pub struct TreeBuilder {
    now: DateTime<Utc>,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self { now: Utc::now() }
    }

    /// A builder with a fixed build clock, for reproducible trees.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    pub fn build(&self, registry: &TestRegistry) -> TestNode {
        self.build_restricted(registry, &LoadRestriction::default())
    }

    /// Builds the tree scanning only fixtures the load restriction allows.
    pub fn build_restricted(
        &self,
        registry: &TestRegistry,
        restriction: &LoadRestriction,
    ) -> TestNode {
        let mut root = TestNode::suite(&registry.name, &registry.name, NodeKind::Assembly);
        for fixture in &registry.fixtures {
            if !restriction.allows(&fixture.namespace) {
                continue;
            }
            let node = self.build_fixture(fixture, &registry.sources);
            Self::place(&mut root, &fixture.namespace, node);
        }
        root
    }

    /// Inserts a fixture node under its (possibly nested) namespace suites,
    /// creating missing namespace nodes on the way down.
    fn place(root: &mut TestNode, namespace: &str, node: TestNode) {
        if namespace.is_empty() {
            root.children.push(Arc::new(node));
            return;
        }

        let mut current = root;
        let mut full = String::new();
        for segment in namespace.split('.') {
            if !full.is_empty() {
                full.push('.');
            }
            full.push_str(segment);

            let position = current
                .children
                .iter()
                .position(|c| matches!(c.kind, NodeKind::Namespace) && c.name == segment);
            let index = match position {
                Some(index) => index,
                None => {
                    current
                        .children
                        .push(Arc::new(TestNode::suite(segment, &full, NodeKind::Namespace)));
                    current.children.len() - 1
                }
            };
            // Nodes are unshared while the tree is under construction.
            current = Arc::make_mut(&mut current.children[index]);
        }
        current.children.push(Arc::new(node));
    }

    fn build_fixture(&self, fixture: &FixtureDef, sources: &DataSourceRegistry) -> TestNode {
        let full_name = fixture.full_name();
        let plan = FixturePlan {
            once_set_ups: MetadataReader::resolved_once_set_ups(fixture),
            once_tear_downs: MetadataReader::resolved_once_tear_downs(fixture),
        };
        let mut node = TestNode::suite(&fixture.name, &full_name, NodeKind::Fixture(plan));

        let markers = MetadataReader::fixture_markers(fixture);
        let summary = MarkerSummary::collect(&markers, &mut node.properties);
        node.declared_scope = summary.scope;
        node.single_threaded = summary.single_threaded;

        if let Some(diagnosis) = MetadataReader::diagnose_fixture(&markers) {
            node.set_skip(RunState::NotRunnable, diagnosis.reason);
        } else {
            self.apply_eligibility(&mut node, &summary);
        }

        let env = FixtureEnv {
            set_ups: MetadataReader::resolved_set_ups(fixture),
            tear_downs: MetadataReader::resolved_tear_downs(fixture),
            constraint: summary.constraint.unwrap_or_default(),
            budget: summary.budget,
            repeat: summary.repeat,
            culture: summary.culture,
            ui_culture: summary.ui_culture,
        };
        for method in MetadataReader::visible_tests(fixture) {
            node.children
                .push(Arc::new(self.build_method(&full_name, &method, &env, sources)));
        }

        // Thread affinity cannot be honored inside a single-threaded subtree.
        if node.single_threaded
            && node.run_state == RunState::Runnable
            && node.any_case(&|plan| plan.constraint != ExecutionConstraint::None)
        {
            node.set_skip(
                RunState::NotRunnable,
                "Tests in a single-threaded fixture may not require a separate thread.",
            );
        }
        node
    }

    fn build_method(
        &self,
        fixture_full_name: &str,
        method: &MethodDef,
        env: &FixtureEnv,
        sources: &DataSourceRegistry,
    ) -> TestNode {
        let method_full_name = format!("{}.{}", fixture_full_name, method.name);
        let expanded = expansion::expand(
            &method.name,
            &method.params,
            method.source.as_ref(),
            sources,
        );
        let is_parameterized =
            method.source.is_some() || !method.params.is_empty() || expanded.no_data;

        let mut properties = PropertyBag::new();
        let summary = MarkerSummary::collect(&method.markers, &mut properties);
        let diagnosis = MetadataReader::diagnose_method(&method.markers, is_parameterized);

        let template = CasePlan {
            body: method.body.clone(),
            args: Vec::new(),
            expected: None,
            set_ups: env.set_ups.clone(),
            tear_downs: env.tear_downs.clone(),
            constraint: summary.constraint.unwrap_or(env.constraint),
            budget: summary.budget.or(env.budget),
            repeat: summary.repeat.or(env.repeat),
            culture: summary.culture.clone().or_else(|| env.culture.clone()),
            ui_culture: summary.ui_culture.clone().or_else(|| env.ui_culture.clone()),
        };

        if !is_parameterized {
            // A plain test method is itself a case leaf, named without an
            // argument list so its full name stays the bare method path.
            let mut case =
                expanded.cases.into_iter().next().unwrap_or_else(|| CaseData::new(Vec::new()));
            case.name = Some(method.name.clone());
            let mut node = self.build_case(&method.name, fixture_full_name, case, &template);
            node.properties = merge_properties(properties, std::mem::take(&mut node.properties));
            node.declared_scope = summary.scope.or(node.declared_scope);
            match &diagnosis {
                Some(diagnosis) => node.set_skip(RunState::NotRunnable, diagnosis.reason.clone()),
                None => {
                    if node.run_state == RunState::Runnable {
                        self.apply_eligibility(&mut node, &summary);
                    }
                }
            }
            return node;
        }

        let mut node = TestNode::suite(
            &method.name,
            &method_full_name,
            NodeKind::ParameterizedMethod { no_data: expanded.no_data },
        );
        node.properties = properties;
        node.declared_scope = summary.scope;
        match diagnosis {
            Some(diagnosis) => node.set_skip(RunState::NotRunnable, diagnosis.reason),
            None => self.apply_eligibility(&mut node, &summary),
        }

        for case in expanded.cases {
            node.children
                .push(Arc::new(self.build_case(&method.name, &method_full_name, case, &template)));
        }
        node
    }

    fn build_case(
        &self,
        method_name: &str,
        parent_full_name: &str,
        case: CaseData,
        template: &CasePlan,
    ) -> TestNode {
        let name = case
            .name
            .clone()
            .unwrap_or_else(|| naming::case_name(method_name, &case.args));
        let full_name = format!("{}.{}", parent_full_name, name);

        let mut plan = template.clone();
        plan.args = case.args;
        plan.expected = case.expected;

        let mut node = TestNode::suite(&name, &full_name, NodeKind::Case(plan));
        for (key, value) in case.properties {
            node.properties.add(&key, value);
        }
        match case.run_override {
            Some(CaseOverride::NotRunnable(reason)) => {
                node.set_skip(RunState::NotRunnable, reason)
            }
            Some(CaseOverride::Ignored(reason)) => node.set_skip(RunState::Ignored, reason),
            Some(CaseOverride::Explicit(reason)) => node.set_skip(
                RunState::Explicit,
                reason.unwrap_or_default(),
            ),
            None => {}
        }
        node
    }

    /// Applies the declarative eligibility markers in precedence order:
    /// an active ignore wins over explicit, which wins over a platform skip.
    ///
    /// 按优先顺序应用声明式资格标记：
    /// 生效的忽略优先于显式，显式优先于平台跳过。
    fn apply_eligibility(&self, node: &mut TestNode, summary: &MarkerSummary) {
        if let Some((reason, until)) = &summary.ignore {
            match until {
                None => {
                    node.set_skip(RunState::Ignored, reason.clone());
                    return;
                }
                Some(until_text) => match parse_until(until_text) {
                    // A past expiry dissolves the ignore entirely.
                    Ok(until) if until <= self.now => {}
                    Ok(until) => {
                        node.set_skip(
                            RunState::Ignored,
                            format!(
                                "Ignoring until {}Z. {}",
                                until.format("%Y-%m-%d %H:%M:%S"),
                                reason
                            ),
                        );
                        return;
                    }
                    Err(()) => {
                        node.set_skip(
                            RunState::NotRunnable,
                            format!("Invalid date string for ignore-until: '{}'", until_text),
                        );
                        return;
                    }
                },
            }
        }

        if let Some(reason) = &summary.explicit {
            node.run_state = RunState::Explicit;
            node.skip_reason = reason.clone();
            if let Some(reason) = reason {
                node.properties.set(property_keys::SKIP_REASON, reason.clone());
            }
            return;
        }

        if let Some((include, exclude)) = &summary.platform {
            if !platform::matches_platform(include, exclude) {
                node.set_skip(RunState::Skipped, "Not supported on the current platform");
            }
        }
    }
}

/// The fixture-level environment inherited by every case under it.
struct FixtureEnv {
    set_ups: Vec<LifecycleHook>,
    tear_downs: Vec<LifecycleHook>,
    constraint: ExecutionConstraint,
    budget: Option<TimeBudget>,
    /// Applies independently to every contained test method.
    repeat: Option<RepeatSpec>,
    culture: Option<String>,
    ui_culture: Option<String>,
}

fn merge_properties(mut base: PropertyBag, extra: PropertyBag) -> PropertyBag {
    for (key, values) in extra.entries() {
        for value in values {
            base.add(key, value.clone());
        }
    }
    base
}

/// Accepts RFC 3339 timestamps, `YYYY-MM-DD HH:MM:SS` and bare `YYYY-MM-DD`
/// date strings; dates without a time component mean midnight UTC.
fn parse_until(text: &str) -> Result<DateTime<Utc>, ()> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Ok(parsed.and_utc());
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Ok(parsed.and_hms_opt(0, 0, 0).ok_or(())?.and_utc());
    }
    Err(())
}

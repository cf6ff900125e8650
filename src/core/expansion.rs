//! # Test Case Expansion Module / 测试用例展开模块
//!
//! This module turns the parameter-source declarations of a test method into
//! the concrete argument tuples of its cases: explicit case lists, per
//! parameter value sets combined combinatorially, sequentially or pairwise,
//! and named data sources resolved through a registry.
//!
//! 此模块将测试方法的参数源声明转换为其用例的具体参数元组：
//! 显式用例列表、按组合/顺序/两两策略组合的参数值集合，
//! 以及通过注册表解析的命名数据源。

use anyhow::{bail, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::core::pairwise;

/// An argument literal supplied to a test case. This is the value model the
/// whole engine works with: expansion produces tuples of these, the naming
/// algorithm renders them, and the case context hands them to the test body.
///
/// 传递给测试用例的参数字面量。这是整个引擎使用的值模型：
/// 展开产生这些值的元组，命名算法渲染它们，用例上下文将它们交给测试体。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ArgValue {
    /// The null/absent value; renders as the literal `null`.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Char(char),
    /// A one-dimensional array of values.
    Array(Vec<ArgValue>),
    /// A multi-dimensional array, rendered as a type-name placeholder.
    /// 多维数组，渲染为类型名占位符。
    Matrix { type_name: String },
}

impl ArgValue {
    pub fn str(value: impl Into<String>) -> Self {
        ArgValue::Str(value.into())
    }

    pub fn array(values: impl IntoIterator<Item = ArgValue>) -> Self {
        ArgValue::Array(values.into_iter().collect())
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ArgValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", crate::core::naming::value_string(self, crate::core::naming::DEFAULT_STRING_MAX))
    }
}

/// A run-state override carried by a single expanded case, independent of the
/// method-level default.
/// 单个展开用例携带的运行状态覆盖，独立于方法级默认值。
#[derive(Debug, Clone, PartialEq)]
pub enum CaseOverride {
    /// The case is ignored with the given reason.
    Ignored(String),
    /// The case only runs when directly selected.
    Explicit(Option<String>),
    /// The case carries a structural defect and must never run.
    NotRunnable(String),
}

/// One concrete expanded case: the argument tuple plus its per-case
/// decorations (name override, run-state override, expected value,
/// properties).
///
/// 一个具体的展开用例：参数元组及其每用例的修饰
/// （名称覆盖、运行状态覆盖、期望值、属性）。
#[derive(Debug, Clone)]
pub struct CaseData {
    pub args: Vec<ArgValue>,
    /// Display-name override; when absent the canonical generated name is used.
    pub name: Option<String>,
    pub run_override: Option<CaseOverride>,
    /// Expected return value, surfaced to the test body through its context.
    pub expected: Option<ArgValue>,
    /// Extra properties (e.g., categories) attached by the source.
    pub properties: Vec<(String, String)>,
}

impl CaseData {
    pub fn new(args: Vec<ArgValue>) -> Self {
        Self {
            args,
            name: None,
            run_override: None,
            expected: None,
            properties: Vec::new(),
        }
    }

    /// A synthetic case representing a defective source or argument list.
    pub fn not_runnable(reason: impl Into<String>) -> Self {
        Self {
            args: Vec::new(),
            name: None,
            run_override: Some(CaseOverride::NotRunnable(reason.into())),
            expected: None,
            properties: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn ignored(mut self, reason: impl Into<String>) -> Self {
        self.run_override = Some(CaseOverride::Ignored(reason.into()));
        self
    }

    pub fn explicit(mut self) -> Self {
        self.run_override = Some(CaseOverride::Explicit(None));
        self
    }

    pub fn expecting(mut self, expected: ArgValue) -> Self {
        self.expected = Some(expected);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.push((key.into(), value.into()));
        self
    }
}

/// How multi-parameter value sets are combined into cases.
/// 多参数值集合如何组合成用例。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombiningStrategy {
    /// Full Cartesian product; the rightmost parameter varies fastest.
    /// 完整笛卡尔积；最右边的参数变化最快。
    Combinatorial,
    /// Positional pairing; shorter value lists repeat their last value.
    /// 按位置配对；较短的值列表重复其最后一个值。
    Sequential,
    /// Deterministic pairwise reduction covering every 2-way combination.
    /// 覆盖每个二元组合的确定性两两缩减。
    Pairwise,
}

/// The parameter-source declaration of one test method.
#[derive(Clone)]
pub enum CaseSource {
    /// Each declared case yields exactly one case node.
    Explicit(Vec<CaseData>),
    /// Combine the per-parameter candidate values with the given strategy.
    Values(CombiningStrategy),
    /// Resolve a named provider through the data-source registry.
    Named(String),
}

impl fmt::Debug for CaseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseSource::Explicit(cases) => f.debug_tuple("Explicit").field(&cases.len()).finish(),
            CaseSource::Values(strategy) => f.debug_tuple("Values").field(strategy).finish(),
            CaseSource::Named(name) => f.debug_tuple("Named").field(name).finish(),
        }
    }
}

/// A data-source provider: yields cases in order and may fail partway, in
/// which case the already-produced items stand and the error is appended as a
/// trailing not-runnable case.
pub type DataProvider = Arc<dyn Fn() -> Vec<Result<CaseData, String>> + Send + Sync>;

/// Registry of named data-source providers, the load-time collaborator that
/// stands in for reflection over static source members.
///
/// 命名数据源提供者的注册表，是代替对静态源成员反射的加载时协作者。
#[derive(Default, Clone)]
pub struct DataSourceRegistry {
    providers: HashMap<String, DataProvider>,
}

impl DataSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider under a unique name.
    pub fn register<F>(&mut self, name: impl Into<String>, provider: F) -> Result<()>
    where
        F: Fn() -> Vec<Result<CaseData, String>> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.providers.contains_key(&name) {
            bail!("A data source named '{}' is already registered.", name);
        }
        self.providers.insert(name, Arc::new(provider));
        Ok(())
    }

    /// Convenience registration for infallible sources.
    pub fn register_cases<F>(&mut self, name: impl Into<String>, provider: F) -> Result<()>
    where
        F: Fn() -> Vec<CaseData> + Send + Sync + 'static,
    {
        self.register(name, move || provider().into_iter().map(Ok).collect())
    }

    fn resolve(&self, name: &str) -> Option<&DataProvider> {
        self.providers.get(name)
    }
}

/// A description of one declared parameter, carrying its candidate values for
/// value-set strategies and its optional/rest reconciliation rules.
///
/// 一个声明参数的描述，携带值集合策略的候选值及其可选/剩余参数的调和规则。
#[derive(Debug, Clone, Default)]
pub struct ParamDef {
    pub name: String,
    /// Candidate values declared on the parameter itself.
    pub values: Vec<ArgValue>,
    /// Default value making the parameter optional in explicit case lists.
    pub default: Option<ArgValue>,
    /// Marks a trailing rest-parameter collecting surplus arguments.
    /// 标记收集多余参数的尾部剩余参数。
    pub rest: bool,
}

impl ParamDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn with_values(mut self, values: impl IntoIterator<Item = ArgValue>) -> Self {
        self.values = values.into_iter().collect();
        self
    }

    pub fn optional(mut self, default: ArgValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn rest(mut self) -> Self {
        self.rest = true;
        self
    }
}

/// The product of expanding one method: the ordered case list, plus whether
/// the expansion came up empty because of an intentional no-data convention
/// (which defaults the suite to `Inconclusive` rather than marking a defect).
///
/// 展开一个方法的产物：有序的用例列表，以及展开是否因有意的"无数据"约定
/// 而为空（这会使套件默认为 `Inconclusive` 而不是标记为缺陷）。
#[derive(Debug, Clone, Default)]
pub struct ExpandedCases {
    pub cases: Vec<CaseData>,
    pub no_data: bool,
}

/// Expands a method's source declaration into its concrete cases.
///
/// Resolution failures never abort discovery: an unresolvable source, a
/// provider error, or a wrong-arity tuple each become a single not-runnable
/// case carrying a precise diagnostic, and siblings are unaffected.
///
/// 将方法的源声明展开为具体用例。
/// 解析失败永远不会中止发现：无法解析的源、提供者错误或参数数量错误的元组
/// 都会成为带有精确诊断的单个不可运行用例，兄弟节点不受影响。
pub fn expand(
    method_name: &str,
    params: &[ParamDef],
    source: Option<&CaseSource>,
    registry: &DataSourceRegistry,
) -> ExpandedCases {
    let raw = match source {
        None => {
            // A parameterless method with no source is a single bare case.
            if params.is_empty() {
                return ExpandedCases { cases: vec![CaseData::new(Vec::new())], no_data: false };
            }
            // Parameters with declared values default to the combinatorial strategy.
            expand_values(params, CombiningStrategy::Combinatorial)
        }
        Some(CaseSource::Explicit(cases)) => cases.clone(),
        Some(CaseSource::Values(strategy)) => expand_values(params, *strategy),
        Some(CaseSource::Named(name)) => match registry.resolve(name) {
            Some(provider) => collect_provider(name, provider),
            None => {
                return ExpandedCases {
                    cases: vec![CaseData::not_runnable(format!(
                        "Unable to locate a data source named '{}'.",
                        name
                    ))],
                    no_data: false,
                };
            }
        },
    };

    if raw.is_empty() {
        return ExpandedCases { cases: Vec::new(), no_data: true };
    }

    let cases = raw
        .into_iter()
        .map(|case| reconcile_case(method_name, params, case))
        .collect();
    ExpandedCases { cases, no_data: false }
}

/// Runs a provider, keeping everything produced before a failure and
/// appending the failure as a trailing not-runnable case.
fn collect_provider(name: &str, provider: &DataProvider) -> Vec<CaseData> {
    let mut cases = Vec::new();
    for item in provider() {
        match item {
            Ok(case) => cases.push(case),
            Err(message) => {
                cases.push(CaseData::not_runnable(format!(
                    "Data source '{}' failed: {}",
                    name, message
                )));
                break;
            }
        }
    }
    cases
}

/// Combines per-parameter candidate values under the given strategy.
fn expand_values(params: &[ParamDef], strategy: CombiningStrategy) -> Vec<CaseData> {
    let value_sets: Vec<&[ArgValue]> = params.iter().map(|p| p.values.as_slice()).collect();
    if value_sets.is_empty() || value_sets.iter().any(|v| v.is_empty()) {
        return Vec::new();
    }

    match strategy {
        CombiningStrategy::Combinatorial => combinatorial(&value_sets),
        CombiningStrategy::Sequential => sequential(&value_sets),
        CombiningStrategy::Pairwise => pairwise_cases(&value_sets),
    }
}

/// Full Cartesian product, rightmost parameter varying fastest.
fn combinatorial(value_sets: &[&[ArgValue]]) -> Vec<CaseData> {
    let total: usize = value_sets.iter().map(|v| v.len()).product();
    let mut cases = Vec::with_capacity(total);
    let mut indices = vec![0usize; value_sets.len()];

    for _ in 0..total {
        let args = indices
            .iter()
            .zip(value_sets)
            .map(|(&i, values)| values[i].clone())
            .collect();
        cases.push(CaseData::new(args));

        // Odometer step, rightmost digit first.
        for k in (0..indices.len()).rev() {
            indices[k] += 1;
            if indices[k] < value_sets[k].len() {
                break;
            }
            indices[k] = 0;
        }
    }
    cases
}

/// Positional pairing: `case[i].argK = valuesK[min(i, len(valuesK) - 1)]`,
/// so shorter lists repeat their last value for overflow rows.
fn sequential(value_sets: &[&[ArgValue]]) -> Vec<CaseData> {
    let rows = value_sets.iter().map(|v| v.len()).max().unwrap_or(0);
    (0..rows)
        .map(|i| {
            let args = value_sets
                .iter()
                .map(|values| values[i.min(values.len() - 1)].clone())
                .collect();
            CaseData::new(args)
        })
        .collect()
}

fn pairwise_cases(value_sets: &[&[ArgValue]]) -> Vec<CaseData> {
    let dimensions: Vec<usize> = value_sets.iter().map(|v| v.len()).collect();
    pairwise::generate(&dimensions)
        .into_iter()
        .map(|case| {
            let args = case
                .features
                .iter()
                .zip(value_sets)
                .map(|(&f, values)| values[f].clone())
                .collect();
            CaseData::new(args)
        })
        .collect()
}

/// Reconciles one case's argument tuple against the declared parameter list,
/// filling optional defaults and folding surplus arguments into a trailing
/// rest-parameter array. A mismatch turns the case into a not-runnable one
/// carrying the diagnostic; the original decorations are preserved.
///
/// 将一个用例的参数元组与声明的参数列表调和，填充可选默认值并将多余参数
/// 折叠进尾部剩余参数数组。不匹配会将用例变为携带诊断的不可运行用例。
fn reconcile_case(method_name: &str, params: &[ParamDef], mut case: CaseData) -> CaseData {
    if matches!(case.run_override, Some(CaseOverride::NotRunnable(_))) {
        return case;
    }
    match reconcile_args(params, case.args.clone()) {
        Ok(args) => {
            case.args = args;
            case
        }
        Err(_) => {
            let reason = format!(
                "Data supplied {} arguments for '{}', but the method declares {} parameters.",
                case.args.len(),
                method_name,
                params.len()
            );
            let mut invalid = CaseData::not_runnable(reason);
            invalid.name = case.name;
            invalid.args = case.args;
            invalid
        }
    }
}

fn reconcile_args(params: &[ParamDef], mut args: Vec<ArgValue>) -> Result<Vec<ArgValue>, ()> {
    let has_rest = params.last().is_some_and(|p| p.rest);

    if has_rest {
        let fixed = params.len() - 1;
        if args.len() < fixed {
            return Err(());
        }
        let surplus: Vec<ArgValue> = args.split_off(fixed);
        // A single trailing array argument is taken as the rest array itself.
        let rest = match <[ArgValue; 1]>::try_from(surplus) {
            Ok([ArgValue::Array(items)]) => ArgValue::Array(items),
            Ok([single]) => ArgValue::Array(vec![single]),
            Err(surplus) => ArgValue::Array(surplus),
        };
        args.push(rest);
        return Ok(args);
    }

    if args.len() > params.len() {
        return Err(());
    }

    // Fill trailing optional parameters from their declared defaults.
    for param in params.iter().skip(args.len()) {
        match &param.default {
            Some(default) => args.push(default.clone()),
            None => return Err(()),
        }
    }
    Ok(args)
}

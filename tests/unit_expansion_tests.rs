//! # Expansion Module Unit Tests / Expansion 模块单元测试
//!
//! This module contains unit tests for case expansion: explicit case lists,
//! the three value-set combining strategies, named data sources and the
//! argument reconciliation rules.
//!
//! 此模块包含用例展开的单元测试：显式用例列表、三种值集合组合策略、
//! 命名数据源和参数调和规则。

use lattice_runner::core::expansion::{
    expand, ArgValue, CaseData, CaseOverride, CaseSource, CombiningStrategy, DataSourceRegistry,
    ParamDef,
};
use lattice_runner::core::pairwise;

fn ints(values: impl IntoIterator<Item = i64>) -> Vec<ArgValue> {
    values.into_iter().map(ArgValue::Int).collect()
}

fn args_of(case: &CaseData) -> Vec<i64> {
    case.args.iter().map(|a| a.as_int().unwrap()).collect()
}

#[cfg(test)]
mod strategy_tests {
    use super::*;

    #[test]
    fn parameterless_method_yields_one_bare_case() {
        let expanded = expand("run", &[], None, &DataSourceRegistry::new());
        assert_eq!(expanded.cases.len(), 1);
        assert!(expanded.cases[0].args.is_empty());
        assert!(!expanded.no_data);
    }

    #[test]
    fn combinatorial_is_full_cartesian_product_rightmost_fastest() {
        let params = vec![
            ParamDef::new("x").with_values(ints([1, 2])),
            ParamDef::new("y").with_values(ints([10, 20, 30])),
        ];
        let expanded = expand(
            "case",
            &params,
            Some(&CaseSource::Values(CombiningStrategy::Combinatorial)),
            &DataSourceRegistry::new(),
        );

        let rows: Vec<Vec<i64>> = expanded.cases.iter().map(args_of).collect();
        assert_eq!(
            rows,
            vec![
                vec![1, 10],
                vec![1, 20],
                vec![1, 30],
                vec![2, 10],
                vec![2, 20],
                vec![2, 30],
            ]
        );
    }

    #[test]
    fn declared_values_without_source_default_to_combinatorial() {
        let params = vec![
            ParamDef::new("x").with_values(ints([1, 2])),
            ParamDef::new("y").with_values(ints([3, 4])),
        ];
        let expanded = expand("case", &params, None, &DataSourceRegistry::new());
        assert_eq!(expanded.cases.len(), 4);
    }

    #[test]
    fn sequential_repeats_the_last_value_for_overflow_rows() {
        let params = vec![
            ParamDef::new("x").with_values(ints([1, 2, 3])),
            ParamDef::new("y").with_values(ints([10, 20])),
        ];
        let expanded = expand(
            "case",
            &params,
            Some(&CaseSource::Values(CombiningStrategy::Sequential)),
            &DataSourceRegistry::new(),
        );

        let rows: Vec<Vec<i64>> = expanded.cases.iter().map(args_of).collect();
        assert_eq!(rows, vec![vec![1, 10], vec![2, 20], vec![3, 20]]);
    }

    #[test]
    fn explicit_cases_expand_one_to_one() {
        let source = CaseSource::Explicit(vec![
            CaseData::new(ints([1])),
            CaseData::new(ints([2])).ignored("broken"),
        ]);
        let params = vec![ParamDef::new("x")];
        let expanded = expand("case", &params, Some(&source), &DataSourceRegistry::new());

        assert_eq!(expanded.cases.len(), 2);
        assert!(matches!(
            expanded.cases[1].run_override,
            Some(CaseOverride::Ignored(ref reason)) if reason == "broken"
        ));
    }
}

#[cfg(test)]
mod pairwise_tests {
    use super::*;

    fn pairwise_count(dimensions: &[usize]) -> usize {
        pairwise::generate(dimensions).len()
    }

    #[test]
    fn pairwise_respects_best_known_case_counts() {
        assert!(pairwise_count(&[2, 4]) <= 8);
        assert!(pairwise_count(&[2, 2, 2]) <= 4);
        assert!(pairwise_count(&[3, 3, 3]) <= 9);
        assert!(pairwise_count(&[4, 4, 4]) <= 17);
        assert!(pairwise_count(&[5, 5, 5]) <= 25);
    }

    #[test]
    fn pairwise_covers_every_two_way_combination() {
        for dimensions in [
            vec![2usize, 4],
            vec![2, 2, 2],
            vec![3, 3, 3],
            vec![4, 4, 4],
            vec![5, 5, 5],
            vec![2, 3, 5, 4],
        ] {
            let cases = pairwise::generate(&dimensions);
            assert!(
                pairwise::covers_all_pairs(&dimensions, &cases),
                "uncovered pair for dimensions {:?}",
                dimensions
            );
        }
    }

    #[test]
    fn pairwise_is_deterministic() {
        let first: Vec<Vec<usize>> = pairwise::generate(&[3, 4, 2])
            .into_iter()
            .map(|c| c.features)
            .collect();
        let second: Vec<Vec<usize>> = pairwise::generate(&[3, 4, 2])
            .into_iter()
            .map(|c| c.features)
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn pairwise_never_generates_fewer_cases_than_the_largest_dimension() {
        assert!(pairwise_count(&[7, 2]) >= 7);
        assert!(pairwise_count(&[2, 9, 3]) >= 9);
    }

    #[test]
    fn pairwise_through_expansion_yields_value_tuples() {
        let params = vec![
            ParamDef::new("x").with_values(ints([1, 2])),
            ParamDef::new("y").with_values(ints([10, 20])),
            ParamDef::new("z").with_values(ints([100, 200])),
        ];
        let expanded = expand(
            "case",
            &params,
            Some(&CaseSource::Values(CombiningStrategy::Pairwise)),
            &DataSourceRegistry::new(),
        );
        assert!(expanded.cases.len() <= 8);
        for case in &expanded.cases {
            assert_eq!(case.args.len(), 3);
        }
    }
}

#[cfg(test)]
mod data_source_tests {
    use super::*;

    #[test]
    fn unresolvable_source_becomes_a_single_not_runnable_case() {
        let source = CaseSource::Named("Missing".to_string());
        let expanded = expand(
            "case",
            &[ParamDef::new("x")],
            Some(&source),
            &DataSourceRegistry::new(),
        );

        assert_eq!(expanded.cases.len(), 1);
        assert!(matches!(
            expanded.cases[0].run_override,
            Some(CaseOverride::NotRunnable(ref reason))
                if reason == "Unable to locate a data source named 'Missing'."
        ));
    }

    #[test]
    fn provider_failing_partway_keeps_produced_cases_and_appends_the_error() {
        let mut registry = DataSourceRegistry::new();
        registry
            .register("Flaky", || {
                vec![
                    Ok(CaseData::new(vec![ArgValue::Int(1)])),
                    Ok(CaseData::new(vec![ArgValue::Int(2)])),
                    Err("enumeration blew up".to_string()),
                ]
            })
            .unwrap();

        let source = CaseSource::Named("Flaky".to_string());
        let expanded = expand("case", &[ParamDef::new("x")], Some(&source), &registry);

        assert_eq!(expanded.cases.len(), 3);
        assert_eq!(args_of(&expanded.cases[0]), vec![1]);
        assert_eq!(args_of(&expanded.cases[1]), vec![2]);
        assert!(matches!(
            expanded.cases[2].run_override,
            Some(CaseOverride::NotRunnable(ref reason))
                if reason == "Data source 'Flaky' failed: enumeration blew up"
        ));
    }

    #[test]
    fn empty_source_propagates_the_no_data_convention() {
        let mut registry = DataSourceRegistry::new();
        registry.register_cases("Empty", Vec::new).unwrap();

        let source = CaseSource::Named("Empty".to_string());
        let expanded = expand("case", &[ParamDef::new("x")], Some(&source), &registry);

        assert!(expanded.cases.is_empty());
        assert!(expanded.no_data);
    }

    #[test]
    fn duplicate_source_registration_is_rejected() {
        let mut registry = DataSourceRegistry::new();
        registry.register_cases("Twice", Vec::new).unwrap();
        assert!(registry.register_cases("Twice", Vec::new).is_err());
    }
}

#[cfg(test)]
mod reconciliation_tests {
    use super::*;

    #[test]
    fn wrong_arity_becomes_not_runnable_with_a_precise_diagnostic() {
        let source = CaseSource::Explicit(vec![CaseData::new(ints([1, 2, 3]))]);
        let params = vec![ParamDef::new("x"), ParamDef::new("y")];
        let expanded = expand("divide", &params, Some(&source), &DataSourceRegistry::new());

        assert!(matches!(
            expanded.cases[0].run_override,
            Some(CaseOverride::NotRunnable(ref reason))
                if reason == "Data supplied 3 arguments for 'divide', but the method declares 2 parameters."
        ));
    }

    #[test]
    fn missing_trailing_arguments_fill_from_declared_defaults() {
        let source = CaseSource::Explicit(vec![CaseData::new(ints([1]))]);
        let params = vec![
            ParamDef::new("x"),
            ParamDef::new("y").optional(ArgValue::Int(42)),
        ];
        let expanded = expand("case", &params, Some(&source), &DataSourceRegistry::new());

        assert_eq!(args_of(&expanded.cases[0]), vec![1, 42]);
    }

    #[test]
    fn surplus_arguments_fold_into_a_trailing_rest_parameter() {
        let source = CaseSource::Explicit(vec![CaseData::new(ints([1, 2, 3, 4]))]);
        let params = vec![ParamDef::new("x"), ParamDef::new("rest").rest()];
        let expanded = expand("case", &params, Some(&source), &DataSourceRegistry::new());

        let case = &expanded.cases[0];
        assert_eq!(case.args.len(), 2);
        assert_eq!(case.args[0], ArgValue::Int(1));
        assert_eq!(case.args[1], ArgValue::array(ints([2, 3, 4])));
    }

    #[test]
    fn a_single_trailing_array_is_taken_as_the_rest_array_itself() {
        let source = CaseSource::Explicit(vec![CaseData::new(vec![
            ArgValue::Int(1),
            ArgValue::array(ints([2, 3])),
        ])]);
        let params = vec![ParamDef::new("x"), ParamDef::new("rest").rest()];
        let expanded = expand("case", &params, Some(&source), &DataSourceRegistry::new());

        assert_eq!(expanded.cases[0].args[1], ArgValue::array(ints([2, 3])));
    }
}

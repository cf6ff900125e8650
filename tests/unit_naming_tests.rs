//! # Naming Module Unit Tests / Naming 模块单元测试
//!
//! This module contains unit tests for the canonical case-name rendering and
//! its round-trip property: a generated name must look the node back up in
//! the built tree.
//!
//! 此模块包含规范用例名称渲染及其往返性质的单元测试：
//! 生成的名称必须能在构建的树中查回该节点。

mod common;

use lattice_runner::core::expansion::{ArgValue, CaseData, CaseSource};
use lattice_runner::core::metadata::MethodDef;
use lattice_runner::core::naming::{case_name, value_string, DEFAULT_STRING_MAX};
use lattice_runner::core::tree::TreeBuilder;

#[cfg(test)]
mod rendering_tests {
    use super::*;

    #[test]
    fn primitives_render_as_literals() {
        assert_eq!(value_string(&ArgValue::Int(42), DEFAULT_STRING_MAX), "42");
        assert_eq!(value_string(&ArgValue::Int(-7), DEFAULT_STRING_MAX), "-7");
        assert_eq!(value_string(&ArgValue::Bool(true), DEFAULT_STRING_MAX), "true");
        assert_eq!(value_string(&ArgValue::Null, DEFAULT_STRING_MAX), "null");
    }

    #[test]
    fn floats_stay_visually_distinct_from_integers() {
        assert_eq!(value_string(&ArgValue::Float(1.0), DEFAULT_STRING_MAX), "1.0");
        assert_eq!(value_string(&ArgValue::Float(0.5), DEFAULT_STRING_MAX), "0.5");
        assert_eq!(
            value_string(&ArgValue::Float(f64::NAN), DEFAULT_STRING_MAX),
            "f64::NAN"
        );
        assert_eq!(
            value_string(&ArgValue::Float(f64::INFINITY), DEFAULT_STRING_MAX),
            "f64::INFINITY"
        );
    }

    #[test]
    fn strings_are_quoted_and_escaped() {
        assert_eq!(
            value_string(&ArgValue::str("hello"), DEFAULT_STRING_MAX),
            "\"hello\""
        );
        assert_eq!(
            value_string(&ArgValue::str("a\"b\nc"), DEFAULT_STRING_MAX),
            "\"a\\\"b\\nc\""
        );
    }

    #[test]
    fn long_strings_truncate_with_an_ellipsis_inside_the_quotes() {
        let long = "x".repeat(300);
        let rendered = value_string(&ArgValue::str(long), DEFAULT_STRING_MAX);
        assert!(rendered.starts_with('"'));
        assert!(rendered.ends_with("...\""));
        assert!(rendered.len() < 300);
    }

    #[test]
    fn chars_render_single_quoted() {
        assert_eq!(value_string(&ArgValue::Char('a'), DEFAULT_STRING_MAX), "'a'");
        assert_eq!(value_string(&ArgValue::Char('\''), DEFAULT_STRING_MAX), "'\\''");
    }

    #[test]
    fn long_arrays_summarize_with_a_trailing_ellipsis_marker() {
        let items: Vec<ArgValue> = (1..=7).map(ArgValue::Int).collect();
        assert_eq!(
            value_string(&ArgValue::Array(items), DEFAULT_STRING_MAX),
            "[1, 2, 3, 4, 5, ...]"
        );
        assert_eq!(value_string(&ArgValue::Array(Vec::new()), DEFAULT_STRING_MAX), "[]");
    }

    #[test]
    fn matrix_arguments_render_as_their_type_name() {
        let matrix = ArgValue::Matrix { type_name: "i64[,]".to_string() };
        assert_eq!(value_string(&matrix, DEFAULT_STRING_MAX), "i64[,]");
    }

    #[test]
    fn case_name_interpolates_the_argument_list() {
        let args = vec![ArgValue::Int(1), ArgValue::str("two"), ArgValue::Null];
        assert_eq!(case_name("combine", &args), "combine(1,\"two\",null)");
    }
}

#[cfg(test)]
mod round_trip_tests {
    use super::*;

    #[test]
    fn generated_names_look_the_case_back_up_in_the_tree() {
        let arg_rows = vec![
            vec![ArgValue::Int(5), ArgValue::str("abc")],
            vec![ArgValue::Int(-3), ArgValue::Null],
            vec![ArgValue::Bool(false), ArgValue::array([ArgValue::Int(1), ArgValue::Int(2)])],
        ];
        let mut method = MethodDef::new("combine", common::passing());
        for row in &arg_rows {
            method = method.case(CaseData::new(row.clone()));
        }
        let registry = common::registry_with_method(method);
        let tree = TreeBuilder::new().build(&registry);

        for row in &arg_rows {
            let expected_name = case_name("combine", row);
            let full_name = format!("Sample.Tests.Calc.combine.{}", expected_name);
            let node = tree
                .find(&full_name)
                .unwrap_or_else(|| panic!("no node named {}", full_name));
            assert_eq!(node.name, expected_name);
        }
    }

    #[test]
    fn distinct_argument_tuples_get_distinct_names() {
        let rows = [
            vec![ArgValue::Int(1)],
            vec![ArgValue::str("1")],
            vec![ArgValue::Char('1')],
            vec![ArgValue::Null],
        ];
        let names: Vec<String> = rows.iter().map(|row| case_name("case", row)).collect();
        for (i, a) in names.iter().enumerate() {
            for b in names.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn explicit_case_names_override_the_generated_ones() {
        let method = MethodDef::new("combine", common::passing()).with_source(
            CaseSource::Explicit(vec![
                CaseData::new(vec![ArgValue::Int(1)]).named("the_special_one"),
            ]),
        );
        let registry = common::registry_with_method(method);
        let tree = TreeBuilder::new().build(&registry);

        assert!(tree.find("Sample.Tests.Calc.combine.the_special_one").is_some());
    }
}

// Helper functions for extracting values from KDL nodes

use kdl::KdlNode;

use crate::{ConfigError, ConfigResult};

pub(crate) fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

pub(crate) fn get_first_integer_arg(node: &KdlNode) -> Option<i128> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
}

pub(crate) fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

pub(crate) fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

pub(crate) fn get_bool_prop(node: &KdlNode, name: &str) -> Option<bool> {
    node.get(name).and_then(|v| v.as_bool())
}

/// Reads a non-negative integer property, rejecting values that do not fit.
pub(crate) fn get_u32_prop(node: &KdlNode, name: &str) -> ConfigResult<Option<u32>> {
    match node.get(name) {
        None => Ok(None),
        Some(value) => value
            .as_integer()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidValue {
                field: name.to_string(),
                message: format!("expected a non-negative integer, got {value}"),
            }),
    }
}

/// Integer argument of a child node such as `forecast-horizon-minutes 15`.
pub(crate) fn child_u32(node: &KdlNode, field: &str) -> ConfigResult<u32> {
    get_first_integer_arg(node)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| ConfigError::InvalidValue {
            field: field.to_string(),
            message: "expected a non-negative integer argument".to_string(),
        })
}

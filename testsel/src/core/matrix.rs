//! Deterministic expansion of a declarative parameter matrix.
//!
//! Axes are expanded as a Cartesian product in declaration order (first axis
//! varies slowest), exclude rules remove matching cases, and include rules
//! append explicit extra cases.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::MatrixError;

/// Partial (exclude) or full (include) assignment of values to axes.
pub type Assignment = BTreeMap<String, String>;

/// Named matrix dimension with ordered discrete values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixAxis {
    pub name: String,
    pub values: Vec<String>,
}

impl MatrixAxis {
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisValue {
    pub axis: String,
    pub value: String,
}

/// One concrete combination of axis values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixCase {
    /// Position within the expanded sequence; selection orders cases by it.
    pub ordinal: usize,
    /// One value per axis, in axis-declaration order.
    pub values: Vec<AxisValue>,
}

impl MatrixCase {
    /// Parametrize-style id, e.g. `i32-linux`.
    pub fn id(&self) -> String {
        self.values
            .iter()
            .map(|v| v.value.as_str())
            .collect::<Vec<_>>()
            .join("-")
    }

    pub fn value(&self, axis: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|v| v.axis == axis)
            .map(|v| v.value.as_str())
    }

    /// True if every axis named by `pattern` carries the same value here.
    pub fn matches(&self, pattern: &Assignment) -> bool {
        pattern
            .iter()
            .all(|(axis, value)| self.value(axis) == Some(value.as_str()))
    }

    fn same_values(&self, other: &[AxisValue]) -> bool {
        self.values.as_slice() == other
    }
}

/// Validated matrix: axes plus the final ordered case list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatrixDesign {
    axes: Vec<MatrixAxis>,
    cases: Vec<MatrixCase>,
}

impl MatrixDesign {
    /// Validate the declaration and expand it.
    ///
    /// Include rules must assign every axis; they are appended after the
    /// filtered product and are not subject to exclude rules.
    pub fn new(
        axes: Vec<MatrixAxis>,
        excludes: &[Assignment],
        includes: &[Assignment],
    ) -> Result<Self, MatrixError> {
        let mut cases = expand(&axes, excludes)?;

        for (idx, include) in includes.iter().enumerate() {
            let rule = format!("include #{}", idx + 1);
            check_known_axes(&axes, include, &rule)?;
            if let Some(missing) = axes.iter().find(|axis| !include.contains_key(&axis.name)) {
                return Err(MatrixError::IncompleteInclude {
                    axis: missing.name.clone(),
                    rule,
                });
            }
            let values: Vec<AxisValue> = axes
                .iter()
                .map(|axis| AxisValue {
                    axis: axis.name.clone(),
                    value: include[&axis.name].clone(),
                })
                .collect();
            if cases.iter().any(|case| case.same_values(&values)) {
                continue;
            }
            cases.push(MatrixCase {
                ordinal: cases.len(),
                values,
            });
        }

        if !axes.is_empty() && cases.is_empty() {
            return Err(MatrixError::AllCasesExcluded);
        }
        Ok(Self { axes, cases })
    }

    pub fn cases(&self) -> &[MatrixCase] {
        &self.cases
    }

    /// A design without axes pairs every test with no case.
    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }
}

/// Expand `axes` into the ordered Cartesian product minus `excludes`.
///
/// Returns an empty sequence when no axes are declared.
pub fn expand(
    axes: &[MatrixAxis],
    excludes: &[Assignment],
) -> Result<Vec<MatrixCase>, MatrixError> {
    validate_axes(axes)?;
    for (idx, exclude) in excludes.iter().enumerate() {
        check_known_axes(axes, exclude, &format!("exclude #{}", idx + 1))?;
    }
    if axes.is_empty() {
        return Ok(Vec::new());
    }

    let mut cases = Vec::new();
    let mut cursor = vec![0usize; axes.len()];
    loop {
        let case = MatrixCase {
            ordinal: cases.len(),
            values: axes
                .iter()
                .zip(&cursor)
                .map(|(axis, &pos)| AxisValue {
                    axis: axis.name.clone(),
                    value: axis.values[pos].clone(),
                })
                .collect(),
        };
        if !excludes.iter().any(|exclude| case.matches(exclude)) {
            cases.push(case);
        }

        // Odometer step: the last axis varies fastest.
        let mut axis = axes.len();
        loop {
            if axis == 0 {
                return Ok(cases);
            }
            axis -= 1;
            cursor[axis] += 1;
            if cursor[axis] < axes[axis].values.len() {
                break;
            }
            cursor[axis] = 0;
        }
    }
}

fn validate_axes(axes: &[MatrixAxis]) -> Result<(), MatrixError> {
    let mut names = BTreeSet::new();
    for axis in axes {
        if !names.insert(axis.name.as_str()) {
            return Err(MatrixError::DuplicateAxis {
                axis: axis.name.clone(),
            });
        }
        if axis.values.is_empty() {
            return Err(MatrixError::EmptyAxis {
                axis: axis.name.clone(),
            });
        }
        let mut seen = BTreeSet::new();
        for value in &axis.values {
            if !seen.insert(value.as_str()) {
                return Err(MatrixError::DuplicateValue {
                    axis: axis.name.clone(),
                    value: value.clone(),
                });
            }
        }
    }
    Ok(())
}

fn check_known_axes(
    axes: &[MatrixAxis],
    rule: &Assignment,
    label: &str,
) -> Result<(), MatrixError> {
    for name in rule.keys() {
        if !axes.iter().any(|axis| &axis.name == name) {
            return Err(MatrixError::UnknownAxis {
                axis: name.clone(),
                rule: label.to_string(),
            });
        }
    }
    Ok(())
}

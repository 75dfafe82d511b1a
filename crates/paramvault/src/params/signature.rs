//! Architecture signatures: the parameter keys and shapes a model exposes.

use super::ParameterMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Parameter keys mapped to tensor shapes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArchitectureSignature {
    shapes: BTreeMap<String, Vec<usize>>,
}

impl ArchitectureSignature {
    /// Derive the signature of a parameter map.
    pub fn from_parameters(params: &ParameterMap) -> Self {
        Self {
            shapes: params
                .iter()
                .map(|(k, v)| (k.clone(), v.shape().to_vec()))
                .collect(),
        }
    }

    /// Build a signature from `(key, shape)` pairs.
    pub fn from_shapes<I, K>(shapes: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<usize>)>,
        K: Into<String>,
    {
        Self {
            shapes: shapes.into_iter().map(|(k, s)| (k.into(), s)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn shape(&self, key: &str) -> Option<&[usize]> {
        self.shapes.get(key).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.shapes.iter().map(|(k, s)| (k.as_str(), s.as_slice()))
    }

    /// Total number of scalar values described by the signature.
    pub fn num_elements(&self) -> u64 {
        self.shapes
            .values()
            .map(|s| s.iter().product::<usize>() as u64)
            .sum()
    }

    /// Every disagreement between `self` (the target) and `actual` (the
    /// snapshot). Empty when the two match exactly.
    pub fn diff(&self, actual: &ArchitectureSignature) -> Vec<SignatureMismatch> {
        let mut mismatches = Vec::new();

        for (key, expected) in &self.shapes {
            match actual.shapes.get(key) {
                None => mismatches.push(SignatureMismatch::Missing {
                    key: key.clone(),
                    expected: expected.clone(),
                }),
                Some(found) if found != expected => mismatches.push(SignatureMismatch::Shape {
                    key: key.clone(),
                    expected: expected.clone(),
                    actual: found.clone(),
                }),
                Some(_) => {}
            }
        }

        for (key, found) in &actual.shapes {
            if !self.shapes.contains_key(key) {
                mismatches.push(SignatureMismatch::Unexpected {
                    key: key.clone(),
                    actual: found.clone(),
                });
            }
        }

        mismatches
    }
}

/// One disagreement between a target model and a snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignatureMismatch {
    /// The target has this parameter, the snapshot does not.
    Missing { key: String, expected: Vec<usize> },
    /// The snapshot has this parameter, the target does not.
    Unexpected { key: String, actual: Vec<usize> },
    /// Both have the parameter with different shapes.
    Shape {
        key: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

impl SignatureMismatch {
    pub fn key(&self) -> &str {
        match self {
            Self::Missing { key, .. } | Self::Unexpected { key, .. } | Self::Shape { key, .. } => {
                key
            }
        }
    }
}

impl fmt::Display for SignatureMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { key, expected } => {
                write!(f, "'{}' {:?} missing from snapshot", key, expected)
            }
            Self::Unexpected { key, actual } => {
                write!(f, "'{}' {:?} not present in target", key, actual)
            }
            Self::Shape {
                key,
                expected,
                actual,
            } => write!(
                f,
                "'{}' expected shape {:?}, snapshot has {:?}",
                key, expected, actual
            ),
        }
    }
}

/// Join mismatches into a single diagnostic line.
pub(crate) fn describe(mismatches: &[SignatureMismatch]) -> String {
    mismatches
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_signatures_have_no_diff() {
        let a = ArchitectureSignature::from_shapes([("w", vec![2, 3]), ("b", vec![3])]);
        assert!(a.diff(&a.clone()).is_empty());
        assert_eq!(a.num_elements(), 9);
    }

    #[test]
    fn test_diff_reports_every_kind() {
        let target = ArchitectureSignature::from_shapes([
            ("dense.weight", vec![4, 2]),
            ("dense.bias", vec![2]),
        ]);
        let snapshot = ArchitectureSignature::from_shapes([
            ("dense.weight", vec![4, 3]),
            ("extra.weight", vec![1]),
        ]);

        let diff = target.diff(&snapshot);
        assert_eq!(diff.len(), 3);
        assert!(diff.contains(&SignatureMismatch::Missing {
            key: "dense.bias".into(),
            expected: vec![2],
        }));
        assert!(diff.contains(&SignatureMismatch::Shape {
            key: "dense.weight".into(),
            expected: vec![4, 2],
            actual: vec![4, 3],
        }));
        assert!(diff.contains(&SignatureMismatch::Unexpected {
            key: "extra.weight".into(),
            actual: vec![1],
        }));

        let text = describe(&diff);
        assert!(text.contains("dense.weight"));
        assert!(text.contains("[4, 3]"));
    }

    #[test]
    fn test_signature_serializes_as_plain_map() {
        let sig = ArchitectureSignature::from_shapes([("w", vec![2])]);
        let json = serde_json::to_string(&sig).unwrap();
        assert_eq!(json, r#"{"w":[2]}"#);
    }
}

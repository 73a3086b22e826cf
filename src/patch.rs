//! JSON-Patch documents for twin property updates.

use std::collections::HashSet;

use serde::Serialize;

/// One operation of a patch document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    Add { path: String, value: serde_json::Value },
    Replace { path: String, value: serde_json::Value },
    Remove { path: String },
}

impl PatchOp {
    pub fn path(&self) -> &str {
        match self {
            PatchOp::Add { path, .. } | PatchOp::Replace { path, .. } | PatchOp::Remove { path } => {
                path
            }
        }
    }
}

/// Ordered list of operations applied atomically to one twin.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PatchDocument {
    ops: Vec<PatchOp>,
}

impl PatchDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, property: &str, value: impl Into<serde_json::Value>) {
        self.ops.push(PatchOp::Add {
            path: property_path(property),
            value: value.into(),
        });
    }

    pub fn replace(&mut self, property: &str, value: impl Into<serde_json::Value>) {
        self.ops.push(PatchOp::Replace {
            path: property_path(property),
            value: value.into(),
        });
    }

    pub fn remove(&mut self, property: &str) {
        self.ops.push(PatchOp::Remove {
            path: property_path(property),
        });
    }

    pub fn ops(&self) -> &[PatchOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

fn property_path(property: &str) -> String {
    format!("/{property}")
}

/// Build the minimal patch that writes `updates` onto a twin whose
/// populated properties are `existing`.
///
/// Properties already present get `replace`, the rest get `add`.
/// Negative values mean "not supplied" and produce no operation.
pub fn build_patch<'a, I>(existing: &HashSet<String>, updates: I) -> PatchDocument
where
    I: IntoIterator<Item = (&'a str, f64)>,
{
    let mut patch = PatchDocument::new();
    for (property, value) in updates {
        if value < 0.0 {
            continue;
        }
        if existing.contains(property) {
            patch.replace(property, value);
        } else {
            patch.add(property, value);
        }
    }
    patch
}

//! Clone-on-write updates for tree-shaped state.
//!
//! [`produce`] hands a mutator a private copy of the base value and then
//! diffs the result against the base. The base is never touched, so any
//! snapshot a consumer already holds stays valid. When the mutator changed
//! nothing the base comes back unchanged and the patch list is empty.

use std::fmt;

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatchOp {
    Add(Value),
    Replace(Value),
    Remove,
}

/// One structural change between base and draft.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    pub path: Vec<PathSegment>,
    pub op: PatchOp,
}

impl fmt::Display for Patch {
    /// JSON-pointer style: `replace /todos/0/done`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            PatchOp::Add(_) => "add",
            PatchOp::Replace(_) => "replace",
            PatchOp::Remove => "remove",
        };
        write!(f, "{op} ")?;
        if self.path.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.path {
            match segment {
                PathSegment::Key(key) => write!(f, "/{}", key.replace('~', "~0").replace('/', "~1"))?,
                PathSegment::Index(index) => write!(f, "/{index}")?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Produced {
    pub value: Value,
    pub patches: Vec<Patch>,
}

impl Produced {
    pub fn changed(&self) -> bool {
        !self.patches.is_empty()
    }
}

/// Apply `recipe` to a draft of `base`.
pub fn produce(base: &Value, recipe: impl FnOnce(&mut Value)) -> Produced {
    let mut draft = base.clone();
    recipe(&mut draft);

    let mut patches = Vec::new();
    diff(&mut Vec::new(), base, &draft, &mut patches);
    if patches.is_empty() {
        Produced {
            value: base.clone(),
            patches,
        }
    } else {
        Produced {
            value: draft,
            patches,
        }
    }
}

fn diff(path: &mut Vec<PathSegment>, before: &Value, after: &Value, out: &mut Vec<Patch>) {
    match (before, after) {
        (Value::Object(old), Value::Object(new)) => {
            for (key, old_value) in old {
                path.push(PathSegment::Key(key.clone()));
                match new.get(key) {
                    Some(new_value) => diff(path, old_value, new_value, out),
                    None => out.push(Patch {
                        path: path.clone(),
                        op: PatchOp::Remove,
                    }),
                }
                path.pop();
            }
            for (key, new_value) in new {
                if !old.contains_key(key) {
                    path.push(PathSegment::Key(key.clone()));
                    out.push(Patch {
                        path: path.clone(),
                        op: PatchOp::Add(new_value.clone()),
                    });
                    path.pop();
                }
            }
        }
        (Value::Array(old), Value::Array(new)) => {
            let common = old.len().min(new.len());
            for index in 0..common {
                path.push(PathSegment::Index(index));
                diff(path, &old[index], &new[index], out);
                path.pop();
            }
            for (index, value) in new.iter().enumerate().skip(common) {
                path.push(PathSegment::Index(index));
                out.push(Patch {
                    path: path.clone(),
                    op: PatchOp::Add(value.clone()),
                });
                path.pop();
            }
            // Remove from the tail so earlier indices stay valid.
            for index in (common..old.len()).rev() {
                path.push(PathSegment::Index(index));
                out.push(Patch {
                    path: path.clone(),
                    op: PatchOp::Remove,
                });
                path.pop();
            }
        }
        _ if before == after => {}
        _ => out.push(Patch {
            path: path.clone(),
            op: PatchOp::Replace(after.clone()),
        }),
    }
}

/// Scalars (and null) never go through a draft.
pub fn is_simple(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}

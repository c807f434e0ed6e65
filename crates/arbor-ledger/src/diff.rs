//! The diff language replayed by temporal logs.
//!
//! A mode string is a run of `u` characters followed by one leaf character.
//! Each leading `u` descends one level into a map: the payload at that level
//! is a map whose keys select the fields to descend into. The leaf operation
//! is then applied to whatever value sits at the bottom. A mode made only of
//! `u`s is a merge at depth `len - 1`.
//!
//! | leaf | effect on the value at the bottom |
//! |------|-----------------------------------|
//! | `u`  | shallow-merge the payload map |
//! | `r`  | replace with the payload |
//! | `+`  | add the payload number (absent counts as 0) |
//! | `0`  | reset to 0 |
//! | `l`  | ensure a list exists |
//! | `a`  | append the payload to a list |
//! | `e`  | extend a list with the payload list |
//! | `m`  | remove the payload from a list, if present |
//! | `p`  | pop the listed keys from a map |
//!
//! Below a map key, `r` reads as `m` (`ur` is `um`) and `a` skips values
//! already in the list, so `ua` maintains an ordered set.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::{LedgerError, LedgerResult};

/// The operation applied at the bottom of a [`DiffMode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Leaf {
    Merge,
    Replace,
    Add,
    Zero,
    List,
    Append,
    Extend,
    Remove,
    Pop,
}

impl Leaf {
    fn code(self) -> char {
        match self {
            Self::Merge => 'u',
            Self::Replace => 'r',
            Self::Add => '+',
            Self::Zero => '0',
            Self::List => 'l',
            Self::Append => 'a',
            Self::Extend => 'e',
            Self::Remove => 'm',
            Self::Pop => 'p',
        }
    }

    fn from_code(c: char) -> Option<Self> {
        Some(match c {
            'u' => Self::Merge,
            'r' => Self::Replace,
            '+' => Self::Add,
            '0' => Self::Zero,
            'l' => Self::List,
            'a' => Self::Append,
            'e' => Self::Extend,
            'm' => Self::Remove,
            'p' => Self::Pop,
            _ => return None,
        })
    }
}

/// A parsed diff mode: how many map levels to descend, then which leaf.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DiffMode {
    depth: u8,
    leaf: Leaf,
}

impl DiffMode {
    /// `u`: shallow merge.
    pub const MERGE: Self = Self::new(0, Leaf::Merge);
    /// `r`: replace wholesale.
    pub const REPLACE: Self = Self::new(0, Leaf::Replace);
    /// `a`: append to a list.
    pub const APPEND: Self = Self::new(0, Leaf::Append);
    /// `m`: remove from a list.
    pub const REMOVE: Self = Self::new(0, Leaf::Remove);
    /// `p`: pop keys from a map.
    pub const POP: Self = Self::new(0, Leaf::Pop);

    pub const fn new(depth: u8, leaf: Leaf) -> Self {
        Self { depth, leaf }
    }

    /// The same leaf, one map level deeper (`a` -> `ua`).
    pub const fn nested(self) -> Self {
        Self::new(self.depth + 1, self.leaf)
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn leaf(&self) -> Leaf {
        self.leaf
    }
}

impl FromStr for DiffMode {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || LedgerError::UnknownMode(s.to_string());
        let last = s.chars().last().ok_or_else(unknown)?;
        let prefix = &s[..s.len() - last.len_utf8()];
        if !prefix.chars().all(|c| c == 'u') {
            return Err(unknown());
        }
        let depth = u8::try_from(prefix.len()).map_err(|_| unknown())?;
        let leaf = match Leaf::from_code(last).ok_or_else(unknown)? {
            Leaf::Replace if depth > 0 => Leaf::Remove,
            leaf => leaf,
        };
        Ok(Self::new(depth, leaf))
    }
}

impl TryFrom<String> for DiffMode {
    type Error = LedgerError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DiffMode> for String {
    fn from(mode: DiffMode) -> Self {
        mode.to_string()
    }
}

impl fmt::Display for DiffMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for _ in 0..self.depth {
            f.write_str("u")?;
        }
        write!(f, "{}", self.leaf.code())
    }
}

impl fmt::Debug for DiffMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DiffMode({self})")
    }
}

/// One `(mode, payload)` step of a diff; serialized as a two-element array.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiffOp(pub DiffMode, pub Value);

impl DiffOp {
    pub fn new(mode: DiffMode, payload: Value) -> Self {
        Self(mode, payload)
    }

    pub fn mode(&self) -> DiffMode {
        self.0
    }

    pub fn payload(&self) -> &Value {
        &self.1
    }
}

/// An ordered sequence of ops recorded as one log entry.
pub type Diff = Vec<DiffOp>;

/// Apply a whole diff to a value, in order.
pub fn apply_diff(value: Option<Value>, diff: &[DiffOp]) -> LedgerResult<Option<Value>> {
    diff.iter()
        .try_fold(value, |value, op| apply(op.mode(), value, op.payload()).map(Some))
}

/// Apply one op: pure function from the old value to the new one.
pub fn apply(mode: DiffMode, old: Option<Value>, payload: &Value) -> LedgerResult<Value> {
    apply_at(mode, mode.depth, old, payload)
}

fn apply_at(mode: DiffMode, depth: u8, old: Option<Value>, payload: &Value) -> LedgerResult<Value> {
    if depth == 0 {
        return apply_leaf(mode, old, payload, mode.depth > 0);
    }
    let mut map = into_map(mode, old)?;
    let fields = payload
        .as_object()
        .ok_or_else(|| mismatch(mode, "a map payload", payload))?;
    for (field, sub) in fields {
        let current = map.remove(field);
        let next = apply_at(mode, depth - 1, current, sub)?;
        map.insert(field.clone(), next);
    }
    Ok(Value::Object(map))
}

fn apply_leaf(
    mode: DiffMode,
    old: Option<Value>,
    payload: &Value,
    keyed: bool,
) -> LedgerResult<Value> {
    let value = match mode.leaf {
        Leaf::Merge => {
            let mut map = into_map(mode, old)?;
            let fields = payload
                .as_object()
                .ok_or_else(|| mismatch(mode, "a map payload", payload))?;
            map.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
            Value::Object(map)
        }
        Leaf::Replace => payload.clone(),
        Leaf::Add => add(mode, present(old), payload)?,
        Leaf::Zero => Value::from(0),
        Leaf::List => present(old).unwrap_or_else(|| Value::Array(Vec::new())),
        Leaf::Append => {
            let mut list = into_list(mode, old)?;
            if !(keyed && list.contains(payload)) {
                list.push(payload.clone());
            }
            Value::Array(list)
        }
        Leaf::Extend => {
            let mut list = into_list(mode, old)?;
            let items = payload
                .as_array()
                .ok_or_else(|| mismatch(mode, "a list payload", payload))?;
            list.extend(items.iter().cloned());
            Value::Array(list)
        }
        Leaf::Remove => {
            let mut list = into_list(mode, old)?;
            if let Some(pos) = list.iter().position(|item| item == payload) {
                list.remove(pos);
            }
            Value::Array(list)
        }
        Leaf::Pop => {
            let mut map = into_map(mode, old)?;
            match payload {
                Value::Array(keys) => {
                    for key in keys {
                        if let Some(key) = key.as_str() {
                            map.remove(key);
                        }
                    }
                }
                Value::Object(keys) => {
                    for key in keys.keys() {
                        map.remove(key);
                    }
                }
                Value::String(key) => {
                    map.remove(key);
                }
                other => return Err(mismatch(mode, "a list of keys", other)),
            }
            Value::Object(map)
        }
    };
    Ok(value)
}

/// Absent and `null` both count as "no value yet".
fn present(old: Option<Value>) -> Option<Value> {
    old.filter(|v| !v.is_null())
}

fn into_map(mode: DiffMode, old: Option<Value>) -> LedgerResult<Map<String, Value>> {
    match present(old) {
        None => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(mismatch(mode, "a map value", &other)),
    }
}

fn into_list(mode: DiffMode, old: Option<Value>) -> LedgerResult<Vec<Value>> {
    match present(old) {
        None => Ok(Vec::new()),
        Some(Value::Array(list)) => Ok(list),
        Some(other) => Err(mismatch(mode, "a list value", &other)),
    }
}

fn add(mode: DiffMode, old: Option<Value>, delta: &Value) -> LedgerResult<Value> {
    let current = match old {
        None => Number::from(0),
        Some(Value::Number(n)) => n,
        Some(other) => return Err(mismatch(mode, "a numeric value", &other)),
    };
    let delta = match delta {
        Value::Number(n) => n,
        other => return Err(mismatch(mode, "a numeric payload", other)),
    };
    if let (Some(a), Some(b)) = (current.as_i64(), delta.as_i64()) {
        return a
            .checked_add(b)
            .map(Value::from)
            .ok_or_else(|| LedgerError::Overflow(mode.to_string()));
    }
    let sum = current.as_f64().unwrap_or(0.0) + delta.as_f64().unwrap_or(0.0);
    Number::from_f64(sum)
        .map(Value::Number)
        .ok_or_else(|| LedgerError::Overflow(mode.to_string()))
}

fn mismatch(mode: DiffMode, expected: &'static str, found: &Value) -> LedgerError {
    let found = match found {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a map",
    };
    LedgerError::TypeMismatch {
        mode: mode.to_string(),
        expected,
        found: found.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn run(mode: &str, old: Value, payload: Value) -> Value {
        let old = if old.is_null() { None } else { Some(old) };
        apply(mode.parse().unwrap(), old, &payload).unwrap()
    }

    // ---- Mode parsing ----

    #[test]
    fn parses_every_documented_mode() {
        for mode in [
            "r", "u", "uu", "uuu", "a", "ua", "um", "uu+", "uu0", "uup", "l", "p", "+", "e",
        ] {
            let parsed: DiffMode = mode.parse().unwrap();
            assert_eq!(parsed.to_string(), mode);
        }
    }

    #[test]
    fn ur_is_an_alias_of_um() {
        let mode: DiffMode = "ur".parse().unwrap();
        assert_eq!(mode, DiffMode::REMOVE.nested());
        assert_eq!(mode.to_string(), "um");
    }

    #[test]
    fn rejects_unknown_modes() {
        for bad in ["", "x", "au", "u?", "ru"] {
            assert!(matches!(bad.parse::<DiffMode>(), Err(LedgerError::UnknownMode(_))), "{bad}");
        }
    }

    #[test]
    fn op_serializes_as_pair() {
        let op = DiffOp::new(DiffMode::APPEND.nested(), json!({"children": "x"}));
        let text = serde_json::to_string(&op).unwrap();
        assert_eq!(text, r#"["ua",{"children":"x"}]"#);
        let back: DiffOp = serde_json::from_str(&text).unwrap();
        assert_eq!(back, op);
    }

    // ---- Leaf semantics ----

    #[test]
    fn replace_and_merge() {
        assert_eq!(run("r", json!({"a": 1}), json!([1])), json!([1]));
        assert_eq!(run("u", json!({"a": 1, "b": 2}), json!({"b": 3})), json!({"a": 1, "b": 3}));
        assert_eq!(run("u", Value::Null, json!({"b": 3})), json!({"b": 3}));
    }

    #[test]
    fn nested_merge_keeps_siblings() {
        let old = json!({"metadata": {"a": 1, "b": 2}, "value": "h"});
        let new = run("uu", old, json!({"metadata": {"b": 9}}));
        assert_eq!(new, json!({"metadata": {"a": 1, "b": 9}, "value": "h"}));

        let deep = run("uuu", json!({"x": {"y": {"z": 1}}}), json!({"x": {"y": {"w": 2}}}));
        assert_eq!(deep, json!({"x": {"y": {"z": 1, "w": 2}}}));
    }

    #[test]
    fn list_ops() {
        assert_eq!(run("l", Value::Null, json!(null)), json!([]));
        assert_eq!(run("l", json!([1]), json!(null)), json!([1]));
        assert_eq!(run("a", json!([1]), json!(1)), json!([1, 1]));
        assert_eq!(run("e", json!([1]), json!([2, 3])), json!([1, 2, 3]));
        assert_eq!(run("m", json!([1, 2, 1]), json!(1)), json!([2, 1]));
        assert_eq!(run("m", json!([2]), json!(7)), json!([2]));
    }

    #[test]
    fn keyed_append_is_a_set_insert() {
        let once = run("ua", Value::Null, json!({"children": "x"}));
        let twice = run("ua", once.clone(), json!({"children": "x"}));
        assert_eq!(once, json!({"children": ["x"]}));
        assert_eq!(twice, once);
        let removed = run("um", twice, json!({"children": "x"}));
        assert_eq!(removed, json!({"children": []}));
    }

    #[test]
    fn numeric_ops() {
        assert_eq!(run("+", Value::Null, json!(2)), json!(2));
        assert_eq!(run("+", json!(1.5), json!(2)), json!(3.5));
        let stats = run("uu+", json!({"hits": {"a": 1}}), json!({"hits": {"a": 2, "b": 5}}));
        assert_eq!(stats, json!({"hits": {"a": 3, "b": 5}}));
        let reset = run("uu0", stats, json!({"hits": {"a": null}}));
        assert_eq!(reset, json!({"hits": {"a": 0, "b": 5}}));
    }

    #[test]
    fn pop_ops() {
        assert_eq!(run("p", json!({"a": 1, "b": 2}), json!(["a", "z"])), json!({"b": 2}));
        let nested = run("uup", json!({"m": {"s": {"x": 1, "y": 2}}}), json!({"m": {"s": ["x"]}}));
        assert_eq!(nested, json!({"m": {"s": {"y": 2}}}));
    }

    #[test]
    fn type_mismatch_is_an_error() {
        let err = apply(DiffMode::APPEND, Some(json!({"a": 1})), &json!(1)).unwrap_err();
        assert!(matches!(err, LedgerError::TypeMismatch { .. }));
        let err = apply("+".parse().unwrap(), Some(json!("s")), &json!(1)).unwrap_err();
        assert!(matches!(err, LedgerError::TypeMismatch { .. }));
    }

    #[test]
    fn compound_diff_applies_in_order() {
        let diff = vec![
            DiffOp::new("uu".parse().unwrap(), json!({"metadata": {"k": 1}})),
            DiffOp::new(DiffMode::MERGE, json!({"value": "hash"})),
            DiffOp::new(DiffMode::APPEND.nested(), json!({"children": "c"})),
        ];
        let value = apply_diff(None, &diff).unwrap().unwrap();
        assert_eq!(value, json!({"metadata": {"k": 1}, "value": "hash", "children": ["c"]}));
    }

    proptest! {
        #[test]
        fn accumulate_equals_sum(deltas in proptest::collection::vec(-1000i64..1000, 0..20)) {
            let diff: Diff = deltas
                .iter()
                .map(|d| DiffOp::new("uu+".parse().unwrap(), json!({"s": {"n": d}})))
                .collect();
            let value = apply_diff(None, &diff).unwrap();
            let expected: i64 = deltas.iter().sum();
            match value {
                None => prop_assert!(deltas.is_empty()),
                Some(v) => prop_assert_eq!(v["s"]["n"].as_i64(), Some(expected)),
            }
        }

        #[test]
        fn children_stay_unique(segments in proptest::collection::vec("[a-c]", 0..30)) {
            let diff: Diff = segments
                .iter()
                .map(|s| DiffOp::new(DiffMode::APPEND.nested(), json!({"children": s})))
                .collect();
            let value = apply_diff(None, &diff).unwrap().unwrap_or(json!({"children": []}));
            let children: Vec<String> = serde_json::from_value(value["children"].clone()).unwrap();
            let mut dedup = children.clone();
            dedup.sort();
            dedup.dedup();
            prop_assert_eq!(children.len(), dedup.len());
        }
    }
}

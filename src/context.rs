use serde_json::{json, Map, Value};

use crate::models::Request;

pub const KEY_ORIGINAL: &str = "original";
pub const KEY_REQUESTS: &str = "requests";
pub const KEY_RESPONSES: &str = "responses";
pub const KEY_VARS: &str = "vars";
pub const KEY_COUNTER: &str = "counter";
pub const KEY_TIMES: &str = "times";

/// One step from the context root down to a node's slot in the
/// tree-mirroring `requests` structure.
#[derive(Debug, Clone, Copy)]
pub enum SlotStep {
    /// i-th entry of the `requests` array (of the root, or of a slot).
    Child(usize),
    /// node-th slot of the time-th iteration batch under a loop slot.
    Iteration { time: usize, node: usize },
}

/// The single mutable JSON document threaded through one `execute` call:
/// `original` (read-only projection of the caller request), `requests`
/// (mirrors the template tree), `responses` (flat dispatch chain) and
/// `vars`. All mutation goes through this type so read/write interleaving
/// stays deterministic.
#[derive(Debug)]
pub struct ContextDocument {
    root: Value,
}

impl ContextDocument {
    pub fn new(original: &Request) -> Self {
        Self {
            root: json!({
                KEY_ORIGINAL: original.original_value(),
                KEY_REQUESTS: [],
                KEY_RESPONSES: [],
                KEY_VARS: {},
            }),
        }
    }

    /// Live view for path evaluation; earlier writes are visible.
    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    /// Append one raw dispatch result to the chain. Chain entries are never
    /// rewritten afterwards.
    pub fn push_response(&mut self, response: Value) {
        elem_push(field_mut(&mut self.root, KEY_RESPONSES), response);
    }

    pub fn chain_len(&self) -> usize {
        self.root
            .get(KEY_RESPONSES)
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Merge one variable; visible to every later expression.
    pub fn merge_var(&mut self, name: String, value: Value) {
        let vars = field_mut(&mut self.root, KEY_VARS);
        if !vars.is_object() {
            *vars = Value::Object(Map::new());
        }
        if let Value::Object(map) = vars {
            map.insert(name, value);
        }
    }

    /// Append a null placeholder slot under `parent`'s child list and
    /// return its index.
    pub fn push_child_slot(&mut self, parent: &[SlotStep]) -> usize {
        let list = field_mut(self.slot_mut(parent), KEY_REQUESTS);
        elem_push(list, Value::Null)
    }

    /// Open a new iteration batch under a loop slot's `times`.
    pub fn push_iteration(&mut self, loop_slot: &[SlotStep]) -> usize {
        let times = field_mut(self.slot_mut(loop_slot), KEY_TIMES);
        elem_push(times, Value::Array(Vec::new()))
    }

    /// Append a null placeholder slot to one iteration batch.
    pub fn push_iteration_slot(&mut self, loop_slot: &[SlotStep], time: usize) -> usize {
        let times = field_mut(self.slot_mut(loop_slot), KEY_TIMES);
        let batch = elem_mut(times, time);
        elem_push(batch, Value::Null)
    }

    /// Replace the whole slot value.
    pub fn set_slot(&mut self, slot: &[SlotStep], value: Value) {
        *self.slot_mut(slot) = value;
    }

    /// Set one field of the slot object, promoting a null placeholder to an
    /// object first.
    pub fn set_slot_field(&mut self, slot: &[SlotStep], key: &str, value: Value) {
        let target = field_mut(self.slot_mut(slot), key);
        *target = value;
    }

    fn slot_mut(&mut self, path: &[SlotStep]) -> &mut Value {
        let mut cur = &mut self.root;
        for step in path {
            cur = match step {
                SlotStep::Child(i) => elem_mut(field_mut(cur, KEY_REQUESTS), *i),
                SlotStep::Iteration { time, node } => {
                    elem_mut(elem_mut(field_mut(cur, KEY_TIMES), *time), *node)
                }
            };
        }
        cur
    }
}

/// Field access that promotes the value to an object on the way. Only the
/// engine navigates slots, always along paths it created.
fn field_mut<'a>(v: &'a mut Value, key: &str) -> &'a mut Value {
    if !v.is_object() {
        *v = Value::Object(Map::new());
    }
    match v {
        Value::Object(map) => map.entry(key.to_string()).or_insert(Value::Null),
        _ => unreachable!("value was just promoted to an object"),
    }
}

fn elem_mut(v: &mut Value, i: usize) -> &mut Value {
    if !v.is_array() {
        *v = Value::Array(Vec::new());
    }
    match v {
        Value::Array(arr) => {
            while arr.len() <= i {
                arr.push(Value::Null);
            }
            &mut arr[i]
        }
        _ => unreachable!("value was just promoted to an array"),
    }
}

fn elem_push(v: &mut Value, item: Value) -> usize {
    if !v.is_array() {
        *v = Value::Array(Vec::new());
    }
    match v {
        Value::Array(arr) => {
            arr.push(item);
            arr.len() - 1
        }
        _ => unreachable!("value was just promoted to an array"),
    }
}

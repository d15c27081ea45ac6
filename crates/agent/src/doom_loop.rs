//! Doom-loop detection for repeated tool calls within one run.

use serde_json::Value;
use std::collections::HashMap;

/// Which rule fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DoomLoopRule {
    /// The same name and arguments, consecutively
    Exact,
    /// The same tool name, anywhere in the run
    Name,
}

impl DoomLoopRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Name => "name",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoomLoopTrip {
    pub tool_name: String,
    pub rule: DoomLoopRule,
    pub count: usize,
    pub threshold: usize,
}

/// Tracks call signatures for one run. A fresh guard per run.
#[derive(Debug)]
pub struct DoomLoopGuard {
    exact_threshold: usize,
    name_threshold: usize,
    last_signature: Option<String>,
    consecutive: usize,
    per_name: HashMap<String, usize>,
}

impl DoomLoopGuard {
    pub fn new(exact_threshold: usize, name_threshold: usize) -> Self {
        Self {
            exact_threshold,
            name_threshold,
            last_signature: None,
            consecutive: 0,
            per_name: HashMap::new(),
        }
    }

    /// Record one requested call; `Some` once a count goes past its threshold.
    pub fn observe(&mut self, tool_name: &str, arguments: &Value) -> Option<DoomLoopTrip> {
        let signature = format!("{tool_name}:{}", canonical_json(arguments));
        if self.last_signature.as_deref() == Some(signature.as_str()) {
            self.consecutive += 1;
        } else {
            self.last_signature = Some(signature);
            self.consecutive = 1;
        }

        let by_name = self.per_name.entry(tool_name.to_string()).or_insert(0);
        *by_name += 1;

        if self.consecutive > self.exact_threshold {
            return Some(DoomLoopTrip {
                tool_name: tool_name.to_string(),
                rule: DoomLoopRule::Exact,
                count: self.consecutive,
                threshold: self.exact_threshold,
            });
        }
        if *by_name > self.name_threshold {
            return Some(DoomLoopTrip {
                tool_name: tool_name.to_string(),
                rule: DoomLoopRule::Name,
                count: *by_name,
                threshold: self.name_threshold,
            });
        }
        None
    }

    /// Observe a whole batch in request order, stopping at the first trip.
    pub fn observe_batch<'a>(&mut self, calls: impl IntoIterator<Item = (&'a str, &'a Value)>) -> Option<DoomLoopTrip> {
        calls.into_iter().find_map(|(name, args)| self.observe(name, args))
    }
}

/// JSON with object keys sorted at every level.
pub fn canonical_json(value: &Value) -> String {
    fn sorted(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let mut out = serde_json::Map::new();
                for key in keys {
                    out.insert(key.clone(), sorted(&map[key]));
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    sorted(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn third_identical_call_trips() {
        let mut guard = DoomLoopGuard::new(2, 4);
        let args = json!({ "ticket_id": 1201 });
        assert!(guard.observe("get_ticket", &args).is_none());
        assert!(guard.observe("get_ticket", &args).is_none());
        let trip = guard.observe("get_ticket", &args).unwrap();
        assert_eq!(trip.rule, DoomLoopRule::Exact);
        assert_eq!(trip.count, 3);
        assert_eq!(trip.threshold, 2);
    }

    #[test]
    fn different_arguments_reset_the_streak() {
        let mut guard = DoomLoopGuard::new(2, 10);
        for id in [1, 1, 2, 2, 1, 1] {
            assert!(guard.observe("get_ticket", &json!({ "ticket_id": id })).is_none());
        }
    }

    #[test]
    fn key_order_does_not_matter() {
        let mut guard = DoomLoopGuard::new(1, 10);
        guard.observe("search", &json!({ "a": 1, "b": { "y": 2, "x": 1 } }));
        let trip = guard.observe("search", &json!({ "b": { "x": 1, "y": 2 }, "a": 1 }));
        assert!(trip.is_some());
    }

    #[test]
    fn fifth_call_by_name_trips() {
        let mut guard = DoomLoopGuard::new(2, 4);
        for id in 0..4 {
            assert!(guard.observe("get_ticket", &json!({ "ticket_id": id })).is_none());
        }
        let trip = guard.observe("get_ticket", &json!({ "ticket_id": 99 })).unwrap();
        assert_eq!(trip.rule, DoomLoopRule::Name);
        assert_eq!(trip.count, 5);
    }

    #[test]
    fn batch_stops_at_first_trip() {
        let mut guard = DoomLoopGuard::new(2, 4);
        let args = json!({});
        let calls = [("list_my_tickets", &args), ("list_my_tickets", &args), ("list_my_tickets", &args)];
        let trip = guard.observe_batch(calls).unwrap();
        assert_eq!(trip.tool_name, "list_my_tickets");
    }

    #[test]
    fn canonical_json_sorts_nested_keys() {
        assert_eq!(canonical_json(&json!({ "b": [{ "d": 1, "c": 2 }], "a": null })), r#"{"a":null,"b":[{"c":2,"d":1}]}"#);
    }
}

//! Variable resolution of node configuration.
//!
//! Templates:
//! - `{{ $jobs.<nodeId>.<path> }}`: field of `<nodeId>`'s job result in the
//!   current execution.
//! - `{{ $context.<path> }}`: field of the trigger payload.
//!
//! Paths are dot-separated; numeric segments index arrays. A string that is
//! exactly one template becomes the referenced value with its JSON type
//! intact. Templates inside a longer string are rendered as text.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};

use nodes::Job;

use crate::EngineError;

static TEMPLATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*\$(jobs|context)((?:\.[A-Za-z0-9_\-]+)*)\s*\}\}")
        .expect("template pattern is valid")
});

/// Everything a template may address.
#[derive(Debug)]
pub struct Scope<'a> {
    results: HashMap<&'a str, &'a Value>,
    context: &'a Value,
}

impl<'a> Scope<'a> {
    /// Only terminal jobs contribute results; a pending job has none yet.
    pub fn new(jobs: &'a [Job], context: &'a Value) -> Self {
        let results = jobs
            .iter()
            .filter(|job| job.status.is_terminal())
            .map(|job| (job.node_id.as_str(), &job.result))
            .collect();
        Self { results, context }
    }
}

/// Resolve every template in `raw` against `scope`.
///
/// # Errors
/// [`EngineError::UnresolvedReference`] when a template names a node with no
/// result in this execution.
pub fn resolve(raw: &Value, scope: &Scope<'_>) -> Result<Value, EngineError> {
    match raw {
        Value::String(s) => resolve_str(s, scope),
        Value::Array(items) => items
            .iter()
            .map(|item| resolve(item, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                out.insert(key.clone(), resolve(value, scope)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn resolve_str(s: &str, scope: &Scope<'_>) -> Result<Value, EngineError> {
    if let Some(caps) = TEMPLATE.captures(s) {
        if caps[0].len() == s.len() {
            return lookup(&caps, scope);
        }
    } else {
        return Ok(Value::String(s.to_owned()));
    }

    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for caps in TEMPLATE.captures_iter(s) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&s[last..whole.start()]);
        match lookup(&caps, scope)? {
            Value::Null => {}
            Value::String(text) => out.push_str(&text),
            other => out.push_str(&other.to_string()),
        }
        last = whole.end();
    }
    out.push_str(&s[last..]);
    Ok(Value::String(out))
}

fn lookup(caps: &Captures<'_>, scope: &Scope<'_>) -> Result<Value, EngineError> {
    let mut segments = caps[2].split('.').filter(|segment| !segment.is_empty());

    let root: Value = match &caps[1] {
        "context" => scope.context.clone(),
        _ => match segments.next() {
            Some(node_id) => (*scope.results.get(node_id).ok_or_else(|| {
                EngineError::UnresolvedReference {
                    reference: caps[0].to_owned(),
                    node_id: node_id.to_owned(),
                }
            })?)
            .clone(),
            // Bare `$jobs`: every result so far, keyed by node id.
            None => Value::Object(
                scope
                    .results
                    .iter()
                    .map(|(id, result)| ((*id).to_owned(), (*result).clone()))
                    .collect(),
            ),
        },
    };

    Ok(segments.fold(root, |value, segment| descend(value, segment)))
}

fn descend(value: Value, segment: &str) -> Value {
    match value {
        Value::Object(mut map) => map.remove(segment).unwrap_or(Value::Null),
        Value::Array(mut items) => match segment.parse::<usize>() {
            Ok(i) if i < items.len() => items.swap_remove(i),
            _ => Value::Null,
        },
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use nodes::JobStatus;
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    fn job(node_id: &str, status: JobStatus, result: Value) -> Job {
        Job {
            id: Uuid::new_v4(),
            execution_id: Uuid::nil(),
            node_id: node_id.into(),
            upstream_id: None,
            status,
            result,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn jobs() -> Vec<Job> {
        vec![
            job("fetch", JobStatus::Resolved, json!({ "x": 1, "items": [{ "id": "a" }, { "id": "b" }] })),
            job("waiting", JobStatus::Pending, Value::Null),
        ]
    }

    #[test]
    fn whole_string_template_keeps_json_type() {
        let jobs = jobs();
        let context = json!({ "user": { "id": 7 } });
        let scope = Scope::new(&jobs, &context);

        let resolved = resolve(
            &json!({
                "count": "{{ $jobs.fetch.x }}",
                "second": "{{$jobs.fetch.items.1.id}}",
                "user": "{{ $context.user }}",
                "whole": "{{ $jobs.fetch }}",
                "flag": true
            }),
            &scope,
        )
        .unwrap();

        assert_eq!(
            resolved,
            json!({
                "count": 1,
                "second": "b",
                "user": { "id": 7 },
                "whole": { "x": 1, "items": [{ "id": "a" }, { "id": "b" }] },
                "flag": true
            })
        );
    }

    #[test]
    fn embedded_templates_are_rendered_as_text() {
        let jobs = jobs();
        let context = json!({ "host": "example.com" });
        let scope = Scope::new(&jobs, &context);

        let resolved = resolve(
            &json!(["https://{{ $context.host }}/items/{{ $jobs.fetch.x }}?q={{ $jobs.fetch.missing }}"]),
            &scope,
        )
        .unwrap();
        assert_eq!(resolved, json!(["https://example.com/items/1?q="]));
    }

    #[test]
    fn missing_field_of_existing_result_is_null() {
        let jobs = jobs();
        let scope = Scope::new(&jobs, &Value::Null);
        assert_eq!(resolve(&json!("{{ $jobs.fetch.nope.deeper }}"), &scope).unwrap(), Value::Null);
        assert_eq!(resolve(&json!("{{ $jobs.fetch.items.9 }}"), &scope).unwrap(), Value::Null);
    }

    #[test]
    fn reference_to_node_without_result_is_unresolved() {
        let jobs = jobs();
        let scope = Scope::new(&jobs, &Value::Null);

        for template in ["{{ $jobs.later.x }}", "prefix {{ $jobs.waiting }}"] {
            let err = resolve(&json!({ "a": [template] }), &scope).unwrap_err();
            assert!(matches!(err, EngineError::UnresolvedReference { .. }), "{template}: {err}");
        }
    }

    #[test]
    fn plain_strings_and_scalars_pass_through() {
        let scope = Scope::new(&[], &Value::Null);
        let raw = json!({ "text": "{{ not a template }}", "n": 3, "none": null });
        assert_eq!(resolve(&raw, &scope).unwrap(), raw);
    }

    #[test]
    fn resolution_is_deterministic() {
        let jobs = jobs();
        let scope = Scope::new(&jobs, &Value::Null);
        let raw = json!({ "all": "{{ $jobs }}" });
        assert_eq!(resolve(&raw, &scope).unwrap(), resolve(&raw, &scope).unwrap());
        assert_eq!(resolve(&raw, &scope).unwrap()["all"]["fetch"]["x"], 1);
    }
}

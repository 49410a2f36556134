use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;

/// Types the endpoint can be forced to emit via structured outputs.
///
/// Blanket-implemented for anything `JsonSchema + DeserializeOwned`. The
/// endpoint's strict mode only accepts schemas where every object carries
/// `additionalProperties: false`, every property is listed in `required`
/// (nullable or not), and nothing is left behind a `$ref`.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    /// The schema for this type, rewritten to satisfy strict mode.
    fn strict_schema() -> serde_json::Value {
        let schema = schema_for!(Self);
        let mut value = serde_json::to_value(schema).unwrap_or_default();

        fix_object_schemas(&mut value);
        inline_refs(&mut value);

        if let serde_json::Value::Object(map) = &mut value {
            map.remove("definitions");
            map.remove("$schema");
        }

        value
    }

    fn type_name() -> String {
        <Self as JsonSchema>::schema_name()
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

/// Close every object schema and mark all of its properties required.
fn fix_object_schemas(value: &mut serde_json::Value) {
    if let serde_json::Value::Object(map) = value {
        if map.get("type") == Some(&serde_json::Value::String("object".to_string())) {
            map.insert(
                "additionalProperties".to_string(),
                serde_json::Value::Bool(false),
            );

            if let Some(serde_json::Value::Object(props)) = map.get("properties") {
                let all_keys: Vec<serde_json::Value> = props
                    .keys()
                    .map(|k| serde_json::Value::String(k.clone()))
                    .collect();
                map.insert("required".to_string(), serde_json::Value::Array(all_keys));
            }
        }

        for (_, v) in map.iter_mut() {
            fix_object_schemas(v);
        }
    } else if let serde_json::Value::Array(arr) = value {
        for item in arr.iter_mut() {
            fix_object_schemas(item);
        }
    }
}

/// Replace `$ref` pointers with the referenced definition bodies.
fn inline_refs(value: &mut serde_json::Value) {
    let definitions = if let serde_json::Value::Object(map) = value {
        map.get("definitions").cloned()
    } else {
        None
    };

    if let Some(defs) = definitions {
        inline_refs_recursive(value, &defs);
    }
}

fn inline_refs_recursive(value: &mut serde_json::Value, definitions: &serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(ref_path)) = map.get("$ref").cloned() {
                if ref_path.starts_with("#/definitions/") {
                    let type_name = ref_path.trim_start_matches("#/definitions/");
                    if let Some(def) = definitions.get(type_name) {
                        *value = def.clone();
                        inline_refs_recursive(value, definitions);
                        return;
                    }
                }
            }

            // schemars wraps single refs in allOf; unwrap before descending.
            if let Some(serde_json::Value::Array(all_of)) = map.get("allOf").cloned() {
                if all_of.len() == 1 {
                    *value = all_of.into_iter().next().unwrap();
                    inline_refs_recursive(value, definitions);
                    return;
                }
            }

            for (_, v) in map.iter_mut() {
                inline_refs_recursive(v, definitions);
            }
        }
        serde_json::Value::Array(arr) => {
            for item in arr.iter_mut() {
                inline_refs_recursive(item, definitions);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    struct Verdict {
        score: f64,
        label: Option<String>,
    }

    #[derive(Deserialize, JsonSchema)]
    struct VerdictList {
        verdicts: Vec<Verdict>,
    }

    #[test]
    fn schema_is_an_object() {
        let schema = VerdictList::strict_schema();
        assert!(schema.is_object());
        assert!(!schema.as_object().unwrap().contains_key("$schema"));
    }

    #[test]
    fn objects_are_closed() {
        let schema = VerdictList::strict_schema();
        let rendered = serde_json::to_string(&schema).unwrap();
        assert!(rendered.contains("additionalProperties"));
    }

    #[test]
    fn nullable_fields_are_still_required() {
        let schema = Verdict::strict_schema();
        let required = schema
            .as_object()
            .unwrap()
            .get("required")
            .expect("required array")
            .as_array()
            .unwrap();
        let names: Vec<&str> = required.iter().filter_map(|v| v.as_str()).collect();

        assert!(names.contains(&"score"));
        assert!(names.contains(&"label"));
    }

    #[test]
    fn nested_types_are_inlined() {
        let schema = VerdictList::strict_schema();
        let root = schema.as_object().unwrap();
        assert!(!root.contains_key("definitions"));

        let items = root["properties"]["verdicts"]["items"]
            .as_object()
            .expect("inlined item schema");
        assert!(!items.contains_key("$ref"));
        assert_eq!(
            items.get("additionalProperties"),
            Some(&serde_json::Value::Bool(false))
        );
    }
}

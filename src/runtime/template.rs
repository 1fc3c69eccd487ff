/// Dot-path lookup and `{{ input.path }}` template rendering
///
/// Paths walk objects by key and arrays by numeric index:
/// `user.roles.0` -> `input["user"]["roles"][0]`. Anything missing resolves
/// to `Value::Null`, which stringifies as "".

use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::OnceLock;

/// Resolve a dot path inside `data`
pub fn lookup<'a>(data: &'a Value, path: &str) -> &'a Value {
    let path = path.trim();
    if path.is_empty() {
        return data;
    }

    let mut current = data;
    for part in path.split('.') {
        current = match current {
            Value::Object(obj) => obj.get(part).unwrap_or(&Value::Null),
            Value::Array(items) => part
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index))
                .unwrap_or(&Value::Null),
            _ => return &Value::Null,
        };
    }
    current
}

/// Text form of a value as used in comparisons and templates
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn placeholder() -> Option<&'static Regex> {
    static PLACEHOLDER: OnceLock<Option<Regex>> = OnceLock::new();
    PLACEHOLDER
        .get_or_init(|| Regex::new(r"\{\{\s*input((?:\.[A-Za-z0-9_\-]+)*)\s*\}\}").ok())
        .as_ref()
}

/// Replace every `{{ input... }}` placeholder with the value it names
pub fn render(template: &str, input: &Value) -> String {
    let Some(placeholder) = placeholder().filter(|_| template.contains("{{")) else {
        return template.to_string();
    };

    placeholder
        .replace_all(template, |caps: &Captures| {
            let path = caps.get(1).map_or("", |m| m.as_str().trim_start_matches('.'));
            stringify(lookup(input, path))
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_walks_objects_and_arrays() {
        let data = json!({ "user": { "name": "Ada", "roles": ["admin", "member"] }, "count": 3 });

        assert_eq!(lookup(&data, "user.name"), &json!("Ada"));
        assert_eq!(lookup(&data, "user.roles.1"), &json!("member"));
        assert_eq!(lookup(&data, "count"), &json!(3));
        assert_eq!(lookup(&data, "user.missing.deeper"), &Value::Null);
        assert_eq!(lookup(&data, "count.value"), &Value::Null);
        assert_eq!(lookup(&data, ""), &data);
    }

    #[test]
    fn stringify_matches_json_text() {
        assert_eq!(stringify(&Value::Null), "");
        assert_eq!(stringify(&json!("open")), "open");
        assert_eq!(stringify(&json!(2.5)), "2.5");
        assert_eq!(stringify(&json!(true)), "true");
        assert_eq!(stringify(&json!({ "a": 1 })), r#"{"a":1}"#);
    }

    #[test]
    fn render_substitutes_placeholders() {
        let input = json!({ "resource": { "id": 12 }, "user": { "name": "Ada" } });

        assert_eq!(
            render("https://hooks.local/{{ input.resource.id }}?by={{input.user.name}}", &input),
            "https://hooks.local/12?by=Ada"
        );
        assert_eq!(render("{{ input.nope }}-x", &input), "-x");
        assert_eq!(render("{{ input }}", &json!({ "a": 1 })), r#"{"a":1}"#);
        assert_eq!(render("{{ other.thing }}", &input), "{{ other.thing }}");
        assert_eq!(render("plain", &input), "plain");
    }
}

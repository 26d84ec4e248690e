//! Generic webhook templating

/// Substitute `$title` and `$content` in `template`
///
/// With `json` set, values are escaped for use inside a JSON string literal.
pub fn render_template(template: &str, title: &str, content: &str, json: bool) -> String {
    let escape = |value: &str| {
        if json {
            let quoted = serde_json::Value::String(value.to_string()).to_string();
            quoted[1..quoted.len() - 1].to_string()
        } else {
            value.to_string()
        }
    };
    template
        .replace("$title", &escape(title))
        .replace("$content", &escape(content))
}

/// `Name: value` pairs, one per line
///
/// Lines without a colon or with an empty name are ignored.
pub fn parse_headers(raw: &str) -> Vec<(String, String)> {
    raw.lines()
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
        })
        .collect()
}

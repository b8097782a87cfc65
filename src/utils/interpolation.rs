use crate::context::{Context, Value};

/// Interpolate a template string, replacing `{{name}}` tokens with context values.
///
/// - Whitespace around the token content is ignored: `{{  var  }}` == `{{var}}`.
/// - Unknown tokens are left intact to aid debugging.
/// - Non-text values are rendered with their `Display` form (`42`, `[a, b]`, `<desktop>`).
pub fn interpolate(template: &str, ctx: &Context) -> String {
    interpolate_with(template, |name| ctx.get(name).map(|value| render(&value)))
}

/// Same as [`interpolate`] over an arbitrary lookup.
pub fn interpolate_with<F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    if !template.contains("{{") {
        return template.to_string();
    }

    let mut out = String::with_capacity(template.len());
    let mut idx = 0;
    let bytes = template.as_bytes();

    while let Some(start) = find_subslice(bytes, b"{{", idx) {
        out.push_str(&template[idx..start]);

        let content_start = start + 2;
        let Some(end) = find_subslice(bytes, b"}}", content_start) else {
            // No matching end, keep the rest verbatim
            out.push_str(&template[start..]);
            return out;
        };

        let token = template[content_start..end].trim();
        let original = &template[start..end + 2];
        match (!token.is_empty()).then(|| lookup(token)).flatten() {
            Some(replaced) => out.push_str(&replaced),
            None => out.push_str(original),
        }
        idx = end + 2;
    }

    if idx < template.len() {
        out.push_str(&template[idx..]);
    }
    out
}

fn render(value: &Value) -> String {
    match value {
        Value::Text(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Find the first occurrence of `needle` in `haystack` starting at `from`.
fn find_subslice(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}

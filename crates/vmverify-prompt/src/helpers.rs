//! Built-in template helpers
//!
//! The helper set is closed: string operations, integer math, array
//! accessors, ordinal word conversion, default, formatArray, contains,
//! lastRowLabel, and maxSlotNumber. Comparison helpers (`eq`, `gt`, ...)
//! come with the handlebars runtime itself.

use handlebars::{
    Context, Handlebars, Helper, HelperDef, HelperResult, Output, RenderContext,
    RenderErrorReason, handlebars_helper,
};
use serde_json::Value;

handlebars_helper!(upper: |s: str| s.to_uppercase());
handlebars_helper!(lower: |s: str| s.to_lowercase());
handlebars_helper!(trim: |s: str| s.trim().to_string());

handlebars_helper!(split: |s: str, separator: str| {
    s.split(separator)
        .map(|part| Value::String(part.to_string()))
        .collect::<Vec<_>>()
});

handlebars_helper!(join: |values: Json, separator: str| {
    values
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(render_scalar)
                .collect::<Vec<_>>()
                .join(separator)
        })
        .unwrap_or_default()
});

handlebars_helper!(add: |a: i64, b: i64| a + b);
handlebars_helper!(sub: |a: i64, b: i64| a - b);
handlebars_helper!(mul: |a: i64, b: i64| a * b);
handlebars_helper!(div: |a: i64, b: i64| if b == 0 { 0 } else { a / b });

handlebars_helper!(len: |values: Json| {
    match values {
        Value::Array(items) => items.len() as i64,
        Value::String(s) => s.chars().count() as i64,
        _ => 0,
    }
});

handlebars_helper!(first: |values: Json| {
    values.as_array().and_then(|items| items.first().cloned()).unwrap_or(Value::Null)
});

handlebars_helper!(last: |values: Json| {
    values.as_array().and_then(|items| items.last().cloned()).unwrap_or(Value::Null)
});

handlebars_helper!(index: |values: Json, position: u64| {
    values
        .as_array()
        .and_then(|items| items.get(position as usize).cloned())
        .unwrap_or(Value::Null)
});

handlebars_helper!(ordinal: |n: u64| ordinal_word(n));

handlebars_helper!(default: |value: Json, fallback: Json| {
    if value.is_null() { fallback.clone() } else { value.clone() }
});

handlebars_helper!(format_array: |values: Json| {
    values
        .as_array()
        .map(|items| items.iter().map(render_scalar).collect::<Vec<_>>().join(", "))
        .unwrap_or_default()
});

handlebars_helper!(contains: |haystack: Json, needle: Json| {
    match haystack {
        Value::Array(items) => items.contains(needle),
        Value::String(s) => needle.as_str().is_some_and(|needle_str| s.contains(needle_str)),
        _ => false,
    }
});

handlebars_helper!(last_row_label: |row_count: u64| {
    let offset = row_count.saturating_sub(1).min(25) as u8;
    ((b'A' + offset) as char).to_string()
});

handlebars_helper!(max_slot_number: |columns: u64| format!("{columns:02}"));

/// `printf` helper: a format string with `%s`/`%d`/`%v` placeholders filled
/// from the remaining arguments in order.
struct PrintfHelper;

impl HelperDef for PrintfHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        helper: &Helper<'rc>,
        _registry: &'reg Handlebars<'reg>,
        _context: &'rc Context,
        _render_context: &mut RenderContext<'reg, 'rc>,
        output: &mut dyn Output,
    ) -> HelperResult {
        let format = helper
            .param(0)
            .and_then(|p| p.value().as_str())
            .ok_or_else(|| {
                RenderErrorReason::ParamTypeMismatchForName(
                    "printf",
                    "0".to_string(),
                    "string".to_string(),
                )
            })?;

        let mut rendered = String::with_capacity(format.len());
        let mut next_arg = 1;
        let mut chars = format.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '%' {
                match chars.peek() {
                    Some('s' | 'd' | 'v') => {
                        chars.next();
                        let value = helper
                            .param(next_arg)
                            .map(|p| render_scalar(p.value()))
                            .unwrap_or_default();
                        rendered.push_str(&value);
                        next_arg += 1;
                    }
                    Some('%') => {
                        chars.next();
                        rendered.push('%');
                    }
                    _ => rendered.push('%'),
                }
            } else {
                rendered.push(c);
            }
        }
        output.write(&rendered)?;
        Ok(())
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// English ordinal word for small numbers, `Nth` beyond ten.
fn ordinal_word(n: u64) -> String {
    match n {
        1 => "first".to_string(),
        2 => "second".to_string(),
        3 => "third".to_string(),
        4 => "fourth".to_string(),
        5 => "fifth".to_string(),
        6 => "sixth".to_string(),
        7 => "seventh".to_string(),
        8 => "eighth".to_string(),
        9 => "ninth".to_string(),
        10 => "tenth".to_string(),
        other => format!("{other}th"),
    }
}

/// Register the closed helper set on a handlebars registry.
pub fn register_helpers(registry: &mut Handlebars<'_>) {
    registry.register_helper("upper", Box::new(upper));
    registry.register_helper("lower", Box::new(lower));
    registry.register_helper("trim", Box::new(trim));
    registry.register_helper("split", Box::new(split));
    registry.register_helper("join", Box::new(join));
    registry.register_helper("add", Box::new(add));
    registry.register_helper("sub", Box::new(sub));
    registry.register_helper("mul", Box::new(mul));
    registry.register_helper("div", Box::new(div));
    registry.register_helper("len", Box::new(len));
    registry.register_helper("first", Box::new(first));
    registry.register_helper("last", Box::new(last));
    registry.register_helper("index", Box::new(index));
    registry.register_helper("ordinal", Box::new(ordinal));
    registry.register_helper("default", Box::new(default));
    registry.register_helper("formatArray", Box::new(format_array));
    registry.register_helper("contains", Box::new(contains));
    registry.register_helper("lastRowLabel", Box::new(last_row_label));
    registry.register_helper("maxSlotNumber", Box::new(max_slot_number));
    registry.register_helper("printf", Box::new(PrintfHelper));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(template: &str, data: &Value) -> String {
        let mut registry = Handlebars::new();
        register_helpers(&mut registry);
        registry.render_template(template, data).unwrap()
    }

    #[test]
    fn test_string_helpers() {
        assert_eq!(render("{{upper name}}", &json!({"name": "row a"})), "ROW A");
        assert_eq!(render("{{lower name}}", &json!({"name": "ROW A"})), "row a");
        assert_eq!(render("{{trim name}}", &json!({"name": "  x  "})), "x");
        assert_eq!(
            render("{{join (split csv \",\") \" | \"}}", &json!({"csv": "a,b,c"})),
            "a | b | c"
        );
    }

    #[test]
    fn test_integer_math() {
        assert_eq!(render("{{add 2 3}}", &json!({})), "5");
        assert_eq!(render("{{sub 9 4}}", &json!({})), "5");
        assert_eq!(render("{{mul 3 4}}", &json!({})), "12");
        assert_eq!(render("{{div 10 2}}", &json!({})), "5");
        assert_eq!(render("{{div 10 0}}", &json!({})), "0");
    }

    #[test]
    fn test_array_helpers() {
        let data = json!({"rows": ["A", "B", "C"]});
        assert_eq!(render("{{len rows}}", &data), "3");
        assert_eq!(render("{{first rows}}", &data), "A");
        assert_eq!(render("{{last rows}}", &data), "C");
        assert_eq!(render("{{index rows 1}}", &data), "B");
        assert_eq!(render("{{formatArray rows}}", &data), "A, B, C");
    }

    #[test]
    fn test_ordinal_words() {
        assert_eq!(render("{{ordinal 1}}", &json!({})), "first");
        assert_eq!(render("{{ordinal 3}}", &json!({})), "third");
        assert_eq!(render("{{ordinal 10}}", &json!({})), "tenth");
        assert_eq!(render("{{ordinal 23}}", &json!({})), "23th");
    }

    #[test]
    fn test_default_helper() {
        assert_eq!(render("{{default missing \"n/a\"}}", &json!({})), "n/a");
        assert_eq!(
            render("{{default present \"n/a\"}}", &json!({"present": "yes"})),
            "yes"
        );
    }

    #[test]
    fn test_contains() {
        let data = json!({"rows": ["A", "B"], "text": "Row A: Full"});
        assert_eq!(render("{{contains rows \"A\"}}", &data), "true");
        assert_eq!(render("{{contains rows \"Z\"}}", &data), "false");
        assert_eq!(render("{{contains text \"Full\"}}", &data), "true");
    }

    #[test]
    fn test_machine_label_helpers() {
        assert_eq!(render("{{lastRowLabel 1}}", &json!({})), "A");
        assert_eq!(render("{{lastRowLabel 6}}", &json!({})), "F");
        // Capped at Z.
        assert_eq!(render("{{lastRowLabel 99}}", &json!({})), "Z");
        assert_eq!(render("{{maxSlotNumber 5}}", &json!({})), "05");
        assert_eq!(render("{{maxSlotNumber 12}}", &json!({})), "12");
    }

    #[test]
    fn test_printf() {
        assert_eq!(
            render(
                "{{printf \"%s has %d rows\" name count}}",
                &json!({"name": "VM-7", "count": 6})
            ),
            "VM-7 has 6 rows"
        );
        assert_eq!(render("{{printf \"100%% sure\"}}", &json!({})), "100% sure");
        assert_eq!(render("{{printf \"%v\" flag}}", &json!({"flag": true})), "true");
    }

    #[test]
    fn test_builtin_comparison_available() {
        assert_eq!(render("{{#if (gt 3 1)}}yes{{/if}}", &json!({})), "yes");
        assert_eq!(
            render("{{#if (eq a b)}}same{{else}}diff{{/if}}", &json!({"a": 1, "b": 2})),
            "diff"
        );
    }
}

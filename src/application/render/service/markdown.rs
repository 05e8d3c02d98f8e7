//! Placeholder substitution into markdown template bodies.

use std::collections::HashMap;

use time::format_description::well_known::Rfc3339;

use crate::application::render::types::RenderError;
use crate::domain::injection::{ImageValue, InjectedValue, InjectionKey, TableValue};
use crate::domain::templates::{TemplateDefinition, TemplateSegment, scan_placeholders};

/// Replaces every `{{ name }}` in the body with its value formatted as markdown.
pub(crate) fn substitute(
    template: &TemplateDefinition,
    values: &HashMap<InjectionKey, InjectedValue>,
) -> Result<String, RenderError> {
    let by_name: HashMap<&str, &InjectedValue> = template
        .placeholders
        .iter()
        .filter_map(|key| values.get(key).map(|value| (key.name(), value)))
        .collect();

    let mut markdown = String::with_capacity(template.body.len());
    for segment in scan_placeholders(&template.body) {
        match segment {
            TemplateSegment::Text(text) => markdown.push_str(text),
            TemplateSegment::Placeholder(name) => {
                let value = by_name.get(name).ok_or_else(|| RenderError::MissingValue {
                    name: name.to_string(),
                })?;
                write_value(&mut markdown, name, value)?;
            }
        }
    }
    Ok(markdown)
}

fn write_value(out: &mut String, name: &str, value: &InjectedValue) -> Result<(), RenderError> {
    match value {
        InjectedValue::String(text) => push_inline(out, text),
        InjectedValue::Number(number) => push_inline(out, &format_number(*number)),
        InjectedValue::Bool(flag) => out.push_str(if *flag { "true" } else { "false" }),
        InjectedValue::Time(at) => {
            let formatted = at.format(&Rfc3339).map_err(|err| RenderError::Value {
                name: name.to_string(),
                message: err.to_string(),
            })?;
            push_inline(out, &formatted);
        }
        InjectedValue::Image(image) => push_image(out, name, image),
        InjectedValue::Table(table) => push_table(out, table),
        InjectedValue::List(items) => {
            if !items.is_empty() {
                out.push_str("\n\n");
                for item in items {
                    out.push_str("- ");
                    push_inline(out, item);
                    out.push('\n');
                }
                out.push('\n');
            }
        }
    }
    Ok(())
}

fn format_number(number: f64) -> String {
    if number.fract() == 0.0 && number.abs() < 1e15 {
        format!("{}", number as i64)
    } else {
        number.to_string()
    }
}

/// Appends text so markdown treats it literally.
fn push_inline(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\n' | '\r' => out.push(' '),
            c if c.is_ascii_punctuation() => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
}

fn push_image(out: &mut String, name: &str, image: &ImageValue) {
    out.push_str("![");
    push_inline(out, name);
    out.push_str("](<");
    for c in image.source().chars() {
        match c {
            ' ' => out.push_str("%20"),
            '<' => out.push_str("%3C"),
            '>' => out.push_str("%3E"),
            '\n' | '\r' => {}
            c => out.push(c),
        }
    }
    out.push_str(">)");
}

fn push_table(out: &mut String, table: &TableValue) {
    out.push_str("\n\n|");
    for column in table.columns() {
        out.push(' ');
        push_inline(out, column);
        out.push_str(" |");
    }
    out.push_str("\n|");
    for _ in table.columns() {
        out.push_str(" --- |");
    }
    out.push('\n');
    for row in table.rows() {
        out.push('|');
        for cell in row {
            out.push(' ');
            push_inline(out, cell);
            out.push_str(" |");
        }
        out.push('\n');
    }
    out.push('\n');
}

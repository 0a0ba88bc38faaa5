//! One-shot rendering of an element tree to markup, without a host.

use crate::element::{Element, PropValue};
use crate::error::RenderError;
use crate::hooks::Hooks;

/// Serializes `element` to markup.
///
/// Components run once with hooks that never persist: state hooks return
/// their initial value, setters are inert, and effects are skipped.
pub fn render_to_string(element: &Element) -> Result<String, RenderError> {
    let mut out = String::new();
    write_element(element, false, &mut out)?;
    Ok(out)
}

/// `in_list` is set for items of a list; a list there is skipped, matching
/// the client reconciler.
fn write_element(element: &Element, in_list: bool, out: &mut String) -> Result<(), RenderError> {
    match element {
        Element::Host { tag, props, .. } => {
            open_tag(tag, props.attributes(), out);
            write_element(&props.children_element(), false, out)?;
            close_tag(tag, out);
        }
        Element::Component {
            component, props, ..
        } => {
            let mut hooks = Hooks::server();
            let rendered =
                component
                    .render(&mut hooks, props)
                    .map_err(|source| RenderError::Component {
                        component: component.name(),
                        source,
                    })?;
            write_element(&rendered, false, out)?;
        }
        Element::Text(text) => escape_into(text, out),
        Element::List(_) if in_list => {
            log::warn!("nested element lists are not supported; skipping");
        }
        Element::List(items) => {
            for item in items {
                write_element(item, true, out)?;
            }
        }
        Element::Empty => {}
    }
    Ok(())
}

pub(crate) fn open_tag<'a, K: AsRef<str>>(
    tag: &str,
    attributes: impl Iterator<Item = (K, &'a PropValue)>,
    out: &mut String,
) {
    out.push('<');
    out.push_str(tag);
    for (key, value) in attributes {
        // opaque values such as callbacks have no markup form
        let Some(value) = value.to_markup() else {
            continue;
        };
        out.push(' ');
        out.push_str(key.as_ref());
        out.push_str("=\"");
        escape_into(&value, out);
        out.push('"');
    }
    out.push('>');
}

pub(crate) fn close_tag(tag: &str, out: &mut String) {
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

pub(crate) fn escape_into(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

#[cfg(test)]
#[path = "tests/server_tests.rs"]
mod tests;

//! Locale files nest translation keys to any depth. Every leaf becomes a
//! record whose section is the dotted path of its parent.

use super::Emitter;
use serde_json::{Map, Value};

pub(super) fn extract(out: &mut Emitter<'_>, root: &Map<String, Value>) {
    walk(out, root, "");
}

fn walk(out: &mut Emitter<'_>, node: &Map<String, Value>, parent: &str) {
    for (key, value) in node {
        match value {
            Value::Object(child) => {
                let path = if parent.is_empty() {
                    key.clone()
                } else {
                    format!("{parent}.{key}")
                };
                walk(out, child, &path);
            }
            // Arrays are values, not structure
            leaf => {
                let section = if parent.is_empty() { key.as_str() } else { parent };
                out.emit(section, "", key, leaf);
            }
        }
    }
}

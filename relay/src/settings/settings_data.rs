//! `config/settings_data.json` holds the theme wide settings under `current`,
//! optionally flattened `current.*` keys, a `sections` map and a few root
//! scalars next to the presets.

use super::{Emitter, template};
use serde_json::{Map, Value};

const CURRENT: &str = "current";
const CURRENT_PREFIX: &str = "current.";
const CURRENT_SECTIONS_PREFIX: &str = "current.sections.";
const ROOT_SECTION: &str = "root";

pub(super) fn extract(out: &mut Emitter<'_>, root: &Map<String, Value>) {
    for (key, value) in root {
        match (key.as_str(), value) {
            (CURRENT, Value::Object(current)) => extract_current(out, current),
            ("sections", Value::Object(sections)) => template::extract_sections(out, sections, ""),
            (key, Value::Object(entries)) if key.starts_with(CURRENT_PREFIX) => {
                for (setting, value) in entries {
                    out.emit(key, "", setting, value);
                }
            }
            // presets and any other nested payloads
            (_, Value::Object(_)) => {}
            (key, value) => out.emit(ROOT_SECTION, "", key, value),
        }
    }
}

fn extract_current(out: &mut Emitter<'_>, current: &Map<String, Value>) {
    for (key, value) in current {
        match (key.as_str(), value) {
            ("sections", Value::Object(sections)) => {
                template::extract_sections(out, sections, CURRENT_SECTIONS_PREFIX)
            }
            (_, Value::Object(_)) => {}
            (key, value) => out.emit(CURRENT, "", key, value),
        }
    }
}

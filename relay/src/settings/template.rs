//! Section/block traversal shared by template files and the section payloads
//! of `config/settings_data.json`.

use super::Emitter;
use serde_json::{Map, Value};

pub(super) fn extract(out: &mut Emitter<'_>, root: &Map<String, Value>) {
    if let Some(Value::Object(sections)) = root.get("sections") {
        extract_sections(out, sections, "");
    }
}

/// Emits the settings of every section, naming each section `prefix + key`.
pub(super) fn extract_sections(out: &mut Emitter<'_>, sections: &Map<String, Value>, prefix: &str) {
    for (key, section) in sections {
        let Value::Object(section) = section else {
            continue;
        };
        let section_name = format!("{prefix}{key}");

        if let Some(Value::Object(settings)) = section.get("settings") {
            for (setting, value) in settings {
                out.emit(&section_name, "", setting, value);
            }
        }

        if let Some(Value::Object(blocks)) = section.get("blocks") {
            extract_blocks(out, &section_name, blocks);
        }
    }
}

// Blocks may nest further blocks; every level reports its own key.
fn extract_blocks(out: &mut Emitter<'_>, section_name: &str, blocks: &Map<String, Value>) {
    for (block_key, block) in blocks {
        let Value::Object(block) = block else {
            continue;
        };

        if let Some(Value::Object(settings)) = block.get("settings") {
            for (setting, value) in settings {
                out.emit(section_name, block_key, setting, value);
            }
        }

        if let Some(Value::Object(nested)) = block.get("blocks") {
            extract_blocks(out, section_name, nested);
        }
    }
}

//! Markdown run report for the reviewer of the resulting diff.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use cardwatch_core::AppliedChangeSet;
use serde_json::Value;

const REVIEW_CHECKLIST: &[&str] = &[
    "Open each citation and confirm it states the new value",
    "Check the citation is the issuer's own page or a reputable source",
    "Confirm values kept their units (dollars, percent, points)",
    "Skim the diff for formatting changes outside the listed fields",
];

/// One section per card listing `field: old → new (citation)`, then the
/// reviewer checklist. `None` when nothing was applied.
pub fn summarize(sets: &[AppliedChangeSet]) -> Option<String> {
    let total: usize = sets.iter().map(|s| s.changes.len()).sum();
    if total == 0 {
        return None;
    }

    let mut out = String::from("# Card data update report\n\n");
    out.push_str(&format!(
        "{total} change(s) across {} card(s).\n",
        sets.iter().filter(|s| !s.changes.is_empty()).count()
    ));

    for set in sets.iter().filter(|s| !s.changes.is_empty()) {
        out.push_str(&format!("\n## {} (`{}`)\n\n", set.record_name, set.record_id));
        for c in &set.changes {
            out.push_str(&format!(
                "- `{}`: {} → {} ({})\n",
                c.field_path,
                display_value(&c.old_value),
                display_value(&c.new_value),
                c.citation_url
            ));
        }
    }

    out.push_str("\n## Reviewer checklist\n\n");
    for item in REVIEW_CHECKLIST {
        out.push_str(&format!("- [ ] {item}\n"));
    }
    Some(out)
}

fn display_value(v: &Value) -> String {
    match v {
        Value::Null => "(absent)".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Write `report` to `path`, or remove a report left by an earlier run when
/// there is nothing to say. Returns whether a report now exists.
pub fn write_report(path: &Path, report: Option<&str>) -> std::io::Result<bool> {
    match report {
        Some(text) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, text)?;
            Ok(true)
        }
        None => match fs::remove_file(path) {
            Ok(()) => Ok(false),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        },
    }
}

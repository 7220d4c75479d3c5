//! Renders a changeset into the user prompt sent to the review generator.

use std::fmt::Write;

use crate::model::Changeset;

/// Metadata first, then the changed files, then the full diff.
pub fn render_changeset(changeset: &Changeset) -> String {
    let mut out = String::new();
    let r = &changeset.reference;

    // Writing into a String cannot fail.
    let _ = writeln!(out, "# Pull request");
    let _ = writeln!(out);
    let _ = writeln!(out, "- owner: {}", r.owner);
    let _ = writeln!(out, "- repo: {}", r.repo);
    let _ = writeln!(out, "- number: {}", r.number);
    let _ = writeln!(out, "- url: {}", changeset.url);
    let _ = writeln!(out, "- title: {}", changeset.title);
    let _ = writeln!(out, "- base: {}", changeset.base_sha);
    let _ = writeln!(out, "- head: {}", changeset.head_sha);
    let _ = writeln!(out);
    let _ = writeln!(out, "## Description");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{}",
        changeset
            .description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or("(no description)")
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "## Changed files ({})", changeset.changed_files.len());
    let _ = writeln!(out);
    for f in &changeset.changed_files {
        let _ = writeln!(
            out,
            "- {} ({}, +{}/-{})",
            f.filename, f.status, f.additions, f.deletions
        );
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "## Diff");
    let _ = writeln!(out);
    let _ = writeln!(out, "```diff");
    let _ = writeln!(out, "{}", changeset.unified_diff.trim_end());
    let _ = writeln!(out, "```");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::sample_changeset;

    #[test]
    fn prompt_lists_metadata_files_and_diff_in_order() {
        let prompt = render_changeset(&sample_changeset(3));
        let title = prompt.find("- title:").unwrap();
        let files = prompt.find("## Changed files (3)").unwrap();
        let diff = prompt.find("```diff").unwrap();
        assert!(title < files && files < diff);
        assert!(prompt.contains("- src/file_2.rs (modified, +3/-1)"));
    }

    #[test]
    fn missing_description_is_marked() {
        let mut changeset = sample_changeset(0);
        changeset.description = None;
        assert!(render_changeset(&changeset).contains("(no description)"));
    }
}

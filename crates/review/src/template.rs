//! Org-mode rendering of the final report.

use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::model::{Changeset, Review};
use crate::roles::Role;

/// Render the report for `changeset`.
///
/// Reviews are emitted in [`Role::ALL`] order whatever order they arrived
/// in. Roles missing from `reviews` are skipped.
pub fn render_report(
    changeset: &Changeset,
    reviews: &BTreeMap<Role, Review>,
    generated_at: DateTime<Utc>,
) -> String {
    let mut out = String::new();
    let r = &changeset.reference;

    let _ = writeln!(out, "#+TITLE: Pull request review: {}", changeset.title);
    let _ = writeln!(
        out,
        "#+DATE: {}",
        generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    let _ = writeln!(out, "#+PROPERTY: PR_URL {}", changeset.url);
    let _ = writeln!(out, "#+PROPERTY: REPO {}/{}", r.owner, r.repo);
    let _ = writeln!(out, "#+PROPERTY: PR_NUMBER {}", r.number);
    let _ = writeln!(out, "#+PROPERTY: BASE_SHA {}", changeset.base_sha);
    let _ = writeln!(out, "#+PROPERTY: HEAD_SHA {}", changeset.head_sha);
    let _ = writeln!(out);

    let _ = writeln!(out, "* Changed files ({})", changeset.changed_files.len());
    for f in &changeset.changed_files {
        let _ = writeln!(
            out,
            "- {} ({}, +{}/-{})",
            f.filename, f.status, f.additions, f.deletions
        );
    }

    for role in Role::ALL {
        if let Some(review) = reviews.get(&role) {
            let _ = writeln!(out);
            let _ = writeln!(out, "{}", review.text.trim());
        }
    }

    out
}

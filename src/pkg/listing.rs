//! `list` magic output

use super::{Origin, PackageRecord, PackageSet};
use crate::magic::ListKind;

const HEADERS: [&str; 4] = ["Name", "Version", "Build", "Channel"];

/// Render installed packages as an aligned table, sorted by name
pub fn format_package_list(installed: &PackageSet, kind: ListKind) -> String {
    let mut records: Vec<&PackageRecord> = installed
        .iter()
        .filter(|(origin, _)| kind == ListKind::All || *origin == Origin::Pip)
        .map(|(_, r)| r)
        .collect();
    records.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.version.cmp(&b.version)));

    let rows: Vec<[&str; 4]> = records
        .iter()
        .map(|r| {
            [
                r.name.as_str(),
                r.version.as_str(),
                r.build_string.as_str(),
                r.repo_name.as_str(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    let mut out = String::new();
    push_row(&mut out, &HEADERS, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_row(&mut out, &rule.iter().map(String::as_str).collect::<Vec<_>>(), &widths);
    for row in &rows {
        push_row(&mut out, row, &widths);
    }
    out
}

fn push_row(out: &mut String, cells: &[&str], widths: &[usize; 4]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, w)| format!("{:<width$}", cell, width = *w))
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}

use super::{AuditReport, ReferenceIntegrityWarning};
use crate::closure::KindCounts;
use crate::duplicator::DuplicationResult;
use crate::model::EntityKind;

/// Formats audit reports and duplication results into human-readable text.
pub struct AuditFormatter;

impl AuditFormatter {
    pub fn format_report(report: &AuditReport) -> String {
        let mut out = format!(
            "Audit of '{}' ({}, suffix {}): {} objects, {} reference fields checked\n",
            report.root, report.mode, report.suffix, report.checked_objects, report.checked_fields
        );
        if report.is_clean() {
            out.push_str("  OK, every reference matches\n");
            return out;
        }
        out.push_str(&format!("  {} mismatch(es):\n", report.warnings.len()));
        for warning in &report.warnings {
            out.push_str("  - ");
            out.push_str(&Self::format_warning(warning));
            out.push('\n');
        }
        out
    }

    /// One line per warning, e.g. `variable 'V' sourceRef: expected formula:F-1, found formula:F`.
    pub fn format_warning(warning: &ReferenceIntegrityWarning) -> String {
        format!(
            "{} '{}' {}: expected {}, found {}",
            warning.kind, warning.original_id, warning.field, warning.expected, warning.actual
        )
    }

    pub fn format_result(result: &DuplicationResult) -> String {
        let mut out = format!(
            "Duplicated '{}' as '{}' ({}, suffix {})\n",
            result.original_root, result.root, result.mode, result.suffix
        );
        if let Some(parent) = &result.parent {
            out.push_str(&format!("  attached under '{}'\n", parent));
        }
        out.push_str(&Self::format_counts(&result.counts));
        out.push_str(&format!(
            "  references rewritten: {}, markers cleared: {}\n",
            result.references_rewritten, result.markers_cleared
        ));
        for warning in &result.warnings {
            out.push_str("  ! ");
            out.push_str(&Self::format_warning(warning));
            out.push('\n');
        }
        out
    }

    /// Non-zero counts only, in commit order.
    pub fn format_counts(counts: &KindCounts) -> String {
        let mut out = String::new();
        for kind in EntityKind::ALL {
            let count = counts.get(kind);
            if count > 0 {
                out.push_str(&format!("  {:<15} {}\n", kind.as_str(), count));
            }
        }
        out
    }
}


//! Plain-text views of a report for the terminal.

use crate::duration::format_duration;
use crate::layout::{Layout, Viewport};
use crate::loader::StructuralIssue;
use crate::report::{RecordKind, Report};

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Include instant events in the tree.
    pub instants: bool,
}

/// Indented call tree per thread, one record per line.
pub fn format_report(report: &Report, options: &RenderOptions) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{} threads, {} records, {} .. {}\n",
        report.threads().len(),
        report.record_count(),
        format_duration(report.start_time()),
        format_duration(report.end_time()),
    ));

    for thread in report.threads().values() {
        out.push_str(&format!("\n{} [{}]\n", thread.name, thread.id));
        out.push_str(&format!("{}\n", "-".repeat(72)));
        for (depth, id) in report.walk(thread) {
            let record = report.record(id);
            let indent = 2 * depth;
            match record.kind {
                RecordKind::Scope => out.push_str(&format!(
                    "{:indent$}{:<w$} {:>10}  @ {}\n",
                    "",
                    record.name,
                    format_duration(record.duration()),
                    format_duration(record.time_start),
                    indent = indent,
                    w = 40usize.saturating_sub(indent),
                )),
                RecordKind::Instant if options.instants => out.push_str(&format!(
                    "{:indent$}* {:<w$} {:>8}  @ {}\n",
                    "",
                    record.name,
                    "",
                    format_duration(record.time_start),
                    indent = indent,
                    w = 38usize.saturating_sub(indent),
                )),
                RecordKind::Instant => {}
            }
        }
    }
    out
}

/// One line per structural issue.
pub fn format_issues(issues: &[StructuralIssue]) -> String {
    let mut out = String::new();
    for issue in issues {
        out.push_str(&format!("{issue}\n"));
    }
    out
}

/// Geometry of one viewport: scale, ruler and the visible record boxes.
pub fn format_layout(layout: &Layout, viewport: &Viewport) -> String {
    let (start_px, end_px) = layout.report_extent_px(viewport.zoom);
    let mut out = String::new();
    out.push_str(&format!(
        "zoom {}  {:.3} px/s  report {:.1}..{:.1} px  height {:.0} px\n",
        viewport.zoom,
        layout.pixels_per_second(viewport.zoom),
        start_px,
        end_px,
        layout.total_height(),
    ));
    out.push_str(&format!(
        "viewport {}x{} at ({:.1}, {:.1})\n",
        viewport.width, viewport.height, viewport.offset_x, viewport.offset_y
    ));

    let labels: Vec<String> = layout
        .ruler_ticks(viewport)
        .into_iter()
        .filter_map(|t| t.label.map(|l| format!("{:.0}:{l}", t.x)))
        .collect();
    out.push_str(&format!("ruler {}\n", labels.join(" ")));

    for row in layout.thread_rows(viewport) {
        out.push_str(&format!(
            "thread {:<20} y {:>8.1}  h {:>6.0}\n",
            row.title, row.y, row.height
        ));
    }

    out.push('\n');
    out.push_str(&format!(
        "{:<40} {:>10} {:>10} {:>8} {:>6}\n",
        "Record", "X", "Width", "Y", "Depth"
    ));
    out.push_str(&format!("{}\n", "-".repeat(78)));
    for b in layout.record_boxes(viewport) {
        out.push_str(&format!(
            "{:<40} {:>10.1} {:>10.1} {:>8.1} {:>6}\n",
            b.label,
            b.x,
            b.width,
            b.y,
            layout.depth_of(b.id)
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutConfig;
    use crate::loader::{LoadOptions, build_report};
    use spanline_runtime::Event;
    use std::sync::Arc;

    fn sample() -> Report {
        let events = vec![
            Event::ThreadName {
                tid: 1,
                name: "main".into(),
            },
            Event::ScopeStart {
                tid: 1,
                name: "parse".into(),
                ts_ns: 0,
            },
            Event::ScopeStart {
                tid: 1,
                name: "lex".into(),
                ts_ns: 1_000_000,
            },
            Event::Instant {
                tid: 1,
                name: "token".into(),
                ts_ns: 2_000_000,
            },
            Event::ScopeEnd {
                tid: 1,
                ts_ns: 4_000_000,
            },
            Event::ScopeEnd {
                tid: 1,
                ts_ns: 10_000_000,
            },
        ];
        build_report(events, &LoadOptions::default()).unwrap().report
    }

    #[test]
    fn tree_is_indented_by_depth() {
        let out = format_report(&sample(), &RenderOptions::default());
        assert!(out.starts_with("1 threads, 3 records"), "{out}");
        assert!(out.contains("main [1]"), "{out}");
        let parse = out.lines().find(|l| l.contains("parse")).unwrap();
        let lex = out.lines().find(|l| l.contains("lex")).unwrap();
        assert!(parse.starts_with("parse"), "{parse}");
        assert!(parse.contains("10ms"), "{parse}");
        assert!(lex.starts_with("  lex"), "{lex}");
        assert!(lex.contains("3ms"), "{lex}");
        assert!(!out.contains("token"), "{out}");
    }

    #[test]
    fn instants_shown_on_request() {
        let out = format_report(&sample(), &RenderOptions { instants: true });
        let token = out.lines().find(|l| l.contains("token")).unwrap();
        assert!(token.starts_with("    * token"), "{token}");
        assert!(token.ends_with("@ 2ms"), "{token}");
    }

    #[test]
    fn layout_lists_visible_boxes() {
        let layout = Layout::new(Arc::new(sample()), LayoutConfig::default());
        let vp = Viewport::new(800.0, 600.0, layout.config());
        let out = format_layout(&layout, &vp);
        assert!(out.contains("128.000 px/s"), "{out}");
        assert!(out.contains("ruler 0:0 48:375ms"), "{out}");
        assert!(out.contains("parse 10ms"), "{out}");
        assert!(out.contains("lex 3ms"), "{out}");
    }
}

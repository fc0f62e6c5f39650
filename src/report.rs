//! Self-contained HTML reports for one student or a whole class.
//!
//! No I/O and no clock reads: dates go through the injected formatter and the
//! "generated" stamp is part of [`ReportOptions`], so the same input gives the same bytes.

use chrono::{DateTime, Utc};

use crate::models::{state_for, MeasureInstance, SharedState, Student, StudentState};

const REPORT_CSS: &str = "body{font-family:system-ui,-apple-system,Segoe UI,Roboto,Ubuntu,Cantarell,Noto Sans,Arial,sans-serif;padding:24px;color:#0f172a}\
h1{font-size:22px;margin:0 0 8px 0}h2{font-size:18px;margin:24px 0 8px 0}h3{font-size:15px;margin:16px 0 6px 0}\
.muted{color:#64748b;font-size:12px}\
.card{border:1px solid #e2e8f0;border-radius:12px;padding:12px;margin:8px 0;background:#fff}\
.student{border:2px solid #e2e8f0;border-radius:12px;padding:12px;margin:12px 0;background:#fff}\
.chip{display:inline-block;border:1px solid #cbd5e1;border-radius:999px;padding:2px 8px;font-size:12px;margin-left:6px}\
.comment{background:#f1f5f9;border-radius:8px;padding:8px;margin:6px 0}\
@media print{body{padding:0}.no-print{display:none}}";

/// Rendering inputs that are not part of the data.
pub struct ReportOptions<'a> {
    pub format_date: &'a dyn Fn(&DateTime<Utc>) -> String,
    pub generated_at: DateTime<Utc>,
}

/// Day/month/year with minutes, the format used when none is injected.
pub fn default_format_date(at: &DateTime<Utc>) -> String {
    at.format("%d/%m/%Y %H:%M").to_string()
}

/// A rendered report and the file name it downloads as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDocument {
    pub filename: String,
    pub html: String,
}

impl ReportDocument {
    pub fn for_student(
        class_name: &str,
        student_name: &str,
        state: &StudentState,
        opts: &ReportOptions<'_>,
    ) -> Self {
        Self {
            filename: report_filename("informe-", student_name),
            html: student_report(class_name, student_name, state, opts),
        }
    }

    pub fn for_class(
        class_name: &str,
        roster: &[Student],
        shared: &SharedState,
        opts: &ReportOptions<'_>,
    ) -> Self {
        Self {
            filename: report_filename("informe-clase-", class_name),
            html: class_report(class_name, roster, shared, opts),
        }
    }
}

/// `<prefix><name>.html` with every whitespace run replaced by `_`.
pub fn report_filename(prefix: &str, name: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + name.len() + 5);
    out.push_str(prefix);
    let mut in_space = false;
    for ch in name.chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out.push_str(".html");
    out
}

/// Escape text for interpolation into element content or attribute values.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

struct Html {
    buf: String,
}

impl Html {
    fn new() -> Self {
        Self {
            buf: String::with_capacity(8 * 1024),
        }
    }
    fn push<S: AsRef<str>>(&mut self, s: S) {
        self.buf.push_str(s.as_ref());
    }
    fn text(&mut self, s: &str) {
        self.buf.push_str(&escape_html(s));
    }
    fn finish(self) -> String {
        self.buf
    }
}

#[derive(Clone, Copy)]
enum Layout {
    /// Standalone student report: measure names as headings, labelled comment block.
    Student,
    /// Section inside a class report: compact cards.
    ClassSection,
}

fn open_document(w: &mut Html, title: &str, opts: &ReportOptions<'_>) {
    w.push("<!doctype html><html><head><meta charset=\"utf-8\"><title>Report ");
    w.text(title);
    w.push("</title><style>");
    w.push(REPORT_CSS);
    w.push("</style></head><body>");
    w.push("<div class=\"no-print\" style=\"text-align:right;margin-bottom:8px;font-size:12px;color:#64748b\">Generated: ");
    w.text(&(opts.format_date)(&opts.generated_at));
    w.push("</div>");
}

fn close_document(mut w: Html) -> String {
    w.push("</body></html>");
    w.finish()
}

/// Render the report of a single student.
pub fn student_report(
    class_name: &str,
    student_name: &str,
    state: &StudentState,
    opts: &ReportOptions<'_>,
) -> String {
    let mut w = Html::new();
    open_document(&mut w, student_name, opts);
    w.push("<h1>Measures report</h1><div class=\"muted\">Class: ");
    w.text(class_name);
    w.push(" &nbsp;&nbsp; Student: ");
    w.text(student_name);
    w.push("</div>");
    measure_sections(&mut w, state, Layout::Student, opts);
    close_document(w)
}

/// Render one section per roster student, in roster order.
pub fn class_report(
    class_name: &str,
    roster: &[Student],
    shared: &SharedState,
    opts: &ReportOptions<'_>,
) -> String {
    let mut w = Html::new();
    open_document(&mut w, class_name, opts);
    w.push("<h1>Class report</h1><div class=\"muted\">Class: ");
    w.text(class_name);
    w.push("</div>");
    for student in roster {
        let state = state_for(shared, &student.id);
        w.push("<div class=\"student\"><h2>");
        w.text(&student.name);
        w.push("</h2>");
        measure_sections(&mut w, &state, Layout::ClassSection, opts);
        w.push("</div>");
    }
    close_document(w)
}

fn measure_sections(w: &mut Html, state: &StudentState, layout: Layout, opts: &ReportOptions<'_>) {
    let heading = match layout {
        Layout::Student => "h2",
        Layout::ClassSection => "h3",
    };

    w.push(format!("<{heading}>Active measures</{heading}>"));
    let mut any = false;
    for m in state.active() {
        any = true;
        measure_card(w, m, layout, opts);
    }
    if !any {
        w.push("<div class=\"card\">No active measures</div>");
    }

    w.push(format!("<{heading}>History</{heading}>"));
    let mut any = false;
    for m in state.history() {
        any = true;
        measure_card(w, m, layout, opts);
    }
    if !any {
        w.push("<div class=\"card\">No history</div>");
    }
}

fn measure_card(w: &mut Html, m: &MeasureInstance, layout: Layout, opts: &ReportOptions<'_>) {
    let fmt = opts.format_date;
    let chip = if m.active { "Active" } else { "Inactive" };

    w.push("<div class=\"card\">");
    match layout {
        Layout::Student => {
            w.push("<h3>");
            w.text(&m.name);
            w.push(format!(" <span class=\"chip\">{chip}</span></h3>"));
        }
        Layout::ClassSection => {
            w.push("<strong>");
            w.text(&m.name);
            w.push(format!("</strong> <span class=\"chip\">{chip}</span>"));
        }
    }

    w.push("<div class=\"muted\">");
    if m.active {
        w.push("Since ");
        w.text(&fmt(&m.started_at));
    } else {
        w.text(&fmt(&m.started_at));
        if let Some(ended) = &m.ended_at {
            w.push(" - ");
            w.text(&fmt(ended));
        }
    }
    w.push("</div>");

    if !m.comments.is_empty() {
        if let Layout::Student = layout {
            w.push("<div style=\"margin-top:6px\"><div class=\"muted\">Comments</div>");
        }
        for c in &m.comments {
            w.push("<div class=\"comment\"><div class=\"muted\">");
            w.text(&fmt(&c.created_at));
            w.push("</div><div>");
            w.text(&c.text);
            w.push("</div></div>");
        }
        if let Layout::Student = layout {
            w.push("</div>");
        }
    }
    w.push("</div>");
}

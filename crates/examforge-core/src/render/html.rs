use crate::model::{BloomLevel, GeneratedTest, QuestionBody, QuestionKind, TosBlueprint};
use crate::render::markdown::title_case;
use std::path::Path;

/// Self-contained printable page for the distribution matrix.
pub fn blueprint_html(bp: &TosBlueprint) -> String {
    let mut html = String::new();
    page_open(&mut html, &format!("Table of Specifications: {}", bp.course));
    html.push_str(&format!(
        "<p>{} &middot; {} &middot; {} items</p>\n",
        escape(&bp.period),
        escape(&bp.school_year),
        bp.total_items
    ));

    html.push_str("<table>\n<tr><th>Topic</th>");
    for level in BloomLevel::ALL {
        html.push_str(&format!("<th>{}</th>", title_case(level.as_str())));
    }
    html.push_str("<th>Total</th></tr>\n");

    for row in &bp.matrix {
        html.push_str(&format!("<tr><td>{}</td>", escape(&row.topic)));
        for cell in &row.cells {
            html.push_str(&format!("<td>{}</td>", cell.items.len()));
        }
        html.push_str(&format!("<td>{}</td></tr>\n", row.total));
    }

    html.push_str("<tr><td><strong>Total</strong></td>");
    for t in bp.level_totals {
        html.push_str(&format!("<td>{}</td>", t));
    }
    html.push_str(&format!("<td>{}</td></tr>\n</table>\n", bp.total_items));
    page_close(&mut html);
    html
}

/// Printable test paper; `with_key` appends the answer key on its own page.
pub fn test_html(test: &GeneratedTest, with_key: bool) -> String {
    let mut html = String::new();
    page_open(&mut html, &test.title);
    html.push_str(&format!(
        "<p>{} &middot; {} &middot; {} &middot; {} items &middot; {} points</p>\n",
        escape(&test.course),
        escape(&test.period),
        escape(&test.school_year),
        test.items.len(),
        test.total_points()
    ));
    html.push_str("<p>Name: ______________________ Date: __________ Score: ______</p>\n");

    for kind in [
        QuestionKind::MultipleChoice,
        QuestionKind::TrueFalse,
        QuestionKind::FillBlank,
        QuestionKind::Matching,
        QuestionKind::Essay,
    ] {
        let section: Vec<_> = test.items.iter().filter(|i| i.body.kind() == kind).collect();
        if section.is_empty() {
            continue;
        }
        html.push_str(&format!("<h2>{}</h2>\n<ol>\n", kind.label()));
        for item in section {
            html.push_str(&format!(
                "<li value=\"{}\">{}",
                item.number,
                escape(&item.text)
            ));
            if let QuestionBody::MultipleChoice { choices, .. } = &item.body {
                html.push_str("<ol type=\"A\">");
                for c in choices {
                    html.push_str(&format!("<li>{}</li>", escape(c)));
                }
                html.push_str("</ol>");
            }
            html.push_str("</li>\n");
        }
        html.push_str("</ol>\n");
    }

    if with_key {
        html.push_str("<hr/>\n<h2>Answer Key</h2>\n<ol>\n");
        for item in &test.items {
            html.push_str(&format!(
                "<li value=\"{}\">{} ({} pt)</li>\n",
                item.number,
                escape(&item.body.answer_text()),
                item.points
            ));
        }
        html.push_str("</ol>\n");
    }
    page_close(&mut html);
    html
}

pub fn write_html(content: &str, out: &Path) -> anyhow::Result<()> {
    std::fs::write(out, content)?;
    Ok(())
}

fn page_open(html: &mut String, title: &str) {
    html.push_str("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"/>");
    html.push_str(&format!("<title>{}</title>", escape(title)));
    html.push_str(
        "<style>body{font-family:serif;margin:2em}table{border-collapse:collapse}\
         td,th{border:1px solid #444;padding:4px 8px;text-align:center}\
         td:first-child{text-align:left}</style>",
    );
    html.push_str("</head><body>\n");
    html.push_str(&format!("<h1>{}</h1>\n", escape(title)));
}

fn page_close(html: &mut String) {
    html.push_str("</body></html>\n");
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

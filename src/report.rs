//! Report model and renderers.
//!
//! The probing core hands over finished tables; this module shapes them into
//! a rectangular report model and renders it — an HTML document built from an
//! embedded template, and optionally a raw JSON dump of the records.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use time::macros::format_description;
use time::OffsetDateTime;

use crate::aggregate::Tables;
use crate::types::ScanResults;

/// One rectangular row of the All Hosts table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRow {
    pub uri: String,
    pub title: String,
    pub status: String,
    pub hash: String,
    pub redirect: String,
}

/// Finished report data handed to a renderer. The column flags say which
/// optional columns the renderer should emit; the rows always carry every
/// field so the model stays rectangular.
#[derive(Debug, Clone, Default)]
pub struct ReportModel {
    pub rows: Vec<HostRow>,
    pub tables: Tables,
    pub show_redirect: bool,
    pub show_notes: bool,
}

/// Build the report model from the finished records and grouped tables.
pub fn build_model(
    results: &ScanResults,
    tables: Tables,
    show_redirect: bool,
    show_notes: bool,
) -> ReportModel {
    let rows = results
        .records
        .iter()
        .map(|(uri, outcome)| HostRow {
            uri: uri.clone(),
            title: outcome.title_field(),
            status: outcome.status_field(),
            hash: outcome.hash_field(),
            redirect: outcome.redirect_field(),
        })
        .collect();
    ReportModel {
        rows,
        tables,
        show_redirect,
        show_notes,
    }
}

/// Timestamp used in the default report filename and the report header,
/// e.g. `tue_04aug2026_1412`.
pub fn report_stamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let format =
        format_description!("[weekday repr:short]_[day][month repr:short][year]_[hour][minute]");
    now.format(&format)
        .map(|s| s.to_lowercase())
        .unwrap_or_else(|_| "scan".to_string())
}

/// Render the model and write the HTML report.
pub fn write_html_report(path: &Path, model: &ReportModel, generated: &str) -> Result<()> {
    fs::write(path, render_html(model, generated))
        .with_context(|| format!("failed to write report to {}", path.display()))
}

/// Dump the raw per-endpoint records as pretty JSON.
pub fn write_results_json(path: &Path, results: &ScanResults) -> Result<()> {
    let file = fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, results).context("failed to serialize results")?;
    Ok(())
}

/// Fill the embedded template with the model's tables.
pub fn render_html(model: &ReportModel, generated: &str) -> String {
    let mut hosts_head = String::from(
        "<th>URI</th><th>Page Title</th><th>Response Code</th><th>Body Hash</th>",
    );
    if model.show_redirect {
        hosts_head.push_str("<th>Redirect</th>");
    }
    if model.show_notes {
        hosts_head.push_str("<th>Notes</th>");
    }

    let mut hosts_rows = String::new();
    for row in &model.rows {
        let uri = escape(&row.uri);
        hosts_rows.push_str("        <tr>");
        hosts_rows.push_str(&format!(
            "<td><a href=\"{uri}\" target=\"_blank\">{uri}</a></td>"
        ));
        hosts_rows.push_str(&format!(
            "<td>{}</td><td>{}</td><td>{}</td>",
            escape(&row.title),
            escape(&row.status),
            escape(&row.hash)
        ));
        if model.show_redirect {
            hosts_rows.push_str(&format!("<td>{}</td>", linkified(&row.redirect)));
        }
        if model.show_notes {
            hosts_rows.push_str("<td></td>");
        }
        hosts_rows.push_str("</tr>\n");
    }

    let mut titles_head = String::from("<th>Page Title</th><th>Count</th>");
    let mut content_head = String::from("<th>Body Hash</th><th>Title</th><th>Count</th>");
    if model.show_notes {
        titles_head.push_str("<th>Notes</th>");
        content_head.push_str("<th>Notes</th>");
    }

    let mut titles_rows = String::new();
    for entry in &model.tables.titles {
        titles_rows.push_str(&format!(
            "        <tr><td>{}</td><td>{}</td>",
            escape(&entry.title),
            entry.count
        ));
        if model.show_notes {
            titles_rows.push_str("<td></td>");
        }
        titles_rows.push_str("</tr>\n");
    }

    let mut content_rows = String::new();
    for entry in &model.tables.content {
        content_rows.push_str(&format!(
            "        <tr><td>{}</td><td>{}</td><td>{}</td>",
            escape(&entry.fingerprint),
            escape(&entry.title),
            entry.count
        ));
        if model.show_notes {
            content_rows.push_str("<td></td>");
        }
        content_rows.push_str("</tr>\n");
    }

    let (celledit_src, celledit_init) = if model.show_notes {
        let hosts_notes_col = 4 + usize::from(model.show_redirect);
        (
            CELLEDIT_SRC.to_string(),
            CELLEDIT_INIT
                .replace("@@HOSTS_NOTES_COL@@", &hosts_notes_col.to_string())
                .replace("@@TITLES_NOTES_COL@@", "2")
                .replace("@@CONTENT_NOTES_COL@@", "3"),
        )
    } else {
        (String::new(), String::new())
    };

    TEMPLATE
        .replace("@@GENERATED@@", &escape(generated))
        .replace("@@CELLEDIT_SRC@@", &celledit_src)
        .replace("@@CELLEDIT_INIT@@", &celledit_init)
        .replace("@@HOSTS_HEAD@@", &hosts_head)
        .replace("@@HOSTS_ROWS@@", &hosts_rows)
        .replace("@@TITLES_HEAD@@", &titles_head)
        .replace("@@TITLES_ROWS@@", &titles_rows)
        .replace("@@CONTENT_HEAD@@", &content_head)
        .replace("@@CONTENT_ROWS@@", &content_rows)
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Redirect cells link out when they carry a URL; plain notes stay text.
fn linkified(field: &str) -> String {
    let text = escape(field);
    if field.starts_with("http://") || field.starts_with("https://") {
        format!("<a href=\"{text}\" target=\"_blank\">{text}</a>")
    } else {
        text
    }
}

const CELLEDIT_SRC: &str = r#"    <script type="text/javascript" charset="utf8" src="./js/dataTables.cellEdit.js"></script>
"#;

const CELLEDIT_INIT: &str = r#"        function onNoteUpdate(updatedCell, updatedRow, oldValue) {
        }
        hosts_table.MakeCellsEditable({
          "onUpdate": onNoteUpdate,
          "columns": [@@HOSTS_NOTES_COL@@]
        });
        titles_table.MakeCellsEditable({
          "onUpdate": onNoteUpdate,
          "columns": [@@TITLES_NOTES_COL@@]
        });
        content_table.MakeCellsEditable({
          "onUpdate": onNoteUpdate,
          "columns": [@@CONTENT_NOTES_COL@@]
        });
"#;

const TEMPLATE: &str = r#"<html>
  <head>
    <title>Scan report for @@GENERATED@@</title>
    <link rel="stylesheet" type="text/css" href="./css/jquery.dataTables.min.css">
    <style type="text/css" class="init">
        body {font-family:Arial;}
    </style>
    <script type="text/javascript" charset="utf8" src="./js/jquery-3.3.1.min.js"></script>
    <script type="text/javascript" charset="utf8" src="./js/jquery.dataTables.min.js"></script>
@@CELLEDIT_SRC@@    <script type="text/javascript" class="init">
      $(document).ready(function () {
        var hosts_table = $('#all_hosts').DataTable({
          "pageLength": 10
        });
        var titles_table = $('#unique_titles').DataTable({
          "initComplete": function () {
            var api = this.api();
            api.$('td').click(function () {
              hosts_table.search(this.innerText).draw();
            });
          }
        });
        var content_table = $('#unique_content').DataTable({
          "initComplete": function () {
            var api = this.api();
            api.$('td').click(function () {
              hosts_table.search(this.innerText).draw();
            });
          }
        });
@@CELLEDIT_INIT@@      });

      function downloadCSV(csv, filename) {
        var blob = new Blob([csv], {type: "text/csv"});
        var link = document.createElement("a");
        link.download = filename;
        link.href = window.URL.createObjectURL(blob);
        link.style.display = "none";
        document.body.appendChild(link);
        link.click();
      }
      function exportToCSV(table, filename) {
        var csv = [];
        var rows = document.getElementById(table).rows;
        for (var i = 0; i < rows.length; i++) {
          var row = [], cols = rows[i].cells;
          for (var j = 0; j < cols.length; j++)
            row.push(cols[j].innerText);
          csv.push(row.join(","));
        }
        downloadCSV(csv.join("\n"), filename);
      }
      function clearSearch(target) {
        $(target).DataTable().search("").draw();
      }
    </script>
  </head>
  <body>
    <h1 align="center">All Hosts</h1>
    <button onclick="clearSearch('#all_hosts')" style="float: right;">Clear Search</button><br><br>
    <table id="all_hosts" class="display">
      <thead>
        <tr>@@HOSTS_HEAD@@</tr>
      </thead>
      <tbody>
@@HOSTS_ROWS@@      </tbody>
    </table>
    <button onclick="exportToCSV('all_hosts', 'all_hosts.csv')">Save as CSV File</button>
    <br><br>
    <h1 align="center">Hosts by Title</h1>
    <button onclick="clearSearch('#unique_titles')" style="float: right;">Clear Search</button><br><br>
    <table id="unique_titles" class="display">
      <thead>
        <tr>@@TITLES_HEAD@@</tr>
      </thead>
      <tbody>
@@TITLES_ROWS@@      </tbody>
    </table>
    <button onclick="exportToCSV('unique_titles', 'unique_titles.csv')">Save as CSV File</button>
    <br><br>
    <h1 align="center">Hosts by Content</h1>
    <button onclick="clearSearch('#unique_content')" style="float: right;">Clear Search</button><br><br>
    <table id="unique_content" class="display">
      <thead>
        <tr>@@CONTENT_HEAD@@</tr>
      </thead>
      <tbody>
@@CONTENT_ROWS@@      </tbody>
    </table>
    <button onclick="exportToCSV('unique_content', 'unique_content.csv')">Save as CSV File</button>
    <br><br>
  </body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{ContentCount, TitleCount};

    fn sample_model(show_redirect: bool, show_notes: bool) -> ReportModel {
        ReportModel {
            rows: vec![HostRow {
                uri: "http://10.0.0.1:80".into(),
                title: "<Login> & Co".into(),
                status: "200".into(),
                hash: "deadbeef".into(),
                redirect: "No redirect.".into(),
            }],
            tables: Tables {
                titles: vec![TitleCount {
                    title: "<Login> & Co".into(),
                    count: 1,
                }],
                content: vec![ContentCount {
                    fingerprint: "deadbeef".into(),
                    title: "<Login> & Co".into(),
                    count: 1,
                }],
            },
            show_redirect,
            show_notes,
        }
    }

    #[test]
    fn optional_columns_follow_flags() {
        let plain = render_html(&sample_model(false, false), "test");
        assert!(!plain.contains("<th>Redirect</th>"));
        assert!(!plain.contains("<th>Notes</th>"));
        assert!(!plain.contains("cellEdit"));

        let full = render_html(&sample_model(true, true), "test");
        assert!(full.contains("<th>Redirect</th>"));
        assert!(full.contains("<th>Notes</th>"));
        assert!(full.contains("dataTables.cellEdit.js"));
        // Notes sits after URI, title, status, hash, redirect.
        assert!(full.contains("\"columns\": [5]"));
    }

    #[test]
    fn row_text_is_escaped() {
        let html = render_html(&sample_model(false, false), "test");
        assert!(html.contains("&lt;Login&gt; &amp; Co"));
        assert!(!html.contains("<Login>"));
    }

    #[test]
    fn redirect_urls_are_linkified() {
        let mut model = sample_model(true, false);
        model.rows[0].redirect = "https://example.com/portal".into();
        let html = render_html(&model, "test");
        assert!(html.contains("<td><a href=\"https://example.com/portal\""));

        model.rows[0].redirect = "No redirect.".into();
        let html = render_html(&model, "test");
        assert!(html.contains("<td>No redirect.</td>"));
    }

    #[test]
    fn all_three_tables_present() {
        let html = render_html(&sample_model(false, false), "test");
        for id in ["all_hosts", "unique_titles", "unique_content"] {
            assert!(html.contains(&format!("<table id=\"{id}\"")));
        }
    }
}

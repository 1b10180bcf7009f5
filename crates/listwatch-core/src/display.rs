use crate::{Query, QueryId, Record};
use colored::Colorize;
use tabled::settings::{object::Columns, Modify, Style, Width};
use tabled::{Table, Tabled};

#[derive(Tabled)]
pub struct QueryTableRow {
    #[tabled(rename = "Id", display_with = "display_right_4")]
    pub id: String,
    #[tabled(rename = "Label")]
    pub label: String,
    #[tabled(rename = "Seen", display_with = "display_right_5")]
    pub seen: String,
    #[tabled(rename = "Every")]
    pub interval: String,
    #[tabled(rename = "Last polled")]
    pub last_polled: String,
    #[tabled(rename = "Search")]
    pub search: String,
}

fn display_right_4(s: &str) -> String {
    format!("{:>4}", s)
}

fn display_right_5(s: &str) -> String {
    format!("{:>5}", s)
}

impl QueryTableRow {
    pub fn from_query(id: QueryId, query: &Query) -> Self {
        let last_polled = query
            .last_polled_at
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());

        Self {
            id: id.to_string(),
            label: query.label.clone(),
            seen: query.last_seen.len().to_string(),
            interval: format!("{}s", query.poll_interval.as_secs()),
            last_polled,
            search: query.query_spec.clone(),
        }
    }
}

pub fn create_query_table<'a>(queries: impl IntoIterator<Item = (&'a QueryId, &'a Query)>) -> String {
    let rows: Vec<QueryTableRow> = queries
        .into_iter()
        .map(|(id, query)| QueryTableRow::from_query(*id, query))
        .collect();

    let mut table = Table::new(&rows);
    table
        .with(Style::modern())
        .with(Modify::new(Columns::single(1)).with(Width::truncate(30)))     // Label column
        .with(Modify::new(Columns::single(5)).with(Width::wrap(60)));        // Search column

    table.to_string()
}

/// Human-readable rendering of one listing.
pub struct RecordDisplay<'a> {
    record: &'a Record,
    query_label: Option<&'a str>,
}

impl<'a> RecordDisplay<'a> {
    pub fn new(record: &'a Record, query_label: Option<&'a str>) -> Self {
        Self { record, query_label }
    }

    pub fn format(&self) -> String {
        let mut result = String::new();

        result.push_str(&format!(
            "{} - {} {}\n",
            self.record.title.bold(),
            self.record.price,
            self.record.currency
        ));
        if let Some(label) = self.query_label {
            result.push_str(&format!("  search: {}\n", label));
        }
        result.push_str(&format!("  {}\n", self.record.url));
        if let Some(photo) = &self.record.photo {
            result.push_str(&format!("  photo: {}\n", photo));
        }

        result
    }
}

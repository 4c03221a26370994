//! CSV and XML helpers for exporting and importing flat records.

use crate::errors::{OfscError, OfscErrorKind, OfscResult};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

/// A flat record, keyed by column name.
pub type Record = Map<String, Value>;

/// Renders rows as CSV with a header taken from the first row's keys.
///
/// Keys missing from later rows render as empty fields. Rows are joined by `\n`.
pub fn to_csv(rows: &[Record]) -> OfscResult<String> {
    let first = rows
        .first()
        .ok_or_else(|| OfscError::validation("No rows to export"))?;
    let headers: Vec<&String> = first.keys().collect();

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(
        headers
            .iter()
            .map(|h| escape_field(h))
            .collect::<Vec<_>>()
            .join(","),
    );

    for row in rows {
        let line = headers
            .iter()
            .map(|h| escape_field(&render_value(row.get(h.as_str()))))
            .collect::<Vec<_>>()
            .join(",");
        // A lone empty field would otherwise be an empty line.
        if line.is_empty() {
            lines.push("\"\"".to_string());
        } else {
            lines.push(line);
        }
    }

    Ok(lines.join("\n"))
}

fn render_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Reads CSV produced by [`to_csv`] back into records of string values.
///
/// Quoted fields may contain commas, doubled quotes and newlines.
pub fn parse_csv(text: &str) -> OfscResult<Vec<Record>> {
    let mut rows = read_rows(text)?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let headers = rows.remove(0);

    rows.into_iter()
        .enumerate()
        .map(|(index, row)| {
            if row.len() != headers.len() {
                return Err(OfscError::validation(format!(
                    "CSV row {} has {} fields, expected {}",
                    index + 2,
                    row.len(),
                    headers.len()
                )));
            }
            Ok(headers
                .iter()
                .cloned()
                .zip(row.into_iter().map(Value::String))
                .collect())
        })
        .collect()
}

fn read_rows(text: &str) -> OfscResult<Vec<Vec<String>>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut row_started = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\n' || in_quotes {
            row_started = true;
        }
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
                row_started = false;
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(OfscError::validation("Unterminated quoted CSV field"));
    }
    if row_started {
        row.push(field);
        rows.push(row);
    }

    Ok(rows)
}

/// Flattens every `<parent>` element into a record of its `<Field name="k">v</Field>` children.
///
/// Values are trimmed. A `parent` that never occurs is a validation error.
pub fn xml_records(xml: &str, parent: &str) -> OfscResult<Vec<Record>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut records = Vec::new();
    let mut current: Option<Record> = None;
    let mut field_name: Option<String> = None;
    let mut field_value = String::new();
    let mut depth = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == parent {
                    current = Some(Record::new());
                } else if name == "Field" && current.is_some() {
                    field_name = Some(field_name_of(&e)?);
                    field_value.clear();
                }
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == parent {
                    records.push(Record::new());
                } else if let (Some(record), true) = (current.as_mut(), name == "Field") {
                    record.insert(field_name_of(&e)?, Value::String(String::new()));
                }
            }
            Ok(Event::Text(e)) => {
                if field_name.is_some() {
                    let text = e.unescape().map_err(xml_error)?;
                    field_value.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                if field_name.is_some() {
                    field_value.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::End(e)) => {
                depth = depth.saturating_sub(1);
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "Field" {
                    if let (Some(record), Some(key)) = (current.as_mut(), field_name.take()) {
                        record.insert(key, Value::String(field_value.trim().to_string()));
                    }
                } else if name == parent {
                    if let Some(record) = current.take() {
                        records.push(record);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
    }

    if depth != 0 {
        return Err(OfscError::new(
            OfscErrorKind::XmlParseError,
            "Unexpected end of XML document",
        ));
    }
    if records.is_empty() {
        return Err(OfscError::validation(format!("No <{}> nodes found", parent)));
    }

    tracing::debug!(parent, records = records.len(), "Flattened XML records");
    Ok(records)
}

fn field_name_of(element: &BytesStart<'_>) -> OfscResult<String> {
    let attribute = element
        .try_get_attribute("name")
        .map_err(|e| OfscError::new(OfscErrorKind::XmlParseError, e.to_string()))?
        .ok_or_else(|| {
            OfscError::new(OfscErrorKind::XmlParseError, "Field element without a name")
        })?;
    let value = attribute.unescape_value().map_err(xml_error)?;
    Ok(value.into_owned())
}

fn xml_error(e: quick_xml::Error) -> OfscError {
    OfscError::new(OfscErrorKind::XmlParseError, e.to_string())
}

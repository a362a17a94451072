use std::collections::HashMap;

/// Splits one logical row into raw field values.
///
/// Commas inside quotes are literal, a doubled quote inside a quoted field is
/// one literal quote, and no trimming is applied. A row with N unquoted commas
/// always yields N + 1 fields.
pub fn decode_fields(row: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut characters = row.chars().peekable();

    while let Some(character) = characters.next() {
        match character {
            '"' if in_quotes && characters.peek() == Some(&'"') => {
                current.push('"');
                characters.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }

    fields.push(current);
    fields
}

pub fn decode_headers(line: &str) -> Vec<String> {
    decode_fields(line)
        .into_iter()
        .map(|header| header.trim().to_string())
        .collect()
}

/// Column name to raw value for a single row. Duplicate column names keep the
/// first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    values: HashMap<String, String>,
}

impl FieldMap {
    pub fn from_row(headers: &[String], row: &str) -> Self {
        let mut decoded = decode_fields(row).into_iter();
        let mut values = HashMap::with_capacity(headers.len());

        for header in headers {
            let value = decoded.next().unwrap_or_default();
            values.entry(header.clone()).or_insert(value);
        }

        Self { values }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }

    pub fn value(&self, column: &str) -> &str {
        self.get(column).unwrap_or_default()
    }

    /// Value of the first alias that exists as a column, blank or not.
    pub fn first_present(&self, aliases: &[&str]) -> Option<&str> {
        aliases.iter().find_map(|alias| self.get(alias))
    }
}

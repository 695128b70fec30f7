use std::fmt;

/// The named fields of a book specification, in canonical order.
pub const BOOK_SPEC_FIELDS: [&str; 8] = [
    "Genre",
    "Setting",
    "Time",
    "Themes",
    "Tone",
    "Point of View",
    "Characters",
    "Premise",
];

/// Structured narrative metadata, one free-text value per recognized field.
#[derive(Debug, Clone, PartialEq)]
pub struct BookSpec {
    values: Vec<String>,
}

impl Default for BookSpec {
    fn default() -> Self {
        Self {
            values: vec![String::new(); BOOK_SPEC_FIELDS.len()],
        }
    }
}

impl BookSpec {
    pub fn get(&self, field: &str) -> Option<&str> {
        field_index(field).map(|i| self.values[i].as_str())
    }

    /// Sets a recognized field's value; unknown field names are ignored.
    pub fn set(&mut self, field: &str, value: &str) {
        if let Some(i) = field_index(field) {
            self.values[i] = value.to_string();
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        BOOK_SPEC_FIELDS
            .iter()
            .zip(self.values.iter())
            .map(|(name, value)| (*name, value.as_str()))
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        self.fields()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| name)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Fills every empty field from `other`, so an enhancement pass never
    /// loses information the previous spec already had.
    pub fn fill_missing_from(&mut self, other: &BookSpec) {
        for (i, value) in self.values.iter_mut().enumerate() {
            if value.trim().is_empty() {
                *value = other.values[i].clone();
            }
        }
    }
}

impl fmt::Display for BookSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in self.fields() {
            if !first {
                writeln!(f)?;
            }
            write!(f, "{name}: {value}")?;
            first = false;
        }
        Ok(())
    }
}

fn field_index(field: &str) -> Option<usize> {
    BOOK_SPEC_FIELDS
        .iter()
        .position(|f| f.eq_ignore_ascii_case(field.trim()))
}

enum LastField {
    Known(usize),
    Other,
}

/// Parses raw spec text into a [`BookSpec`].
///
/// Lines are matched as `key: value` with a fuzzy key lookup; lines without
/// a colon continue the previous field's value. Unrecognized `key:` lines
/// divert following text into a transient bucket that is discarded.
pub fn parse_book_spec(text_spec: &str) -> BookSpec {
    let mut spec = BookSpec::default();
    let mut other = String::new();
    let mut last_field: Option<LastField> = None;

    // Some backends wrap the spec in a quoted block with a lead-in sentence.
    let mut body = text_spec;
    if let Some(pos) = text_spec.find("\"\"\"") {
        if pos < text_spec.len() / 2 {
            body = &text_spec[pos + 3..];
        }
    }

    for line in body.trim().lines() {
        if let Some((raw_key, value)) = line.split_once(':') {
            let pseudokey = raw_key.to_lowercase();
            let pseudokey = pseudokey.trim();
            let matched: Vec<usize> = BOOK_SPEC_FIELDS
                .iter()
                .enumerate()
                .filter(|(_, field)| {
                    let field = field.to_lowercase();
                    pseudokey.contains(field.trim()) && pseudokey.len() < 2 * field.trim().len()
                })
                .map(|(i, _)| i)
                .collect();
            if matched.len() == 1 {
                let idx = matched[0];
                spec.values[idx].push_str(value.trim());
                last_field = Some(LastField::Known(idx));
            } else {
                other.clear();
                last_field = Some(LastField::Other);
            }
        } else {
            match last_field {
                Some(LastField::Known(idx)) => {
                    spec.values[idx].push(' ');
                    spec.values[idx].push_str(line.trim());
                }
                Some(LastField::Other) => {
                    other.push(' ');
                    other.push_str(line.trim());
                }
                None => {}
            }
        }
    }

    spec
}

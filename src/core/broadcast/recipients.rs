use std::collections::HashSet;

/// Entries this short or shorter are treated as typos, not phone numbers.
pub const MIN_DIGITS_EXCLUSIVE: usize = 5;

/// Unique numeric recipient ids, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RecipientList {
    pub numbers: Vec<String>,
}

impl RecipientList {
    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.numbers
    }
}

/// Parses free text with one candidate per line.
pub fn normalize_recipients(raw: &str) -> RecipientList {
    normalize_entries(raw.lines())
}

/// Strips every non-digit, drops entries of `MIN_DIGITS_EXCLUSIVE` digits or
/// fewer, and removes duplicates.
pub fn normalize_entries<I, S>(entries: I) -> RecipientList
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut numbers = Vec::new();

    for entry in entries {
        let digits: String = entry
            .as_ref()
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect();
        if digits.len() <= MIN_DIGITS_EXCLUSIVE {
            continue;
        }
        if seen.insert(digits.clone()) {
            numbers.push(digits);
        }
    }

    RecipientList { numbers }
}

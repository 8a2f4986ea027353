//! Line unfolding and directive tokenization.
//!
//! A directive is one logical line of a calendar document:
//!
//! ```text
//! ATTENDEE;ROLE=REQ-PARTICIPANT;CN="Smith, John":mailto:j.smith@gmail.com
//! ^^^^^^^^ ^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^ ^^^^^^^^^^^^^^^^^^^^^^^^
//!   name              parameters                         value
//! ```
//!
//! Physical lines starting with a space or tab continue the previous line.

/// One tokenized directive line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    /// Directive name, uppercased.
    pub name: String,
    /// Parameters in document order; keys uppercased, quotes removed.
    pub params: Vec<(String, String)>,
    /// Everything after the first unquoted colon, verbatim.
    pub value: String,
}

impl Directive {
    /// Tokenizes a single unfolded line.
    ///
    /// Returns `None` for blank lines and lines without a name.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut chars = line.char_indices().peekable();

        let mut name = String::new();
        let mut delimiter = None;
        for (_, c) in chars.by_ref() {
            if c == ';' || c == ':' {
                delimiter = Some(c);
                break;
            }
            name.push(c);
        }

        let name = name.trim().to_ascii_uppercase();
        if name.is_empty() {
            return None;
        }

        let mut params = Vec::new();
        let mut delimiter = delimiter;
        while delimiter == Some(';') {
            let mut key = String::new();
            let mut value = String::new();
            let mut in_value = false;
            let mut quoted = false;
            delimiter = None;

            for (_, c) in chars.by_ref() {
                match c {
                    '"' if in_value => quoted = !quoted,
                    ';' | ':' if !quoted => {
                        delimiter = Some(c);
                        break;
                    }
                    '=' if !in_value => in_value = true,
                    _ if in_value => value.push(c),
                    _ => key.push(c),
                }
            }

            let key = key.trim().to_ascii_uppercase();
            if !key.is_empty() {
                params.push((key, value));
            }
        }

        let value = match (delimiter, chars.peek()) {
            (Some(':'), Some(&(idx, _))) => line[idx..].to_string(),
            _ => String::new(),
        };

        Some(Self {
            name,
            params,
            value,
        })
    }

    /// Returns the first parameter with the given (case-insensitive) key.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Returns a parameter value, or an empty string when absent.
    pub fn param_or_empty(&self, key: &str) -> &str {
        self.param(key).unwrap_or_default()
    }
}

/// Joins continuation lines onto the line they continue.
///
/// Line endings are normalized to `\n`. A line break followed by a single
/// space or tab is removed together with that whitespace character.
pub fn unfold(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\n' && matches!(chars.peek(), Some(' ' | '\t')) {
            chars.next();
            continue;
        }
        out.push(c);
    }
    out
}

/// The tokenized directives of one document section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directives {
    items: Vec<Directive>,
}

impl Directives {
    /// Unfolds and tokenizes every line of `text`.
    pub fn parse(text: &str) -> Self {
        let items = unfold(text).lines().filter_map(Directive::parse).collect();
        Self { items }
    }

    /// The first directive named `name`.
    pub fn first(&self, name: &str) -> Option<&Directive> {
        self.items.iter().find(|d| d.name.eq_ignore_ascii_case(name))
    }

    /// The value of the first directive named `name`, or an empty string.
    pub fn value(&self, name: &str) -> &str {
        self.first(name).map(|d| d.value.as_str()).unwrap_or_default()
    }

    /// All directives named `name`, in document order.
    pub fn all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Directive> + 'a {
        self.items
            .iter()
            .filter(move |d| d.name.eq_ignore_ascii_case(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Directive> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

use serde_json::Value;

use super::{collate, Document, View};

/// Options for reading a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub(crate) view: String,
    pub(crate) group_level: usize,
    pub(crate) map_only: bool,
    pub(crate) descending: bool,
    pub(crate) limit: Option<usize>,
}

impl Query {
    /// A query over the named view with default options: reduced if the view has
    /// a reduce function, collapsed to a single row, ascending, unlimited.
    pub fn new(view: impl Into<String>) -> Self {
        Query {
            view: view.into(),
            group_level: 0,
            map_only: false,
            descending: false,
            limit: None,
        }
    }

    /// Groups reduced rows by key. Array keys are grouped on their first
    /// `level` elements; any other key is grouped on itself.
    pub fn group_level(mut self, level: usize) -> Self {
        self.group_level = level;
        self
    }

    /// Skips the reduce function and returns the mapped rows.
    pub fn map_only(mut self) -> Self {
        self.map_only = true;
        self
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn view(&self) -> &str {
        &self.view
    }
}

/// One row of a query result.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRow {
    pub key: Value,
    pub value: Value,
    /// Emitting document. `None` for reduced rows.
    pub doc_id: Option<String>,
    /// The emitting document as stored. `None` for reduced rows.
    pub document: Option<Document>,
}

/// One emitted pair in a view index.
#[derive(Debug, Clone)]
pub(crate) struct IndexEntry {
    pub key: Value,
    pub value: Value,
    pub doc_id: String,
}

/// Builds the result rows of `query` from `entries`, which must already be in
/// collation order. `document` looks up the backing document of a map row.
pub(crate) fn run<'a>(
    view: &View,
    query: &Query,
    entries: impl Iterator<Item = &'a IndexEntry>,
    document: impl Fn(&str) -> Option<Document>,
) -> Vec<QueryRow> {
    let mut rows = if view.has_reduce() && !query.map_only {
        reduce_rows(view, query.group_level, entries)
    } else {
        entries
            .map(|entry| QueryRow {
                key: entry.key.clone(),
                value: entry.value.clone(),
                doc_id: Some(entry.doc_id.clone()),
                document: document(&entry.doc_id),
            })
            .collect()
    };

    if query.descending {
        rows.reverse();
    }
    if let Some(limit) = query.limit {
        rows.truncate(limit);
    }
    rows
}

fn group_key(key: &Value, level: usize) -> Value {
    match key {
        Value::Array(items) => Value::Array(items.iter().take(level).cloned().collect()),
        other => other.clone(),
    }
}

fn reduce_rows<'a>(
    view: &View,
    group_level: usize,
    entries: impl Iterator<Item = &'a IndexEntry>,
) -> Vec<QueryRow> {
    // (group key, keys, values) for each run of equal group keys
    let mut groups: Vec<(Value, Vec<Value>, Vec<Value>)> = Vec::new();
    for entry in entries {
        let key = if group_level == 0 { Value::Null } else { group_key(&entry.key, group_level) };
        if let Some((current, keys, values)) = groups.last_mut() {
            if collate(current, &key).is_eq() {
                keys.push(entry.key.clone());
                values.push(entry.value.clone());
                continue;
            }
        }
        groups.push((key, vec![entry.key.clone()], vec![entry.value.clone()]));
    }

    groups
        .into_iter()
        .filter_map(|(key, keys, values)| {
            let value = view.reduce(&keys, &values, false)?;
            Some(QueryRow { key, value, doc_id: None, document: None })
        })
        .collect()
}

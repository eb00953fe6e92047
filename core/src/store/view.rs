use std::{cmp::Ordering, fmt, sync::Arc};

use serde_json::Value;

use super::Document;

/// Map function of a view. Called once per document; emits zero or more key/value pairs.
pub type MapFn = Arc<dyn Fn(&Document, &mut Emitter) + Send + Sync>;

/// Reduce function of a view.
///
/// Receives the keys and values of a group of rows. When `rereduce` is true the
/// values are outputs of earlier reduce calls and the keys are empty.
pub type ReduceFn = Arc<dyn Fn(&[Value], &[Value], bool) -> Value + Send + Sync>;

/// Collects the key/value pairs a map function emits for one document.
#[derive(Debug, Default)]
pub struct Emitter {
    rows: Vec<(Value, Value)>,
}

impl Emitter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, key: Value, value: Value) {
        self.rows.push((key, value));
    }

    pub(crate) fn into_rows(self) -> Vec<(Value, Value)> {
        self.rows
    }
}

/// A named, versioned index definition.
///
/// The version tag is opaque. Whenever the map or reduce logic changes, the
/// version must change too, otherwise a database that already indexed the view
/// keeps serving the old index.
#[derive(Clone)]
pub struct View {
    name: String,
    version: String,
    map: MapFn,
    reduce: Option<ReduceFn>,
}

impl View {
    pub fn new<F>(name: impl Into<String>, version: impl Into<String>, map: F) -> Self
    where
        F: Fn(&Document, &mut Emitter) + Send + Sync + 'static,
    {
        View {
            name: name.into(),
            version: version.into(),
            map: Arc::new(map),
            reduce: None,
        }
    }

    pub fn with_reduce<R>(mut self, reduce: R) -> Self
    where
        R: Fn(&[Value], &[Value], bool) -> Value + Send + Sync + 'static,
    {
        self.reduce = Some(Arc::new(reduce));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn has_reduce(&self) -> bool {
        self.reduce.is_some()
    }

    pub(crate) fn map(&self, doc: &Document) -> Vec<(Value, Value)> {
        let mut emitter = Emitter::new();
        (self.map)(doc, &mut emitter);
        emitter.into_rows()
    }

    pub(crate) fn reduce(&self, keys: &[Value], values: &[Value], rereduce: bool) -> Option<Value> {
        self.reduce.as_ref().map(|reduce| reduce(keys, values, rereduce))
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("has_reduce", &self.has_reduce())
            .finish()
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON keys used to sort view rows.
///
/// `null` < booleans < numbers < strings < arrays < objects. Strings compare by
/// code point, arrays element by element, objects entry by entry in their stored
/// order.
pub fn collate(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(x, y)| collate(x, y))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(x), Value::Object(y)) => x
            .iter()
            .zip(y)
            .map(|((kx, vx), (ky, vy))| kx.cmp(ky).then_with(|| collate(vx, vy)))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collation_across_types() {
        let mut keys = vec![
            json!({ "a": 1 }),
            json!(["a"]),
            json!("b"),
            json!(10),
            json!(true),
            json!(null),
            json!(false),
            json!("a"),
            json!(2.5),
        ];
        keys.sort_by(collate);
        assert_eq!(
            keys,
            vec![
                json!(null),
                json!(false),
                json!(true),
                json!(2.5),
                json!(10),
                json!("a"),
                json!("b"),
                json!(["a"]),
                json!({ "a": 1 }),
            ]
        );
    }

    #[test]
    fn test_array_collation_is_elementwise() {
        assert_eq!(collate(&json!(["a", 2]), &json!(["a", 10])), Ordering::Less);
        assert_eq!(collate(&json!(["a"]), &json!(["a", 1])), Ordering::Less);
        assert_eq!(collate(&json!(["b"]), &json!(["a", 1])), Ordering::Greater);
    }

    #[test]
    fn test_map_and_reduce() {
        let view = View::new("lengths", "1", |doc, emit| {
            if let Some(title) = doc.get("title").and_then(Value::as_str) {
                emit.emit(json!(title), json!(title.len()));
            }
        })
        .with_reduce(|_, values, _| json!(values.iter().filter_map(Value::as_u64).sum::<u64>()));

        let mut doc = Document::with_id("d");
        doc.set("title", json!("inbox"));
        assert_eq!(view.map(&doc), vec![(json!("inbox"), json!(5))]);
        assert_eq!(view.reduce(&[], &[json!(5), json!(3)], true), Some(json!(8)));

        let untitled = Document::with_id("e");
        assert!(view.map(&untitled).is_empty());
    }
}

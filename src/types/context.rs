use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Caller context handed to every rule evaluation: who is asking, with what
/// roles and on which tenant.
///
/// A JSON object addressed by dot-separated paths like `"user.roles"`. The
/// pipeline never inspects it; it is shared read-only by all evaluations of
/// one request. Claims decoded from a token deserialize straight into it.
///
/// ```
/// use fieldgate::Context;
///
/// let ctx: Context = serde_json::from_str(
///     r#"{ "user": { "id": "u1", "roles": ["reader", "moderator"] } }"#,
/// )
/// .unwrap();
/// assert!(ctx.includes("user.roles", "moderator"));
/// assert_eq!(ctx.get_str("user.id"), Some("u1"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    root: Map<String, Value>,
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value at a dot-separated path, replacing anything on the way
    /// that is not an object.
    #[must_use]
    pub fn set(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.insert(path, value.into());
        self
    }

    pub fn insert(&mut self, path: &str, value: Value) {
        let mut segments = path.split('.');
        let Some(last) = segments.next_back() else {
            return;
        };
        let mut map = &mut self.root;
        for segment in segments {
            let slot = map
                .entry(segment.to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            map = match slot {
                Value::Object(next) => next,
                _ => return,
            };
        }
        map.insert(last.to_owned(), value);
    }

    /// The value at a dot-separated path. Intermediate paths return the
    /// whole object below them, so a rule can read `"user"` at once.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = self.root.get(segments.next()?)?;
        segments.try_fold(first, |value, segment| value.as_object()?.get(segment))
    }

    #[must_use]
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// Whether the value at `path` is `needle`, or is a list holding it.
    /// Meant for role and scope lists.
    #[must_use]
    pub fn includes(&self, path: &str, needle: impl Into<Value>) -> bool {
        let needle = needle.into();
        match self.get(path) {
            Some(Value::Array(items)) => items.contains(&needle),
            Some(value) => *value == needle,
            None => false,
        }
    }
}

impl From<Map<String, Value>> for Context {
    fn from(root: Map<String, Value>) -> Self {
        Self { root }
    }
}

/// A tag name with the number of files carrying it.
///
/// Tags are derived from the tags view on every rebuild and are never stored:
/// there is no conversion from a `Tag` to a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    pub title: String,
    pub count: u64,
}

impl Tag {
    pub fn new(title: impl Into<String>, count: u64) -> Self {
        Tag { title: title.into(), count }
    }

    /// Always `false`.
    pub fn should_save(&self) -> bool {
        false
    }
}

use std::fmt;

/// Sort direction of an `$orderby` key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderKey {
    pub field: String,
    pub dir: SortDir,
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.dir {
            SortDir::Asc => f.write_str(&self.field),
            SortDir::Desc => write!(f, "{} desc", self.field),
        }
    }
}

/// Structured query options produced by the visitor, consumed once by URL assembly.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ODataV4QuerySegments {
    pub select: Option<Vec<String>>,
    pub order_by: Option<Vec<OrderKey>>,
    pub skip: Option<u64>,
    pub top: Option<u64>,
    pub filter: Option<String>,
    /// Rendered key literal, spliced into the path as `(key)`.
    pub key: Option<String>,
    pub count: bool,
    pub expand: Option<Vec<String>>,
    /// Request the raw value (`/$value`) instead of JSON.
    pub value: bool,
}

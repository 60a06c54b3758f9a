use crate::proxy::ODataEntity;
use crate::query::ODataQuery;
use crate::v4::ODataV4Options;

/// Entry point for an `OData` v4 service rooted at a base path.
///
/// Each query gets its own provider, so range-variable numbering restarts per query root.
#[derive(Clone, Debug)]
pub struct ODataV4Context {
    base_path: String,
    options: ODataV4Options,
}

impl ODataV4Context {
    pub fn new(base_path: impl Into<String>, options: ODataV4Options) -> Self {
        Self {
            base_path: base_path.into(),
            options,
        }
    }

    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Query over the entity set at `base_path + endpoint`.
    #[must_use]
    pub fn query<T: ODataEntity>(&self, endpoint: &str) -> ODataQuery<T> {
        ODataQuery::for_v4_with(format!("{}{endpoint}", self.base_path), self.options.clone())
    }
}

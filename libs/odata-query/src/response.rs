//! JSON response shapes returned by `OData` v4 services.

use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Base response carrying the metadata context URL.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ODataResponse {
    #[serde(rename = "@odata.context", default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Collection response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ODataQueryResponse<T> {
    #[serde(rename = "@odata.context", default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(rename = "@odata.nextLink", default, skip_serializing_if = "Option::is_none")]
    pub next_link: Option<String>,
    pub value: Vec<T>,
}

impl<T> ODataQueryResponse<T> {
    pub(crate) fn try_map<U>(self, f: impl FnMut(T) -> Result<U>) -> Result<ODataQueryResponse<U>> {
        Ok(ODataQueryResponse {
            context: self.context,
            next_link: self.next_link,
            value: self.value.into_iter().map(f).collect::<Result<_>>()?,
        })
    }
}

/// Collection response requested with `$count=true`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ODataQueryResponseWithCount<T> {
    #[serde(rename = "@odata.context", default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(rename = "@odata.nextLink", default, skip_serializing_if = "Option::is_none")]
    pub next_link: Option<String>,
    #[serde(rename = "@odata.count", default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    pub value: Vec<T>,
}

impl<T> ODataQueryResponseWithCount<T> {
    pub(crate) fn try_map<U>(
        self,
        f: impl FnMut(T) -> Result<U>,
    ) -> Result<ODataQueryResponseWithCount<U>> {
        Ok(ODataQueryResponseWithCount {
            context: self.context,
            next_link: self.next_link,
            count: self.count,
            value: self.value.into_iter().map(f).collect::<Result<_>>()?,
        })
    }
}

/// Single entity response; the entity's own properties sit next to the context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ODataEntityResponse<T> {
    #[serde(rename = "@odata.context", default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(flatten)]
    pub entity: T,
}

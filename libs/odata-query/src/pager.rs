//! `@odata.nextLink` pagination with Stream API
//!
//! Converts a page-fetching function into a stream of pages or items. The first
//! call receives `None`; every following call receives the previous page's
//! `@odata.nextLink`. The stream ends after a page without a next link or after
//! the first error, and stays finished once exhausted.
//!
//! # Example
//!
//! ```rust,ignore
//! use futures_util::StreamExt;
//!
//! let mut users = query.filter(|u| u.age().greater_than(30))?.items();
//! while let Some(user) = users.next().await {
//!     println!("{:?}", user?);
//! }
//! ```

use futures_core::Stream;
use pin_project_lite::pin_project;
use std::collections::VecDeque;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use url::{Position, Url};

use crate::errors::{Error, Result};
use crate::response::ODataQueryResponse;

/// Origin standing in for the missing one while resolving against a relative URL.
const PLACEHOLDER_ORIGIN: &str = "http://relative.invalid";

/// Resolve a `@odata.nextLink` against the URL of the request whose response
/// carried it.
///
/// Absolute links are returned unchanged. Relative links follow RFC 3986
/// reference resolution; against a relative request URL the result stays relative.
///
/// # Errors
/// Returns [`Error::InvalidNextLink`] if the link cannot be resolved.
pub fn resolve_next_link(request_url: &str, next_link: &str) -> Result<String> {
    let invalid = |source: url::ParseError| Error::InvalidNextLink {
        link: next_link.to_owned(),
        source,
    };

    match Url::parse(next_link) {
        Ok(_) => return Ok(next_link.to_owned()),
        Err(url::ParseError::RelativeUrlWithoutBase) => {}
        Err(e) => return Err(invalid(e)),
    }

    match Url::parse(request_url) {
        Ok(base) => Ok(base.join(next_link).map_err(invalid)?.into()),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let placeholder = Url::parse(PLACEHOLDER_ORIGIN).map_err(invalid)?;
            let resolved = placeholder
                .join(request_url)
                .and_then(|base| base.join(next_link))
                .map_err(invalid)?;
            if resolved.origin() != placeholder.origin() {
                return Ok(resolved.into());
            }
            let path = &resolved[Position::BeforePath..];
            if request_url.starts_with('/') {
                Ok(path.to_owned())
            } else {
                Ok(path.trim_start_matches('/').to_owned())
            }
        }
        Err(e) => Err(invalid(e)),
    }
}

pin_project! {
    /// Stream of whole pages.
    pub struct PagesPager<T, F, Fut>
    where
        F: FnMut(Option<String>) -> Fut,
        Fut: Future<Output = Result<ODataQueryResponse<T>>>,
    {
        next_link: Option<String>,
        done: bool,
        fetcher: F,
        #[pin]
        current_fetch: Option<Fut>,
        _page: PhantomData<fn() -> T>,
    }
}

impl<T, F, Fut> PagesPager<T, F, Fut>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<ODataQueryResponse<T>>>,
{
    pub fn new(fetcher: F) -> Self {
        Self {
            next_link: None,
            done: false,
            fetcher,
            current_fetch: None,
            _page: PhantomData,
        }
    }
}

impl<T, F, Fut> Stream for PagesPager<T, F, Fut>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<ODataQueryResponse<T>>>,
{
    type Item = Result<ODataQueryResponse<T>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if *this.done {
                return Poll::Ready(None);
            }

            if let Some(fut) = this.current_fetch.as_mut().as_pin_mut() {
                match fut.poll(cx) {
                    Poll::Ready(Ok(page)) => {
                        this.current_fetch.set(None);

                        this.next_link.clone_from(&page.next_link);

                        if this.next_link.is_none() {
                            *this.done = true;
                        }

                        return Poll::Ready(Some(Ok(page)));
                    }
                    Poll::Ready(Err(e)) => {
                        this.current_fetch.set(None);
                        *this.done = true;
                        return Poll::Ready(Some(Err(e)));
                    }
                    Poll::Pending => return Poll::Pending,
                }
            }

            let fut = (this.fetcher)(this.next_link.take());
            this.current_fetch.set(Some(fut));
        }
    }
}

pin_project! {
    /// Stream of individual items across all pages.
    pub struct ItemsPager<T, F, Fut>
    where
        F: FnMut(Option<String>) -> Fut,
        Fut: Future<Output = Result<ODataQueryResponse<T>>>,
    {
        next_link: Option<String>,
        buffer: VecDeque<T>,
        done: bool,
        fetcher: F,
        #[pin]
        current_fetch: Option<Fut>,
    }
}

impl<T, F, Fut> ItemsPager<T, F, Fut>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<ODataQueryResponse<T>>>,
{
    pub fn new(fetcher: F) -> Self {
        Self {
            next_link: None,
            buffer: VecDeque::new(),
            done: false,
            fetcher,
            current_fetch: None,
        }
    }
}

impl<T, F, Fut> Stream for ItemsPager<T, F, Fut>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<ODataQueryResponse<T>>>,
{
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(item) = this.buffer.pop_front() {
                return Poll::Ready(Some(Ok(item)));
            }

            if *this.done {
                return Poll::Ready(None);
            }

            if let Some(fut) = this.current_fetch.as_mut().as_pin_mut() {
                match fut.poll(cx) {
                    Poll::Ready(Ok(page)) => {
                        this.current_fetch.set(None);

                        this.next_link.clone_from(&page.next_link);

                        if this.next_link.is_none() {
                            *this.done = true;
                        }

                        this.buffer.extend(page.value);

                        continue;
                    }
                    Poll::Ready(Err(e)) => {
                        this.current_fetch.set(None);
                        *this.done = true;
                        return Poll::Ready(Some(Err(e)));
                    }
                    Poll::Pending => return Poll::Pending,
                }
            }

            let fut = (this.fetcher)(this.next_link.take());
            this.current_fetch.set(Some(fut));
        }
    }
}
